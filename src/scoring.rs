//! Click pattern scoring
//!
//! Reduces a click history to a single human-likeness estimate in `[0, 1]`.
//! Scripted clicking tends to be periodic, aimed at one kind of element and
//! spatially tight; people click irregularly, on varied targets, all over the
//! page.

use crate::types::ClickRecord;
use std::collections::{HashMap, HashSet};

/// Entropy (bits) at which the timing term saturates
const ENTROPY_CAP_BITS: f64 = 3.0;
/// Distinct target tags at which the diversity term saturates
const TAG_DIVERSITY_CAP: f64 = 4.0;
/// Mean click-to-click distance at which the spread term saturates
const SPREAD_CAP_UNITS: f64 = 100.0;

const ENTROPY_WEIGHT: f64 = 0.4;
const DIVERSITY_WEIGHT: f64 = 0.2;
const SPREAD_WEIGHT: f64 = 0.4;

/// Score returned when there is too little evidence to judge
pub const NEUTRAL_SCORE: f64 = 1.0;

/// Compute the click pattern score for a click history in arrival order.
///
/// ```text
/// score = 0.4 * min(H(intervals) / 3, 1)
///       + 0.2 * min(distinct_tags / 4, 1)
///       + 0.4 * min(mean_step_distance / 100, 1)
/// ```
///
/// Fewer than two clicks yields [`NEUTRAL_SCORE`]. The result is rounded to
/// two decimal places.
pub fn click_pattern_score(clicks: &[ClickRecord]) -> f64 {
    if clicks.len() < 2 {
        return NEUTRAL_SCORE;
    }

    let intervals = inter_click_intervals_ms(clicks);
    let norm_entropy = (shannon_entropy(&intervals) / ENTROPY_CAP_BITS).min(1.0);
    let tag_diversity = (distinct_tags(clicks) as f64 / TAG_DIVERSITY_CAP).min(1.0);
    let spread_score = (mean_step_distance(clicks) / SPREAD_CAP_UNITS).min(1.0);

    let score = ENTROPY_WEIGHT * norm_entropy
        + DIVERSITY_WEIGHT * tag_diversity
        + SPREAD_WEIGHT * spread_score;
    round_decimals(score.clamp(0.0, 1.0), 2)
}

/// Round to a fixed number of decimal places
pub fn round_decimals(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Successive time differences in whole milliseconds
fn inter_click_intervals_ms(clicks: &[ClickRecord]) -> Vec<i64> {
    clicks
        .windows(2)
        .map(|pair| (pair[1].time - pair[0].time).num_milliseconds())
        .collect()
}

/// Shannon entropy (bits) of the distribution of exact interval values
fn shannon_entropy(intervals: &[i64]) -> f64 {
    if intervals.is_empty() {
        return 0.0;
    }

    let mut counts: HashMap<i64, usize> = HashMap::new();
    for interval in intervals {
        *counts.entry(*interval).or_insert(0) += 1;
    }

    let total = intervals.len() as f64;
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

fn distinct_tags(clicks: &[ClickRecord]) -> usize {
    clicks
        .iter()
        .map(|c| c.target_tag.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Mean distance from each click to its predecessor; the first click counts as 0
fn mean_step_distance(clicks: &[ClickRecord]) -> f64 {
    let total: f64 = clicks
        .windows(2)
        .map(|pair| pair[0].position().distance_to(&pair[1].position()))
        .sum();
    total / clicks.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn click(offset_ms: i64, x: f64, y: f64, tag: &str) -> ClickRecord {
        ClickRecord {
            time: base_time() + Duration::milliseconds(offset_ms),
            x,
            y,
            target_tag: tag.to_string(),
        }
    }

    #[test]
    fn test_insufficient_clicks_are_neutral() {
        assert_eq!(click_pattern_score(&[]), 1.0);
        assert_eq!(click_pattern_score(&[click(0, 10.0, 10.0, "BUTTON")]), 1.0);
    }

    #[test]
    fn test_periodic_single_target_is_low() {
        let clicks: Vec<_> = (0..10).map(|i| click(i * 500, 50.0, 50.0, "BUTTON")).collect();
        // Entropy and spread collapse to 0; one tag contributes 0.25 * 0.2
        assert_eq!(click_pattern_score(&clicks), 0.05);
    }

    #[test]
    fn test_irregular_diverse_spread_is_high() {
        let tags = ["BUTTON", "A", "DIV", "SPAN"];
        let offsets = [0, 310, 1020, 1650, 2900, 3370, 4800, 5230, 7010];
        let clicks: Vec<_> = offsets
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                let x = if i % 2 == 0 { 0.0 } else { 400.0 };
                click(t, x, (i * 150) as f64, tags[i % tags.len()])
            })
            .collect();

        // 8 distinct intervals -> 3 bits of entropy
        assert_eq!(click_pattern_score(&clicks), 1.0);
    }

    #[test]
    fn test_human_beats_scripted() {
        let scripted: Vec<_> = (0..6).map(|i| click(i * 200, 10.0, 10.0, "BUTTON")).collect();
        let human = vec![
            click(0, 50.0, 60.0, "BUTTON"),
            click(800, 52.0, 63.0, "A"),
            click(1500, 300.0, 100.0, "DIV"),
            click(2900, 305.0, 95.0, "SPAN"),
        ];
        assert!(click_pattern_score(&scripted) < click_pattern_score(&human));
    }

    #[test]
    fn test_mixed_history_score() {
        let clicks = vec![
            click(0, 50.0, 60.0, "BUTTON"),
            click(800, 52.0, 63.0, "A"),
            click(1500, 300.0, 100.0, "DIV"),
            click(2900, 305.0, 95.0, "SPAN"),
        ];
        // entropy log2(3)/3 * 0.4 = 0.211, tags 0.2, spread 65.35/100 * 0.4 = 0.261
        assert_eq!(click_pattern_score(&clicks), 0.67);
    }

    #[test]
    fn test_two_clicks_far_apart() {
        let clicks = vec![click(0, 5.0, 5.0, "BUTTON"), click(1200, 400.0, 5.0, "DIV")];
        // entropy 0, tags 2/4 * 0.2 = 0.1, mean distance 197.5 saturates -> 0.4
        assert_eq!(click_pattern_score(&clicks), 0.5);
    }

    #[test]
    fn test_shannon_entropy() {
        assert_eq!(shannon_entropy(&[]), 0.0);
        assert_eq!(shannon_entropy(&[100, 100, 100]), 0.0);
        assert!((shannon_entropy(&[1, 2]) - 1.0).abs() < 1e-9);
        assert!((shannon_entropy(&[1, 2, 3, 4]) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_decimals() {
        assert_eq!(round_decimals(0.6727, 2), 0.67);
        assert_eq!(round_decimals(99.999, 2), 100.0);
    }
}
