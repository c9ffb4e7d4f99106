//! FFI bindings for Synheart Sentinel
//!
//! This module provides C-compatible functions for embedding a telemetry
//! session in a host shell (browser bridge, webview, native app). All
//! functions use C strings (null-terminated); returned strings are allocated
//! and must be freed by the caller with `sentinel_free_string`.
//!
//! Status-returning functions use `0` (or a positive value) for success and
//! `-1` for failure, with the message available from `sentinel_last_error`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::clock::{Clock, SystemClock};
use crate::config::SentinelConfig;
use crate::error::SentinelError;
use crate::scoring::click_pattern_score;
use crate::session::BehaviorSession;
use crate::store::{FileStore, MemoryStore, SnapshotStore};
use crate::types::{ClickRecord, InteractionEvent};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// Session API
// ============================================================================

/// Opaque handle to a telemetry session
pub struct SentinelHandle {
    session: BehaviorSession<SystemClock, Box<dyn SnapshotStore>>,
}

/// Resolve a handle pointer, recording an error when it is null
unsafe fn handle_mut<'a>(handle: *mut SentinelHandle) -> Option<&'a mut SentinelHandle> {
    if handle.is_null() {
        set_last_error("Null session pointer");
        return None;
    }
    Some(&mut *handle)
}

fn build_handle(
    config_json: Option<String>,
    state_dir: Option<String>,
) -> Result<SentinelHandle, SentinelError> {
    let config = match config_json {
        Some(json) => SentinelConfig::from_json(&json)?,
        None => SentinelConfig::default(),
    };
    let store: Box<dyn SnapshotStore> = match state_dir {
        Some(dir) => Box::new(FileStore::new(dir)),
        None => Box::new(MemoryStore::new()),
    };
    Ok(SentinelHandle {
        session: BehaviorSession::new(config, SystemClock, store),
    })
}

/// Create a new, uninitialized session.
///
/// # Safety
/// - `config_json` may be NULL (defaults) or a valid null-terminated C string
///   holding a JSON config.
/// - `state_dir` may be NULL (in-memory storage) or a valid null-terminated C
///   string naming the directory that holds the snapshot slot.
/// - Returns a pointer that must be freed with `sentinel_free`, or NULL on error.
#[no_mangle]
pub unsafe extern "C" fn sentinel_new(
    config_json: *const c_char,
    state_dir: *const c_char,
) -> *mut SentinelHandle {
    clear_last_error();

    match build_handle(cstr_to_string(config_json), cstr_to_string(state_dir)) {
        Ok(handle) => Box::into_raw(Box::new(handle)),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a session.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `sentinel_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn sentinel_free(handle: *mut SentinelHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Begin session tracking. Returns 1 if this call started the session, 0 if
/// it was already active, -1 on error.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `sentinel_new`.
#[no_mangle]
pub unsafe extern "C" fn sentinel_init(handle: *mut SentinelHandle) -> i32 {
    clear_last_error();
    match handle_mut(handle) {
        Some(h) => i32::from(h.session.init()),
        None => -1,
    }
}

/// Clear the session and start a fresh identity.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `sentinel_new`.
#[no_mangle]
pub unsafe extern "C" fn sentinel_reset(handle: *mut SentinelHandle) -> i32 {
    clear_last_error();
    match handle_mut(handle) {
        Some(h) => {
            h.session.reset();
            0
        }
        None => -1,
    }
}

/// Report the outcome of a verification challenge.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `sentinel_new`.
#[no_mangle]
pub unsafe extern "C" fn sentinel_notify_verification(
    handle: *mut SentinelHandle,
    passed: bool,
) -> i32 {
    clear_last_error();
    match handle_mut(handle) {
        Some(h) => {
            h.session.notify_verification_success(passed);
            0
        }
        None => -1,
    }
}

/// Deliver one interaction event encoded as JSON
/// (e.g. `{"type":"click","x":1,"y":2,"target_tag":"BUTTON"}`).
///
/// # Safety
/// - `handle` must be a valid pointer returned by `sentinel_new`.
/// - `event_json` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn sentinel_dispatch_event(
    handle: *mut SentinelHandle,
    event_json: *const c_char,
) -> i32 {
    clear_last_error();

    let Some(h) = handle_mut(handle) else {
        return -1;
    };

    let json_str = match cstr_to_string(event_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid event string pointer");
            return -1;
        }
    };

    match serde_json::from_str::<InteractionEvent>(&json_str) {
        Ok(event) => {
            h.session.handle_event(&event);
            0
        }
        Err(e) => {
            set_last_error(&SentinelError::InvalidEvent(e.to_string()).to_string());
            -1
        }
    }
}

/// Run elapsed timers. Returns 1 if a snapshot was written, 0 if not, -1 on error.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `sentinel_new`.
#[no_mangle]
pub unsafe extern "C" fn sentinel_poll_timers(handle: *mut SentinelHandle) -> i32 {
    clear_last_error();
    match handle_mut(handle) {
        Some(h) => i32::from(h.session.poll_timers()),
        None => -1,
    }
}

/// Milliseconds until the next timer is due, 0 if overdue, -1 if none is armed
/// or on error.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `sentinel_new`.
#[no_mangle]
pub unsafe extern "C" fn sentinel_next_deadline_ms(handle: *mut SentinelHandle) -> i64 {
    clear_last_error();
    let Some(h) = handle_mut(handle) else {
        return -1;
    };
    match h.session.next_deadline() {
        Some(deadline) => {
            let remaining = deadline - SystemClock.now();
            // Round up so a host that sleeps this long finds the timer due
            let ms = remaining.num_milliseconds();
            let ms = if remaining > chrono::Duration::milliseconds(ms) {
                ms.saturating_add(1)
            } else {
                ms
            };
            ms.max(0)
        }
        None => -1,
    }
}

/// Write the snapshot immediately (page exit).
///
/// # Safety
/// - `handle` must be a valid pointer returned by `sentinel_new`.
#[no_mangle]
pub unsafe extern "C" fn sentinel_flush(handle: *mut SentinelHandle) -> i32 {
    clear_last_error();
    match handle_mut(handle) {
        Some(h) => {
            h.session.flush();
            0
        }
        None => -1,
    }
}

/// Return the last persisted snapshot as JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `sentinel_new`.
/// - Returns a newly allocated string that must be freed with `sentinel_free_string`.
/// - Returns NULL on error; call `sentinel_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn sentinel_get_snapshot(handle: *mut SentinelHandle) -> *mut c_char {
    clear_last_error();
    let Some(h) = handle_mut(handle) else {
        return ptr::null_mut();
    };

    match serde_json::to_string(&h.session.get_snapshot()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Score a JSON array of click records. Returns -1.0 on error.
///
/// # Safety
/// - `clicks_json` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn sentinel_score_clicks(clicks_json: *const c_char) -> f64 {
    clear_last_error();

    let json_str = match cstr_to_string(clicks_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return -1.0;
        }
    };

    match serde_json::from_str::<Vec<ClickRecord>>(&json_str) {
        Ok(clicks) => click_pattern_score(&clicks),
        Err(e) => {
            set_last_error(&e.to_string());
            -1.0
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Sentinel functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Sentinel function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn sentinel_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Sentinel function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn sentinel_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the Sentinel library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn sentinel_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn snapshot_value(handle: *mut SentinelHandle) -> serde_json::Value {
        let raw = sentinel_get_snapshot(handle);
        assert!(!raw.is_null());
        let value = serde_json::from_str(CStr::from_ptr(raw).to_str().unwrap()).unwrap();
        sentinel_free_string(raw);
        value
    }

    #[test]
    fn test_ffi_session_lifecycle() {
        unsafe {
            let handle = sentinel_new(ptr::null(), ptr::null());
            assert!(!handle.is_null());

            assert_eq!(sentinel_init(handle), 1);
            assert_eq!(sentinel_init(handle), 0);

            for event in [
                r#"{"type":"pointer_move","x":0,"y":0}"#,
                r#"{"type":"pointer_move","x":3,"y":4}"#,
                r#"{"type":"scroll"}"#,
            ] {
                let json = CString::new(event).unwrap();
                assert_eq!(sentinel_dispatch_event(handle, json.as_ptr()), 0);
            }
            assert!(sentinel_next_deadline_ms(handle) >= 0);
            assert_eq!(sentinel_notify_verification(handle, true), 0);
            assert_eq!(sentinel_flush(handle), 0);

            let snapshot = snapshot_value(handle);
            assert_eq!(snapshot["cursorTravelUnits"], 5.0);
            assert_eq!(snapshot["scrollTier"], "short");
            assert_eq!(snapshot["captchaSuccess"], 1);
            let first_id = snapshot["sessionId"].clone();

            assert_eq!(sentinel_reset(handle), 0);
            let snapshot = snapshot_value(handle);
            assert_ne!(snapshot["sessionId"], first_id);
            assert_eq!(snapshot["cursorTravelUnits"], 0.0);

            sentinel_free(handle);
        }
    }

    #[test]
    fn test_ffi_invalid_event() {
        unsafe {
            let handle = sentinel_new(ptr::null(), ptr::null());
            let json = CString::new(r#"{"type":"teleport"}"#).unwrap();
            assert_eq!(sentinel_dispatch_event(handle, json.as_ptr()), -1);

            let error = sentinel_last_error();
            assert!(!error.is_null());
            let message = CStr::from_ptr(error).to_str().unwrap();
            assert!(message.starts_with("Invalid interaction event"));

            sentinel_free(handle);
        }
    }

    #[test]
    fn test_ffi_invalid_config() {
        unsafe {
            let config = CString::new(r#"{"debounce_ms": 0}"#).unwrap();
            let handle = sentinel_new(config.as_ptr(), ptr::null());
            assert!(handle.is_null());
            assert!(!sentinel_last_error().is_null());

            let config = CString::new(r#"{"debounce_ms": 100000000000000000}"#).unwrap();
            let handle = sentinel_new(config.as_ptr(), ptr::null());
            assert!(handle.is_null());
            let message = CStr::from_ptr(sentinel_last_error()).to_str().unwrap();
            assert!(message.contains("debounce_ms"));
        }
    }

    #[test]
    fn test_ffi_null_handle() {
        unsafe {
            assert_eq!(sentinel_init(ptr::null_mut()), -1);
            assert!(sentinel_get_snapshot(ptr::null_mut()).is_null());
            assert_eq!(sentinel_poll_timers(ptr::null_mut()), -1);
        }
    }

    #[test]
    fn test_ffi_score_clicks() {
        unsafe {
            let json = CString::new(
                r#"[
                    {"time":"2024-01-15T14:00:00Z","x":5,"y":5,"tag":"BUTTON"},
                    {"time":"2024-01-15T14:00:01.200Z","x":400,"y":5,"tag":"DIV"}
                ]"#,
            )
            .unwrap();
            assert_eq!(sentinel_score_clicks(json.as_ptr()), 0.5);

            let bad = CString::new("nope").unwrap();
            assert_eq!(sentinel_score_clicks(bad.as_ptr()), -1.0);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = sentinel_version();
            assert!(!version.is_null());
            assert!(!CStr::from_ptr(version).to_str().unwrap().is_empty());
        }
    }
}
