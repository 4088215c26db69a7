//! FFI bindings for Synheart Readiness
//!
//! This module provides C-compatible functions for calling the estimator from other languages.
//! All functions use C strings (null-terminated) and return allocated memory that
//! must be freed by the caller using `readiness_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use crate::cpt::CptStore;
use crate::personalization::PersonalizedCpt;
use crate::pipeline::{readiness_daily, ReadinessProcessor};

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

/// Join already-serialized JSON documents into a JSON array
fn vec_to_json_array(vec: Vec<String>) -> String {
    format!("[{}]", vec.join(","))
}

// ============================================================================
// Stateless API
// ============================================================================

/// Process a JSON array of daily records and return a JSON array of reports.
///
/// # Safety
/// - `records_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `readiness_free_string`.
/// - Returns NULL on error; call `readiness_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn readiness_daily_json(records_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(records_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    match readiness_daily(&json_str) {
        Ok(reports) => string_to_cstr(&vec_to_json_array(reports)),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to a ReadinessProcessor
pub struct ReadinessProcessorHandle {
    processor: ReadinessProcessor,
}

/// Create a new processor.
///
/// # Safety
/// - `cpt_json` may be NULL to use the built-in model, otherwise it must be a
///   valid null-terminated C string holding a CPT store document.
/// - Returns a pointer that must be freed with `readiness_processor_free`.
/// - Returns NULL if the CPT store is invalid; call `readiness_last_error`.
#[no_mangle]
pub unsafe extern "C" fn readiness_processor_new(
    cpt_json: *const c_char,
) -> *mut ReadinessProcessorHandle {
    clear_last_error();

    let processor = if cpt_json.is_null() {
        ReadinessProcessor::new()
    } else {
        let json_str = match cstr_to_string(cpt_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid CPT string pointer");
                return ptr::null_mut();
            }
        };
        let store = match CptStore::from_json(&json_str) {
            Ok(store) => store,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        };
        match ReadinessProcessor::with_store(Arc::new(store)) {
            Ok(processor) => processor,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    Box::into_raw(Box::new(ReadinessProcessorHandle { processor }))
}

/// Free a processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `readiness_processor_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn readiness_processor_free(processor: *mut ReadinessProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Process one daily record JSON and return the report JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `readiness_processor_new`.
/// - `record_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `readiness_free_string`.
/// - Returns NULL on error; call `readiness_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn readiness_processor_process_day(
    processor: *mut ReadinessProcessorHandle,
    record_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;

    let json_str = match cstr_to_string(record_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    match handle.processor.process_day_json(&json_str) {
        Ok(report) => string_to_cstr(&report),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Install a personalized emission table.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `readiness_processor_new`.
/// - `personalized_json` must be a valid null-terminated C string, or NULL to
///   return to the default tables.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn readiness_processor_set_personalized(
    processor: *mut ReadinessProcessorHandle,
    personalized_json: *const c_char,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    let handle = &mut *processor;

    if personalized_json.is_null() {
        handle.processor.clear_personalized();
        return 0;
    }

    let json_str = match cstr_to_string(personalized_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return -1;
        }
    };

    let result = PersonalizedCpt::from_json(&json_str)
        .and_then(|cpt| handle.processor.install_personalized(Arc::new(cpt)));
    match result {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Save processor state (posterior, training history, last date) to JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `readiness_processor_new`.
/// - Returns a newly allocated string that must be freed with `readiness_free_string`.
/// - Returns NULL on error; call `readiness_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn readiness_processor_save_state(
    processor: *mut ReadinessProcessorHandle,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &*processor;

    match handle.processor.save_state() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Load processor state from JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `readiness_processor_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `readiness_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn readiness_processor_load_state(
    processor: *mut ReadinessProcessorHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    let handle = &mut *processor;

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return -1;
        }
    };

    match handle.processor.load_state(&json_str) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by readiness functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a readiness function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn readiness_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next readiness function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn readiness_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn readiness_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(date: &str) -> CString {
        CString::new(format!(
            r#"{{
                "date": "{date}",
                "causal": {{ "training_load": "high", "subjective_sleep_state": "poor" }},
                "evidence": {{ "fatigue": "high", "stress": "medium", "hrv_trend": "slight_decline" }}
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_ffi_readiness_daily() {
        let json = CString::new(format!(
            "[{}]",
            sample_record("2024-01-15").to_str().unwrap()
        ))
        .unwrap();

        unsafe {
            let result = readiness_daily_json(json.as_ptr());
            assert!(!result.is_null());

            let result_str = CStr::from_ptr(result).to_str().unwrap();
            assert!(result_str.starts_with('['));
            assert!(result_str.contains("report_version"));

            readiness_free_string(result);
        }
    }

    #[test]
    fn test_ffi_processor_lifecycle() {
        unsafe {
            let processor = readiness_processor_new(ptr::null());
            assert!(!processor.is_null());

            let record = sample_record("2024-01-15");
            let result = readiness_processor_process_day(processor, record.as_ptr());
            assert!(!result.is_null());
            readiness_free_string(result);

            let state = readiness_processor_save_state(processor);
            assert!(!state.is_null());

            let processor2 = readiness_processor_new(ptr::null());
            assert_eq!(readiness_processor_load_state(processor2, state), 0);

            // Same date is now out of order for the restored processor
            let again = readiness_processor_process_day(processor2, record.as_ptr());
            assert!(again.is_null());
            assert!(!readiness_last_error().is_null());

            assert_eq!(readiness_processor_set_personalized(processor2, ptr::null()), 0);

            readiness_free_string(state);
            readiness_processor_free(processor);
            readiness_processor_free(processor2);
        }
    }

    #[test]
    fn test_ffi_rejects_bad_cpt() {
        let cpt = CString::new(r#"{"transition": {}}"#).unwrap();
        unsafe {
            let processor = readiness_processor_new(cpt.as_ptr());
            assert!(processor.is_null());
            assert!(!readiness_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let invalid_json = CString::new("not json").unwrap();
            let result = readiness_daily_json(invalid_json.as_ptr());

            assert!(result.is_null());

            let error = readiness_last_error();
            assert!(!error.is_null());

            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(!error_str.is_empty());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = readiness_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
