//! Fuzz target: JSON deserialization and validation of the create-request
//! body.
//!
//! Verifies that arbitrary byte sequences fed to the parser never cause
//! panics — errors are expected and fine.

#![no_main]

use libfuzzer_sys::fuzz_target;
use nestbox_core::CreateMicroVmRequest;

fuzz_target!(|data: &[u8]| {
    if let Ok(request) = serde_json::from_slice::<CreateMicroVmRequest>(data) {
        let _ = request.into_parts();
    }
});
