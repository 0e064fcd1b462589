//! Fuzz target: parsing of `ps` sampler output.
//!
//! The sampler must degrade to zeroes on any malformed input, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use nestbox_vmm::stats::parse_ps_output;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let _ = parse_ps_output(&raw);
});
