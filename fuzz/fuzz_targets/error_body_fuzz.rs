//! Fuzz test for HTTP failure classification
//!
//! This fuzz target feeds arbitrary status/body pairs through the
//! gateway's failure classifier to find:
//! - Panics or crashes on malformed JSON bodies
//! - Statuses escaping the error taxonomy
//! - Broken Display rendering of the produced errors
//!
//! Run with: cargo +nightly fuzz run error_body_fuzz -- -max_total_time=60

#![no_main]

use byline_core::GatewayError;
use byline_gateway::classify_failure;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let status = u16::from_be_bytes([data[0], data[1]]);
    let Ok(body) = std::str::from_utf8(&data[2..]) else {
        return;
    };

    // The classifier must be total: every status lands in exactly one
    // error kind, whatever the body contains.
    let error = classify_failure("/api/blogs/some-slug/", status, body);
    match status {
        401 | 403 => match &error {
            GatewayError::Auth { status: got, .. } => assert_eq!(*got, status),
            other => panic!("status {status} should classify as auth, got {other:?}"),
        },
        404 => match &error {
            GatewayError::NotFound { resource } => {
                assert_eq!(resource, "api/blogs/some-slug");
            }
            other => panic!("status 404 should classify as not-found, got {other:?}"),
        },
        400 | 422 => {
            assert!(
                matches!(error, GatewayError::Validation { .. }),
                "status {status} should classify as validation, got {error:?}"
            );
        }
        _ => match &error {
            GatewayError::Server { status: got, .. } => assert_eq!(*got, status),
            other => panic!("status {status} should classify as server, got {other:?}"),
        },
    }

    // Rendering the error for logs must never panic either.
    let _ = error.to_string();
});
