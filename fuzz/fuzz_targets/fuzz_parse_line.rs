//! Fuzz target: libFuzzer progress-line parser.
//!
//! Engine output is untrusted. Parsing arbitrary text must never panic, and
//! a recognised event must carry the keyword it was classified by.
#![no_main]

use libfuzzer_sys::fuzz_target;
use warden_core::{parse_line, Event};

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);

    match parse_line(&line) {
        Ok(Some(event)) => {
            assert!(
                line.contains(event.kind.keyword()),
                "classified as {} without the keyword",
                event.kind
            );
            assert_eq!(Event::parse(&line), Some(event));
        }
        Ok(None) => assert_eq!(Event::parse(&line), None),
        Err(_) => assert_eq!(Event::parse(&line), None, "malformed lines are not events"),
    }
});
