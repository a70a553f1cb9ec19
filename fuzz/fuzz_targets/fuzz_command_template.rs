//! Fuzz target: command template parsing and tokenizing.
//!
//! Arbitrary text must either parse or fail with an error, never panic,
//! and tokenizing the same rendered command twice must agree.

#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;
use tripwire_core::{tokenize, CommandTemplate, PlaceholderValues};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let _ = tokenize(text);

    let Ok(template) = CommandTemplate::parse(text) else {
        return;
    };
    let values = PlaceholderValues::new(Path::new("/tmp/tripwire"), "case");
    let Ok(rendered) = template.render(&values) else {
        return;
    };
    assert_eq!(
        tokenize(&rendered).ok(),
        tokenize(&rendered).ok(),
        "tokenizing must be deterministic"
    );
});
