//! Crash signatures: regular expressions matched against target output lines.

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Built-in crash signatures, checked in this order.
pub const DEFAULT_SIGNATURES: &[&str] = &[
    ".*panic.*",
    ".*core dump.*",
    ".*Segmentation fault.*",
    ".*segmentation violation.*",
    ".*invalid memory.*",
    ".*nil pointer dereference.*",
    ".*signal SIGSEGV.*",
    ".*fatal.*",
];

/// Operator signature used when none is configured.
pub const DEFAULT_EXTRA_SIGNATURE: &str = ".*panic.*";

/// A successful signature match on one output line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureMatch {
    /// Source text of the pattern that matched.
    pub pattern: String,
    /// The matched line, without its terminator, decoded lossily as UTF-8.
    pub line: String,
}

/// An ordered, immutable set of compiled crash signatures.
///
/// Matching is case-sensitive and unanchored; lines are raw bytes, so
/// output that is not valid UTF-8 is still scanned.
#[derive(Debug, Clone)]
pub struct CrashSignatureSet {
    patterns: Vec<Regex>,
}

impl CrashSignatureSet {
    /// Compile the given patterns, preserving their order.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidSignature`] for the first pattern that
    /// fails to compile.
    pub fn new<I, S>(patterns: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let pattern = p.as_ref();
                Regex::new(pattern).map_err(|source| CoreError::InvalidSignature {
                    pattern: pattern.to_owned(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// The built-in signatures followed by one operator-supplied pattern.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidSignature`] if `extra` does not compile.
    pub fn with_extra(extra: &str) -> Result<Self, CoreError> {
        Self::new(DEFAULT_SIGNATURES.iter().copied().chain(std::iter::once(extra)))
    }

    /// Number of patterns in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the set has no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Return the first pattern, in set order, that matches `line`.
    #[must_use]
    pub fn find(&self, line: &[u8]) -> Option<SignatureMatch> {
        self.patterns
            .iter()
            .find(|re| re.is_match(line))
            .map(|re| SignatureMatch {
                pattern: re.as_str().to_owned(),
                line: String::from_utf8_lossy(line).into_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> CrashSignatureSet {
        match CrashSignatureSet::with_extra(DEFAULT_EXTRA_SIGNATURE) {
            Ok(set) => set,
            Err(e) => panic!("default signatures must compile: {e}"),
        }
    }

    #[test]
    fn default_set_has_base_plus_extra() {
        assert_eq!(defaults().len(), DEFAULT_SIGNATURES.len() + 1);
    }

    #[test]
    fn fatal_runtime_error_matches_fatal_signature() {
        let m = defaults().find(b"fatal error: runtime error").expect("must match");
        assert_eq!(m.pattern, ".*fatal.*");
        assert_eq!(m.line, "fatal error: runtime error");
    }

    #[test]
    fn first_pattern_in_order_wins() {
        let m = defaults()
            .find(b"panic: runtime error: invalid memory address or nil pointer dereference")
            .expect("must match");
        assert_eq!(m.pattern, ".*panic.*", "earliest pattern must be reported");
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(defaults().find(b"PANIC in the disco").is_none());
        assert!(defaults().find(b"segmentation fault").is_none());
        assert!(defaults().find(b"Segmentation fault (core dumped)").is_some());
    }

    #[test]
    fn clean_line_does_not_match() {
        assert!(defaults().find(b"hello world").is_none());
        assert!(defaults().find(b"").is_none());
    }

    #[test]
    fn non_utf8_line_is_scanned() {
        let m = defaults().find(b"\xff\xfe panic \xff").expect("must match");
        assert!(m.line.contains("panic"));
    }

    #[test]
    fn operator_pattern_is_appended() {
        let set = CrashSignatureSet::with_extra("ERROR: AddressSanitizer").expect("compile");
        let m = set.find(b"==1==ERROR: AddressSanitizer: heap-use-after-free").expect("match");
        assert_eq!(m.pattern, "ERROR: AddressSanitizer");
    }

    #[test]
    fn malformed_pattern_is_rejected() {
        let err = CrashSignatureSet::with_extra("(unclosed").expect_err("must fail");
        match err {
            CoreError::InvalidSignature { pattern, .. } => assert_eq!(pattern, "(unclosed"),
            other => panic!("expected InvalidSignature, got {other:?}"),
        }
    }
}
