//! Core types for the tripwire crash-detecting process harness.
//!
//! Defines the synchronous domain: command templates and their resolution
//! into argv, crash signatures, harness configuration, seed corpus loading,
//! and case outcomes. Process supervision lives in `tripwire-executor`.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod corpus;
pub mod error;
pub mod id;
pub mod outcome;
pub mod signature;
pub mod template;

pub use config::HarnessConfig;
pub use corpus::{load_corpus, Seed};
pub use error::CoreError;
pub use id::{CaseId, InputDigest};
pub use outcome::{CaseOutcome, Stream};
pub use signature::{CrashSignatureSet, SignatureMatch, DEFAULT_EXTRA_SIGNATURE, DEFAULT_SIGNATURES};
pub use template::{tokenize, CommandTemplate, PlaceholderValues, ResolvedCommand};
