//! Structural verifier adapter.
//!
//! Wraps an external semantic-patch tool behind three operations. The
//! adapter classifies every outcome as data instead of surfacing errors:
//! callers branch on classifications, nothing propagates as `Err`. All
//! judgement about whether a script is correct lives in the external tool.

mod spatch;

pub use spatch::SpatchVerifier;

use std::path::PathBuf;

use async_trait::async_trait;

/// Outcome of a script syntax check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxCheck {
    /// The script parses.
    Ok,
    /// The script is malformed; carries the verifier's diagnostic.
    SyntaxError { message: String },
    /// The verifier itself failed (binary missing, timeout). An environment
    /// fault, not a script fault.
    SystemError { message: String },
}

/// Outcome of a dry run against a synthetic sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DryRun {
    /// The script transformed the sample; carries the produced diff.
    Ok { diff: String },
    /// The script parses but matched nothing in the sample. Repaired by
    /// relaxing match constraints, not by fixing grammar.
    LogicError { message: String },
    /// The verifier itself failed.
    SystemError { message: String },
}

/// Outcome of applying a script to real files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Apply {
    /// The script was applied; carries a short summary.
    Applied { summary: String },
    /// The apply run failed. Targets may have been partially modified:
    /// application is not atomic across files.
    SystemError { message: String },
}

/// The three verifier operations.
///
/// `apply` mutates real files in place and is irreversible from the
/// adapter's perspective; only call it after a successful dry run.
/// Implementations must allocate uniquely-named ephemeral resources per
/// call so concurrent sessions never collide.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Check that `script` parses.
    async fn syntax_check(&self, script: &str) -> SyntaxCheck;

    /// Run `script` against `sample_input` without touching real files.
    async fn dry_run(&self, script: &str, sample_input: &str) -> DryRun;

    /// Apply `script` to `targets` in place.
    async fn apply(&self, script: &str, targets: &[PathBuf]) -> Apply;
}
