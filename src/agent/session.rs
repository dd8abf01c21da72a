//! Session state for one verify-refine run.
//!
//! A session is created when a task starts, mutated only by the controller,
//! and consumed into a [`RunReport`] once it reaches a terminal status. It
//! is never persisted across requests.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::knowledge::KnowledgeBundle;

/// Iteration budget: generate-validate cycles before forced failure.
pub const MAX_ITERATIONS: u32 = 5;

/// How a request will be carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Draft and verify a structural patch script.
    Structural,
    /// Hand the request to the direct-edit path.
    Direct,
}

/// One code-change request. Immutable once the router has assigned the
/// strategy.
#[derive(Debug, Clone)]
pub struct Task {
    pub description: String,
    pub target_locations: Vec<PathBuf>,
    pub strategy: Strategy,
}

impl Task {
    pub fn new(
        description: impl Into<String>,
        target_locations: Vec<PathBuf>,
        strategy: Strategy,
    ) -> Self {
        Self {
            description: description.into(),
            target_locations,
            strategy,
        }
    }

    /// A structural task with no real targets (dry-run only).
    pub fn sample_only(description: impl Into<String>) -> Self {
        Self::new(description, Vec::new(), Strategy::Structural)
    }
}

/// One generated (script, sample input) pair under evaluation.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub script: String,
    pub sample_input: String,
    /// Session iteration at which this candidate was produced.
    pub iteration: u32,
}

impl Candidate {
    /// The initial draft, before any refinement.
    pub fn first(script: String, sample_input: String) -> Self {
        Self {
            script,
            sample_input,
            iteration: 0,
        }
    }
}

/// Pipeline stage a validation outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Syntax,
    DryRun,
    Apply,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Syntax => write!(f, "syntax-check"),
            Stage::DryRun => write!(f, "dry-run"),
            Stage::Apply => write!(f, "apply"),
        }
    }
}

/// Classification of a validation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckResult {
    Ok,
    /// Malformed script. Repaired by fixing grammar.
    SyntaxError,
    /// Well-formed script that matched nothing. Repaired by relaxing
    /// matching constraints.
    LogicError,
    /// The tooling failed, not the script. Signals environment trouble.
    SystemError,
}

impl std::fmt::Display for CheckResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckResult::Ok => write!(f, "ok"),
            CheckResult::SyntaxError => write!(f, "syntax-error"),
            CheckResult::LogicError => write!(f, "logic-error"),
            CheckResult::SystemError => write!(f, "system-error"),
        }
    }
}

/// The result of one validation step.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub stage: Stage,
    pub result: CheckResult,
    pub message: String,
    /// Present exactly when a dry run succeeded.
    pub produced_diff: Option<String>,
}

impl ValidationOutcome {
    /// A clean pass at `stage`.
    pub fn ok(stage: Stage) -> Self {
        Self {
            stage,
            result: CheckResult::Ok,
            message: String::new(),
            produced_diff: None,
        }
    }

    /// A successful dry run carrying the produced diff.
    pub fn dry_run_ok(diff: String) -> Self {
        Self {
            stage: Stage::DryRun,
            result: CheckResult::Ok,
            message: String::new(),
            produced_diff: Some(diff),
        }
    }

    /// A failed validation step.
    pub fn failure(stage: Stage, result: CheckResult, message: impl Into<String>) -> Self {
        Self {
            stage,
            result,
            message: message.into(),
            produced_diff: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result == CheckResult::Ok
    }

    /// One-line rendering for the error trace.
    pub fn trace_line(&self) -> String {
        format!("[{}] {}: {}", self.stage, self.result, self.message)
    }
}

/// Terminal and non-terminal session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Success,
    Failed,
}

/// Structured result returned over the session boundary.
///
/// Failures still carry the last script attempted and the full error trace
/// so a human can pick up where the loop stopped.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: SessionStatus,
    pub script: String,
    pub diff: Option<String>,
    pub error_trace: Vec<String>,
}

/// Per-run state. Single-writer: only the controller mutates it.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    task: Task,
    bundle: KnowledgeBundle,
    candidate: Option<Candidate>,
    last_outcome: Option<ValidationOutcome>,
    latest_diff: Option<String>,
    iteration: u32,
    status: SessionStatus,
    error_trace: Vec<String>,
}

impl Session {
    pub fn new(task: Task) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            task,
            bundle: KnowledgeBundle::default(),
            candidate: None,
            last_outcome: None,
            latest_diff: None,
            iteration: 0,
            status: SessionStatus::Running,
            error_trace: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn bundle(&self) -> &KnowledgeBundle {
        &self.bundle
    }

    pub fn candidate(&self) -> Option<&Candidate> {
        self.candidate.as_ref()
    }

    pub fn last_outcome(&self) -> Option<&ValidationOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn error_trace(&self) -> &[String] {
        &self.error_trace
    }

    pub(crate) fn set_bundle(&mut self, bundle: KnowledgeBundle) {
        self.bundle = bundle;
    }

    pub(crate) fn install_candidate(&mut self, candidate: Candidate) {
        self.candidate = Some(candidate);
    }

    /// Replace the script after a refinement, keeping the sample input.
    pub(crate) fn adopt_refined(&mut self, script: String) {
        self.iteration += 1;
        let sample_input = self
            .candidate
            .as_ref()
            .map(|c| c.sample_input.clone())
            .unwrap_or_default();
        self.candidate = Some(Candidate {
            script,
            sample_input,
            iteration: self.iteration,
        });
    }

    /// Count a refinement attempt that produced no usable script.
    pub(crate) fn bump_iteration(&mut self) {
        self.iteration += 1;
    }

    /// Record a validation outcome. Failures land in the error trace; a
    /// successful dry run updates the retained diff.
    pub(crate) fn record_outcome(&mut self, outcome: ValidationOutcome) {
        if let Some(diff) = &outcome.produced_diff {
            self.latest_diff = Some(diff.clone());
        }
        if !outcome.is_ok() {
            self.error_trace.push(outcome.trace_line());
        }
        self.last_outcome = Some(outcome);
    }

    pub(crate) fn succeed(&mut self) {
        self.status = SessionStatus::Success;
    }

    pub(crate) fn fail(&mut self) {
        self.status = SessionStatus::Failed;
    }

    /// Consume the session into the boundary report.
    pub fn into_report(self) -> RunReport {
        RunReport {
            status: self.status,
            script: self.candidate.map(|c| c.script).unwrap_or_default(),
            diff: self.latest_diff,
            error_trace: self.error_trace,
        }
    }
}
