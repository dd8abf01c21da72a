//! The bounded verify-refine state machine.
//!
//! Drives retrieval, drafting, syntax checking, dry running, refinement,
//! and application for one session. Every transition blocks on exactly one
//! external call and is decided from that call's classified result; the
//! refinement loop is capped by the iteration budget so a misbehaving
//! generator or verifier can never stall a session.
//!
//! All dependencies arrive through the constructor, so tests swap in
//! deterministic generator and verifier doubles.

use std::sync::Arc;

use crate::agent::session::{
    Candidate, CheckResult, MAX_ITERATIONS, RunReport, Session, Stage, Task, ValidationOutcome,
};
use crate::agent::{extract, prompts};
use crate::generator::CandidateGenerator;
use crate::knowledge::KnowledgeStore;
use crate::verifier::{Apply, DryRun, SyntaxCheck, Verifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Retrieving,
    Drafting,
    SyntaxChecking,
    DryRunning,
    Refining,
    Applying,
    Done,
}

/// Runs one task through the generate-verify-refine loop.
pub struct RefinementController {
    generator: Arc<dyn CandidateGenerator>,
    knowledge: Arc<KnowledgeStore>,
    verifier: Arc<dyn Verifier>,
    max_iterations: u32,
}

impl RefinementController {
    pub fn new(
        generator: Arc<dyn CandidateGenerator>,
        knowledge: Arc<KnowledgeStore>,
        verifier: Arc<dyn Verifier>,
    ) -> Self {
        Self {
            generator,
            knowledge,
            verifier,
            max_iterations: MAX_ITERATIONS,
        }
    }

    /// Override the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Run a task to a terminal report. Never panics on external garbage;
    /// every failure ends up classified in the report's error trace.
    pub async fn run(&self, task: Task) -> RunReport {
        let mut session = Session::new(task);
        tracing::info!(
            session = %session.id(),
            description = %session.task().description,
            "starting verify-refine session"
        );

        let mut state = State::Retrieving;
        while state != State::Done {
            tracing::debug!(?state, iteration = session.iteration(), "entering state");
            state = match state {
                State::Retrieving => self.retrieve(&mut session).await,
                State::Drafting => self.draft(&mut session).await,
                State::SyntaxChecking => self.syntax_check(&mut session).await,
                State::DryRunning => self.dry_run(&mut session).await,
                State::Refining => self.refine(&mut session).await,
                State::Applying => self.apply(&mut session).await,
                State::Done => State::Done,
            };
        }

        tracing::info!(
            session = %session.id(),
            status = ?session.status(),
            iterations = session.iteration(),
            "session finished"
        );
        session.into_report()
    }

    async fn retrieve(&self, session: &mut Session) -> State {
        let bundle = self.knowledge.retrieve(&session.task().description).await;
        session.set_bundle(bundle);
        State::Drafting
    }

    async fn draft(&self, session: &mut Session) -> State {
        let prompt = prompts::draft(session.task(), session.bundle());

        let reply = match self.generator.generate(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                session.install_candidate(Candidate::first(String::new(), String::new()));
                session.record_outcome(ValidationOutcome::failure(
                    Stage::Syntax,
                    CheckResult::SystemError,
                    format!("draft generation failed: {}", e),
                ));
                return State::Refining;
            }
        };

        match extract::extract_candidate(&reply) {
            Ok((script, sample_input)) => {
                session.install_candidate(Candidate::first(script, sample_input));
                State::SyntaxChecking
            }
            Err(e) => {
                // The repair prompt still needs a script body to quote, so
                // keep whatever partial payload surfaced.
                let partial = extract::extract_script(&reply).unwrap_or_default();
                session.install_candidate(Candidate::first(partial, String::new()));
                session.record_outcome(ValidationOutcome::failure(
                    Stage::Syntax,
                    CheckResult::SystemError,
                    format!("draft reply unusable: {}", e),
                ));
                State::Refining
            }
        }
    }

    async fn syntax_check(&self, session: &mut Session) -> State {
        let Some(candidate) = session.candidate() else {
            session.record_outcome(ValidationOutcome::failure(
                Stage::Syntax,
                CheckResult::SystemError,
                "no candidate available to check",
            ));
            return State::Refining;
        };
        let script = candidate.script.clone();

        match self.verifier.syntax_check(&script).await {
            SyntaxCheck::Ok => {
                session.record_outcome(ValidationOutcome::ok(Stage::Syntax));
                State::DryRunning
            }
            SyntaxCheck::SyntaxError { message } => {
                session.record_outcome(ValidationOutcome::failure(
                    Stage::Syntax,
                    CheckResult::SyntaxError,
                    message,
                ));
                State::Refining
            }
            SyntaxCheck::SystemError { message } => {
                session.record_outcome(ValidationOutcome::failure(
                    Stage::Syntax,
                    CheckResult::SystemError,
                    message,
                ));
                State::Refining
            }
        }
    }

    async fn dry_run(&self, session: &mut Session) -> State {
        let Some(candidate) = session.candidate() else {
            session.record_outcome(ValidationOutcome::failure(
                Stage::DryRun,
                CheckResult::SystemError,
                "no candidate available to dry-run",
            ));
            return State::Refining;
        };
        let (script, sample_input) = (candidate.script.clone(), candidate.sample_input.clone());

        match self.verifier.dry_run(&script, &sample_input).await {
            DryRun::Ok { diff } => {
                session.record_outcome(ValidationOutcome::dry_run_ok(diff));
                State::Applying
            }
            DryRun::LogicError { message } => {
                session.record_outcome(ValidationOutcome::failure(
                    Stage::DryRun,
                    CheckResult::LogicError,
                    message,
                ));
                State::Refining
            }
            DryRun::SystemError { message } => {
                session.record_outcome(ValidationOutcome::failure(
                    Stage::DryRun,
                    CheckResult::SystemError,
                    message,
                ));
                State::Refining
            }
        }
    }

    async fn refine(&self, session: &mut Session) -> State {
        if session.iteration() >= self.max_iterations {
            tracing::warn!(
                session = %session.id(),
                iterations = session.iteration(),
                "iteration budget exhausted"
            );
            session.fail();
            return State::Done;
        }

        let candidate = session
            .candidate()
            .cloned()
            .unwrap_or_else(|| Candidate::first(String::new(), String::new()));
        let outcome = session.last_outcome().cloned().unwrap_or_else(|| {
            ValidationOutcome::failure(
                Stage::Syntax,
                CheckResult::SystemError,
                "no validation outcome recorded",
            )
        });

        let prompt = prompts::refine(session.task(), &candidate, &outcome);

        match self.generator.generate(&prompt).await {
            Ok(reply) => match extract::extract_script(&reply) {
                Ok(script) => {
                    session.adopt_refined(script);
                    State::SyntaxChecking
                }
                Err(e) => {
                    session.bump_iteration();
                    session.record_outcome(ValidationOutcome::failure(
                        outcome.stage,
                        CheckResult::SystemError,
                        format!("refine reply unusable: {}", e),
                    ));
                    State::Refining
                }
            },
            Err(e) => {
                session.bump_iteration();
                session.record_outcome(ValidationOutcome::failure(
                    outcome.stage,
                    CheckResult::SystemError,
                    format!("refine generation failed: {}", e),
                ));
                State::Refining
            }
        }
    }

    async fn apply(&self, session: &mut Session) -> State {
        let targets = session.task().target_locations.clone();
        let script = session
            .candidate()
            .map(|c| c.script.clone())
            .unwrap_or_default();

        if targets.is_empty() {
            tracing::info!("no target locations; the dry-run diff is the deliverable");
            session.succeed();
            return State::Done;
        }

        match self.verifier.apply(&script, &targets).await {
            Apply::Applied { summary } => {
                tracing::info!(%summary, "script applied to targets");
                session.succeed();
            }
            Apply::SystemError { message } => {
                // The dry run already proved the script against the sample;
                // a real-target failure is an environment mismatch that a
                // human must look at, and is never retried. Targets may be
                // partially modified: apply is not atomic across files.
                session.record_outcome(ValidationOutcome::failure(
                    Stage::Apply,
                    CheckResult::SystemError,
                    message,
                ));
                session.fail();
            }
        }
        State::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::session::{SessionStatus, Strategy};
    use crate::agent::testing::{ScriptedGenerator, ScriptedVerifier};
    use crate::error::GeneratorError;
    use crate::knowledge::{Document, DocumentIndex, DocumentTag, ScoredDocument};
    use crate::error::KnowledgeError;
    use async_trait::async_trait;
    use std::path::PathBuf;

    const DRAFT_REPLY: &str = "```cocci\n@@ expression E; @@\n- old(E)\n+ new(E)\n```\n```c\nvoid f(void) { old(1); }\n```";
    const REFINED_REPLY: &str = "```cocci\n@@ expression E; @@\n- old(E)\n+ renamed(E)\n```";

    struct FixtureIndex;

    #[async_trait]
    impl DocumentIndex for FixtureIndex {
        async fn search(
            &self,
            _query: &str,
            tag: DocumentTag,
            _k: usize,
        ) -> Result<Vec<ScoredDocument>, KnowledgeError> {
            Ok(vec![ScoredDocument {
                document: Document::new(format!("{} doc", tag), tag),
                score: 1.0,
            }])
        }
    }

    fn knowledge() -> Arc<KnowledgeStore> {
        Arc::new(KnowledgeStore::new(Arc::new(FixtureIndex)))
    }

    fn controller(
        generator: &Arc<ScriptedGenerator>,
        verifier: &Arc<ScriptedVerifier>,
    ) -> RefinementController {
        RefinementController::new(generator.clone(), knowledge(), verifier.clone())
    }

    fn ok_dry() -> DryRun {
        DryRun::Ok {
            diff: "--- sample.c\n+++ sample.c\n-old(1);\n+new(1);".to_string(),
        }
    }

    fn syntax_err() -> SyntaxCheck {
        SyntaxCheck::SyntaxError {
            message: "parse error at line 2".to_string(),
        }
    }

    #[tokio::test]
    async fn scenario_a_first_draft_succeeds() {
        let generator = Arc::new(ScriptedGenerator::replies(vec![DRAFT_REPLY.to_string()]));
        let verifier = Arc::new(
            ScriptedVerifier::new()
                .syntax(vec![SyntaxCheck::Ok])
                .dry(vec![ok_dry()]),
        );

        let report = controller(&generator, &verifier)
            .run(Task::sample_only("rename old() to new()"))
            .await;

        assert_eq!(report.status, SessionStatus::Success);
        assert!(report.diff.as_deref().is_some_and(|d| !d.is_empty()));
        assert!(report.error_trace.is_empty());
        assert_eq!(generator.call_count(), 1);
        // A passing syntax check is always followed by a dry run.
        assert_eq!(verifier.syntax_count(), 1);
        assert_eq!(verifier.dry_count(), 1);
        assert_eq!(verifier.apply_count(), 0);
    }

    #[tokio::test]
    async fn scenario_b_one_refinement_then_success() {
        let generator = Arc::new(ScriptedGenerator::replies(vec![
            DRAFT_REPLY.to_string(),
            REFINED_REPLY.to_string(),
        ]));
        let verifier = Arc::new(
            ScriptedVerifier::new()
                .syntax(vec![syntax_err(), SyntaxCheck::Ok])
                .dry(vec![ok_dry()]),
        );

        let report = controller(&generator, &verifier)
            .run(Task::sample_only("rename old() to new()"))
            .await;

        assert_eq!(report.status, SessionStatus::Success);
        assert_eq!(report.error_trace.len(), 1);
        assert!(report.error_trace[0].contains("[syntax-check] syntax-error"));
        assert_eq!(generator.call_count(), 2);
        assert_eq!(verifier.syntax_count(), 2);
        assert_eq!(verifier.dry_count(), 1);
    }

    #[tokio::test]
    async fn scenario_c_persistent_syntax_errors_exhaust_the_budget() {
        let mut replies = vec![DRAFT_REPLY.to_string()];
        replies.extend(std::iter::repeat_n(REFINED_REPLY.to_string(), 5));
        let generator = Arc::new(ScriptedGenerator::replies(replies));
        let verifier = Arc::new(ScriptedVerifier::new().syntax(vec![
            syntax_err(),
            syntax_err(),
            syntax_err(),
            syntax_err(),
            syntax_err(),
            syntax_err(),
        ]));

        let report = controller(&generator, &verifier)
            .run(Task::sample_only("hopeless task"))
            .await;

        assert_eq!(report.status, SessionStatus::Failed);
        assert_eq!(report.error_trace.len(), 6);
        assert!(report
            .error_trace
            .iter()
            .all(|line| line.contains("[syntax-check] syntax-error")));
        // Budget reached: no dry run ever attempted, no further calls made.
        assert_eq!(verifier.syntax_count(), 6);
        assert_eq!(verifier.dry_count(), 0);
        assert_eq!(verifier.apply_count(), 0);
        assert_eq!(generator.call_count(), 6);
        assert!(!report.script.is_empty());
    }

    #[tokio::test]
    async fn scenario_d_logic_error_changes_the_repair_ask() {
        let generator = Arc::new(ScriptedGenerator::replies(vec![
            DRAFT_REPLY.to_string(),
            REFINED_REPLY.to_string(),
        ]));
        let verifier = Arc::new(
            ScriptedVerifier::new()
                .syntax(vec![SyntaxCheck::Ok, SyntaxCheck::Ok])
                .dry(vec![
                    DryRun::LogicError {
                        message: "no transformation produced".to_string(),
                    },
                    ok_dry(),
                ]),
        );

        let report = controller(&generator, &verifier)
            .run(Task::sample_only("rename old() to new()"))
            .await;

        assert_eq!(report.status, SessionStatus::Success);
        assert!(report.error_trace[0].contains("[dry-run] logic-error"));

        let refine_prompt = generator.prompt(1);
        assert!(refine_prompt.contains("Relax the matching"));
        assert!(!refine_prompt.contains("Fix the SmPL grammar"));
    }

    #[tokio::test]
    async fn scenario_e_unavailable_verifier_still_terminates() {
        let unavailable = || SyntaxCheck::SystemError {
            message: "verifier binary 'spatch' not found".to_string(),
        };
        let mut replies = vec![DRAFT_REPLY.to_string()];
        replies.extend(std::iter::repeat_n(REFINED_REPLY.to_string(), 5));
        let generator = Arc::new(ScriptedGenerator::replies(replies));
        let verifier = Arc::new(ScriptedVerifier::new().syntax(vec![
            unavailable(),
            unavailable(),
            unavailable(),
            unavailable(),
            unavailable(),
            unavailable(),
        ]));

        let report = controller(&generator, &verifier)
            .run(Task::sample_only("task"))
            .await;

        assert_eq!(report.status, SessionStatus::Failed);
        assert_eq!(report.error_trace.len(), 6);
        assert!(report
            .error_trace
            .iter()
            .all(|line| line.contains("system-error")));
        assert_eq!(verifier.dry_count(), 0);
    }

    #[tokio::test]
    async fn apply_failure_after_clean_dry_run_is_terminal() {
        let generator = Arc::new(ScriptedGenerator::replies(vec![DRAFT_REPLY.to_string()]));
        let verifier = Arc::new(
            ScriptedVerifier::new()
                .syntax(vec![SyntaxCheck::Ok])
                .dry(vec![ok_dry()])
                .applying(vec![Apply::SystemError {
                    message: "target tree is read-only".to_string(),
                }]),
        );

        let task = Task::new(
            "rename old() to new()",
            vec![PathBuf::from("drivers/net/foo.c")],
            Strategy::Structural,
        );
        let report = controller(&generator, &verifier).run(task).await;

        assert_eq!(report.status, SessionStatus::Failed);
        assert_eq!(verifier.apply_count(), 1);
        assert!(report
            .error_trace
            .last()
            .is_some_and(|line| line.contains("[apply] system-error")));
        // The proven dry-run diff is still surfaced for manual resumption.
        assert!(report.diff.is_some());
        // No retry happened: one generator call, one of each verifier stage.
        assert_eq!(generator.call_count(), 1);
        assert_eq!(verifier.syntax_count(), 1);
        assert_eq!(verifier.dry_count(), 1);
    }

    #[tokio::test]
    async fn empty_target_list_skips_the_apply_call() {
        let generator = Arc::new(ScriptedGenerator::replies(vec![DRAFT_REPLY.to_string()]));
        let verifier = Arc::new(
            ScriptedVerifier::new()
                .syntax(vec![SyntaxCheck::Ok])
                .dry(vec![ok_dry()]),
        );

        let report = controller(&generator, &verifier)
            .run(Task::sample_only("task"))
            .await;

        assert_eq!(report.status, SessionStatus::Success);
        assert_eq!(verifier.apply_count(), 0);
    }

    #[tokio::test]
    async fn unusable_draft_reply_feeds_the_refine_loop() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok(String::new()),
            Ok(REFINED_REPLY.to_string()),
        ]));
        let verifier = Arc::new(
            ScriptedVerifier::new()
                .syntax(vec![SyntaxCheck::Ok])
                .dry(vec![ok_dry()]),
        );

        let report = controller(&generator, &verifier)
            .run(Task::sample_only("task"))
            .await;

        assert_eq!(report.status, SessionStatus::Success);
        assert_eq!(report.error_trace.len(), 1);
        assert!(report.error_trace[0].contains("system-error"));
        assert!(report.error_trace[0].contains("draft"));
    }

    #[tokio::test]
    async fn generator_outage_terminates_at_the_budget() {
        let outage = || {
            Err(GeneratorError::RequestFailed {
                provider: "scripted".to_string(),
                reason: "connection refused".to_string(),
            })
        };
        let generator = Arc::new(ScriptedGenerator::new(vec![
            outage(),
            outage(),
            outage(),
            outage(),
            outage(),
            outage(),
        ]));
        let verifier = Arc::new(ScriptedVerifier::new());

        let report = controller(&generator, &verifier)
            .run(Task::sample_only("task"))
            .await;

        assert_eq!(report.status, SessionStatus::Failed);
        assert_eq!(generator.call_count(), 6);
        assert_eq!(verifier.syntax_count(), 0);
        assert_eq!(report.error_trace.len(), 6);
    }

    #[tokio::test]
    async fn budget_is_configurable() {
        let generator = Arc::new(ScriptedGenerator::replies(vec![
            DRAFT_REPLY.to_string(),
            REFINED_REPLY.to_string(),
        ]));
        let verifier = Arc::new(
            ScriptedVerifier::new().syntax(vec![syntax_err(), syntax_err()]),
        );

        let report = RefinementController::new(generator.clone(), knowledge(), verifier.clone())
            .with_max_iterations(1)
            .run(Task::sample_only("task"))
            .await;

        assert_eq!(report.status, SessionStatus::Failed);
        assert_eq!(report.error_trace.len(), 2);
        assert_eq!(generator.call_count(), 2);
    }
}
