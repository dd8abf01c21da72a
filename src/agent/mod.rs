//! Routing plus the bounded verify-refine state machine.
//!
//! The pipeline classifies each request once, then either drives the
//! structural-script session to a terminal report or hands the request to
//! the direct-edit path. Callers get a structured outcome either way;
//! nothing in here escapes as an error.

mod controller;
mod extract;
mod prompts;
mod router;
mod session;
#[cfg(test)]
pub(crate) mod testing;

pub use controller::RefinementController;
pub use extract::{ExtractionError, extract_candidate, extract_script};
pub use router::{RoutingDecision, StrategyRouter};
pub use session::{
    Candidate, CheckResult, MAX_ITERATIONS, RunReport, Session, SessionStatus, Stage, Strategy,
    Task, ValidationOutcome,
};

use std::path::PathBuf;
use std::sync::Arc;

use crate::generator::CandidateGenerator;
use crate::knowledge::KnowledgeStore;
use crate::verifier::Verifier;

/// One incoming code-change request, before routing.
#[derive(Debug, Clone)]
pub struct PatchRequest {
    pub description: String,
    /// Real files the script should ultimately be applied to. Empty means
    /// dry-run only.
    pub target_locations: Vec<PathBuf>,
}

impl PatchRequest {
    pub fn new(description: impl Into<String>, target_locations: Vec<PathBuf>) -> Self {
        Self {
            description: description.into(),
            target_locations,
        }
    }
}

/// Terminal outcome of handling one request.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// The structural path ran; here is its report.
    Structural(RunReport),
    /// The router sent the request to the direct-edit path.
    DirectFallback { rationale: String },
}

/// Session boundary: routes a request and runs it to completion.
pub struct Pipeline {
    router: StrategyRouter,
    controller: RefinementController,
}

impl Pipeline {
    pub fn new(
        generator: Arc<dyn CandidateGenerator>,
        knowledge: Arc<KnowledgeStore>,
        verifier: Arc<dyn Verifier>,
    ) -> Self {
        Self {
            router: StrategyRouter::new(generator.clone()),
            controller: RefinementController::new(generator, knowledge, verifier),
        }
    }

    /// Handle one request end to end.
    pub async fn handle(&self, request: PatchRequest) -> PipelineOutcome {
        let decision = self.router.classify(&request.description).await;

        match decision.strategy {
            Strategy::Structural => {
                let task = Task::new(
                    request.description,
                    request.target_locations,
                    Strategy::Structural,
                );
                PipelineOutcome::Structural(self.controller.run(task).await)
            }
            Strategy::Direct => {
                tracing::info!(rationale = %decision.rationale, "request routed to direct edits");
                PipelineOutcome::DirectFallback {
                    rationale: decision.rationale,
                }
            }
        }
    }
}
