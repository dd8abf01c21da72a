//! Patchwright drafts structural patch scripts (semantic-patch style
//! pattern/rewrite rules) for C-like codebases, proves each draft against a
//! synthetic sample before any real file is touched, and iteratively repairs
//! the draft from observed verifier failures.
//!
//! The crate is organized around four collaborators:
//! - [`generator`]: the external text generator consumed as an opaque oracle
//! - [`knowledge`]: tag-separated similarity retrieval grounding each draft
//! - [`verifier`]: the external structural verifier behind a scoped adapter
//! - [`agent`]: the routing and bounded verify-refine state machine

pub mod agent;
pub mod config;
pub mod error;
pub mod generator;
pub mod knowledge;
pub mod verifier;

pub use agent::{
    Candidate, PatchRequest, Pipeline, PipelineOutcome, RefinementController, RoutingDecision,
    RunReport, SessionStatus, Strategy, StrategyRouter, Task, ValidationOutcome,
};
pub use generator::{CandidateGenerator, ChatCompletionsGenerator};
pub use knowledge::{KnowledgeBundle, KnowledgeStore};
pub use verifier::{SpatchVerifier, Verifier};
