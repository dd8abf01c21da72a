//! Deterministic test doubles for the agent state machine.
//!
//! The scenario tests need full control over generator and verifier
//! behavior; both doubles play back scripted results and panic when a
//! component makes more calls than the scenario allows, which turns
//! "no further calls occur" properties into hard assertions.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::GeneratorError;
use crate::generator::CandidateGenerator;
use crate::verifier::{Apply, DryRun, SyntaxCheck, Verifier};

/// Generator that plays back a fixed sequence of replies and records every
/// prompt it was given.
pub(crate) struct ScriptedGenerator {
    queue: Mutex<VecDeque<Result<String, GeneratorError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub(crate) fn new(queue: Vec<Result<String, GeneratorError>>) -> Self {
        Self {
            queue: Mutex::new(queue.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn replies(replies: Vec<String>) -> Self {
        Self::new(replies.into_iter().map(Ok).collect())
    }

    pub(crate) fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub(crate) fn prompt(&self, index: usize) -> String {
        self.prompts.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl CandidateGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted generator ran out of replies")
    }
}

/// Verifier that plays back fixed per-operation result sequences.
#[derive(Default)]
pub(crate) struct ScriptedVerifier {
    syntax: Mutex<VecDeque<SyntaxCheck>>,
    dry: Mutex<VecDeque<DryRun>>,
    apply: Mutex<VecDeque<Apply>>,
    syntax_calls: AtomicUsize,
    dry_calls: AtomicUsize,
    apply_calls: AtomicUsize,
}

impl ScriptedVerifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn syntax(self, results: Vec<SyntaxCheck>) -> Self {
        *self.syntax.lock().unwrap() = results.into();
        self
    }

    pub(crate) fn dry(self, results: Vec<DryRun>) -> Self {
        *self.dry.lock().unwrap() = results.into();
        self
    }

    pub(crate) fn applying(self, results: Vec<Apply>) -> Self {
        *self.apply.lock().unwrap() = results.into();
        self
    }

    pub(crate) fn syntax_count(&self) -> usize {
        self.syntax_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn dry_count(&self) -> usize {
        self.dry_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn apply_count(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Verifier for ScriptedVerifier {
    async fn syntax_check(&self, _script: &str) -> SyntaxCheck {
        self.syntax_calls.fetch_add(1, Ordering::SeqCst);
        self.syntax
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted verifier ran out of syntax-check results")
    }

    async fn dry_run(&self, _script: &str, _sample_input: &str) -> DryRun {
        self.dry_calls.fetch_add(1, Ordering::SeqCst);
        self.dry
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted verifier ran out of dry-run results")
    }

    async fn apply(&self, _script: &str, _targets: &[PathBuf]) -> Apply {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        self.apply
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted verifier ran out of apply results")
    }
}
