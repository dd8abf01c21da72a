//! One-shot strategy classification.
//!
//! Decides whether a request fits the structural-script path at all. The
//! router fails open: any generator failure or unparseable reply lands on
//! the direct-edit path, which automates less and therefore risks less.
//! Classification is never fatal to a request.

use std::sync::Arc;

use crate::agent::prompts;
use crate::agent::session::Strategy;
use crate::generator::CandidateGenerator;

/// The router's verdict for one request.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub strategy: Strategy,
    pub rationale: String,
}

/// Classifies requests into the structural or direct path.
pub struct StrategyRouter {
    generator: Arc<dyn CandidateGenerator>,
}

impl StrategyRouter {
    pub fn new(generator: Arc<dyn CandidateGenerator>) -> Self {
        Self { generator }
    }

    /// Classify a request description. Never fails; the worst case is the
    /// direct-edit fallback.
    pub async fn classify(&self, description: &str) -> RoutingDecision {
        let prompt = prompts::classify(description);

        let reply = match self.generator.generate(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                return fail_open(format!("classifier call failed: {}", e));
            }
        };

        match parse_decision(&reply) {
            Some(decision) => {
                tracing::info!(strategy = ?decision.strategy, "request classified");
                decision
            }
            None => fail_open("classifier reply had no recognizable strategy tag".to_string()),
        }
    }
}

fn fail_open(reason: String) -> RoutingDecision {
    tracing::warn!(%reason, "strategy classification unavailable, falling back to direct");
    RoutingDecision {
        strategy: Strategy::Direct,
        rationale: format!("falling back to direct edits: {}", reason),
    }
}

/// Parse `strategy:`/`rationale:` key-value lines out of a free-form reply.
fn parse_decision(reply: &str) -> Option<RoutingDecision> {
    let mut strategy = None;
    let mut rationale = None;

    for line in reply.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        // Models decorate keys with markdown; keep only the letters.
        let key: String = key
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();

        match key.as_str() {
            "strategy" => {
                let value = value.trim().to_lowercase();
                if value.contains("structural") {
                    strategy = Some(Strategy::Structural);
                } else if value.contains("direct") {
                    strategy = Some(Strategy::Direct);
                }
            }
            "rationale" => {
                rationale = Some(value.trim().to_string());
            }
            _ => {}
        }
    }

    strategy.map(|strategy| RoutingDecision {
        strategy,
        rationale: rationale.unwrap_or_default(),
    })
}
