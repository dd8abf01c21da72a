//! Prompt construction for drafting, refining, and routing.
//!
//! The repair instruction is deliberately different per failure class:
//! grammar fixes and matching-constraint relaxation are different asks, and
//! conflating them sends the generator in circles.

use crate::agent::session::{Candidate, CheckResult, Task, ValidationOutcome};
use crate::knowledge::KnowledgeBundle;

/// Prompt for the initial draft: one script plus one synthetic sample.
pub fn draft(task: &Task, bundle: &KnowledgeBundle) -> String {
    format!(
        r#"You are a senior systems engineer who writes semantic patch scripts (SmPL) for large C codebases.

Write one semantic patch script automating the refactoring task below, plus one minimal C sample the script must transform.

Strict rules (SmPL is not C):
- Do not behave like a C compiler; a semantic patch is a pattern matcher.
- Declare every metavariable between the `@@` markers before using it: `expression E;` for values, `identifier f;` for names, `type T;` for types.
- Use `...` to match arbitrary execution paths and `<... ...>` for code that may execute multiple times.
- Keep surrounding context minimal; include it only to disambiguate.

## Syntax rules
{rules}

## Worked examples
{examples}

## Task
{description}

Reply with exactly two fenced code blocks:
1. the semantic patch script, fenced as ```cocci
2. a minimal C sample (under 20 lines) written in the OLD style the script must rewrite; dummy struct definitions are fine. Fence it as ```c"#,
        rules = section(&bundle.rules),
        examples = section(&bundle.examples),
        description = task.description,
    )
}

/// Prompt for a targeted repair of the current candidate.
pub fn refine(task: &Task, candidate: &Candidate, outcome: &ValidationOutcome) -> String {
    format!(
        r#"The semantic patch script below failed validation.

## Task
{description}

## Current script
```cocci
{script}
```

## Sample input
```c
{sample}
```

## Validation failure ({stage}, {result})
{message}

{instruction}

Reply with ONLY the corrected script in a ```cocci fenced block."#,
        description = task.description,
        script = candidate.script,
        sample = candidate.sample_input,
        stage = outcome.stage,
        result = outcome.result,
        message = outcome.message,
        instruction = repair_instruction(outcome.result),
    )
}

/// Prompt for the one-shot strategy classification.
pub fn classify(description: &str) -> String {
    format!(
        r#"Decide how the code-change request below should be carried out.

Reply with exactly two lines:
strategy: structural | direct
rationale: <one sentence>

Choose `structural` when the change is a mechanical pattern repeated across many call sites (API renames, argument changes, deprecated-call replacement) that a match/rewrite rule can express. Choose `direct` when the change is localized, semantic, or needs per-site judgement.

## Request
{description}"#,
    )
}

fn repair_instruction(result: CheckResult) -> &'static str {
    match result {
        CheckResult::SyntaxError => {
            "Fix the SmPL grammar: check metavariable declarations, `@@` delimiters, and the \
             `-`/`+` line markers. Do not change what the rule matches."
        }
        CheckResult::LogicError => {
            "The script parses but matches nothing in the sample. Relax the matching \
             constraints: replace concrete types with `expression` or `identifier` \
             metavariables, drop over-specific context lines, and make the pattern reflect \
             the sample's actual shape."
        }
        CheckResult::SystemError => {
            "The validation tooling failed before the script could be judged. Re-emit the \
             script, correcting anything that looks malformed or incomplete."
        }
        CheckResult::Ok => "Re-emit the script unchanged.",
    }
}

fn section(text: &str) -> &str {
    if text.trim().is_empty() {
        "(none retrieved)"
    } else {
        text
    }
}
