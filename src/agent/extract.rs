//! Extraction of code payloads from generator replies.
//!
//! Generators wrap code in fenced blocks, sometimes tagged, sometimes not,
//! and occasionally return bare text. Every call site goes through this
//! module so the fallback rules live in exactly one place: a payload that
//! would be accepted after a draft is also accepted after a refinement.

const SCRIPT_TAGS: &[&str] = &["cocci", "smpl", "coccinelle"];
const SAMPLE_TAGS: &[&str] = &["c", "h"];

/// Why no payload could be extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("no script payload in generator reply")]
    MissingScript,
    #[error("no sample-input payload in generator reply")]
    MissingSample,
}

#[derive(Debug)]
struct FencedBlock {
    tag: String,
    body: String,
}

impl FencedBlock {
    fn is_script_tagged(&self) -> bool {
        SCRIPT_TAGS.contains(&self.tag.as_str())
    }

    fn is_sample_tagged(&self) -> bool {
        SAMPLE_TAGS.contains(&self.tag.as_str())
    }

    fn is_blank(&self) -> bool {
        self.body.trim().is_empty()
    }
}

/// Split free-form text into fenced blocks.
///
/// Any line opening with three backticks toggles fence state; an unclosed
/// trailing fence still yields its partial body rather than dropping it.
fn fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut open_tag: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            match open_tag.take() {
                None => {
                    open_tag = Some(trimmed.trim_start_matches('`').trim().to_lowercase());
                }
                Some(tag) => {
                    blocks.push(FencedBlock {
                        tag,
                        body: body.join("\n"),
                    });
                    body.clear();
                }
            }
        } else if open_tag.is_some() {
            body.push(line);
        }
    }

    if let Some(tag) = open_tag {
        blocks.push(FencedBlock {
            tag,
            body: body.join("\n"),
        });
    }

    blocks
}

/// Extract a script from a reply that should contain only a script.
///
/// Fallback order: a script-tagged fence, any fence not tagged as sample
/// code, the raw text when no fences exist at all.
pub fn extract_script(text: &str) -> Result<String, ExtractionError> {
    let blocks = fenced_blocks(text);

    if let Some(block) = blocks.iter().find(|b| b.is_script_tagged() && !b.is_blank()) {
        return Ok(block.body.trim().to_string());
    }

    if let Some(block) = blocks.iter().find(|b| !b.is_sample_tagged() && !b.is_blank()) {
        return Ok(block.body.trim().to_string());
    }

    if blocks.is_empty() && !text.trim().is_empty() {
        return Ok(text.trim().to_string());
    }

    Err(ExtractionError::MissingScript)
}

/// Extract the (script, sample input) pair from a draft reply.
///
/// The draft prompt asks for a `cocci` fence and a `c` fence; replies that
/// drop the tags still parse as long as two distinguishable fences exist.
pub fn extract_candidate(text: &str) -> Result<(String, String), ExtractionError> {
    let blocks = fenced_blocks(text);

    let script_idx = blocks
        .iter()
        .position(|b| b.is_script_tagged() && !b.is_blank())
        .or_else(|| {
            blocks
                .iter()
                .position(|b| !b.is_sample_tagged() && !b.is_blank())
        });

    let Some(script_idx) = script_idx else {
        if blocks.is_empty() && !text.trim().is_empty() {
            // Bare text can only be one payload; the sample is gone.
            return Err(ExtractionError::MissingSample);
        }
        return Err(ExtractionError::MissingScript);
    };

    let sample_idx = blocks
        .iter()
        .position(|b| b.is_sample_tagged() && !b.is_blank())
        .or_else(|| {
            blocks
                .iter()
                .enumerate()
                .position(|(i, b)| i != script_idx && !b.is_blank())
        });

    let Some(sample_idx) = sample_idx else {
        return Err(ExtractionError::MissingSample);
    };

    Ok((
        blocks[script_idx].body.trim().to_string(),
        blocks[sample_idx].body.trim().to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tagged_blocks_are_preferred() {
        let reply = "Here you go:\n```cocci\n@@ expression E; @@\n- old(E)\n+ new(E)\n```\nand the sample:\n```c\nvoid f(void) { old(1); }\n```";

        let (script, sample) = extract_candidate(reply).unwrap();
        assert_eq!(script, "@@ expression E; @@\n- old(E)\n+ new(E)");
        assert_eq!(sample, "void f(void) { old(1); }");
    }

    #[test]
    fn untagged_blocks_fall_back_by_position() {
        let reply = "```\nscript body\n```\n```\nsample body\n```";

        let (script, sample) = extract_candidate(reply).unwrap();
        assert_eq!(script, "script body");
        assert_eq!(sample, "sample body");
    }

    #[test]
    fn tag_order_does_not_matter() {
        let reply = "```c\nint x;\n```\n```cocci\n@@ @@\n```";

        let (script, sample) = extract_candidate(reply).unwrap();
        assert_eq!(script, "@@ @@");
        assert_eq!(sample, "int x;");
    }

    #[test]
    fn missing_sample_is_reported() {
        let reply = "```cocci\n@@ @@\n```";
        assert_eq!(
            extract_candidate(reply),
            Err(ExtractionError::MissingSample)
        );
    }

    #[test]
    fn bare_text_draft_cannot_supply_a_sample() {
        assert_eq!(
            extract_candidate("@@ @@\n- old()\n+ new()"),
            Err(ExtractionError::MissingSample)
        );
    }

    #[test]
    fn empty_reply_has_no_script() {
        assert_eq!(extract_candidate(""), Err(ExtractionError::MissingScript));
        assert_eq!(extract_script("   \n"), Err(ExtractionError::MissingScript));
    }

    #[test]
    fn script_extraction_strips_fences() {
        let reply = "Sure, fixed:\n```cocci\n@@ identifier f; @@\n```\nLet me know.";
        assert_eq!(extract_script(reply).unwrap(), "@@ identifier f; @@");
    }

    #[test]
    fn script_extraction_accepts_untagged_fence() {
        assert_eq!(extract_script("```\n@@ @@\n```").unwrap(), "@@ @@");
    }

    #[test]
    fn script_extraction_accepts_bare_text() {
        assert_eq!(extract_script("@@ @@\n- old()").unwrap(), "@@ @@\n- old()");
    }

    #[test]
    fn script_extraction_skips_blank_blocks() {
        let reply = "```cocci\n\n```\n```\nreal body\n```";
        assert_eq!(extract_script(reply).unwrap(), "real body");
    }

    #[test]
    fn unclosed_fence_still_yields_its_body() {
        let reply = "```cocci\n@@ @@\n- old()";
        assert_eq!(extract_script(reply).unwrap(), "@@ @@\n- old()");
    }

    #[test]
    fn sample_only_reply_is_not_a_script() {
        let reply = "```c\nint x;\n```";
        assert_eq!(extract_script(reply), Err(ExtractionError::MissingScript));
    }
}
