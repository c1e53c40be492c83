//! Human-readable rendering of transcripts.

use std::fmt::Write;

use crate::message::{ContentBlock, Role, ToolResultContent, Turn};

const RULE: &str = "--------------------------------------------------";

pub fn render_transcript(turns: &[Turn]) -> String {
    let mut out = String::new();
    for (index, turn) in turns.iter().enumerate() {
        let role = match turn.role {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        };
        let _ = writeln!(out, "{RULE}\nMessage # {}\n{RULE}", index + 1);
        let _ = writeln!(out, "ROLE: {role}");
        for item in &turn.content {
            match item {
                ContentBlock::Text(text) => {
                    let _ = writeln!(out, "TEXT: {text}");
                }
                ContentBlock::ToolUse(call) => {
                    let _ = writeln!(out, "TOOL USE: {}", call.name);
                    let _ = writeln!(out, "INPUT: {}", call.input);
                }
                ContentBlock::ToolResult(result) => {
                    for content in &result.content {
                        match content {
                            ToolResultContent::Text(text) => {
                                let _ = writeln!(out, "TOOL RESULT: {text}");
                            }
                            ToolResultContent::Json(value) => {
                                let _ = writeln!(out, "TOOL RESULT: {value}");
                            }
                        }
                    }
                }
            }
        }
    }
    out
}

/// Renders the main transcript followed by every handoff transcript.
pub fn render_with_handoffs<'a>(
    turns: &[Turn],
    handoffs: impl IntoIterator<Item = (&'a String, &'a Vec<Turn>)>,
) -> String {
    let mut out = render_transcript(turns);
    for (key, transcript) in handoffs {
        let _ = writeln!(out, "\n==================================================");
        let _ = writeln!(out, "HANDOFF: {key}");
        let _ = writeln!(out, "==================================================");
        out.push_str(&render_transcript(transcript));
    }
    out
}
