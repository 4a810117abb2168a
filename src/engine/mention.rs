//! Mention placement for comment text.
//!
//! Turns a comment and a list of people to mention into the ordered editor
//! steps that produce it. Mentions are typed as `@Name` and then resolved
//! against the suggestion tray by the dispatcher; the plan only decides where
//! each one goes.

use crate::ui::types::Caret;
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MentionPosition {
    Prepend,
    #[default]
    Append,
    /// Treated as `Append` for anchorless mentions.
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MentionTarget {
    #[serde(default)]
    pub anchor: Option<String>,
    pub name: String,
}

impl MentionTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self { anchor: None, name: name.into() }
    }

    pub fn anchored(anchor: impl Into<String>, name: impl Into<String>) -> Self {
        Self { anchor: Some(anchor.into()), name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeStep {
    Type(String),
    Caret(Caret),
    Mention(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedMention {
    pub anchor: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionPlan {
    /// Final editor text, with mentions rendered as `@Name`.
    pub text: String,
    pub steps: Vec<ComposeStep>,
    pub dropped: Vec<DroppedMention>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Mention(String),
}

pub fn place(text: &str, targets: &[MentionTarget], position: MentionPosition) -> MentionPlan {
    let mut pieces = parse_placeholders(text);
    let mut dropped = Vec::new();
    let mut anchorless = Vec::new();

    for target in targets {
        let name = target.name.trim();
        if name.is_empty() {
            continue;
        }
        match target.anchor.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            Some(anchor) => {
                if !insert_after_anchor(&mut pieces, anchor, name) {
                    tracing::warn!(anchor, name, "mention anchor not found in comment, mention dropped");
                    dropped.push(DroppedMention { anchor: anchor.to_string(), name: name.to_string() });
                }
            }
            None => anchorless.push(name.to_string()),
        }
    }

    let mut steps = body_steps(&pieces);
    if !anchorless.is_empty() {
        let body = render(&steps);
        match position {
            MentionPosition::Prepend => {
                steps.push(ComposeStep::Caret(Caret::Start));
                let last = anchorless.len() - 1;
                for (i, name) in anchorless.into_iter().enumerate() {
                    steps.push(ComposeStep::Mention(name));
                    if i < last || !body.is_empty() {
                        steps.push(ComposeStep::Type(" ".to_string()));
                    }
                }
            }
            MentionPosition::Append | MentionPosition::Inline => {
                steps.push(ComposeStep::Caret(Caret::End));
                let mut needs_space = body.chars().last().is_some_and(|c| !c.is_whitespace());
                for name in anchorless {
                    if needs_space {
                        steps.push(ComposeStep::Type(" ".to_string()));
                    }
                    steps.push(ComposeStep::Mention(name));
                    needs_space = true;
                }
            }
        }
    }

    let steps = merge_types(steps);
    MentionPlan { text: render(&steps), steps, dropped }
}

/// Whether `text` already mentions `name`, as `@{Name}` or literal `@Name`.
pub fn mentions_name(text: &str, name: &str) -> bool {
    let name = name.trim();
    if name.is_empty() {
        return false;
    }
    let text = text.to_ascii_lowercase();
    let name = name.to_ascii_lowercase();
    text.contains(&format!("@{{{}}}", name)) || text.contains(&format!("@{}", name))
}

/// Replay steps against an empty buffer with a moving caret.
pub fn render(steps: &[ComposeStep]) -> String {
    let mut buf = String::new();
    let mut caret = 0;
    for step in steps {
        match step {
            ComposeStep::Type(t) => {
                buf.insert_str(caret, t);
                caret += t.len();
            }
            ComposeStep::Mention(name) => {
                let m = format!("@{}", name);
                buf.insert_str(caret, &m);
                caret += m.len();
            }
            ComposeStep::Caret(Caret::Start) => caret = 0,
            ComposeStep::Caret(Caret::End) => caret = buf.len(),
        }
    }
    buf
}

fn parse_placeholders(text: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("@{") {
        let inner = &rest[open + 2..];
        let Some(close) = inner.find('}') else {
            break;
        };
        let name = inner[..close].trim();
        if name.is_empty() {
            pieces.push(Piece::Text(rest[..open + 2 + close + 1].to_string()));
        } else {
            pieces.push(Piece::Text(rest[..open].to_string()));
            pieces.push(Piece::Mention(name.to_string()));
        }
        rest = &inner[close + 1..];
    }
    pieces.push(Piece::Text(rest.to_string()));
    pieces.retain(|p| !matches!(p, Piece::Text(t) if t.is_empty()));
    pieces
}

/// Case-insensitive whole-word pattern for `anchor`; its words may be
/// separated by any run of whitespace in the comment.
fn anchor_pattern(anchor: &str) -> Option<Regex> {
    let words: Vec<String> = anchor.split_whitespace().map(regex::escape).collect();
    if words.is_empty() {
        return None;
    }
    Regex::new(&format!(r"(?i)\b{}\b", words.join(r"\s+"))).ok()
}

/// Insert after the first match of `anchor`, behind any mentions already
/// placed there.
fn insert_after_anchor(pieces: &mut Vec<Piece>, anchor: &str, name: &str) -> bool {
    let Some(pattern) = anchor_pattern(anchor) else {
        return false;
    };
    for i in 0..pieces.len() {
        let Piece::Text(text) = &pieces[i] else {
            continue;
        };
        let Some(found) = pattern.find(text) else {
            continue;
        };
        let end = found.end();
        let mut at = i + 1;
        if end < text.len() {
            let head = text[..end].to_string();
            let tail = text[end..].to_string();
            pieces[i] = Piece::Text(head);
            pieces.insert(i + 1, Piece::Text(tail));
        } else {
            while matches!(pieces.get(at), Some(Piece::Mention(_))) {
                at += 1;
            }
        }
        pieces.insert(at, Piece::Mention(name.to_string()));
        return true;
    }
    false
}

fn body_steps(pieces: &[Piece]) -> Vec<ComposeStep> {
    let mut steps = Vec::new();
    let mut last: Option<char> = None;
    let mut after_mention = false;
    for piece in pieces {
        match piece {
            Piece::Text(t) => {
                if after_mention && t.chars().next().is_some_and(char::is_alphanumeric) {
                    steps.push(ComposeStep::Type(" ".to_string()));
                }
                steps.push(ComposeStep::Type(t.clone()));
                last = t.chars().last();
                after_mention = false;
            }
            Piece::Mention(name) => {
                if last.is_some_and(|c| !c.is_whitespace()) {
                    steps.push(ComposeStep::Type(" ".to_string()));
                }
                steps.push(ComposeStep::Mention(name.clone()));
                last = name.chars().last();
                after_mention = true;
            }
        }
    }
    steps
}

fn merge_types(steps: Vec<ComposeStep>) -> Vec<ComposeStep> {
    let mut out: Vec<ComposeStep> = Vec::with_capacity(steps.len());
    for step in steps {
        if let ComposeStep::Type(next) = &step {
            if let Some(ComposeStep::Type(prev)) = out.last_mut() {
                prev.push_str(next);
                continue;
            }
        }
        out.push(step);
    }
    out
}
