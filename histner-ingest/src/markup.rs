//! Markdown parsing: text blocks with labeled emphasis spans
//!
//! Annotators mark an entity by making it bold and writing its class in
//! parentheses right after it:
//!
//! ```text
//! Jan reisde naar **Amsterdam** (E53 Place) in 1650.
//! ```
//!
//! Each block (paragraph, heading, list item) becomes a `Block` whose text has
//! the markers and the parenthetical removed, plus the byte ranges of the
//! labeled spans inside that text.

use pulldown_cmark::{Event, Options, Parser, Tag};

use crate::error::IngestError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledSpan {
    /// Byte offsets into `Block::text`, end-exclusive.
    pub start: usize,
    pub end: usize,
    pub label_raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub text: String,
    pub spans: Vec<LabeledSpan>,
}

#[derive(Debug)]
struct Segment {
    text: String,
    strong: bool,
}

/// Parse a markdown document into text blocks.
pub fn parse_blocks(document: &str, markdown: &str) -> Result<Vec<Block>, IngestError> {
    let mut blocks = Vec::new();
    let mut segments: Vec<Segment> = Vec::new();
    let mut strong_depth = 0usize;

    for event in Parser::new_ext(markdown, Options::empty()) {
        match event {
            Event::Start(Tag::Paragraph | Tag::Heading(..) | Tag::Item)
            | Event::End(Tag::Paragraph | Tag::Heading(..) | Tag::Item) => {
                flush(document, &mut segments, &mut blocks)?;
                strong_depth = 0;
            }
            Event::Start(Tag::Strong) => {
                if strong_depth == 0 {
                    segments.push(Segment {
                        text: String::new(),
                        strong: true,
                    });
                }
                strong_depth += 1;
            }
            Event::End(Tag::Strong) => {
                strong_depth = strong_depth.saturating_sub(1);
                if strong_depth == 0 {
                    segments.push(Segment {
                        text: String::new(),
                        strong: false,
                    });
                }
            }
            Event::Text(text) | Event::Code(text) => append(&mut segments, &text, strong_depth > 0),
            Event::SoftBreak | Event::HardBreak => append(&mut segments, " ", strong_depth > 0),
            _ => {}
        }
    }
    flush(document, &mut segments, &mut blocks)?;

    if blocks.is_empty() {
        return Err(IngestError::format(document, "document contains no text"));
    }
    Ok(blocks)
}

fn append(segments: &mut Vec<Segment>, text: &str, strong: bool) {
    match segments.last_mut() {
        Some(last) if last.strong == strong => last.text.push_str(text),
        _ => segments.push(Segment {
            text: text.to_string(),
            strong,
        }),
    }
}

fn flush(
    document: &str,
    segments: &mut Vec<Segment>,
    blocks: &mut Vec<Block>,
) -> Result<(), IngestError> {
    let taken = std::mem::take(segments);
    if let Some(block) = build_block(document, taken)? {
        blocks.push(block);
    }
    Ok(())
}

fn build_block(document: &str, mut segments: Vec<Segment>) -> Result<Option<Block>, IngestError> {
    let mut text = String::new();
    let mut spans = Vec::new();

    for i in 0..segments.len() {
        if !segments[i].strong {
            text.push_str(&segments[i].text);
            continue;
        }

        let span_text = segments[i].text.trim().to_string();
        if span_text.is_empty() {
            text.push_str(&segments[i].text);
            continue;
        }
        text.push_str(&segments[i].text);
        let end = text.trim_end().len();
        let start = end - span_text.len();

        let following = segments
            .get(i + 1)
            .filter(|s| !s.strong)
            .map(|s| s.text.as_str())
            .unwrap_or("");

        match split_label(following) {
            LabelSplit::Label { label, rest } => {
                let rest = rest.to_string();
                if label.is_empty() {
                    tracing::warn!(document, span = %span_text, "Emphasized span with empty label dropped");
                } else {
                    spans.push(LabeledSpan {
                        start,
                        end,
                        label_raw: label,
                    });
                }
                if let Some(next) = segments.get_mut(i + 1) {
                    next.text = rest;
                }
            }
            LabelSplit::Unterminated => {
                return Err(IngestError::format(
                    document,
                    format!("unterminated label after **{span_text}**"),
                ));
            }
            LabelSplit::None => {
                tracing::warn!(document, span = %span_text, "Emphasized span without label dropped");
            }
        }
    }

    if text.contains("**") {
        return Err(IngestError::format(
            document,
            format!("unbalanced emphasis marker in {:?}", text.trim()),
        ));
    }

    if text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(Block { text, spans }))
}

enum LabelSplit<'a> {
    Label { label: String, rest: &'a str },
    Unterminated,
    None,
}

/// Split `" (E53 Place) in 1650."` into the label and the text after it.
fn split_label(following: &str) -> LabelSplit<'_> {
    let trimmed = following.trim_start();
    let Some(inner) = trimmed.strip_prefix('(') else {
        return LabelSplit::None;
    };
    match inner.find(')') {
        Some(close) => LabelSplit::Label {
            label: inner[..close].trim().to_string(),
            rest: &inner[close + 1..],
        },
        None => LabelSplit::Unterminated,
    }
}
