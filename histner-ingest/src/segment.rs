//! Sentence segmentation
//!
//! Unicode sentence boundaries (UAX #29) split too eagerly on historical Dutch
//! text full of abbreviations ("o.a.", "jhr.", "St.") and initials
//! ("J. de Witt", "J.P. Coen"). Pieces ending in one of those are glued to
//! the next piece.

use std::collections::HashSet;
use std::ops::Range;
use unicode_segmentation::UnicodeSegmentation;

const DUTCH_ABBREVIATIONS: &[&str] = &[
    "a.s.", "aug.", "bijv.", "blz.", "ca.", "d.w.z.", "dec.", "dhr.", "dr.", "ds.", "enz.",
    "etc.", "feb.", "febr.", "fl.", "gld.", "ing.", "ir.", "jan.", "jhr.", "jl.", "m.b.t.",
    "mevr.", "mr.", "nl.", "no.", "nov.", "nr.", "o.a.", "okt.", "p.", "pag.", "prof.", "resp.",
    "sept.", "st.", "t.a.v.", "vs.", "wed.", "z.g.",
];

const ENGLISH_ABBREVIATIONS: &[&str] = &[
    "a.m.", "approx.", "ca.", "co.", "dr.", "e.g.", "etc.", "i.e.", "jr.", "mr.", "mrs.", "ms.",
    "no.", "p.", "p.m.", "pp.", "prof.", "sr.", "st.", "vol.", "vs.",
];

#[derive(Debug, Clone)]
pub struct Segmenter {
    abbreviations: HashSet<String>,
}

impl Segmenter {
    /// Build a segmenter for `language` ("nl" or "en"; anything else gets both
    /// lists) plus extra abbreviations from configuration.
    pub fn new(language: &str, extra_abbreviations: &[String]) -> Self {
        let base: Vec<&str> = match language {
            "nl" => DUTCH_ABBREVIATIONS.to_vec(),
            "en" => ENGLISH_ABBREVIATIONS.to_vec(),
            _ => DUTCH_ABBREVIATIONS
                .iter()
                .chain(ENGLISH_ABBREVIATIONS)
                .copied()
                .collect(),
        };

        let abbreviations = base
            .into_iter()
            .map(str::to_string)
            .chain(extra_abbreviations.iter().map(|a| normalize_abbreviation(a)))
            .collect();

        Self { abbreviations }
    }

    /// Byte ranges of the sentences in `text`, trimmed of surrounding
    /// whitespace. Empty sentences are skipped.
    pub fn split(&self, text: &str) -> Vec<Range<usize>> {
        let mut sentences = Vec::new();
        let mut current: Option<usize> = None;

        for (idx, piece) in text.split_sentence_bound_indices() {
            let start = *current.get_or_insert(idx);
            if self.continues_after(piece) {
                continue;
            }
            push_trimmed(text, start..idx + piece.len(), &mut sentences);
            current = None;
        }
        if let Some(start) = current {
            push_trimmed(text, start..text.len(), &mut sentences);
        }

        sentences
    }

    fn continues_after(&self, piece: &str) -> bool {
        let trimmed = piece.trim_end();
        if !trimmed.ends_with('.') {
            return false;
        }
        let Some(last_word) = trimmed.split_whitespace().last() else {
            return false;
        };
        let last_word = last_word.trim_start_matches(|c: char| !c.is_alphanumeric());

        if self.abbreviations.contains(&last_word.to_lowercase()) {
            return true;
        }

        is_initials(last_word)
    }
}

/// One or more capital initials, each followed by a dot: `J.`, `J.P.`, `A.B.C.`
fn is_initials(word: &str) -> bool {
    let mut chars = word.chars();
    let mut seen = false;
    loop {
        match (chars.next(), chars.next()) {
            (None, _) => return seen,
            (Some(c), Some('.')) if c.is_uppercase() => seen = true,
            _ => return false,
        }
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new("nl", &[])
    }
}

fn normalize_abbreviation(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    if lower.ends_with('.') {
        lower
    } else {
        format!("{lower}.")
    }
}

fn push_trimmed(text: &str, range: Range<usize>, out: &mut Vec<Range<usize>>) {
    let slice = &text[range.clone()];
    let leading = slice.len() - slice.trim_start().len();
    let trailing = slice.len() - slice.trim_end().len();
    if leading == slice.len() {
        return;
    }
    out.push(range.start + leading..range.end - trailing);
}
