//! HTML comparison report
//!
//! Renders every prediction record next to the ground truth of its sentence,
//! with entity spans coloured by class, plus a per-model summary table.
//! Rendering is a pure function of the predictions file content: records are
//! grouped by sentence id and ordered by model id, then by content, and
//! nothing time dependent is written, so the same set of records always gives
//! byte-identical output whatever their line order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::Path;
use thiserror::Error;

use histner_core::models::{Entity, Prediction, PredictionOutcome, PredictionRecord};
use histner_core::Ontology;

use crate::jsonl::{parse_lines, write_atomic};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Cannot read predictions file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write report file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSummary {
    pub sentences: usize,
    pub records: usize,
    pub failed: usize,
    pub malformed: usize,
}

/// Read a predictions file and write the HTML report for it.
pub fn convert(predictions: &Path, output: &Path, ontology: &Ontology) -> Result<ReportSummary, ReportError> {
    let content = std::fs::read_to_string(predictions).map_err(|source| ReportError::Read {
        path: predictions.display().to_string(),
        source,
    })?;

    let report = Report::parse(&content);
    let html = report.render(ontology);
    write_atomic(output, html.as_bytes()).map_err(|source| ReportError::Write {
        path: output.display().to_string(),
        source,
    })?;

    let summary = report.summary();
    tracing::info!(
        output = %output.display(),
        sentences = summary.sentences,
        records = summary.records,
        failed = summary.failed,
        malformed = summary.malformed,
        "Wrote report"
    );
    Ok(summary)
}

/// Render the report for the content of a predictions file.
pub fn render_report(content: &str, ontology: &Ontology) -> String {
    Report::parse(content).render(ontology)
}

// ============================================================================
// Colours
// ============================================================================

const DEFAULT_COLOUR: &str = "#BDC3C7";

fn colour_for(code: &str) -> &'static str {
    match code {
        "E21" => "#FF6B6B",
        "E53" => "#4ECDC4",
        "E52" => "#45B7D1",
        "E54" => "#96CEB4",
        "E19" => "#FFEAA7",
        "E74" => "#DDA0DD",
        "E86" => "#F39C12",
        "E9" => "#E17055",
        "F2" => "#A29BFE",
        "E31" => "#FD79A8",
        "E55" => "#FDCB6E",
        "E7" => "#6C5CE7",
        _ => DEFAULT_COLOUR,
    }
}

fn background_for(labels: &[String]) -> String {
    match labels {
        [] => DEFAULT_COLOUR.to_string(),
        [single] => colour_for(single).to_string(),
        many => {
            let colours: Vec<&str> = many.iter().map(|l| colour_for(l)).collect();
            format!("linear-gradient(90deg, {})", colours.join(", "))
        }
    }
}

pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

// ============================================================================
// Marks: located, merged spans
// ============================================================================

/// A span located in the sentence, in char offsets, with every label that
/// was given for exactly these offsets (sorted, deduplicated).
#[derive(Debug, Clone, PartialEq, Eq)]
struct Mark {
    start: usize,
    end: usize,
    labels: Vec<String>,
    /// 1-based occurrence of the span text in the sentence.
    occurrence: usize,
}

fn merge_marks(marks: Vec<Mark>) -> Vec<Mark> {
    let mut merged: BTreeMap<(usize, usize), Mark> = BTreeMap::new();
    for mark in marks {
        merged
            .entry((mark.start, mark.end))
            .and_modify(|m| {
                m.labels.extend(mark.labels.iter().cloned());
                m.occurrence = m.occurrence.min(mark.occurrence);
            })
            .or_insert(mark);
    }

    let mut out: Vec<Mark> = merged
        .into_values()
        .map(|mut m| {
            m.labels.sort();
            m.labels.dedup();
            m
        })
        .collect();
    out.sort_by_key(|m| (m.start, std::cmp::Reverse(m.end)));
    out
}

fn gold_marks(text: &str, gold: &[Entity]) -> Vec<Mark> {
    let len = text.chars().count();
    let marks = gold
        .iter()
        .filter(|e| e.start < e.end && e.end <= len)
        .map(|e| Mark {
            start: e.start,
            end: e.end,
            labels: vec![e.label.clone()],
            occurrence: 1,
        })
        .collect();
    merge_marks(marks)
}

/// Model predictions carry no offsets: every occurrence of the span text in
/// the sentence is marked.
fn model_marks(text: &str, predictions: &[Prediction]) -> Vec<Mark> {
    let mut marks = Vec::new();
    for prediction in predictions {
        if prediction.span.is_empty() {
            continue;
        }
        let span_chars = prediction.span.chars().count();
        let mut from = 0;
        let mut occurrence = 0;
        // Restart one char after each hit so overlapping occurrences count too.
        while let Some(found) = text[from..].find(prediction.span.as_str()) {
            let byte_idx = from + found;
            let start = text[..byte_idx].chars().count();
            occurrence += 1;
            marks.push(Mark {
                start,
                end: start + span_chars,
                labels: vec![prediction.label.clone()],
                occurrence,
            });
            from = byte_idx + text[byte_idx..].chars().next().map_or(1, char::len_utf8);
        }
    }
    merge_marks(marks)
}

/// Render `text` with marks. Overlapping marks form one group: the longest
/// is drawn, the others are listed in its tooltip.
fn render_marked(text: &str, marks: &[Mark], ontology: &Ontology) -> String {
    let chars: Vec<char> = text.chars().collect();
    let slice = |from: usize, to: usize| -> String { html_escape(&chars[from..to].iter().collect::<String>()) };

    let mut out = String::new();
    let mut cursor = 0;
    let mut i = 0;
    while i < marks.len() {
        let group_start = marks[i].start;
        let mut group_end = marks[i].end;
        let mut j = i + 1;
        while j < marks.len() && marks[j].start < group_end {
            group_end = group_end.max(marks[j].end);
            j += 1;
        }
        let group = &marks[i..j];

        let mut primary = &group[0];
        for mark in group {
            if mark.end - mark.start > primary.end - primary.start {
                primary = mark;
            }
        }

        out.push_str(&slice(cursor, group_start));
        out.push_str(&slice(group_start, primary.start));
        out.push_str(&render_entity(&chars, primary, group, ontology));
        out.push_str(&slice(primary.end, group_end));

        cursor = group_end;
        i = j;
    }
    out.push_str(&slice(cursor, chars.len()));
    out
}

fn render_entity(chars: &[char], primary: &Mark, group: &[Mark], ontology: &Ontology) -> String {
    let text: String = chars[primary.start..primary.end].iter().collect();
    let names: Vec<String> = primary.labels.iter().map(|l| ontology.display_name(l)).collect();

    let mut title = format!("{} [{}-{}]", names.join(", "), primary.start, primary.end);
    for other in group.iter().filter(|m| *m != primary) {
        let other_text: String = chars[other.start..other.end].iter().collect();
        let other_names: Vec<String> = other.labels.iter().map(|l| ontology.display_name(l)).collect();
        let _ = write!(
            title,
            "\nAlso: {} ({}) [{}-{}]",
            other_text,
            other_names.join(", "),
            other.start,
            other.end
        );
    }

    let class = if primary.labels.len() > 1 { "entity multi" } else { "entity" };
    let occurrence = if primary.occurrence > 1 {
        format!("<sup>{}</sup>", primary.occurrence)
    } else {
        String::new()
    };

    format!(
        r#"<span class="{class}" style="background: {background};" title="{title}">{text}{occurrence}<span class="tag">{tag}</span></span>"#,
        background = background_for(&primary.labels),
        title = html_escape(&title),
        text = html_escape(&text),
        tag = html_escape(&primary.labels.join("/")),
    )
}

// ============================================================================
// Statistics
// ============================================================================

/// Span-level agreement between a model and the ground truth, as set
/// arithmetic over (offsets, sorted label set). A type mismatch at the same
/// offsets counts as `partial` and also as one `model_only` and one
/// `gold_only`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ModelStats {
    pub records: usize,
    pub failed: usize,
    pub predicted: usize,
    pub gold: usize,
    pub exact: usize,
    /// Offsets shared with a gold span without an exact match there.
    pub partial: usize,
    pub model_only: usize,
    pub gold_only: usize,
}

impl ModelStats {
    fn compare(gold: &[Mark], predicted: &[Mark]) -> Self {
        let key = |m: &Mark| (m.start, m.end, m.labels.clone());
        let gold_keys: BTreeSet<(usize, usize, Vec<String>)> = gold.iter().map(key).collect();
        let predicted_keys: BTreeSet<(usize, usize, Vec<String>)> = predicted.iter().map(key).collect();

        let exact: BTreeSet<(usize, usize)> = gold_keys
            .intersection(&predicted_keys)
            .map(|(start, end, _)| (*start, *end))
            .collect();
        let gold_positions: BTreeSet<(usize, usize)> = gold.iter().map(|m| (m.start, m.end)).collect();
        let predicted_positions: BTreeSet<(usize, usize)> = predicted.iter().map(|m| (m.start, m.end)).collect();

        ModelStats {
            records: 1,
            predicted: predicted_keys.len(),
            gold: gold_keys.len(),
            exact: exact.len(),
            partial: gold_positions
                .intersection(&predicted_positions)
                .filter(|p| !exact.contains(*p))
                .count(),
            model_only: predicted_keys.difference(&gold_keys).count(),
            gold_only: gold_keys.difference(&predicted_keys).count(),
            ..Default::default()
        }
    }

    fn failed(gold: &[Mark]) -> Self {
        ModelStats {
            records: 1,
            failed: 1,
            gold: gold.len(),
            gold_only: gold.len(),
            ..Default::default()
        }
    }

    fn add(&mut self, other: &ModelStats) {
        self.records += other.records;
        self.failed += other.failed;
        self.predicted += other.predicted;
        self.gold += other.gold;
        self.exact += other.exact;
        self.partial += other.partial;
        self.model_only += other.model_only;
        self.gold_only += other.gold_only;
    }

    pub fn precision(&self) -> f64 {
        ratio(self.exact, self.predicted)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.exact, self.gold)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

// ============================================================================
// Report
// ============================================================================

struct Report {
    /// sentence id -> records, sorted by model id and content
    sentences: BTreeMap<String, Vec<PredictionRecord>>,
    /// (line number, parse error)
    malformed: Vec<(usize, String)>,
}

impl Report {
    fn parse(content: &str) -> Self {
        let mut sentences: BTreeMap<String, Vec<PredictionRecord>> = BTreeMap::new();
        let mut malformed = Vec::new();

        for (line, parsed) in parse_lines::<PredictionRecord>(content) {
            match parsed {
                Ok(record) => sentences.entry(record.sentence_id.clone()).or_default().push(record),
                Err(e) => {
                    tracing::warn!(line, error = %e, "Malformed prediction record");
                    malformed.push((line, e.to_string()));
                }
            }
        }
        // Records sharing a model (concatenated runs) fall back to their
        // serialized form, so line order never shows in the output.
        for records in sentences.values_mut() {
            records.sort_by_cached_key(|r| (r.model.clone(), serde_json::to_string(r).unwrap_or_default()));
        }

        Self { sentences, malformed }
    }

    fn summary(&self) -> ReportSummary {
        let records = self.sentences.values().flatten();
        ReportSummary {
            sentences: self.sentences.len(),
            records: records.clone().count(),
            failed: records.filter(|r| r.is_failed()).count(),
            malformed: self.malformed.len(),
        }
    }

    fn models(&self) -> BTreeSet<&str> {
        self.sentences
            .values()
            .flatten()
            .map(|r| r.model.as_str())
            .collect()
    }

    fn render(&self, ontology: &Ontology) -> String {
        let summary = self.summary();
        let models = self.models();
        let mut totals: BTreeMap<&str, ModelStats> = BTreeMap::new();
        let mut body = String::new();

        for (sentence_id, records) in &self.sentences {
            let Some(first) = records.first() else {
                continue;
            };
            let text = &first.text;
            let gold = gold_marks(text, &first.gold);

            let _ = writeln!(body, r#"<section class="sentence" id="{}">"#, html_escape(sentence_id));
            let _ = writeln!(body, "<h2>{}</h2>", html_escape(sentence_id));
            let _ = writeln!(
                body,
                r#"<div class="row gold"><div class="source">Ground truth</div><div class="text">{}</div></div>"#,
                render_marked(text, &gold, ontology)
            );

            for record in records {
                let stats = self.render_record(&mut body, record, &gold, ontology);
                totals.entry(record.model.as_str()).or_default().add(&stats);
            }
            body.push_str("</section>\n");
        }

        if !self.malformed.is_empty() {
            body.push_str("<section class=\"malformed\">\n<h2>Malformed records</h2>\n");
            for (line, error) in &self.malformed {
                let _ = writeln!(
                    body,
                    r#"<div class="failed-marker">Line {line}: malformed record: {}</div>"#,
                    html_escape(error)
                );
            }
            body.push_str("</section>\n");
        }

        let mut html = String::new();
        html.push_str(HTML_HEAD);
        html.push_str(&render_legend(ontology, &models));
        html.push_str("<main>\n<h1>Entity extraction comparison</h1>\n");
        let _ = writeln!(
            html,
            r#"<p class="meta">{} sentences, {} models, {} records ({} failed), {} malformed lines</p>"#,
            summary.sentences,
            models.len(),
            summary.records,
            summary.failed,
            summary.malformed
        );
        html.push_str(&render_summary_table(&totals));
        html.push_str(&body);
        html.push_str("</main>\n</body>\n</html>\n");
        html
    }

    fn render_record(
        &self,
        body: &mut String,
        record: &PredictionRecord,
        gold: &[Mark],
        ontology: &Ontology,
    ) -> ModelStats {
        let model = html_escape(&record.model);
        match &record.outcome {
            PredictionOutcome::Success { predictions } => {
                let marks = model_marks(&record.text, predictions);
                let stats = ModelStats::compare(gold, &marks);
                let _ = writeln!(
                    body,
                    r#"<div class="row model"><div class="source">{model}</div><div class="text">{}</div><div class="comparison">exact {} | partial {} | model-only {} | gold-only {}</div></div>"#,
                    render_marked(&record.text, &marks, ontology),
                    stats.exact,
                    stats.partial,
                    stats.model_only,
                    stats.gold_only
                );
                stats
            }
            PredictionOutcome::Failed { kind, message } => {
                let _ = write!(
                    body,
                    r#"<div class="row model failed"><div class="source">{model}</div><div class="failed-marker">FAILED ({kind}): {}</div>"#,
                    html_escape(message)
                );
                if let Some(raw) = &record.raw_output {
                    let _ = write!(body, r#"<pre class="raw-output">{}</pre>"#, html_escape(raw));
                }
                body.push_str("</div>\n");
                ModelStats::failed(gold)
            }
        }
    }
}

fn render_legend(ontology: &Ontology, models: &BTreeSet<&str>) -> String {
    let mut out = String::from("<aside class=\"legend\">\n<h3>Entity classes</h3>\n<ul>\n");
    for class in ontology.classes() {
        let _ = writeln!(
            out,
            r#"<li><span class="swatch" style="background: {};"></span>{}</li>"#,
            colour_for(&class.code),
            html_escape(&class.display())
        );
    }
    out.push_str("</ul>\n<h3>Sources</h3>\n<ul>\n<li>Ground truth</li>\n");
    for model in models {
        let _ = writeln!(out, "<li>{}</li>", html_escape(model));
    }
    out.push_str("</ul>\n</aside>\n");
    out
}

fn render_summary_table(totals: &BTreeMap<&str, ModelStats>) -> String {
    let mut out = String::from(
        "<table class=\"summary\">\n<tr><th>Model</th><th>Records</th><th>Failed</th><th>Predicted</th><th>Gold</th>\
         <th>Exact</th><th>Partial</th><th>Model-only</th><th>Gold-only</th><th>Precision</th><th>Recall</th><th>F1</th></tr>\n",
    );
    for (model, s) in totals {
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.3}</td><td>{:.3}</td><td>{:.3}</td></tr>",
            html_escape(model),
            s.records,
            s.failed,
            s.predicted,
            s.gold,
            s.exact,
            s.partial,
            s.model_only,
            s.gold_only,
            s.precision(),
            s.recall(),
            s.f1()
        );
    }
    out.push_str("</table>\n");
    out
}

const HTML_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Entity extraction comparison</title>
<style>
body { font-family: Georgia, serif; margin: 0; padding: 2em 300px 2em 2em; line-height: 1.8; color: #2d3436; }
h1 { font-size: 1.6em; }
h2 { font-size: 1em; font-family: monospace; color: #636e72; margin-bottom: 0.3em; }
.meta { color: #636e72; }
.legend { position: fixed; top: 1em; right: 1em; width: 250px; max-height: 90vh; overflow-y: auto; background: #fff; border: 1px solid #dfe6e9; border-radius: 6px; padding: 0.5em 1em; font-size: 0.85em; box-shadow: 0 2px 8px rgba(0,0,0,0.1); }
.legend ul { list-style: none; padding: 0; margin: 0; }
.swatch { display: inline-block; width: 1em; height: 1em; margin-right: 0.5em; vertical-align: middle; border-radius: 3px; }
.sentence { border-bottom: 1px solid #dfe6e9; padding: 0.5em 0 1em; }
.row { display: flex; gap: 1em; align-items: baseline; flex-wrap: wrap; }
.source { width: 160px; flex-shrink: 0; font-family: monospace; font-size: 0.85em; color: #636e72; }
.text { flex: 1; }
.gold .source { font-weight: bold; color: #2d3436; }
.comparison { width: 100%; margin-left: 176px; font-size: 0.8em; color: #636e72; }
.entity { padding: 1px 4px; border-radius: 4px; cursor: help; }
.entity.multi { border: 1px dashed #2d3436; }
.tag { font-size: 0.65em; font-family: monospace; margin-left: 3px; vertical-align: super; }
.failed-marker { color: #d63031; font-weight: bold; }
.raw-output { width: 100%; margin-left: 176px; background: #f5f6fa; padding: 0.5em; white-space: pre-wrap; font-size: 0.85em; }
.summary { border-collapse: collapse; margin: 1em 0 2em; font-size: 0.9em; }
.summary th, .summary td { border: 1px solid #dfe6e9; padding: 4px 8px; text-align: right; }
.summary td:first-child, .summary th:first-child { text-align: left; }
</style>
</head>
<body>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use histner_core::models::{FailureKind, RetrievedExample};
    use uuid::Uuid;

    const TEXT: &str = "Pieter ging naar Rotterdam.";

    fn entity(span: &str, label: &str, start: usize, end: usize) -> Entity {
        Entity {
            span: span.to_string(),
            label: label.to_string(),
            start,
            end,
        }
    }

    fn prediction(span: &str, label: &str) -> Prediction {
        Prediction {
            span: span.to_string(),
            label: label.to_string(),
        }
    }

    fn record(model: &str, outcome: PredictionOutcome, raw: Option<&str>) -> PredictionRecord {
        PredictionRecord {
            run_id: Uuid::nil(),
            sentence_id: "q#0001".to_string(),
            text: TEXT.to_string(),
            gold: vec![entity("Pieter", "E21", 0, 6), entity("Rotterdam", "E53", 17, 26)],
            model: model.to_string(),
            examples: vec![RetrievedExample {
                id: "reis#0001".to_string(),
                score: 0.8,
            }],
            raw_output: raw.map(str::to_string),
            outcome,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
        }
    }

    fn to_jsonl(records: &[PredictionRecord]) -> String {
        records
            .iter()
            .map(|r| serde_json::to_string(r).unwrap() + "\n")
            .collect()
    }

    fn sample() -> Vec<PredictionRecord> {
        vec![
            record(
                "mistral",
                PredictionOutcome::Success {
                    predictions: vec![prediction("Rotterdam", "E53"), prediction("Pieter", "E74")],
                },
                Some("**Pieter** (E74) ging naar **Rotterdam** (E53 Place)."),
            ),
            record(
                "gpt",
                PredictionOutcome::Failed {
                    kind: FailureKind::UnparsableResponse,
                    message: "unbalanced ** markers".to_string(),
                },
                Some("Pieter <b>ging</b> naar **Rotterdam."),
            ),
        ]
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let content = to_jsonl(&sample());
        let a = render_report(&content, &Ontology::default());
        let b = render_report(&content, &Ontology::default());
        assert_eq!(a, b);
    }

    #[test]
    fn test_line_order_does_not_change_output() {
        let success = record(
            "m",
            PredictionOutcome::Success {
                predictions: vec![prediction("Rotterdam", "E53")],
            },
            None,
        );
        let failed = record(
            "m",
            PredictionOutcome::Failed {
                kind: FailureKind::ModelCallFailed,
                message: "timeout".to_string(),
            },
            None,
        );

        let forward = render_report(&to_jsonl(&[success.clone(), failed.clone()]), &Ontology::default());
        let backward = render_report(&to_jsonl(&[failed, success]), &Ontology::default());
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_models_are_sorted_within_sentence() {
        let html = render_report(&to_jsonl(&sample()), &Ontology::default());
        let gpt = html.find(r#"<div class="source">gpt</div>"#).unwrap();
        let mistral = html.find(r#"<div class="source">mistral</div>"#).unwrap();
        assert!(gpt < mistral);
    }

    #[test]
    fn test_failed_record_is_marked_with_escaped_raw_output() {
        let html = render_report(&to_jsonl(&sample()), &Ontology::default());
        assert!(html.contains("FAILED (UnparsableResponse): unbalanced ** markers"));
        assert!(html.contains("Pieter &lt;b&gt;ging&lt;/b&gt; naar **Rotterdam."));
        assert!(!html.contains("<b>ging</b>"));
    }

    #[test]
    fn test_malformed_line_is_marked_with_line_number() {
        let mut content = to_jsonl(&sample());
        content.push_str("{\"broken\": true}\n");
        let html = render_report(&content, &Ontology::default());
        assert!(html.contains("Line 3: malformed record"));
        assert!(html.contains("1 malformed lines"));
    }

    #[test]
    fn test_summary_statistics() {
        let html = render_report(&to_jsonl(&sample()), &Ontology::default());
        // mistral: Rotterdam exact; Pieter E74 vs E21 is partial, model-only and gold-only
        assert!(html.contains(
            "<tr><td>mistral</td><td>1</td><td>0</td><td>2</td><td>2</td><td>1</td><td>1</td><td>1</td><td>1</td><td>0.500</td><td>0.500</td><td>0.500</td></tr>"
        ));
        // gpt failed: gold still counted, all gold-only
        assert!(html.contains(
            "<tr><td>gpt</td><td>1</td><td>1</td><td>0</td><td>2</td><td>0</td><td>0</td><td>0</td><td>2</td><td>0.000</td><td>0.000</td><td>0.000</td></tr>"
        ));
    }

    #[test]
    fn test_identical_offsets_merge_labels() {
        let marks = gold_marks(TEXT, &[entity("Pieter", "E74", 0, 6), entity("Pieter", "E21", 0, 6)]);
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].labels, vec!["E21", "E74"]);

        let html = render_marked(TEXT, &marks, &Ontology::default());
        assert!(html.contains(r#"class="entity multi""#));
        assert!(html.contains("linear-gradient(90deg, #FF6B6B, #DDA0DD)"));
        assert!(html.contains(r#"<span class="tag">E21/E74</span>"#));
    }

    #[test]
    fn test_every_occurrence_is_marked() {
        let text = "Van Delft naar Delft.";
        let marks = model_marks(text, &[prediction("Delft", "E53")]);
        assert_eq!(marks.len(), 2);
        assert_eq!((marks[1].start, marks[1].end, marks[1].occurrence), (15, 20, 2));

        let html = render_marked(text, &marks, &Ontology::default());
        assert!(html.contains("Delft<sup>2</sup>"));
        assert!(html.starts_with("Van <span"));
        assert!(html.ends_with("</span>."));
    }

    #[test]
    fn test_overlapping_occurrences_are_marked() {
        let marks = model_marks("Lololo.", &[prediction("olo", "E53")]);
        let found: Vec<(usize, usize, usize)> = marks.iter().map(|m| (m.start, m.end, m.occurrence)).collect();
        assert_eq!(found, vec![(1, 4, 1), (3, 6, 2)]);
    }

    #[test]
    fn test_compare_counts_like_sets() {
        let gold = gold_marks(TEXT, &[entity("Pieter", "E21", 0, 6), entity("Rotterdam", "E53", 17, 26)]);
        let predicted = model_marks(TEXT, &[prediction("Pieter", "E21"), prediction("naar", "E53")]);
        let stats = ModelStats::compare(&gold, &predicted);
        assert_eq!(
            (stats.exact, stats.partial, stats.model_only, stats.gold_only),
            (1, 0, 1, 1)
        );

        let mislabeled = model_marks(TEXT, &[prediction("Rotterdam", "E21")]);
        let stats = ModelStats::compare(&gold, &mislabeled);
        assert_eq!(
            (stats.exact, stats.partial, stats.model_only, stats.gold_only),
            (0, 1, 1, 2)
        );
    }

    #[test]
    fn test_overlapping_spans_keep_longest_and_text() {
        let text = "De Oost-Indische Compagnie zeilde.";
        let marks = gold_marks(
            text,
            &[entity("Oost-Indische", "E53", 3, 16), entity("Indische Compagnie", "E74", 8, 26)],
        );
        let html = render_marked(text, &marks, &Ontology::default());

        // primary is the longer E74 span, the leading "Oost-" stays as plain text
        assert!(html.starts_with("De Oost-<span"));
        assert!(html.contains(">Indische Compagnie<span class=\"tag\">E74</span>"));
        assert!(html.contains("Also: Oost-Indische (E53 Place) [3-16]"));
        assert!(html.ends_with("</span> zeilde."));
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<a href=\"x\">'&'</a>"), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }

    #[test]
    fn test_convert_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("predictions.jsonl");
        let output = dir.path().join("report.html");
        std::fs::write(&input, to_jsonl(&sample())).unwrap();

        let summary = convert(&input, &output, &Ontology::default()).unwrap();
        assert_eq!(
            summary,
            ReportSummary {
                sentences: 1,
                records: 2,
                failed: 1,
                malformed: 0
            }
        );
        let html = std::fs::read_to_string(&output).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn test_convert_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.jsonl");
        assert!(matches!(
            convert(&missing, &dir.path().join("out.html"), &Ontology::default()),
            Err(ReportError::Read { .. })
        ));

        let input = dir.path().join("predictions.jsonl");
        std::fs::write(&input, "").unwrap();
        assert!(matches!(
            convert(&input, &dir.path().join("no/such/dir/out.html"), &Ontology::default()),
            Err(ReportError::Write { .. })
        ));
    }
}
