//! Ontology whitelist and label normalization
//!
//! Raw labels come from two places: the parentheticals annotators typed into the
//! source documents, and the labels language models write in their responses.
//! Both go through the same `Normalizer`, which consults an ordered rule table:
//! the first rule that produces a code decides the label. The produced code must
//! start with an allowed letter (E, F or P) and be whitelisted, otherwise the
//! label is rejected and the annotation is filtered out.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ClassConfig, NormalizerConfig, OntologyConfig, RuleConfig};
use crate::error::HistnerError;

/// A whitelisted ontology code with its human-readable name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalLabel {
    pub code: String,
    pub name: String,
}

impl CanonicalLabel {
    /// `"E53 Place"`
    pub fn display(&self) -> String {
        format!("{} {}", self.code, self.name)
    }
}

/// Why a raw label was filtered out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("no rule recognizes label {0:?}")]
    Unrecognized(String),

    #[error("code {0} is outside the allowed ontology prefixes")]
    OutOfScope(String),

    #[error("code {0} is not in the ontology whitelist")]
    NotWhitelisted(String),
}

pub fn default_classes() -> Vec<ClassConfig> {
    [
        ("E21", "Person"),
        ("E53", "Place"),
        ("E52", "Time-Span"),
        ("E54", "Dimension"),
        ("E19", "Physical Thing"),
        ("E74", "Group"),
        ("E86", "Leaving"),
        ("E9", "Move"),
        ("F2", "Expression"),
        ("E31", "Document"),
        ("E55", "Type"),
        ("E7", "Activity"),
    ]
    .into_iter()
    .map(|(code, name)| ClassConfig {
        code: code.to_string(),
        name: name.to_string(),
    })
    .collect()
}

pub fn default_rules() -> Vec<RuleConfig> {
    let synonyms = [
        ("persoon", "E21"),
        ("person", "E21"),
        ("plaats", "E53"),
        ("locatie", "E53"),
        ("location", "E53"),
        ("stad", "E53"),
        ("city", "E53"),
        ("datum", "E52"),
        ("date", "E52"),
        ("jaartal", "E52"),
        ("timespan", "E52"),
        ("groep", "E74"),
        ("organisatie", "E74"),
        ("organization", "E74"),
        ("voorwerp", "E19"),
        ("object", "E19"),
        ("afmeting", "E54"),
        ("hoeveelheid", "E54"),
        ("vertrek", "E86"),
        ("reis", "E9"),
        ("verplaatsing", "E9"),
        ("journey", "E9"),
        ("expressie", "F2"),
        ("soort", "E55"),
        ("activiteit", "E7"),
    ];

    let mut rules = vec![RuleConfig::Code, RuleConfig::ClassName];
    rules.extend(synonyms.into_iter().map(|(phrase, code)| RuleConfig::Synonym {
        phrase: phrase.to_string(),
        code: code.to_string(),
    }));
    rules
}

/// The fixed set of classes labels may be normalized to.
#[derive(Debug, Clone)]
pub struct Ontology {
    classes: Vec<ClassConfig>,
    allowed_prefixes: Vec<char>,
}

impl Default for Ontology {
    fn default() -> Self {
        Self::new(&OntologyConfig::default())
    }
}

impl Ontology {
    pub fn new(config: &OntologyConfig) -> Self {
        let allowed_prefixes = config
            .allowed_prefixes
            .iter()
            .filter_map(|p| p.trim().chars().next())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        Self {
            classes: config.classes.clone(),
            allowed_prefixes,
        }
    }

    pub fn get(&self, code: &str) -> Option<CanonicalLabel> {
        self.classes
            .iter()
            .find(|c| c.code == code)
            .map(|c| CanonicalLabel {
                code: c.code.clone(),
                name: c.name.clone(),
            })
    }

    /// Whitelisted classes in configuration order.
    pub fn classes(&self) -> Vec<CanonicalLabel> {
        self.classes
            .iter()
            .map(|c| CanonicalLabel {
                code: c.code.clone(),
                name: c.name.clone(),
            })
            .collect()
    }

    pub fn allows_prefix(&self, code: &str) -> bool {
        code.chars()
            .next()
            .map(|c| self.allowed_prefixes.contains(&c))
            .unwrap_or(false)
    }

    /// `"E53 Place"` for whitelisted codes, the bare code otherwise.
    pub fn display_name(&self, code: &str) -> String {
        self.get(code)
            .map(|l| l.display())
            .unwrap_or_else(|| code.to_string())
    }
}

#[derive(Debug)]
enum Rule {
    Code,
    ClassName(Vec<(Regex, String)>),
    Synonym { pattern: Regex, code: String },
}

/// Rewrites free-text labels into whitelisted ontology codes.
#[derive(Debug)]
pub struct Normalizer {
    ontology: Ontology,
    code_pattern: Regex,
    rules: Vec<Rule>,
}

impl Normalizer {
    pub fn new(ontology: Ontology, config: &NormalizerConfig) -> Result<Self, HistnerError> {
        const CODE: &str = r"^([A-Za-z])\s*[-_]?\s*(\d+)";
        let code_pattern = Regex::new(CODE).map_err(|e| HistnerError::pattern(CODE, e))?;

        let mut rules = Vec::with_capacity(config.rules.len());
        for rule in &config.rules {
            let compiled = match rule {
                RuleConfig::Code => Rule::Code,
                RuleConfig::ClassName => {
                    let mut names = Vec::new();
                    for class in &ontology.classes {
                        names.push((word_pattern(&class.name)?, class.code.clone()));
                    }
                    Rule::ClassName(names)
                }
                RuleConfig::Synonym { phrase, code } => Rule::Synonym {
                    pattern: word_pattern(phrase)?,
                    code: code.trim().to_uppercase(),
                },
            };
            rules.push(compiled);
        }

        Ok(Self {
            ontology,
            code_pattern,
            rules,
        })
    }

    pub fn from_config(
        ontology: &OntologyConfig,
        normalizer: &NormalizerConfig,
    ) -> Result<Self, HistnerError> {
        Self::new(Ontology::new(ontology), normalizer)
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    /// Normalize a raw label. The first rule that yields a code wins.
    pub fn normalize(&self, raw: &str) -> Result<CanonicalLabel, Rejection> {
        let cleaned = clean_label(raw);
        let code = self
            .rules
            .iter()
            .find_map(|rule| self.apply(rule, &cleaned))
            .ok_or_else(|| Rejection::Unrecognized(raw.to_string()))?;

        if !self.ontology.allows_prefix(&code) {
            return Err(Rejection::OutOfScope(code));
        }

        self.ontology
            .get(&code)
            .ok_or(Rejection::NotWhitelisted(code))
    }

    /// Every distinct code any rule would produce, in rule order. More than one
    /// entry means the label was ambiguous and priority decided it.
    pub fn candidates(&self, raw: &str) -> Vec<String> {
        let cleaned = clean_label(raw);
        let mut codes: Vec<String> = Vec::new();
        for rule in &self.rules {
            if let Some(code) = self.apply(rule, &cleaned) {
                if !codes.contains(&code) {
                    codes.push(code);
                }
            }
        }
        codes
    }

    /// Normalize and log the outcome. Rejections and ambiguities are not errors.
    pub fn normalize_logged(&self, raw: &str) -> Option<CanonicalLabel> {
        match self.normalize(raw) {
            Ok(label) => {
                let candidates = self.candidates(raw);
                if candidates.len() > 1 {
                    tracing::debug!(
                        raw = %raw,
                        chosen = %label.code,
                        candidates = ?candidates,
                        "Ambiguous label resolved by rule priority"
                    );
                }
                Some(label)
            }
            Err(rejection) => {
                tracing::debug!(raw = %raw, reason = %rejection, "Label filtered out");
                None
            }
        }
    }

    fn apply(&self, rule: &Rule, cleaned: &str) -> Option<String> {
        match rule {
            Rule::Code => {
                let caps = self.code_pattern.captures(cleaned)?;
                let letter = caps.get(1)?.as_str().to_uppercase();
                let number: u32 = caps.get(2)?.as_str().parse().ok()?;
                Some(format!("{letter}{number}"))
            }
            Rule::ClassName(names) => names
                .iter()
                .find(|(pattern, _)| pattern.is_match(cleaned))
                .map(|(_, code)| code.clone()),
            Rule::Synonym { pattern, code } => {
                pattern.is_match(cleaned).then(|| code.clone())
            }
        }
    }
}

/// Split a parenthetical that lists several labels (`E53 Place; E74 Group`).
pub fn split_label_list(raw: &str) -> Vec<String> {
    raw.split([';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn clean_label(raw: &str) -> String {
    raw.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn word_pattern(phrase: &str) -> Result<Regex, HistnerError> {
    let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
    Regex::new(&format!(r"(?i)\b{}\b", words.join(r"\s+"))).map_err(|e| HistnerError::pattern(phrase, e))
}
