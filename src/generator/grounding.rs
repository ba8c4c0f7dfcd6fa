//! Grounding extraction.
//!
//! Source text is cut into sentence-level candidates, each candidate gets a
//! salience score, and the best ones are kept within a fact/character budget.
//! Selection is by score; output is always in document order.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GroundingConfig;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").unwrap());
static QUANTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d\s?%|[$€£]\s?\d|\d\s?(?:€|USD|EUR|k€|M€)").unwrap());

const MAX_PROPER_NOUN_SCORE: usize = 3;

/// A page's byte range within the assembled text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpan {
    pub number: usize,
    pub start: usize,
    pub end: usize,
}

/// Text a request can be grounded in: an ingested document or a fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundingSource {
    pub label: String,
    pub text: String,
    pub pages: Vec<PageSpan>,
}

impl GroundingSource {
    pub fn page_at(&self, offset: usize) -> Option<usize> {
        self.pages
            .iter()
            .find(|p| offset >= p.start && offset < p.end)
            .map(|p| p.number)
    }
}

/// A claim lifted verbatim (whitespace aside) from a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingFact {
    pub text: String,
    pub source: String,
    /// Byte offset of the claim in its source text.
    pub offset: usize,
    pub page: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactBudget {
    pub max_facts: usize,
    pub max_chars: usize,
}

impl From<&GroundingConfig> for FactBudget {
    fn from(config: &GroundingConfig) -> Self {
        Self {
            max_facts: config.max_facts,
            max_chars: config.max_chars,
        }
    }
}

struct Candidate {
    source_index: usize,
    offset: usize,
    text: String,
    score: usize,
}

#[derive(Debug, Clone)]
pub struct GroundingExtractor {
    min_statement_chars: usize,
    min_candidates: usize,
}

impl GroundingExtractor {
    pub fn new(config: &GroundingConfig) -> Self {
        Self {
            min_statement_chars: config.min_statement_chars,
            min_candidates: config.min_candidates.max(1),
        }
    }

    /// Pick the most salient statements across `sources` under one budget.
    ///
    /// Returns an empty list when the sources are blank or carry too few
    /// informative statements; callers treat that as "ungrounded", not as an
    /// error.
    pub fn extract(
        &self,
        sources: &[GroundingSource],
        keywords: &[String],
        budget: FactBudget,
    ) -> Vec<GroundingFact> {
        let keywords = keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect::<Vec<_>>();

        let candidates = sources
            .iter()
            .enumerate()
            .flat_map(|(source_index, source)| {
                segment(&source.text)
                    .into_iter()
                    .map(move |(offset, text)| (source_index, offset, text))
            })
            .filter(|(_, _, text)| text.chars().count() >= self.min_statement_chars)
            .map(|(source_index, offset, text)| {
                let score = salience(&text, &keywords);
                Candidate {
                    source_index,
                    offset,
                    text,
                    score,
                }
            })
            .filter(|c| c.score > 0)
            .collect::<Vec<_>>();

        if candidates.len() < self.min_candidates {
            debug!(
                candidates = candidates.len(),
                "source text below informativeness threshold"
            );
            return Vec::new();
        }

        // Candidates are already in document order, so a stable sort on score
        // keeps earlier statements ahead of equally salient later ones.
        let mut ranked = (0..candidates.len()).collect::<Vec<_>>();
        ranked.sort_by(|a, b| candidates[*b].score.cmp(&candidates[*a].score));

        let mut chosen = Vec::new();
        let mut used_chars = 0;
        for index in ranked {
            if chosen.len() >= budget.max_facts {
                break;
            }
            let len = candidates[index].text.chars().count();
            if used_chars + len > budget.max_chars {
                continue;
            }
            used_chars += len;
            chosen.push(index);
        }
        chosen.sort_unstable();

        debug!(
            candidates = candidates.len(),
            selected = chosen.len(),
            chars = used_chars,
            "grounding facts selected"
        );

        chosen
            .into_iter()
            .map(|index| {
                let candidate = &candidates[index];
                let source = &sources[candidate.source_index];
                GroundingFact {
                    text: candidate.text.clone(),
                    source: source.label.clone(),
                    offset: candidate.offset,
                    page: source.page_at(candidate.offset),
                }
            })
            .collect()
    }
}

/// Split text into sentence candidates with their byte offsets.
///
/// Sentences end at `.`, `!` or `?` followed by whitespace, and at blank lines.
fn segment(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '.' | '!' | '?' => chars.peek().is_none_or(|(_, next)| next.is_whitespace()),
            '\n' => chars.peek().is_some_and(|(_, next)| *next == '\n'),
            _ => false,
        };
        if boundary {
            let end = i + c.len_utf8();
            push_candidate(text, start, end, &mut out);
            start = end;
        }
    }
    push_candidate(text, start, text.len(), &mut out);
    out
}

fn push_candidate(text: &str, start: usize, end: usize, out: &mut Vec<(usize, String)>) {
    let slice = &text[start..end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return;
    }
    let offset = start + (slice.len() - slice.trim_start().len());
    out.push((offset, WHITESPACE.replace_all(trimmed, " ").into_owned()));
}

fn salience(statement: &str, keywords: &[String]) -> usize {
    let mut score = 0;
    if DIGIT.is_match(statement) {
        score += 2;
    }
    if QUANTITY.is_match(statement) {
        score += 1;
    }

    let proper_nouns = statement
        .split_whitespace()
        .skip(1)
        .filter(|word| {
            let mut letters = word.chars().skip_while(|c| !c.is_alphanumeric());
            matches!(letters.next(), Some(first) if first.is_uppercase())
                && letters.next().is_some()
        })
        .count();
    score += proper_nouns.min(MAX_PROPER_NOUN_SCORE);

    let lowered = statement.to_lowercase();
    score += keywords.iter().filter(|k| lowered.contains(k.as_str())).count() * 2;
    score
}
