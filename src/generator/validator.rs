//! Structural checks on generated text.

use std::fmt;

use serde::Serialize;

use crate::types::{LengthUnit, PromptConstraints};

/// One reason a draft was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    TooShort {
        actual: usize,
        minimum: u32,
        unit: LengthUnit,
    },
    TooLong {
        actual: usize,
        maximum: u32,
        unit: LengthUnit,
    },
    CharacterCeilingExceeded { actual: usize, ceiling: usize },
    MissingMarker { marker: String },
    DisallowedContent { term: String },
    Empty,
}

impl Violation {
    /// Imperative fix for the corrective regeneration prompt.
    pub fn corrective_instruction(&self) -> String {
        match self {
            Violation::TooShort { minimum, unit, .. } => {
                format!("lengthen to at least {minimum} {}", unit.label())
            }
            Violation::TooLong { maximum, unit, .. } => {
                format!("shorten to under {maximum} {}", unit.label())
            }
            Violation::CharacterCeilingExceeded { ceiling, .. } => {
                format!("shorten to under {ceiling} characters in total, hashtags included")
            }
            Violation::MissingMarker { marker } if is_heading(marker) => {
                format!("include a section headed exactly \"{marker}\"")
            }
            Violation::MissingMarker { marker } => {
                format!("include the call to action verbatim: \"{marker}\"")
            }
            Violation::DisallowedContent { term } => format!("remove every mention of \"{term}\""),
            Violation::Empty => "write the complete text, the previous response was empty".to_string(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::TooShort {
                actual,
                minimum,
                unit,
            } => write!(f, "too short: {actual} {}, target minimum {minimum}", unit.label()),
            Violation::TooLong {
                actual,
                maximum,
                unit,
            } => write!(f, "too long: {actual} {}, target maximum {maximum}", unit.label()),
            Violation::CharacterCeilingExceeded { actual, ceiling } => {
                write!(f, "{actual} characters exceeds the {ceiling} character limit")
            }
            Violation::MissingMarker { marker } => write!(f, "missing required text \"{marker}\""),
            Violation::DisallowedContent { term } => write!(f, "contains disallowed term \"{term}\""),
            Violation::Empty => f.write_str("empty response"),
        }
    }
}

/// Build the correction block listing every violation.
pub fn correction_for(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("- {}", v.corrective_instruction()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// States a draft moves through between generation and the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    Generated,
    Validating,
    Accepted,
    Regenerating,
    Rejected,
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidationState::Generated => "generated",
            ValidationState::Validating => "validating",
            ValidationState::Accepted => "accepted",
            ValidationState::Regenerating => "regenerating",
            ValidationState::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutputValidator {
    denylist: Vec<String>,
}

impl OutputValidator {
    pub fn new(denylist: &[String]) -> Self {
        Self {
            denylist: denylist
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// All violations of `constraints` in `text`; empty means accepted.
    pub fn check(&self, text: &str, constraints: &PromptConstraints) -> Vec<Violation> {
        if text.trim().is_empty() {
            return vec![Violation::Empty];
        }

        let mut violations = Vec::new();
        let bounds = &constraints.length;
        let actual = measure(text, bounds.unit);
        let (lower, upper) = bounds.with_tolerance(constraints.length_tolerance);
        if actual < lower {
            violations.push(Violation::TooShort {
                actual,
                minimum: bounds.min,
                unit: bounds.unit,
            });
        } else if actual > upper {
            violations.push(Violation::TooLong {
                actual,
                maximum: bounds.max,
                unit: bounds.unit,
            });
        }

        if let Some(ceiling) = constraints.hard_char_ceiling {
            let chars = text.chars().count();
            if chars > ceiling {
                violations.push(Violation::CharacterCeilingExceeded {
                    actual: chars,
                    ceiling,
                });
            }
        }

        for marker in &constraints.required_markers {
            if !contains_marker(text, marker) {
                violations.push(Violation::MissingMarker {
                    marker: marker.clone(),
                });
            }
        }

        let lowered = text.to_lowercase();
        for term in &self.denylist {
            if lowered.contains(&term.to_lowercase()) {
                violations.push(Violation::DisallowedContent { term: term.clone() });
            }
        }

        violations
    }
}

/// Words are whitespace-separated tokens with at least one letter or digit,
/// so Markdown bullets and heading hashes do not count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .count()
}

pub fn measure(text: &str, unit: LengthUnit) -> usize {
    match unit {
        LengthUnit::Words => word_count(text),
        LengthUnit::Characters => text.chars().count(),
    }
}

fn is_heading(marker: &str) -> bool {
    marker.starts_with('#')
}

/// Headings match case-insensitively at any level; other markers verbatim.
fn contains_marker(text: &str, marker: &str) -> bool {
    if !is_heading(marker) {
        return text.contains(marker);
    }
    let wanted = marker.trim_start_matches('#').trim().to_lowercase();
    text.lines().any(|line| {
        let line = line.trim();
        line.starts_with('#') && line.trim_start_matches('#').trim().to_lowercase() == wanted
    })
}
