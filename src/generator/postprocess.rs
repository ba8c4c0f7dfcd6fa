//! Readability clean-up and structured artifacts of a draft.

use std::collections::HashSet;
use std::sync::LazyLock;

use markdown::mdast::Node;
use markdown::{ParseOptions, to_mdast};
use regex::{Captures, Regex};

use crate::types::ContentType;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[a-zA-Z]*\s*\n(?s)(.*?)\n```\s*$").unwrap());
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static MISSING_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\p{Ll}[.!?])(\p{Lu}\p{Ll})").unwrap());
static META_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[*_\s]*meta[ -]?descrip(?:tion|ción)[*_\s]*:[*_\s]*(.*?)[*_\s]*$").unwrap()
});
static KEYWORDS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[*_\s]*(?:keywords|palabras clave)[*_\s]*:[*_\s]*(.*?)[*_\s]*$").unwrap()
});
static HASHTAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:^|\s)#(\w+)").unwrap());

/// A tidied draft and what could be lifted out of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedDraft {
    /// Content without the metadata lines.
    pub text: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub keywords: Vec<String>,
    pub summary: Option<String>,
    pub hashtags: Vec<String>,
}

/// Tidy `raw` and lift out its artifacts. Text inside any of `keep` (the
/// strings the validator requires verbatim) is left as written.
pub fn process(raw: &str, content_type: ContentType, keep: &[String]) -> ProcessedDraft {
    let tidied = tidy_keeping(raw, keep);

    let mut meta_description = None;
    let mut keywords = Vec::new();
    let mut body = Vec::new();
    for line in tidied.lines() {
        if content_type.is_blog() {
            if let Some(caps) = META_LINE.captures(line) {
                meta_description = Some(caps[1].trim().to_string()).filter(|m| !m.is_empty());
                continue;
            }
            if let Some(caps) = KEYWORDS_LINE.captures(line) {
                keywords = split_keywords(&caps[1]);
                continue;
            }
        }
        body.push(line);
    }
    let text = tidy_keeping(&body.join("\n"), keep);

    ProcessedDraft {
        title: title_of(&text),
        summary: match content_type {
            ContentType::CaseStudyBlog => section_after(&text, "executive summary"),
            _ => None,
        },
        hashtags: match content_type {
            ContentType::LinkedInPost => hashtags_of(&text),
            _ => Vec::new(),
        },
        text,
        meta_description,
        keywords,
    }
}

/// Trailing whitespace, blank-line runs, a missing space after sentence
/// punctuation, and a code fence wrapped around the whole answer.
pub fn tidy(raw: &str) -> String {
    tidy_keeping(raw, &[])
}

/// [`tidy`], except that no space is inserted inside an occurrence of `keep`.
pub fn tidy_keeping(raw: &str, keep: &[String]) -> String {
    let unified = raw.replace("\r\n", "\n");
    let trimmed = unified.trim();
    let unfenced = match CODE_FENCE.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    };

    let lines = unfenced
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let collapsed = BLANK_RUNS.replace_all(&lines, "\n\n");

    let protected = keep
        .iter()
        .filter(|k| !k.is_empty())
        .flat_map(|k| {
            collapsed
                .match_indices(k.as_str())
                .map(|(start, m)| start..start + m.len())
        })
        .collect::<Vec<_>>();
    MISSING_SPACE
        .replace_all(&collapsed, |caps: &Captures| {
            let whole = &caps[0];
            let start = caps.get(0).map_or(0, |m| m.start());
            let end = start + whole.len();
            if protected.iter().any(|r| start < r.end && r.start < end) {
                whole.to_string()
            } else {
                format!("{} {}", &caps[1], &caps[2])
            }
        })
        .trim()
        .to_string()
}

/// First Markdown heading, or the first non-empty line.
fn title_of(text: &str) -> Option<String> {
    let heading = to_mdast(text, &ParseOptions::default())
        .ok()
        .and_then(|root| {
            root.children()?.iter().find_map(|node| match node {
                Node::Heading(_) => Some(node.to_string()),
                _ => None,
            })
        })
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    heading.or_else(|| {
        text.lines()
            .map(|l| l.trim().trim_matches(|c| c == '#' || c == '*').trim())
            .find(|l| !l.is_empty())
            .map(str::to_string)
    })
}

/// Body of the section whose heading matches `heading`, up to the next heading.
fn section_after(text: &str, heading: &str) -> Option<String> {
    let mut lines = text.lines();
    lines.find(|line| {
        let line = line.trim();
        line.starts_with('#') && line.trim_start_matches('#').trim().eq_ignore_ascii_case(heading)
    })?;

    let body = lines
        .take_while(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");
    Some(body.trim().to_string()).filter(|b| !b.is_empty())
}

fn hashtags_of(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    HASHTAG
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .map(|tag| format!("#{tag}"))
        .collect()
}

fn split_keywords(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(|k| k.trim().trim_matches('*').trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tidy() {
        let raw = "```markdown\n# Title   \n\n\n\nFirst line.Second sentence.  \nv1.2 stays\n```";
        assert_eq!(tidy(raw), "# Title\n\nFirst line. Second sentence.\nv1.2 stays");
    }

    #[test]
    fn test_kept_text_is_not_respaced() {
        let cta = "Reserva tu demo en acme.Com".to_string();
        let raw = format!("Fin del texto.Sigue aquí. {cta}");
        assert_eq!(
            tidy_keeping(&raw, std::slice::from_ref(&cta)),
            format!("Fin del texto. Sigue aquí. {cta}")
        );
        assert_eq!(tidy(&raw), "Fin del texto. Sigue aquí. Reserva tu demo en acme. Com");

        let draft = process(&raw, ContentType::GeneralInterestBlog, &[cta.clone()]);
        assert!(draft.text.ends_with(&cta));
    }

    #[test]
    fn test_blog_metadata_is_lifted_out() {
        let raw = "# IA en marketing: guía práctica\n\nCuerpo del artículo.\n\n\
                   **Meta descripción:** Cómo usar IA en marketing.\n\
                   Keywords: IA, marketing digital, automatización";
        let draft = process(raw, ContentType::GeneralInterestBlog, &[]);
        assert_eq!(draft.title.as_deref(), Some("IA en marketing: guía práctica"));
        assert_eq!(
            draft.meta_description.as_deref(),
            Some("Cómo usar IA en marketing.")
        );
        assert_eq!(
            draft.keywords,
            vec!["IA", "marketing digital", "automatización"]
        );
        assert_eq!(draft.text, "# IA en marketing: guía práctica\n\nCuerpo del artículo.");
    }

    #[test]
    fn test_case_study_summary() {
        let raw = "# Acme\n\n## Executive summary\nAcme cut costs by 30%.\n\n## Full story\nLong text.";
        let draft = process(raw, ContentType::CaseStudyBlog, &[]);
        assert_eq!(draft.summary.as_deref(), Some("Acme cut costs by 30%."));
        assert!(draft.hashtags.is_empty());
    }

    #[test]
    fn test_linkedin_hashtags_and_title_fallback() {
        let raw = "Remote work is not dead.\nSee https://x.example/#anchor\n\n#Leadership #RemoteWork #leadership";
        let draft = process(raw, ContentType::LinkedInPost, &[]);
        assert_eq!(draft.hashtags, vec!["#Leadership", "#RemoteWork"]);
        assert_eq!(draft.title.as_deref(), Some("Remote work is not dead."));
        assert_eq!(draft.meta_description, None);
    }
}
