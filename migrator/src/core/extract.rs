//! Candidate extraction from raw generator completions.
//!
//! Generators are asked to wrap code in `<code>` tags, but completions drift.
//! Extraction prefers the tagged form and falls back to a single fenced block
//! that plausibly contains code in the target language. Anything else is a
//! format violation fed back to the generator verbatim.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static CODE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<code>\s*(.*?)\s*</code>").expect("valid code tag regex")
});
static ANALYSIS_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<analysis>\s*(.*?)\s*</analysis>").expect("valid analysis tag regex")
});
static ARCHITECTURE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<architecture>\s*(.*?)\s*</architecture>")
        .expect("valid architecture tag regex")
});
static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[a-zA-Z]*\n(.*?)```").expect("valid fence regex")
});

/// Structured sections pulled out of one completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSections {
    /// The translated module source.
    pub code: String,
    /// Optional free-form analysis the generator attached.
    pub analysis: Option<String>,
    /// Optional architecture notes.
    pub architecture: Option<String>,
}

/// The completion did not contain an extractable candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatViolation {
    /// No `<code>` tag and no code fence at all.
    MissingCode,
    /// Multiple code fences without a `<code>` tag; ambiguous.
    AmbiguousFences(usize),
    /// A single fence was found but its body does not look like the target
    /// language.
    NotTargetLanguage,
}

impl fmt::Display for FormatViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCode => {
                write!(f, "no <code> tag or fenced code block found in the response")
            }
            Self::AmbiguousFences(n) => write!(
                f,
                "found {n} fenced code blocks but no <code> tag; wrap the final code in <code> tags"
            ),
            Self::NotTargetLanguage => write!(
                f,
                "the fenced block does not look like target-language source; wrap the final code in <code> tags"
            ),
        }
    }
}

impl std::error::Error for FormatViolation {}

/// Extract candidate sections from a completion.
///
/// A `<code>` tag always wins, even when fences are also present. Without a
/// tag, exactly one fence whose body contains a target-language keyword is
/// accepted; zero or several fences, or a fence in the wrong language, is a
/// violation.
pub fn extract_candidate(
    completion: &str,
    language: &str,
) -> Result<CandidateSections, FormatViolation> {
    let analysis = ANALYSIS_TAG
        .captures(completion)
        .map(|c| c[1].to_string());
    let architecture = ARCHITECTURE_TAG
        .captures(completion)
        .map(|c| c[1].to_string());

    if let Some(captures) = CODE_TAG.captures(completion) {
        return Ok(CandidateSections {
            code: captures[1].to_string(),
            analysis,
            architecture,
        });
    }

    let fences: Vec<String> = FENCE
        .captures_iter(completion)
        .map(|c| c[1].trim().to_string())
        .collect();
    match fences.len() {
        0 => Err(FormatViolation::MissingCode),
        1 => {
            let body = &fences[0];
            let keywords = language_keywords(language);
            if keywords.iter().any(|kw| body.contains(kw)) {
                Ok(CandidateSections {
                    code: body.clone(),
                    analysis,
                    architecture,
                })
            } else {
                Err(FormatViolation::NotTargetLanguage)
            }
        }
        n => Err(FormatViolation::AmbiguousFences(n)),
    }
}

/// Keywords that identify source in a given target language.
fn language_keywords(language: &str) -> &'static [&'static str] {
    match language {
        "go" => &["package ", "func ", "type ", "import "],
        "rust" => &["fn ", "struct ", "impl ", "use "],
        "java" => &["class ", "public ", "import ", "void "],
        _ => &["func ", "fn ", "class ", "def "],
    }
}
