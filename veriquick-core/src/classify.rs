//! Document classification by identifier pattern.
//!
//! Content detectors run in a fixed precedence order (Aadhaar, PAN,
//! marksheet keywords) and collect their matches as evidence. The final
//! type comes from an ordered rule table evaluated first-match-wins; the
//! filename heuristic sits at the bottom and can only replace `Unknown`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Inferred document type, serialized with the wire strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "Aadhaar")]
    Aadhaar,
    #[serde(rename = "PAN")]
    Pan,
    #[serde(rename = "Aadhaar & PAN")]
    AadhaarAndPan,
    #[serde(rename = "Marksheet")]
    Marksheet,
    #[serde(rename = "Other")]
    Other,
    #[default]
    #[serde(rename = "Unknown")]
    Unknown,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aadhaar => "Aadhaar",
            Self::Pan => "PAN",
            Self::AadhaarAndPan => "Aadhaar & PAN",
            Self::Marksheet => "Marksheet",
            Self::Other => "Other",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content detector: one regex and the type it suggests.
#[derive(Debug)]
pub struct ClassificationRule {
    pub pattern: Regex,
    pub document_type: DocumentType,
    pub precedence: u8,
}

static AADHAAR_RULE: LazyLock<ClassificationRule> = LazyLock::new(|| ClassificationRule {
    pattern: Regex::new(r"\b\d{4} \d{4} \d{4}\b").expect("valid Aadhaar regex"),
    document_type: DocumentType::Aadhaar,
    precedence: 1,
});

static PAN_RULE: LazyLock<ClassificationRule> = LazyLock::new(|| ClassificationRule {
    pattern: Regex::new(r"\b[A-Z]{5}\d{4}[A-Z]\b").expect("valid PAN regex"),
    document_type: DocumentType::Pan,
    precedence: 2,
});

static MARKSHEET_RULE: LazyLock<ClassificationRule> = LazyLock::new(|| ClassificationRule {
    pattern: Regex::new(
        r"(?i)\b(?:CBSE|ICSE|state\s+board|board\s+of\s+(?:higher\s+)?secondary\s+education|mark\s*sheet|statement\s+of\s+marks|class\s+\d{1,2})\b",
    )
    .expect("valid marksheet regex"),
    document_type: DocumentType::Marksheet,
    precedence: 3,
});

/// Content detectors in declared precedence order.
pub fn content_rules() -> [&'static ClassificationRule; 3] {
    [&*AADHAAR_RULE, &*PAN_RULE, &*MARKSHEET_RULE]
}

/// Everything the rule table can look at.
#[derive(Debug, Default)]
struct Evidence {
    text_present: bool,
    aadhaar: Vec<String>,
    pan: Vec<String>,
    marksheet: bool,
    filename: String,
}

struct Rule {
    matches: fn(&Evidence) -> bool,
    document_type: DocumentType,
}

/// Decision table, highest priority first.
const RULES: &[Rule] = &[
    Rule {
        matches: |e| !e.aadhaar.is_empty() && !e.pan.is_empty(),
        document_type: DocumentType::AadhaarAndPan,
    },
    Rule {
        matches: |e| !e.aadhaar.is_empty(),
        document_type: DocumentType::Aadhaar,
    },
    Rule {
        matches: |e| !e.pan.is_empty(),
        document_type: DocumentType::Pan,
    },
    Rule {
        matches: |e| e.marksheet,
        document_type: DocumentType::Marksheet,
    },
    Rule {
        matches: |e| e.text_present,
        document_type: DocumentType::Other,
    },
    // Filename fallback tier: only reachable when no text was extracted
    Rule {
        matches: |e| e.filename.contains("aadhar") || e.filename.contains("aadhaar"),
        document_type: DocumentType::Aadhaar,
    },
    Rule {
        matches: |e| e.filename.contains("pan"),
        document_type: DocumentType::Pan,
    },
    Rule {
        matches: |e| e.filename.contains("marksheet"),
        document_type: DocumentType::Marksheet,
    },
];

/// Outcome of classifying one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub document_type: DocumentType,
    pub aadhaar_numbers: Vec<String>,
    pub pan_numbers: Vec<String>,
}

impl Classification {
    /// All identifiers, Aadhaar numbers first.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.aadhaar_numbers
            .iter()
            .chain(self.pan_numbers.iter())
            .map(String::as_str)
    }
}

/// Stateless pattern classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternClassifier;

impl PatternClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify content only.
    pub fn classify(&self, text: &str) -> Classification {
        self.classify_with_filename(text, "")
    }

    /// Classify content, falling back to the filename when no text exists.
    pub fn classify_with_filename(&self, text: &str, filename: &str) -> Classification {
        let evidence = Evidence {
            text_present: !text.trim().is_empty(),
            aadhaar: distinct_matches(&AADHAAR_RULE.pattern, text),
            pan: distinct_matches(&PAN_RULE.pattern, text),
            marksheet: MARKSHEET_RULE.pattern.is_match(text),
            filename: filename.to_lowercase(),
        };

        let document_type = RULES
            .iter()
            .find(|rule| (rule.matches)(&evidence))
            .map(|rule| rule.document_type)
            .unwrap_or(DocumentType::Unknown);

        Classification {
            document_type,
            aadhaar_numbers: evidence.aadhaar,
            pan_numbers: evidence.pan,
        }
    }
}

/// Matches in text order, keeping only the first occurrence of each.
fn distinct_matches(pattern: &Regex, text: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for m in pattern.find_iter(text) {
        if !seen.iter().any(|s| s == m.as_str()) {
            seen.push(m.as_str().to_string());
        }
    }
    seen
}

/// Official identifier validation hook.
///
/// No checksum is verified; the default accepts every identifier.
pub trait IdentifierValidator: Send + Sync {
    fn validate(&self, _identifier: &str) -> bool {
        true
    }
}

/// The default, always-valid validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl IdentifierValidator for AcceptAll {}

/// Placeholder validation: always `true`.
pub fn validate(identifier: &str) -> bool {
    AcceptAll.validate(identifier)
}
