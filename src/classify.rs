use std::sync::LazyLock;

use regex::Regex;

// Signed decimal with optional fraction and exponent: "12", "-1.5", ".5", "1e3".
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").unwrap());

pub const DEFAULT_CURRENCY_SUFFIX: &str = "원";
const THOUSANDS_SEPARATOR: char = ',';
const PERCENT_MARKER: char = '%';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Security,
    Price,
    Percent,
    PureNumeric,
    Empty,
}

impl TextKind {
    pub fn is_noise(self) -> bool {
        self != TextKind::Security
    }
}

/// Sorts a rendered text token into a security name or one of the noise kinds.
#[derive(Debug, Clone)]
pub struct TextClassifier {
    currency_suffix: String,
}

impl Default for TextClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_CURRENCY_SUFFIX)
    }
}

impl TextClassifier {
    pub fn new(currency_suffix: impl Into<String>) -> Self {
        Self {
            currency_suffix: currency_suffix.into(),
        }
    }

    pub fn classify(&self, text: &str) -> TextKind {
        let text = text.trim();
        if text.is_empty() {
            return TextKind::Empty;
        }

        if !self.currency_suffix.is_empty() {
            if let Some(amount) = text.strip_suffix(self.currency_suffix.as_str()) {
                if is_number(amount) {
                    return TextKind::Price;
                }
            }
        }

        if text.contains(PERCENT_MARKER) {
            return TextKind::Percent;
        }

        if is_number(text) {
            return TextKind::PureNumeric;
        }

        TextKind::Security
    }
}

fn is_number(text: &str) -> bool {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| *c != THOUSANDS_SEPARATOR)
        .collect();
    NUMBER_RE.is_match(&cleaned)
}

/// First non-empty line of a multi-line rendered text, trimmed.
pub fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}
