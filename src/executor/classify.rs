//! Statement Classification
//!
//! Decides whether a SQL statement changes stored data. This is a keyword
//! scan, not a parser: a keyword anywhere in the text counts, including inside
//! string literals and identifiers, so `SELECT 'delete me'` is Mutating.

/// Keywords that mark a statement as mutating unless configured otherwise
pub const DEFAULT_MUTATING_KEYWORDS: [&str; 4] = ["INSERT", "UPDATE", "DELETE", "CREATE"];

/// Classification of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Changes stored data; replicated and logged
    Mutating,
    /// Leaves stored data untouched
    ReadOnly,
}

impl StatementKind {
    pub fn is_mutating(&self) -> bool {
        matches!(self, StatementKind::Mutating)
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatementKind::Mutating => write!(f, "MUTATING"),
            StatementKind::ReadOnly => write!(f, "READ_ONLY"),
        }
    }
}

/// Keyword-based statement classifier
#[derive(Debug, Clone)]
pub struct StatementClassifier {
    /// Upper-cased keywords, in match order
    keywords: Vec<String>,
}

impl Default for StatementClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MUTATING_KEYWORDS)
    }
}

impl StatementClassifier {
    /// Create a classifier over a custom keyword set
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_uppercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    /// Configured keywords
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// First keyword found in `text`, if any
    pub fn matched_keyword(&self, text: &str) -> Option<&str> {
        let upper = text.to_uppercase();
        self.keywords
            .iter()
            .find(|k| upper.contains(k.as_str()))
            .map(String::as_str)
    }

    /// Classify a statement
    pub fn classify(&self, text: &str) -> StatementKind {
        match self.matched_keyword(text) {
            Some(_) => StatementKind::Mutating,
            None => StatementKind::ReadOnly,
        }
    }
}

/// Classify with the default keyword set
pub fn classify(text: &str) -> StatementKind {
    StatementClassifier::default().classify(text)
}
