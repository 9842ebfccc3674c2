use serde::{Deserialize, Serialize};

/// A theme (category) surfaced on the landing page. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub id: String,
    pub name: String,
}

/// One security inside a theme. Field order matches the snapshot format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityListing {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeResult {
    pub theme_name: String,
    pub stocks: Vec<SecurityListing>,
    pub count: usize,
}

impl ThemeResult {
    pub fn new(theme_name: impl Into<String>, stocks: Vec<SecurityListing>) -> Self {
        let count = stocks.len();
        Self {
            theme_name: theme_name.into(),
            stocks,
            count,
        }
    }
}

/// Everything completed so far in one run, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionRun {
    themes: Vec<ThemeResult>,
}

impl CollectionRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: ThemeResult) {
        self.themes.push(result);
    }

    pub fn themes(&self) -> &[ThemeResult] {
        &self.themes
    }

    pub fn len(&self) -> usize {
        self.themes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }

    pub fn listing_count(&self) -> usize {
        self.themes.iter().map(|t| t.count).sum()
    }
}

/// Drop repeated theme ids, keeping the first occurrence.
pub fn dedup_themes(themes: Vec<Theme>) -> Vec<Theme> {
    let mut seen = std::collections::HashSet::new();
    themes
        .into_iter()
        .filter(|t| seen.insert(t.id.clone()))
        .collect()
}
