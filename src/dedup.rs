use std::collections::HashSet;

use crate::model::{SecurityListing, ThemeResult};

/// Per-category listings keyed by code, kept in first-seen order.
#[derive(Debug, Default)]
pub struct DeduplicationStore {
    codes: HashSet<String>,
    listings: Vec<SecurityListing>,
}

impl DeduplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false (and changes nothing) when the code is already present.
    pub fn add(&mut self, listing: SecurityListing) -> bool {
        if !self.codes.insert(listing.code.clone()) {
            return false;
        }
        self.listings.push(listing);
        true
    }

    /// Adds every listing, returning how many were new.
    pub fn extend(&mut self, listings: impl IntoIterator<Item = SecurityListing>) -> usize {
        let mut added = 0;
        for listing in listings {
            if self.add(listing) {
                added += 1;
            }
        }
        added
    }

    pub fn snapshot(&self) -> &[SecurityListing] {
        &self.listings
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn into_result(self, theme_name: &str) -> ThemeResult {
        ThemeResult::new(theme_name, self.listings)
    }
}
