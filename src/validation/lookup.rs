//! Reference-code lookup
//!
//! Country, currency and similar codes are checked through this capability
//! so the validators never depend on a concrete data source.

use std::collections::{HashMap, HashSet};

/// Answers whether a code belongs to a reference category
pub trait ReferenceLookup: Send + Sync {
    fn is_known(&self, category: &str, code: &str) -> bool;
}

impl<F> ReferenceLookup for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn is_known(&self, category: &str, code: &str) -> bool {
        self(category, code)
    }
}

/// In-memory code lists keyed by category, compared case-insensitively
///
/// Categories without a list are not judged: every code is known.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeTable {
    tables: HashMap<String, HashSet<String>>,
}

impl CodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from category → codes lists, as read from config
    pub fn from_lists(lists: &HashMap<String, Vec<String>>) -> Self {
        let mut table = Self::new();
        for (category, codes) in lists {
            table.insert(category, codes.iter().map(String::as_str));
        }
        table
    }

    pub fn insert<'c>(&mut self, category: &str, codes: impl IntoIterator<Item = &'c str>) {
        self.tables
            .entry(category.to_ascii_lowercase())
            .or_default()
            .extend(codes.into_iter().map(|c| c.trim().to_lowercase()));
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn categories(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }
}

impl ReferenceLookup for CodeTable {
    fn is_known(&self, category: &str, code: &str) -> bool {
        match self.tables.get(&category.to_ascii_lowercase()) {
            Some(codes) => codes.contains(&code.trim().to_lowercase()),
            None => true,
        }
    }
}
