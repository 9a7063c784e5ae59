//! String collations used by comparisons and `order by`.
use crate::consts::{CODEPOINT_URI, SIMPLE_ACCENT_URI, SIMPLE_CASE_ACCENT_URI, SIMPLE_CASE_URI};
use crate::error::{Error, ErrorCode, Result};
use core::cmp::Ordering;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::canonical_combining_class as ccc;

pub trait Collation: Send + Sync + core::fmt::Debug {
    fn uri(&self) -> &str;

    /// Comparison key; two strings are equal under the collation iff their keys are.
    fn key<'s>(&self, s: &'s str) -> Cow<'s, str> {
        Cow::Borrowed(s)
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        self.key(a).cmp(&self.key(b))
    }

    fn equals(&self, a: &str, b: &str) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

#[derive(Debug)]
pub struct CodepointCollation;

impl Collation for CodepointCollation {
    fn uri(&self) -> &str {
        CODEPOINT_URI
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.cmp(b)
    }
}

fn strip_marks(s: &str) -> String {
    s.nfd().filter(|&ch| ccc(ch) == 0).collect()
}

/// Case-insensitive.
#[derive(Debug)]
pub struct SimpleCaseCollation;

impl Collation for SimpleCaseCollation {
    fn uri(&self) -> &str {
        SIMPLE_CASE_URI
    }

    fn key<'s>(&self, s: &'s str) -> Cow<'s, str> {
        Cow::Owned(s.to_lowercase())
    }
}

/// Accent-insensitive: NFD with combining marks removed.
#[derive(Debug)]
pub struct SimpleAccentCollation;

impl Collation for SimpleAccentCollation {
    fn uri(&self) -> &str {
        SIMPLE_ACCENT_URI
    }

    fn key<'s>(&self, s: &'s str) -> Cow<'s, str> {
        if s.is_ascii() {
            return Cow::Borrowed(s);
        }
        Cow::Owned(strip_marks(s))
    }
}

#[derive(Debug)]
pub struct SimpleCaseAccentCollation;

impl Collation for SimpleCaseAccentCollation {
    fn uri(&self) -> &str {
        SIMPLE_CASE_ACCENT_URI
    }

    fn key<'s>(&self, s: &'s str) -> Cow<'s, str> {
        Cow::Owned(strip_marks(s).to_lowercase())
    }
}

/// Collations by URI. The four built-ins are always present.
#[derive(Debug, Clone)]
pub struct CollationRegistry {
    by_uri: HashMap<String, Arc<dyn Collation>>,
}

impl Default for CollationRegistry {
    fn default() -> Self {
        let mut reg = Self {
            by_uri: HashMap::new(),
        };
        reg.insert(Arc::new(CodepointCollation));
        reg.insert(Arc::new(SimpleCaseCollation));
        reg.insert(Arc::new(SimpleAccentCollation));
        reg.insert(Arc::new(SimpleCaseAccentCollation));
        reg
    }
}

impl CollationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &str) -> Option<Arc<dyn Collation>> {
        self.by_uri.get(uri).cloned()
    }

    pub fn insert(&mut self, collation: Arc<dyn Collation>) {
        self.by_uri.insert(collation.uri().to_owned(), collation);
    }

    /// `FOCH0002` for unknown URIs.
    pub fn resolve(&self, uri: &str) -> Result<Arc<dyn Collation>> {
        self.get(uri).ok_or_else(|| {
            Error::new(ErrorCode::FOCH0002, format!("unknown collation URI: {uri}"))
        })
    }
}
