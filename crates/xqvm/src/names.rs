//! Qualified names and the name cache.
//!
//! Encoded nodes never carry name strings inline. A name is a [`NameCode`]
//! triple of integer codes that index either the dictionary embedded in the
//! node tree or, for trees built without one, the [`NameCache`] shared through
//! the dynamic context.
use crate::error::{Error, Result};
use compact_str::CompactString;
use core::fmt;
use std::collections::HashMap;

/// A resolved qualified name. Empty strings stand for "no prefix" / "no namespace".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct QName {
    pub prefix: CompactString,
    pub uri: CompactString,
    pub local: CompactString,
}

impl QName {
    pub fn new(prefix: &str, uri: &str, local: &str) -> Self {
        Self {
            prefix: prefix.into(),
            uri: uri.into(),
            local: local.into(),
        }
    }

    /// Name without prefix and namespace.
    pub fn local(local: &str) -> Self {
        Self::new("", "", local)
    }

    pub fn ns(uri: &str, local: &str) -> Self {
        Self::new("", uri, local)
    }

    /// Parses `prefix:local` against the given namespace URI.
    pub fn parse(lexical: &str, uri: &str) -> Self {
        match lexical.split_once(':') {
            Some((p, l)) => Self::new(p, uri, l),
            None => Self::new("", uri, lexical),
        }
    }

    /// Compares namespace URI and local part, ignoring the prefix.
    pub fn matches_expanded(&self, other: &QName) -> bool {
        self.uri == other.uri && self.local == other.local
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            f.write_str(&self.local)
        } else {
            write!(f, "{}:{}", self.prefix, self.local)
        }
    }
}

/// Integer-coded name: `(prefix, namespace uri, local name)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NameCode {
    pub prefix: i32,
    pub uri: i32,
    pub local: i32,
}

impl NameCode {
    pub const ENCODED_LEN: usize = 12;
}

/// Anything that can hand out codes for strings while nodes are written.
pub trait NameEncoder {
    fn encode_str(&mut self, s: &str) -> Result<i32>;

    fn encode(&mut self, name: &QName) -> Result<NameCode> {
        Ok(NameCode {
            prefix: self.encode_str(&name.prefix)?,
            uri: self.encode_str(&name.uri)?,
            local: self.encode_str(&name.local)?,
        })
    }
}

/// Interning table from strings to stable `i32` codes.
///
/// Code `0` is always the empty string. Growth appends; an existing code never
/// changes meaning for the lifetime of the cache.
#[derive(Debug, Clone)]
pub struct NameCache {
    strings: Vec<CompactString>,
    codes: HashMap<CompactString, i32>,
}

impl Default for NameCache {
    fn default() -> Self {
        let mut cache = Self {
            strings: Vec::new(),
            codes: HashMap::new(),
        };
        cache.strings.push(CompactString::default());
        cache.codes.insert(CompactString::default(), 0);
        cache
    }
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Always false: the empty string is pre-interned.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn intern_str(&mut self, s: &str) -> Result<i32> {
        if let Some(&code) = self.codes.get(s) {
            return Ok(code);
        }
        let code = i32::try_from(self.strings.len())
            .map_err(|_| Error::system("name cache exhausted the i32 code space"))?;
        let owned = CompactString::from(s);
        self.strings.push(owned.clone());
        self.codes.insert(owned, code);
        Ok(code)
    }

    pub fn find_str(&self, s: &str) -> Option<i32> {
        self.codes.get(s).copied()
    }

    pub fn intern(&mut self, prefix: &str, uri: &str, local: &str) -> Result<NameCode> {
        Ok(NameCode {
            prefix: self.intern_str(prefix)?,
            uri: self.intern_str(uri)?,
            local: self.intern_str(local)?,
        })
    }

    /// Looks a name up without interning. `None` when any part is unknown.
    pub fn find(&self, prefix: &str, uri: &str, local: &str) -> Option<NameCode> {
        Some(NameCode {
            prefix: self.find_str(prefix)?,
            uri: self.find_str(uri)?,
            local: self.find_str(local)?,
        })
    }

    pub fn string(&self, code: i32) -> Option<&str> {
        usize::try_from(code)
            .ok()
            .and_then(|i| self.strings.get(i))
            .map(CompactString::as_str)
    }

    pub fn resolve(&self, code: NameCode) -> Option<QName> {
        Some(QName::new(
            self.string(code.prefix)?,
            self.string(code.uri)?,
            self.string(code.local)?,
        ))
    }

    /// Re-interns a code issued by `other` into this cache.
    pub fn translate_code(&mut self, other: &NameCache, code: NameCode) -> Result<NameCode> {
        let name = other
            .resolve(code)
            .ok_or_else(|| Error::system(format!("unknown name code {code:?}")))?;
        self.encode(&name)
    }
}

impl NameEncoder for NameCache {
    fn encode_str(&mut self, s: &str) -> Result<i32> {
        self.intern_str(s)
    }
}
