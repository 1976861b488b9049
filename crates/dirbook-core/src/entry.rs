//! Raw directory entry model
//!
//! Attribute bags, search scopes and search outcomes as produced by the
//! `DirectoryClient` collaborator. Attribute names are lower-cased on insert
//! so the adapter can look them up case-insensitively (LDAP attribute names
//! are case-insensitive per RFC 4512).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Attribute name (lower-cased) to ordered values.
pub type AttrMap = BTreeMap<String, Vec<String>>;

/// A raw directory entry: its distinguished name plus the attribute bag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Distinguished name identifying the entry.
    pub dn: String,

    /// Attribute values keyed by lower-cased attribute name.
    pub attrs: AttrMap,
}

impl DirectoryEntry {
    /// Create an empty entry with the given DN.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attrs: AttrMap::new(),
        }
    }

    /// Append a value to an attribute (builder style).
    pub fn with(mut self, attr: &str, value: impl Into<String>) -> Self {
        self.push(attr, value);
        self
    }

    /// Append a value to an attribute.
    pub fn push(&mut self, attr: &str, value: impl Into<String>) {
        self.attrs
            .entry(attr.to_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Replace all values of an attribute.
    pub fn set(&mut self, attr: &str, values: Vec<String>) {
        self.attrs.insert(attr.to_lowercase(), values);
    }

    /// All values of an attribute, empty when absent.
    pub fn values(&self, attr: &str) -> &[String] {
        self.attrs
            .get(&attr.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First value of an attribute, if any.
    pub fn first(&self, attr: &str) -> Option<&str> {
        self.values(attr).first().map(String::as_str)
    }

    /// The entry's object classes as stored.
    pub fn object_classes(&self) -> &[String] {
        self.values("objectclass")
    }

    /// Case-insensitive object class membership test.
    pub fn has_object_class(&self, name: &str) -> bool {
        self.object_classes()
            .iter()
            .any(|oc| oc.eq_ignore_ascii_case(name))
    }
}

/// The parent DN: everything after the first unescaped comma.
pub fn parent_dn(dn: &str) -> Option<&str> {
    let bytes = dn.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b',' => return Some(dn[i + 1..].trim_start()),
            _ => i += 1,
        }
    }
    None
}

/// Search scope relative to the base DN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// The base entry itself.
    Base,
    /// Direct children of the base entry.
    One,
    /// The whole subtree below (and including) the base entry.
    #[default]
    Sub,
}

impl Scope {
    /// Parse from the conventional string form. Unknown values degrade to
    /// subtree, matching how directory URLs omit or misspell the scope.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "base" => Scope::Base,
            "one" | "onelevel" => Scope::One,
            _ => Scope::Sub,
        }
    }

    /// Conventional string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Base => "base",
            Scope::One => "one",
            Scope::Sub => "sub",
        }
    }
}

/// Server-side virtual-list-view window: page the sorted result set at the
/// protocol layer instead of materializing it locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlvWindow {
    /// 1-based page number.
    pub page: usize,
    /// Rows per page.
    pub page_size: usize,
}

impl VlvWindow {
    /// Absolute offset of the first row of this window.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) * self.page_size
    }
}

/// Options for a directory search call.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Attributes to fetch; empty means all.
    pub attributes: Vec<String>,

    /// Server-side sort attribute.
    pub sort: Option<String>,

    /// Server-side result windowing, when the directory supports it.
    pub vlv: Option<VlvWindow>,

    /// Cap on the number of entries returned (0 = no cap).
    pub size_limit: usize,
}

impl SearchOptions {
    /// Options fetching the given attributes.
    pub fn attributes(attrs: &[&str]) -> Self {
        Self {
            attributes: attrs.iter().map(|a| (*a).to_string()).collect(),
            ..Self::default()
        }
    }

    /// Set the server-side sort attribute.
    pub fn sorted_by(mut self, attr: impl Into<String>) -> Self {
        self.sort = Some(attr.into());
        self
    }

    /// Set the server-side window.
    pub fn windowed(mut self, page: usize, page_size: usize) -> Self {
        self.vlv = Some(VlvWindow { page, page_size });
        self
    }

    /// Set the size limit.
    pub fn limited(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }
}

/// Materialized outcome of a directory search.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// The entries of the (possibly windowed) result.
    pub entries: Vec<DirectoryEntry>,

    /// Total number of matching entries when the server reports it; for a
    /// windowed search this counts the full result, not the window.
    pub total: Option<usize>,

    /// Whether the server already returned the entries in sort order.
    pub server_sorted: bool,
}

impl SearchOutcome {
    /// Outcome holding exactly the given entries, total derived locally.
    pub fn of(entries: Vec<DirectoryEntry>) -> Self {
        let total = Some(entries.len());
        Self {
            entries,
            total,
            server_sorted: false,
        }
    }
}
