//! In-memory DirectoryClient
//!
//! A process-local directory used by the test suites and by single-node
//! development setups. It evaluates real RFC 4515 filter strings (and/or/not,
//! equality, presence, substring wildcards, hex escapes) against seeded
//! entries, honors scopes, sorting and VLV windowing, and can be told to fail
//! connects or binds per host to exercise the store's failover path.
//!
//! This is a fake, not a server: no wire protocol, no schema enforcement.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::DirectoryClient;
use crate::entry::{parent_dn, AttrMap, DirectoryEntry, Scope, SearchOptions, SearchOutcome};
use crate::error::{StoreError, StoreResult};

/// In-memory [`DirectoryClient`] implementation.
#[derive(Default)]
pub struct MemoryDirectory {
    // Keyed by lower-cased DN for case-insensitive lookup; entries keep the
    // original DN spelling.
    entries: Mutex<BTreeMap<String, DirectoryEntry>>,
    fail_connect: Mutex<HashSet<String>>,
    fail_bind: Mutex<HashSet<String>>,
    bound_host: Mutex<Option<String>>,
    bound_dn: Mutex<Option<String>>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry, replacing any previous entry with the same DN.
    pub fn insert(&self, entry: DirectoryEntry) {
        self.entries
            .lock()
            .expect("directory lock poisoned")
            .insert(entry.dn.to_lowercase(), entry);
    }

    /// Seed several entries at once (builder style).
    pub fn with_entries(self, entries: impl IntoIterator<Item = DirectoryEntry>) -> Self {
        for entry in entries {
            self.insert(entry);
        }
        self
    }

    /// Make `connect` fail for the given host.
    pub fn fail_connect_for(&self, host: &str) {
        self.fail_connect
            .lock()
            .expect("directory lock poisoned")
            .insert(host.to_string());
    }

    /// Make `bind` fail while connected to the given host.
    pub fn fail_bind_for(&self, host: &str) {
        self.fail_bind
            .lock()
            .expect("directory lock poisoned")
            .insert(host.to_string());
    }

    /// The DN of the most recent successful bind.
    pub fn bound_dn(&self) -> Option<String> {
        self.bound_dn.lock().expect("directory lock poisoned").clone()
    }

    /// Snapshot of an entry by DN, for test assertions.
    pub fn entry(&self, dn: &str) -> Option<DirectoryEntry> {
        self.entries
            .lock()
            .expect("directory lock poisoned")
            .get(&dn.to_lowercase())
            .cloned()
    }

    fn matching(&self, base: &str, scope: Scope, filter: &str) -> StoreResult<Vec<DirectoryEntry>> {
        let expr = FilterExpr::parse(filter)
            .ok_or_else(|| StoreError::invalid_data(format!("malformed filter: {filter}")))?;
        let entries = self.entries.lock().expect("directory lock poisoned");
        Ok(entries
            .values()
            .filter(|e| in_scope(&e.dn, base, scope) && expr.matches(e))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DirectoryClient for MemoryDirectory {
    async fn connect(&self, host: &str) -> StoreResult<()> {
        if self
            .fail_connect
            .lock()
            .expect("directory lock poisoned")
            .contains(host)
        {
            return Err(StoreError::connection_failed(format!(
                "host {host} unreachable"
            )));
        }
        *self.bound_host.lock().expect("directory lock poisoned") = Some(host.to_string());
        Ok(())
    }

    async fn bind(&self, dn: &str, _password: &str) -> StoreResult<()> {
        let host = self
            .bound_host
            .lock()
            .expect("directory lock poisoned")
            .clone()
            .unwrap_or_default();
        if self
            .fail_bind
            .lock()
            .expect("directory lock poisoned")
            .contains(&host)
        {
            return Err(StoreError::bind_failed(host, "invalid credentials"));
        }
        *self.bound_dn.lock().expect("directory lock poisoned") = Some(dn.to_string());
        Ok(())
    }

    async fn sasl_bind(
        &self,
        identity: &str,
        password: &str,
        _authz_id: Option<&str>,
    ) -> StoreResult<()> {
        self.bind(identity, password).await
    }

    async fn search(
        &self,
        base: &str,
        scope: Scope,
        filter: &str,
        options: &SearchOptions,
    ) -> StoreResult<SearchOutcome> {
        let mut hits = self.matching(base, scope, filter)?;
        let total = hits.len();

        let server_sorted = if let Some(sort) = &options.sort {
            hits.sort_by_key(|e| e.first(sort).unwrap_or_default().to_lowercase());
            true
        } else {
            false
        };

        if let Some(vlv) = options.vlv {
            hits = hits
                .into_iter()
                .skip(vlv.offset())
                .take(vlv.page_size)
                .collect();
        }

        if options.size_limit > 0 && hits.len() > options.size_limit {
            hits.truncate(options.size_limit);
        }

        let hits = hits
            .into_iter()
            .map(|e| project(e, &options.attributes))
            .collect();

        Ok(SearchOutcome {
            entries: hits,
            total: Some(total),
            server_sorted,
        })
    }

    async fn count(&self, base: &str, scope: Scope, filter: &str) -> StoreResult<usize> {
        Ok(self.matching(base, scope, filter)?.len())
    }

    async fn read_entry(
        &self,
        dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> StoreResult<Option<DirectoryEntry>> {
        let expr = FilterExpr::parse(filter)
            .ok_or_else(|| StoreError::invalid_data(format!("malformed filter: {filter}")))?;
        let entries = self.entries.lock().expect("directory lock poisoned");
        Ok(entries
            .get(&dn.to_lowercase())
            .filter(|e| expr.matches(e))
            .cloned()
            .map(|e| project(e, attributes)))
    }

    async fn list_entries(
        &self,
        base: &str,
        filter: &str,
        attributes: &[String],
    ) -> StoreResult<Vec<DirectoryEntry>> {
        Ok(self
            .matching(base, Scope::One, filter)?
            .into_iter()
            .map(|e| project(e, attributes))
            .collect())
    }

    async fn add(&self, dn: &str, attrs: &AttrMap) -> StoreResult<()> {
        let mut entries = self.entries.lock().expect("directory lock poisoned");
        let key = dn.to_lowercase();
        if entries.contains_key(&key) {
            return Err(StoreError::invalid_data(format!("entry already exists: {dn}")));
        }
        let mut entry = DirectoryEntry::new(dn);
        for (attr, values) in attrs {
            entry.set(attr, values.clone());
        }
        entries.insert(key, entry);
        Ok(())
    }

    async fn mod_add(&self, dn: &str, attrs: &AttrMap) -> StoreResult<()> {
        let mut entries = self.entries.lock().expect("directory lock poisoned");
        let entry = entries
            .get_mut(&dn.to_lowercase())
            .ok_or_else(|| StoreError::not_found(dn))?;
        for (attr, values) in attrs {
            for value in values {
                entry.push(attr, value.clone());
            }
        }
        Ok(())
    }

    async fn mod_replace(&self, dn: &str, attrs: &AttrMap) -> StoreResult<()> {
        let mut entries = self.entries.lock().expect("directory lock poisoned");
        let entry = entries
            .get_mut(&dn.to_lowercase())
            .ok_or_else(|| StoreError::not_found(dn))?;
        for (attr, values) in attrs {
            if values.is_empty() {
                entry.attrs.remove(&attr.to_lowercase());
            } else {
                entry.set(attr, values.clone());
            }
        }
        Ok(())
    }

    async fn mod_delete(&self, dn: &str, attrs: &AttrMap) -> StoreResult<()> {
        let mut entries = self.entries.lock().expect("directory lock poisoned");
        let entry = entries
            .get_mut(&dn.to_lowercase())
            .ok_or_else(|| StoreError::not_found(dn))?;
        for (attr, values) in attrs {
            let key = attr.to_lowercase();
            if values.is_empty() {
                entry.attrs.remove(&key);
            } else if let Some(existing) = entry.attrs.get_mut(&key) {
                existing.retain(|v| !values.iter().any(|d| d.eq_ignore_ascii_case(v)));
                if existing.is_empty() {
                    entry.attrs.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn rename(
        &self,
        dn: &str,
        new_rdn: &str,
        new_parent: Option<&str>,
        delete_old: bool,
    ) -> StoreResult<()> {
        let mut entries = self.entries.lock().expect("directory lock poisoned");
        let mut entry = entries
            .remove(&dn.to_lowercase())
            .ok_or_else(|| StoreError::not_found(dn))?;

        let parent = new_parent
            .map(ToString::to_string)
            .or_else(|| parent_dn(dn).map(ToString::to_string))
            .unwrap_or_default();
        let new_dn = if parent.is_empty() {
            new_rdn.to_string()
        } else {
            format!("{new_rdn},{parent}")
        };

        if let Some((attr, value)) = new_rdn.split_once('=') {
            if delete_old {
                entry.set(attr, vec![value.to_string()]);
            } else {
                entry.push(attr, value.to_string());
            }
        }

        entry.dn = new_dn.clone();
        entries.insert(new_dn.to_lowercase(), entry);
        Ok(())
    }

    async fn delete(&self, dn: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().expect("directory lock poisoned");
        entries
            .remove(&dn.to_lowercase())
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(dn))
    }
}

/// Keep only the requested attributes; an empty request keeps everything.
fn project(mut entry: DirectoryEntry, attributes: &[String]) -> DirectoryEntry {
    if attributes.is_empty() {
        return entry;
    }
    let wanted: HashSet<String> = attributes.iter().map(|a| a.to_lowercase()).collect();
    entry.attrs.retain(|attr, _| wanted.contains(attr));
    entry
}

fn in_scope(dn: &str, base: &str, scope: Scope) -> bool {
    let dn = dn.to_lowercase();
    let base = base.to_lowercase();
    match scope {
        Scope::Base => dn == base,
        Scope::One => parent_dn(&dn).map(str::to_string) == Some(base),
        Scope::Sub => dn == base || dn.ends_with(&format!(",{base}")),
    }
}

/// Parsed filter expression tree.
enum FilterExpr {
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Not(Box<FilterExpr>),
    Present(String),
    Test { attr: String, pattern: String },
}

impl FilterExpr {
    /// Parse a complete filter string; `None` on malformed input.
    fn parse(filter: &str) -> Option<FilterExpr> {
        let (expr, rest) = Self::parse_one(filter.trim())?;
        rest.trim().is_empty().then_some(expr)
    }

    fn parse_one(s: &str) -> Option<(FilterExpr, &str)> {
        let s = s.strip_prefix('(')?;
        match s.chars().next()? {
            '&' => Self::parse_list(&s[1..]).map(|(list, rest)| (FilterExpr::And(list), rest)),
            '|' => Self::parse_list(&s[1..]).map(|(list, rest)| (FilterExpr::Or(list), rest)),
            '!' => {
                let (inner, rest) = Self::parse_one(&s[1..])?;
                let rest = rest.strip_prefix(')')?;
                Some((FilterExpr::Not(Box::new(inner)), rest))
            }
            _ => {
                let end = s.find(')')?;
                let (attr, value) = s[..end].split_once('=')?;
                let expr = if value == "*" {
                    FilterExpr::Present(attr.to_lowercase())
                } else {
                    FilterExpr::Test {
                        attr: attr.to_lowercase(),
                        pattern: value.to_string(),
                    }
                };
                Some((expr, &s[end + 1..]))
            }
        }
    }

    fn parse_list(mut s: &str) -> Option<(Vec<FilterExpr>, &str)> {
        let mut list = Vec::new();
        while s.starts_with('(') {
            let (expr, rest) = Self::parse_one(s)?;
            list.push(expr);
            s = rest;
        }
        let rest = s.strip_prefix(')')?;
        (!list.is_empty()).then_some((list, rest))
    }

    fn matches(&self, entry: &DirectoryEntry) -> bool {
        match self {
            FilterExpr::And(list) => list.iter().all(|f| f.matches(entry)),
            FilterExpr::Or(list) => list.iter().any(|f| f.matches(entry)),
            FilterExpr::Not(inner) => !inner.matches(entry),
            FilterExpr::Present(attr) => !entry.values(attr).is_empty(),
            FilterExpr::Test { attr, pattern } => entry
                .values(attr)
                .iter()
                .any(|v| wildcard_match(v, pattern)),
        }
    }
}

/// Decode RFC 4515 hex escapes and lower-case for comparison.
fn unescape_lower(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '\\' && i + 3 <= segment.len() && segment.is_char_boundary(i + 3) {
            if let Ok(code) = u8::from_str_radix(&segment[i + 1..i + 3], 16) {
                out.push(code as char);
                chars.next();
                chars.next();
                continue;
            }
        }
        out.push(c);
    }
    out.to_lowercase()
}

/// Case-insensitive wildcard match. The pattern is split on raw `*` before
/// unescaping, so an escaped `\2a` stays a literal asterisk.
fn wildcard_match(value: &str, pattern: &str) -> bool {
    let value = value.to_lowercase();
    let segments: Vec<String> = pattern.split('*').map(unescape_lower).collect();

    if segments.len() == 1 {
        return value == segments[0];
    }

    let first = &segments[0];
    let last = segments.last().expect("split yields at least one segment");

    if !value.starts_with(first.as_str()) || !value.ends_with(last.as_str()) {
        return false;
    }
    let mut pos = first.len();
    let end = value.len() - last.len();
    if pos > end {
        return false;
    }

    for segment in &segments[1..segments.len() - 1] {
        if segment.is_empty() {
            continue;
        }
        match value[pos..end].find(segment.as_str()) {
            Some(found) => pos += found + segment.len(),
            None => return false,
        }
    }
    true
}
