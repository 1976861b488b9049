//! Listing pagination
//!
//! Pages are 1-based and sliced as `start = (page - 1) * page_size`, with an
//! optional signed subset: a positive subset keeps the first N records of
//! the page, a negative one the last N. Against servers with virtual-list-
//! view support the window is requested at the protocol layer and the local
//! slice starts at the beginning of the returned page.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use dirbook_core::client::DirectoryClient;
use dirbook_core::entry::{DirectoryEntry, Scope, SearchOptions};
use dirbook_core::error::StoreResult;

use crate::config::DirectoryConfig;

/// A page request: 1-based page, rows per page, optional signed subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
    pub subset: i64,
}

impl PageRequest {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self {
            page,
            page_size,
            subset: 0,
        }
    }

    /// Keep only part of the page: the first N records for a positive
    /// subset, the last N for a negative one.
    pub fn with_subset(mut self, subset: i64) -> Self {
        self.subset = subset;
        self
    }

    /// Offset of the page start in the full result.
    fn page_start(&self) -> usize {
        self.page.max(1).saturating_sub(1) * self.page_size
    }

    /// Offset within the page and number of records to keep. The subset
    /// magnitude never widens the window beyond the page size.
    fn subset_window(&self) -> (usize, usize) {
        let magnitude = (self.subset.unsigned_abs() as usize).min(self.page_size);
        if self.subset < 0 {
            (self.page_size - magnitude, magnitude)
        } else if self.subset > 0 {
            (0, magnitude)
        } else {
            (0, self.page_size)
        }
    }

    /// Absolute offset of the first record this request selects.
    fn first(&self) -> usize {
        self.page_start() + self.subset_window().0
    }
}

/// One page of a listing, with its position in the full result.
#[derive(Debug, Clone, Default)]
pub struct ResultWindow {
    /// Absolute offset of the first record; never exceeds `total`.
    pub first: usize,

    /// Size of the full result set.
    pub total: usize,

    /// The records of this window; at most the requested page size.
    pub records: Vec<DirectoryEntry>,
}

/// Pages contact listings, server-side when the directory supports it.
pub struct Paginator {
    client: Arc<dyn DirectoryClient>,
    vlv: bool,
    sort_attr: Option<String>,
    size_limit: usize,
}

impl Paginator {
    pub fn new(client: Arc<dyn DirectoryClient>, config: &DirectoryConfig) -> Self {
        Self {
            client,
            vlv: config.vlv,
            sort_attr: config.sort_attr.clone(),
            size_limit: config.size_limit,
        }
    }

    /// Fetch one page of the entries matching `filter`.
    pub async fn list(
        &self,
        base: &str,
        scope: Scope,
        filter: &str,
        attributes: &[String],
        request: &PageRequest,
    ) -> StoreResult<ResultWindow> {
        let mut options = SearchOptions {
            attributes: attributes.to_vec(),
            sort: self.sort_attr.clone(),
            vlv: None,
            size_limit: 0,
        };

        if self.vlv {
            options = options.windowed(request.page.max(1), request.page_size);
        } else {
            options.size_limit = self.size_limit;
        }

        let outcome = self.client.search(base, scope, filter, &options).await?;
        let total = match outcome.total {
            Some(total) => total,
            None => self.client.count(base, scope, filter).await?,
        };

        let mut entries = outcome.entries;
        if !outcome.server_sorted {
            if let Some(sort) = &self.sort_attr {
                entries.sort_by_key(|e| e.first(sort).unwrap_or_default().to_lowercase());
            }
        }

        let (skip, length) = request.subset_window();
        // A protocol window already starts at the page boundary.
        let local_start = if self.vlv {
            skip
        } else {
            request.page_start() + skip
        };
        let records: Vec<DirectoryEntry> =
            entries.into_iter().skip(local_start).take(length).collect();

        debug!(
            total,
            first = request.first(),
            returned = records.len(),
            "listing page assembled"
        );
        Ok(ResultWindow {
            first: request.first().min(total),
            total,
            records,
        })
    }

    /// Window an already-materialized member listing: duplicates (by DN,
    /// case-insensitive) are dropped, the rest sorted by `sort_attr`, then
    /// the requested slice is taken.
    pub fn window_members(
        &self,
        entries: Vec<DirectoryEntry>,
        sort_attr: &str,
        request: &PageRequest,
    ) -> ResultWindow {
        let mut seen: HashSet<String> = HashSet::new();
        let mut members: Vec<DirectoryEntry> = entries
            .into_iter()
            .filter(|e| seen.insert(e.dn.to_lowercase()))
            .collect();
        members.sort_by_key(|e| e.first(sort_attr).unwrap_or_default().to_lowercase());

        let total = members.len();
        let (skip, length) = request.subset_window();
        let start = request.page_start() + skip;
        let records: Vec<DirectoryEntry> =
            members.into_iter().skip(start).take(length).collect();

        ResultWindow {
            first: request.first().min(total),
            total,
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirbook_core::memory::MemoryDirectory;

    fn seeded(count: usize) -> MemoryDirectory {
        let dir = MemoryDirectory::new();
        for i in 0..count {
            dir.insert(
                DirectoryEntry::new(format!("cn=user{i:02},ou=people,dc=x"))
                    .with("objectClass", "inetOrgPerson")
                    .with("cn", format!("user{i:02}")),
            );
        }
        dir
    }

    fn paginator(dir: MemoryDirectory, vlv: bool) -> Paginator {
        let mut config = DirectoryConfig::new("ldap.example.com", "dc=x");
        config.vlv = vlv;
        config.sort_attr = Some("cn".to_string());
        Paginator::new(Arc::new(dir), &config)
    }

    fn names(window: &ResultWindow) -> Vec<&str> {
        window.records.iter().filter_map(|e| e.first("cn")).collect()
    }

    #[tokio::test]
    async fn test_page_slicing() {
        let pager = paginator(seeded(25), false);
        let window = pager
            .list("dc=x", Scope::Sub, "(cn=*)", &[], &PageRequest::new(2, 10))
            .await
            .unwrap();

        assert_eq!(window.first, 10);
        assert_eq!(window.total, 25);
        assert_eq!(names(&window).first(), Some(&"user10"));
        assert_eq!(names(&window).last(), Some(&"user19"));
        assert_eq!(window.records.len(), 10);
    }

    #[tokio::test]
    async fn test_negative_subset_takes_page_tail() {
        let pager = paginator(seeded(25), false);
        let window = pager
            .list(
                "dc=x",
                Scope::Sub,
                "(cn=*)",
                &[],
                &PageRequest::new(2, 10).with_subset(-5),
            )
            .await
            .unwrap();

        assert_eq!(window.first, 15);
        assert_eq!(window.total, 25);
        assert_eq!(names(&window), vec!["user15", "user16", "user17", "user18", "user19"]);
    }

    #[tokio::test]
    async fn test_positive_subset_takes_page_head() {
        let pager = paginator(seeded(25), false);
        let window = pager
            .list(
                "dc=x",
                Scope::Sub,
                "(cn=*)",
                &[],
                &PageRequest::new(2, 10).with_subset(3),
            )
            .await
            .unwrap();

        assert_eq!(window.first, 10);
        assert_eq!(names(&window), vec!["user10", "user11", "user12"]);
    }

    #[tokio::test]
    async fn test_protocol_windowing_slices_locally_from_zero() {
        let pager = paginator(seeded(25), true);
        let window = pager
            .list("dc=x", Scope::Sub, "(cn=*)", &[], &PageRequest::new(3, 10))
            .await
            .unwrap();

        assert_eq!(window.first, 20);
        assert_eq!(window.total, 25);
        assert_eq!(names(&window), vec!["user20", "user21", "user22", "user23", "user24"]);

        let tail = pager
            .list(
                "dc=x",
                Scope::Sub,
                "(cn=*)",
                &[],
                &PageRequest::new(2, 10).with_subset(-5),
            )
            .await
            .unwrap();
        assert_eq!(tail.first, 15);
        assert_eq!(names(&tail), vec!["user15", "user16", "user17", "user18", "user19"]);
    }

    #[tokio::test]
    async fn test_subset_never_exceeds_page_size() {
        let pager = paginator(seeded(25), false);
        let window = pager
            .list(
                "dc=x",
                Scope::Sub,
                "(cn=*)",
                &[],
                &PageRequest::new(1, 10).with_subset(15),
            )
            .await
            .unwrap();
        assert_eq!(window.records.len(), 10);
        assert_eq!(names(&window).first(), Some(&"user00"));
        assert_eq!(names(&window).last(), Some(&"user09"));

        let tail = pager
            .list(
                "dc=x",
                Scope::Sub,
                "(cn=*)",
                &[],
                &PageRequest::new(2, 10).with_subset(-15),
            )
            .await
            .unwrap();
        assert_eq!(tail.records.len(), 10);
        assert_eq!(tail.first, 10);
        assert_eq!(names(&tail).first(), Some(&"user10"));
        assert_eq!(names(&tail).last(), Some(&"user19"));
    }

    #[tokio::test]
    async fn test_page_past_the_end_is_empty() {
        let pager = paginator(seeded(5), false);
        let window = pager
            .list("dc=x", Scope::Sub, "(cn=*)", &[], &PageRequest::new(4, 10))
            .await
            .unwrap();

        assert_eq!(window.total, 5);
        assert_eq!(window.first, 5);
        assert!(window.records.is_empty());
    }

    #[tokio::test]
    async fn test_member_windowing_dedupes_and_sorts() {
        let pager = paginator(MemoryDirectory::new(), false);
        let entries = vec![
            DirectoryEntry::new("cn=zoe,dc=x").with("cn", "zoe"),
            DirectoryEntry::new("cn=amy,dc=x").with("cn", "amy"),
            DirectoryEntry::new("CN=Zoe,dc=x").with("cn", "Zoe"),
            DirectoryEntry::new("cn=bob,dc=x").with("cn", "bob"),
        ];

        let window = pager.window_members(entries, "cn", &PageRequest::new(1, 10));
        assert_eq!(window.total, 3);
        assert_eq!(names(&window), vec!["amy", "bob", "zoe"]);
    }
}
