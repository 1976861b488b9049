//! Group listing and membership resolution
//!
//! Directory groups come in two shapes: static groups whose member attribute
//! holds DNs, and dynamic groups whose `memberURL` values each describe a
//! search. Nested groups of either shape are expanded with a worklist
//! traversal that tracks visited DNs, so cycles terminate and no contact is
//! reported twice. The group listing itself is cached under a fixed key.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use dirbook_core::cache::Cache;
use dirbook_core::client::DirectoryClient;
use dirbook_core::entry::{DirectoryEntry, Scope, SearchOptions};
use dirbook_core::error::{StoreError, StoreResult};
use dirbook_core::ids::encode_id;

use crate::codec::is_group_entry;
use crate::config::{DirectoryConfig, GroupConfig};
use crate::filter::and_join;

/// Cache key of the group listing.
pub const GROUPS_CACHE_KEY: &str = "dirbook.groups";

const ANY_FILTER: &str = "(objectclass=*)";

/// How a group stores its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupVariant {
    /// Members are DNs in the given attribute.
    Static {
        /// Lower-cased member attribute name.
        member_attr: String,
    },
    /// Members are described by `memberURL` search references.
    Dynamic,
}

/// Classify a group entry from its object classes.
///
/// Deployment overrides in `class_member_attrs` win; otherwise the
/// `groupOfNames` family maps to `member`, the `groupOfUniqueNames` family
/// to `uniqueMember`, and `groupOfUrls` (or a present `memberURL`) makes the
/// group dynamic. A configured `member_attr` overrides the detected static
/// attribute.
pub fn group_variant(entry: &DirectoryEntry, config: &GroupConfig) -> GroupVariant {
    for class in entry.object_classes() {
        if let Some(attr) = config.class_member_attrs.get(&class.to_lowercase()) {
            return GroupVariant::Static {
                member_attr: attr.to_lowercase(),
            };
        }
    }

    if entry.has_object_class("groupofurls") || !entry.values("memberurl").is_empty() {
        return GroupVariant::Dynamic;
    }

    if let Some(attr) = &config.member_attr {
        return GroupVariant::Static {
            member_attr: attr.to_lowercase(),
        };
    }

    let detected = if entry.has_object_class("groupofuniquenames")
        || entry.has_object_class("kolabgroupofuniquenames")
    {
        "uniquemember"
    } else {
        "member"
    };
    GroupVariant::Static {
        member_attr: detected.to_string(),
    }
}

/// A listed group, as cached and as returned to the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Stable identifier (encoded DN, or encoded name for synthesized
    /// groups).
    pub id: String,

    /// Display name.
    pub name: String,

    /// DN of the backing entry; empty for groups synthesized from static
    /// filters.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dn: String,

    /// Group email addresses, when the deployment maps an email attribute.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<String>,

    /// Member filter of a synthesized group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Membership variant detected when the group was listed; `None` until
    /// the entry has been classified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<GroupVariant>,
}

/// TTL wrapper storing the group listing in the shared cache.
#[derive(Clone)]
pub struct GroupCache {
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl GroupCache {
    pub fn new(cache: Arc<dyn Cache>, config: &GroupConfig) -> Self {
        Self {
            cache,
            ttl: Duration::from_secs(config.cache_ttl_secs),
        }
    }

    /// The cached listing, if present and decodable.
    pub fn load(&self) -> Option<Vec<GroupRecord>> {
        let value = self.cache.get(GROUPS_CACHE_KEY)?;
        match serde_json::from_value(value) {
            Ok(groups) => Some(groups),
            Err(err) => {
                warn!(error = %err, "discarding undecodable cached group listing");
                self.cache.remove(GROUPS_CACHE_KEY);
                None
            }
        }
    }

    /// Store a listing under the fixed key with the configured TTL.
    pub fn store(&self, groups: &[GroupRecord]) {
        match serde_json::to_value(groups) {
            Ok(value) => self.cache.set(GROUPS_CACHE_KEY, value, Some(self.ttl)),
            Err(err) => warn!(error = %err, "failed to serialize group listing"),
        }
    }

    /// Drop the cached listing.
    pub fn clear(&self) {
        self.cache.remove(GROUPS_CACHE_KEY);
    }
}

/// Lists groups and resolves their membership.
pub struct GroupResolver {
    client: Arc<dyn DirectoryClient>,
    config: DirectoryConfig,
    cache: GroupCache,
}

impl GroupResolver {
    pub fn new(
        client: Arc<dyn DirectoryClient>,
        cache: Arc<dyn Cache>,
        config: &DirectoryConfig,
    ) -> Self {
        Self {
            client,
            cache: GroupCache::new(cache, &config.groups),
            config: config.clone(),
        }
    }

    /// Drop the cached group listing. Called after every membership-changing
    /// mutation.
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    /// All groups of this source, from the cache when fresh.
    pub async fn list_groups(&self) -> StoreResult<Vec<GroupRecord>> {
        if let Some(groups) = self.cache.load() {
            debug!(count = groups.len(), "group listing served from cache");
            return Ok(groups);
        }

        let groups = if self.config.groups.filter.is_some() {
            self.list_live().await?
        } else {
            self.synthesize_static()
        };
        self.cache.store(&groups);
        Ok(groups)
    }

    /// A single group by its identifier.
    pub async fn get_group(&self, id: &str) -> StoreResult<GroupRecord> {
        let groups = self.list_groups().await?;
        groups
            .into_iter()
            .find(|g| g.id == id)
            .ok_or_else(|| StoreError::not_found(id))
    }

    /// Resolve the contact entries belonging to a group, expanding nested
    /// groups of either variant. When an active contact filter is given,
    /// dynamic member searches are intersected with it.
    ///
    /// Cycles terminate via the visited-DN set. Once the accumulated member
    /// count reaches the configured size limit the partial result is
    /// returned, not an error.
    pub async fn resolve_members(
        &self,
        group: &GroupRecord,
        active_filter: Option<&str>,
    ) -> StoreResult<Vec<DirectoryEntry>> {
        // Synthesized groups have no entry, only a filter.
        if group.dn.is_empty() {
            let filter = group.filter.as_deref().unwrap_or(ANY_FILTER);
            return self.search_members(&self.config.base_dn, self.config.scope, filter, active_filter).await;
        }

        let root = self
            .client
            .read_entry(&group.dn, ANY_FILTER, &[])
            .await?
            .ok_or_else(|| StoreError::not_found(group.dn.clone()))?;
        let root_variant = match &group.variant {
            Some(variant) => variant.clone(),
            None => group_variant(&root, &self.config.groups),
        };

        let mut members: Vec<DirectoryEntry> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(DirectoryEntry, GroupVariant)> = VecDeque::new();
        seen.insert(group.dn.to_lowercase());
        queue.push_back((root, root_variant));

        'expand: while let Some((entry, variant)) = queue.pop_front() {
            match variant {
                GroupVariant::Static { member_attr } => {
                    for dn in entry.values(&member_attr) {
                        if !seen.insert(dn.to_lowercase()) {
                            continue;
                        }
                        let Some(member) =
                            self.client.read_entry(dn, ANY_FILTER, &[]).await?
                        else {
                            debug!(dn = %dn, "skipping dangling member reference");
                            continue;
                        };
                        if is_group_entry(&member) {
                            let nested = group_variant(&member, &self.config.groups);
                            queue.push_back((member, nested));
                        } else {
                            members.push(member);
                            if self.at_limit(members.len()) {
                                break 'expand;
                            }
                        }
                    }
                }
                GroupVariant::Dynamic => {
                    for url in entry.values("memberurl") {
                        let Some((base, scope, filter)) = parse_member_url(url) else {
                            warn!(url = %url, "skipping unparseable memberURL");
                            continue;
                        };
                        let filter = match active_filter {
                            Some(active) => and_join(&[&filter, active]),
                            None => filter,
                        };
                        let outcome = self
                            .client
                            .search(&base, scope, &filter, &SearchOptions::default())
                            .await?;
                        for member in outcome.entries {
                            if !seen.insert(member.dn.to_lowercase()) {
                                continue;
                            }
                            if is_group_entry(&member) {
                                let nested = group_variant(&member, &self.config.groups);
                                queue.push_back((member, nested));
                            } else {
                                members.push(member);
                                if self.at_limit(members.len()) {
                                    break 'expand;
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(members)
    }

    fn at_limit(&self, count: usize) -> bool {
        if self.config.size_limit > 0 && count >= self.config.size_limit {
            warn!(
                limit = self.config.size_limit,
                "group resolution hit the size limit, returning a partial result"
            );
            return true;
        }
        false
    }

    async fn search_members(
        &self,
        base: &str,
        scope: Scope,
        filter: &str,
        active_filter: Option<&str>,
    ) -> StoreResult<Vec<DirectoryEntry>> {
        let filter = match active_filter {
            Some(active) => and_join(&[filter, active]),
            None => filter.to_string(),
        };
        let options = SearchOptions::default().limited(self.config.size_limit);
        let outcome = self.client.search(base, scope, &filter, &options).await?;
        Ok(outcome.entries)
    }

    async fn list_live(&self) -> StoreResult<Vec<GroupRecord>> {
        let groups = &self.config.groups;
        let filter = groups.filter.as_deref().unwrap_or(ANY_FILTER);
        let base = self.config.group_base_dn();
        let name_attr = groups.name_attr.as_str();
        // objectclass and memberurl feed the variant classification.
        let mut fetch = vec![name_attr, "objectclass", "memberurl"];
        if let Some(email_attr) = &groups.email_attr {
            fetch.push(email_attr.as_str());
        }

        let mut entries: Vec<DirectoryEntry> = Vec::new();
        let mut server_sorted = false;
        if groups.vlv {
            // Merge windowed pages until a short page signals the end.
            let page_size = groups.page_size.max(1);
            let mut page = 1;
            loop {
                let options = SearchOptions::attributes(&fetch)
                    .sorted_by(groups.sort_attr.as_str())
                    .windowed(page, page_size);
                let outcome = self.client.search(base, groups.scope, filter, &options).await?;
                let len = outcome.entries.len();
                entries.extend(outcome.entries);
                if len < page_size {
                    break;
                }
                page += 1;
            }
        } else {
            let options =
                SearchOptions::attributes(&fetch).sorted_by(groups.sort_attr.as_str());
            let outcome = self.client.search(base, groups.scope, filter, &options).await?;
            server_sorted = outcome.server_sorted;
            entries = outcome.entries;
        }

        let mut records: Vec<GroupRecord> = entries
            .into_iter()
            .map(|entry| GroupRecord {
                id: encode_id(&entry.dn),
                name: entry
                    .first(name_attr)
                    .unwrap_or(entry.dn.as_str())
                    .to_string(),
                emails: groups
                    .email_attr
                    .as_deref()
                    .map(|attr| entry.values(attr).to_vec())
                    .unwrap_or_default(),
                variant: Some(group_variant(&entry, groups)),
                dn: entry.dn,
                filter: None,
            })
            .collect();

        if !server_sorted {
            records.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        }
        Ok(records)
    }

    fn synthesize_static(&self) -> Vec<GroupRecord> {
        let mut records: Vec<GroupRecord> = self
            .config
            .groups
            .static_filters
            .iter()
            .map(|sf| GroupRecord {
                id: encode_id(&sf.name),
                name: sf.name.clone(),
                dn: String::new(),
                emails: Vec::new(),
                filter: Some(sf.filter.clone()),
                variant: None,
            })
            .collect();
        records.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        records
    }
}

/// Parse a `memberURL` value (`ldap:///<base>?<attrs>?<scope>?<filter>`)
/// into its base DN, scope and filter. Components are percent-decoded; a
/// missing filter matches everything.
pub fn parse_member_url(url: &str) -> Option<(String, Scope, String)> {
    let rest = url
        .strip_prefix("ldap:///")
        .or_else(|| url.strip_prefix("LDAP:///"))?;
    let mut parts = rest.splitn(4, '?');
    let base = decode_component(parts.next()?)?;
    let _attrs = parts.next();
    let scope = Scope::parse(parts.next().unwrap_or(""));
    let filter = match parts.next() {
        Some(raw) if !raw.is_empty() => decode_component(raw)?,
        _ => ANY_FILTER.to_string(),
    };
    if base.is_empty() {
        return None;
    }
    Some((base, scope, filter))
}

fn decode_component(raw: &str) -> Option<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirbook_core::cache::MemoryCache;
    use dirbook_core::memory::MemoryDirectory;

    fn person(dn: &str, cn: &str) -> DirectoryEntry {
        DirectoryEntry::new(dn)
            .with("objectClass", "inetOrgPerson")
            .with("cn", cn)
    }

    fn static_group(dn: &str, cn: &str, members: &[&str]) -> DirectoryEntry {
        let mut entry = DirectoryEntry::new(dn)
            .with("objectClass", "top")
            .with("objectClass", "groupOfNames")
            .with("cn", cn);
        for member in members {
            entry.push("member", *member);
        }
        entry
    }

    fn resolver(
        directory: MemoryDirectory,
        config: &DirectoryConfig,
    ) -> GroupResolver {
        GroupResolver::new(Arc::new(directory), Arc::new(MemoryCache::new()), config)
    }

    fn group_record(dn: &str) -> GroupRecord {
        GroupRecord {
            id: encode_id(dn),
            name: String::new(),
            dn: dn.to_string(),
            emails: Vec::new(),
            filter: None,
            variant: None,
        }
    }

    #[test]
    fn test_variant_detection() {
        let config = GroupConfig::default();
        let names = static_group("cn=g,dc=x", "g", &[]);
        assert_eq!(
            group_variant(&names, &config),
            GroupVariant::Static { member_attr: "member".to_string() }
        );

        let unique = DirectoryEntry::new("cn=g,dc=x")
            .with("objectClass", "groupOfUniqueNames");
        assert_eq!(
            group_variant(&unique, &config),
            GroupVariant::Static { member_attr: "uniquemember".to_string() }
        );

        let dynamic = DirectoryEntry::new("cn=g,dc=x")
            .with("objectClass", "groupOfURLs")
            .with("memberURL", "ldap:///dc=x??sub?(cn=*)");
        assert_eq!(group_variant(&dynamic, &config), GroupVariant::Dynamic);
    }

    #[test]
    fn test_variant_overrides() {
        let mut config = GroupConfig::default();
        config
            .class_member_attrs
            .insert("posixgroup".to_string(), "memberUid".to_string());
        let posix = DirectoryEntry::new("cn=g,dc=x").with("objectClass", "posixGroup");
        assert_eq!(
            group_variant(&posix, &config),
            GroupVariant::Static { member_attr: "memberuid".to_string() }
        );

        config.member_attr = Some("roleOccupant".to_string());
        let role = DirectoryEntry::new("cn=g,dc=x").with("objectClass", "organizationalRole");
        assert_eq!(
            group_variant(&role, &config),
            GroupVariant::Static { member_attr: "roleoccupant".to_string() }
        );
    }

    #[test]
    fn test_member_url_parsing() {
        let (base, scope, filter) =
            parse_member_url("ldap:///ou=people,dc=example,dc=com??sub?(objectClass=person)")
                .unwrap();
        assert_eq!(base, "ou=people,dc=example,dc=com");
        assert_eq!(scope, Scope::Sub);
        assert_eq!(filter, "(objectClass=person)");

        let (base, scope, filter) =
            parse_member_url("ldap:///ou=x,dc=example,dc=com?cn?one?(cn=a%20b)").unwrap();
        assert_eq!(base, "ou=x,dc=example,dc=com");
        assert_eq!(scope, Scope::One);
        assert_eq!(filter, "(cn=a b)");

        assert!(parse_member_url("http://example.com").is_none());
        // Missing filter matches everything.
        let (_, _, filter) = parse_member_url("ldap:///dc=x").unwrap();
        assert_eq!(filter, ANY_FILTER);
    }

    #[tokio::test]
    async fn test_cyclic_nested_groups_terminate() {
        let directory = MemoryDirectory::new().with_entries(vec![
            static_group(
                "cn=a,ou=groups,dc=x",
                "a",
                &["cn=b,ou=groups,dc=x", "cn=jane,ou=people,dc=x"],
            ),
            static_group(
                "cn=b,ou=groups,dc=x",
                "b",
                &["cn=a,ou=groups,dc=x", "cn=joe,ou=people,dc=x"],
            ),
            person("cn=jane,ou=people,dc=x", "jane"),
            person("cn=joe,ou=people,dc=x", "joe"),
        ]);
        let config = DirectoryConfig::new("ldap.example.com", "dc=x");
        let resolver = resolver(directory, &config);

        let members = resolver
            .resolve_members(&group_record("cn=a,ou=groups,dc=x"), None)
            .await
            .unwrap();
        let mut names: Vec<&str> = members.iter().filter_map(|m| m.first("cn")).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["jane", "joe"]);
    }

    #[tokio::test]
    async fn test_duplicate_members_reported_once() {
        let directory = MemoryDirectory::new().with_entries(vec![
            static_group(
                "cn=a,ou=groups,dc=x",
                "a",
                &["cn=b,ou=groups,dc=x", "cn=jane,ou=people,dc=x"],
            ),
            static_group("cn=b,ou=groups,dc=x", "b", &["CN=Jane,ou=people,dc=x"]),
            person("cn=jane,ou=people,dc=x", "jane"),
        ]);
        let config = DirectoryConfig::new("ldap.example.com", "dc=x");
        let resolver = resolver(directory, &config);

        let members = resolver
            .resolve_members(&group_record("cn=a,ou=groups,dc=x"), None)
            .await
            .unwrap();
        assert_eq!(members.len(), 1);
    }

    #[tokio::test]
    async fn test_dynamic_group_resolution_intersects_active_filter() {
        let directory = MemoryDirectory::new().with_entries(vec![
            DirectoryEntry::new("cn=dyn,ou=groups,dc=x")
                .with("objectClass", "groupOfURLs")
                .with("cn", "dyn")
                .with("memberURL", "ldap:///ou=people,dc=x??sub?(objectClass=inetOrgPerson)"),
            person("cn=jane,ou=people,dc=x", "jane"),
            person("cn=joe,ou=people,dc=x", "joe"),
        ]);
        let config = DirectoryConfig::new("ldap.example.com", "dc=x");
        let resolver = resolver(directory, &config);

        let all = resolver
            .resolve_members(&group_record("cn=dyn,ou=groups,dc=x"), None)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let janes = resolver
            .resolve_members(&group_record("cn=dyn,ou=groups,dc=x"), Some("(cn=jane)"))
            .await
            .unwrap();
        assert_eq!(janes.len(), 1);
        assert_eq!(janes[0].first("cn"), Some("jane"));
    }

    #[tokio::test]
    async fn test_size_limit_returns_partial_result() {
        let member_dns: Vec<String> =
            (0..10).map(|i| format!("cn=p{i},ou=people,dc=x")).collect();
        let member_refs: Vec<&str> = member_dns.iter().map(String::as_str).collect();
        let mut entries = vec![static_group("cn=big,ou=groups,dc=x", "big", &member_refs)];
        for i in 0..10 {
            entries.push(person(&format!("cn=p{i},ou=people,dc=x"), &format!("p{i}")));
        }
        let directory = MemoryDirectory::new().with_entries(entries);
        let mut config = DirectoryConfig::new("ldap.example.com", "dc=x");
        config.size_limit = 3;
        let resolver = resolver(directory, &config);

        let members = resolver
            .resolve_members(&group_record("cn=big,ou=groups,dc=x"), None)
            .await
            .unwrap();
        assert_eq!(members.len(), 3);
    }

    #[tokio::test]
    async fn test_group_listing_is_cached_and_invalidated() {
        let directory = MemoryDirectory::new().with_entries(vec![static_group(
            "cn=devs,ou=groups,dc=x",
            "devs",
            &[],
        )]);
        let mut config = DirectoryConfig::new("ldap.example.com", "dc=x");
        config.groups.filter = Some("(objectClass=groupOfNames)".to_string());

        let client = Arc::new(directory);
        let resolver = GroupResolver::new(
            client.clone(),
            Arc::new(MemoryCache::new()),
            &config,
        );

        let first = resolver.list_groups().await.unwrap();
        assert_eq!(first.len(), 1);

        client.insert(static_group("cn=ops,ou=groups,dc=x", "ops", &[]));
        let cached = resolver.list_groups().await.unwrap();
        assert_eq!(cached.len(), 1);

        resolver.invalidate();
        let fresh = resolver.list_groups().await.unwrap();
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh[0].name, "devs");
        assert_eq!(fresh[1].name, "ops");
    }

    #[tokio::test]
    async fn test_listing_records_the_detected_variant() {
        let directory = MemoryDirectory::new().with_entries(vec![
            static_group("cn=devs,ou=groups,dc=x", "devs", &[]),
            DirectoryEntry::new("cn=dyn,ou=groups,dc=x")
                .with("objectClass", "groupOfURLs")
                .with("cn", "dyn")
                .with("memberURL", "ldap:///ou=people,dc=x??sub?(cn=*)"),
        ]);
        let mut config = DirectoryConfig::new("ldap.example.com", "dc=x");
        config.groups.filter =
            Some("(|(objectClass=groupOfNames)(objectClass=groupOfURLs))".to_string());
        let resolver = resolver(directory, &config);

        let groups = resolver.list_groups().await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups[0].variant,
            Some(GroupVariant::Static { member_attr: "member".to_string() })
        );
        assert_eq!(groups[1].variant, Some(GroupVariant::Dynamic));

        // The classification survives the cache round trip.
        let cached = resolver.list_groups().await.unwrap();
        assert_eq!(cached, groups);
    }

    #[tokio::test]
    async fn test_recorded_variant_drives_member_lookup() {
        let directory = MemoryDirectory::new().with_entries(vec![
            static_group("cn=g,ou=groups,dc=x", "g", &[])
                .with("uniqueMember", "cn=jane,ou=people,dc=x"),
            person("cn=jane,ou=people,dc=x", "jane"),
        ]);
        let config = DirectoryConfig::new("ldap.example.com", "dc=x");
        let resolver = resolver(directory, &config);

        // Object classes alone would pick `member`, which holds nothing.
        let unclassified = resolver
            .resolve_members(&group_record("cn=g,ou=groups,dc=x"), None)
            .await
            .unwrap();
        assert!(unclassified.is_empty());

        let mut record = group_record("cn=g,ou=groups,dc=x");
        record.variant = Some(GroupVariant::Static {
            member_attr: "uniquemember".to_string(),
        });
        let members = resolver.resolve_members(&record, None).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].first("cn"), Some("jane"));
    }

    #[tokio::test]
    async fn test_static_filters_synthesize_groups() {
        let directory = MemoryDirectory::new().with_entries(vec![
            person("cn=jane,ou=people,dc=x", "jane"),
            DirectoryEntry::new("cn=joe,ou=people,dc=x")
                .with("objectClass", "inetOrgPerson")
                .with("cn", "joe")
                .with("o", "acme"),
        ]);
        let mut config = DirectoryConfig::new("ldap.example.com", "dc=x");
        config.groups.static_filters.push(crate::config::StaticGroupFilter {
            name: "Acme".to_string(),
            filter: "(o=acme)".to_string(),
        });
        let resolver = resolver(directory, &config);

        let groups = resolver.list_groups().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Acme");
        assert!(groups[0].dn.is_empty());

        let members = resolver.resolve_members(&groups[0], None).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].first("cn"), Some("joe"));
    }

    #[tokio::test]
    async fn test_missing_group_is_not_found() {
        let directory = MemoryDirectory::new().with_entries(vec![]);
        let config = DirectoryConfig::new("ldap.example.com", "dc=x");
        let resolver = resolver(directory, &config);

        let err = resolver
            .resolve_members(&group_record("cn=nope,dc=x"), None)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }
}
