//! Contact store facade
//!
//! One `ContactStore` per configured directory source. The store owns the
//! component set built from the configuration (catalog, codec, filter
//! builder, group resolver, paginator, mutation planner) and threads every
//! operation through them sequentially. Collaborators come in as trait
//! objects so tests run against the in-memory directory.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, instrument, warn};

use dirbook_core::cache::Cache;
use dirbook_core::client::DirectoryClient;
use dirbook_core::entry::{parent_dn, AttrMap};
use dirbook_core::error::{LastError, StoreError, StoreResult};
use dirbook_core::ids::{decode_id, encode_id};

use crate::autovalue;
use crate::codec::RecordCodec;
use crate::config::DirectoryConfig;
use crate::filter::{FilterBuilder, SearchSpec};
use crate::groups::{group_variant, GroupRecord, GroupResolver, GroupVariant};
use crate::mutation::{escape_dn_value, MutationPlanner};
use crate::pager::{PageRequest, Paginator, ResultWindow};
use crate::record::LogicalRecord;
use crate::schema::FieldCatalog;

const ANY_FILTER: &str = "(objectclass=*)";

/// One page of decoded contact records.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    /// Absolute offset of the first record.
    pub first: usize,
    /// Size of the full result set.
    pub total: usize,
    /// The decoded records of this page.
    pub records: Vec<LogicalRecord>,
}

/// Directory-backed contact store.
pub struct ContactStore {
    config: DirectoryConfig,
    client: Arc<dyn DirectoryClient>,
    catalog: Arc<FieldCatalog>,
    codec: RecordCodec,
    filters: FilterBuilder,
    groups: GroupResolver,
    pager: Paginator,
    planner: MutationPlanner,
    active_group: Mutex<Option<GroupRecord>>,
    last_error: Mutex<Option<LastError>>,
}

impl ContactStore {
    /// Build a store context from a validated configuration.
    pub fn new(
        config: DirectoryConfig,
        client: Arc<dyn DirectoryClient>,
        cache: Arc<dyn Cache>,
    ) -> StoreResult<Self> {
        config.validate()?;
        let catalog = Arc::new(FieldCatalog::build(&config));
        Ok(Self {
            codec: RecordCodec::new(catalog.clone(), &config),
            filters: FilterBuilder::new(catalog.clone(), &config),
            groups: GroupResolver::new(client.clone(), cache, &config),
            pager: Paginator::new(client.clone(), &config),
            planner: MutationPlanner::new(&config),
            catalog,
            client,
            config,
            active_group: Mutex::new(None),
            last_error: Mutex::new(None),
        })
    }

    /// The most recent surfaced error, if any.
    pub fn last_error(&self) -> Option<LastError> {
        self.last_error
            .lock()
            .expect("store lock poisoned")
            .clone()
    }

    /// Connect and bind, trying each configured host once in order. A bind
    /// failure on one host is recovered by moving on to the next; only
    /// after every host failed is the session given up.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> StoreResult<()> {
        let result = self.connect_inner().await;
        self.track(result)
    }

    async fn connect_inner(&self) -> StoreResult<()> {
        for host in &self.config.hosts {
            if let Err(err) = self.client.connect(host).await {
                warn!(host = %host, error = %err, "connect failed, trying next host");
                continue;
            }
            match self.bind().await {
                Ok(()) => {
                    info!(host = %host, "directory session established");
                    return Ok(());
                }
                Err(err) => {
                    warn!(host = %host, error = %err, "bind failed, trying next host");
                }
            }
        }
        Err(StoreError::connection_failed(
            "all configured hosts exhausted",
        ))
    }

    async fn bind(&self) -> StoreResult<()> {
        let dn = self.config.bind_dn.as_deref().unwrap_or_default();
        let password = self.config.bind_password.as_deref().unwrap_or_default();
        if self.config.use_sasl {
            self.client
                .sasl_bind(dn, password, self.config.sasl_authz_id.as_deref())
                .await
        } else if dn.is_empty() {
            // Anonymous session.
            Ok(())
        } else {
            self.client.bind(dn, password).await
        }
    }

    /// List one page of contacts, scoped to the active group when one is
    /// selected.
    #[instrument(skip(self))]
    pub async fn list_records(&self, request: &PageRequest) -> StoreResult<RecordPage> {
        let result = self.listing(None, request).await;
        self.track(result)
    }

    /// Search contacts and return one page of matches.
    #[instrument(skip(self, spec))]
    pub async fn search(
        &self,
        spec: &SearchSpec,
        request: &PageRequest,
    ) -> StoreResult<RecordPage> {
        let result = match self.filters.build(spec) {
            Ok(filter) => self.listing(Some(filter), request).await,
            Err(err) => Err(err),
        };
        self.track(result)
    }

    async fn listing(
        &self,
        filter: Option<String>,
        request: &PageRequest,
    ) -> StoreResult<RecordPage> {
        if let Some(group) = self.selected_group() {
            // The built filter already carries the base filter; a plain
            // listing intersects with it explicitly.
            let active = filter.as_deref().or(self.config.filter.as_deref());
            let members = self.groups.resolve_members(&group, active).await?;
            let window = self
                .pager
                .window_members(members, &self.member_sort_attr(), request);
            return Ok(self.decode_window(window));
        }

        let filter = filter.unwrap_or_else(|| self.base_filter().to_string());
        let window = self
            .pager
            .list(
                &self.config.base_dn,
                self.config.scope,
                &filter,
                &self.catalog.attributes(),
                request,
            )
            .await?;
        Ok(self.decode_window(window))
    }

    /// Number of contacts in the current context (group or whole source).
    pub async fn count(&self) -> StoreResult<usize> {
        let result = self.count_inner().await;
        self.track(result)
    }

    async fn count_inner(&self) -> StoreResult<usize> {
        if let Some(group) = self.selected_group() {
            let members = self
                .groups
                .resolve_members(&group, self.config.filter.as_deref())
                .await?;
            return Ok(members.len());
        }
        self.client
            .count(&self.config.base_dn, self.config.scope, self.base_filter())
            .await
    }

    /// Fetch a single contact by its identifier.
    #[instrument(skip(self))]
    pub async fn get_record(&self, id: &str) -> StoreResult<LogicalRecord> {
        let result = self.get_record_inner(id).await;
        self.track(result)
    }

    async fn get_record_inner(&self, id: &str) -> StoreResult<LogicalRecord> {
        let dn = decode_id(id)?;
        let attrs = self.catalog.attributes();
        let entry = self
            .client
            .read_entry(&dn, ANY_FILTER, &attrs)
            .await?
            .ok_or_else(|| StoreError::not_found(id))?;
        Ok(self.codec.decode(&entry))
    }

    /// Check required fields, optionally deriving missing name parts first:
    /// a two-part display name fills first and last name, and a missing
    /// display name is composed from them.
    pub fn validate(&self, record: &mut LogicalRecord, autofix: bool) -> StoreResult<()> {
        let result = self.validate_inner(record, autofix);
        self.track(result)
    }

    fn validate_inner(&self, record: &mut LogicalRecord, autofix: bool) -> StoreResult<()> {
        if autofix {
            let display = record.scalar("name").map(str::to_string);
            let firstname = record.scalar("firstname").map(str::to_string);
            let surname = record.scalar("surname").map(str::to_string);

            if firstname.is_none() && surname.is_none() {
                if let Some(display) = &display {
                    let parts: Vec<&str> = display.split_whitespace().collect();
                    if let [first, last] = parts[..] {
                        record.set("firstname", first);
                        record.set("surname", last);
                    }
                }
            }
            if display.is_none() {
                if let (Some(first), Some(last)) = (
                    record.scalar("firstname").map(str::to_string),
                    record.scalar("surname").map(str::to_string),
                ) {
                    record.set("name", format!("{first} {last}"));
                }
            }
        }

        let missing: Vec<String> = self
            .catalog
            .required()
            .iter()
            .filter(|field| !has_value(record, field))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StoreError::validation(missing))
        }
    }

    /// Create a contact and return its identifier.
    #[instrument(skip(self, record))]
    pub async fn create_record(&self, record: &mut LogicalRecord) -> StoreResult<String> {
        let result = self.create_inner(record).await;
        self.track(result)
    }

    async fn create_inner(&self, record: &mut LogicalRecord) -> StoreResult<String> {
        self.validate_inner(record, true)?;

        let mut attrs = self.codec.encode(record);
        autovalue::apply(&self.config.autovalues, record, &mut attrs);

        let name_attr = self.config.name_attr.to_lowercase();
        let name_value = attrs
            .get(&name_attr)
            .and_then(|values| values.first())
            .cloned()
            .ok_or_else(|| StoreError::validation(vec!["name".to_string()]))?;
        attrs.insert(
            "objectclass".to_string(),
            self.config.object_classes.clone(),
        );

        // Sub-field values become child entries, not attributes.
        let mut subs: Vec<(String, String, String)> = Vec::new();
        for (attr, object_class) in &self.config.sub_fields {
            let attr = attr.to_lowercase();
            if let Some(values) = attrs.remove(&attr) {
                for value in values.into_iter().filter(|v| !v.is_empty()) {
                    subs.push((attr.clone(), value, object_class.clone()));
                }
            }
        }

        let dn = format!(
            "{name_attr}={},{}",
            escape_dn_value(&name_value),
            self.config.base_dn
        );
        self.client
            .add(&dn, &attrs)
            .await
            .map_err(|err| StoreError::save_with_source("create", err.to_string(), err))?;

        for (attr, value, object_class) in subs {
            let sub_dn = format!("{attr}={},{dn}", escape_dn_value(&value));
            let mut sub_attrs = AttrMap::new();
            sub_attrs.insert("objectclass".to_string(), vec![object_class]);
            sub_attrs.insert(attr, vec![value]);
            self.client.add(&sub_dn, &sub_attrs).await.map_err(|err| {
                StoreError::save_with_source("sub-entry creation", err.to_string(), err)
            })?;
        }

        info!(dn = %dn, "contact created");
        Ok(encode_id(&dn))
    }

    /// Save a modified contact. Returns the identifier, which changes when
    /// the save renames the entry.
    #[instrument(skip(self, record))]
    pub async fn save_record(
        &self,
        id: &str,
        record: &mut LogicalRecord,
    ) -> StoreResult<String> {
        let result = self.save_inner(id, record).await;
        self.track(result)
    }

    async fn save_inner(&self, id: &str, record: &mut LogicalRecord) -> StoreResult<String> {
        if record.read_only {
            return Err(StoreError::invalid_data("record is read-only"));
        }
        self.validate_inner(record, false)?;

        let dn = decode_id(id)?;
        record.dn = dn.clone();
        let new_attrs = self.codec.encode(record);
        let plan = self.planner.plan(record, &new_attrs);
        if plan.is_empty() {
            debug!(dn = %dn, "save is a no-op");
            return Ok(id.to_string());
        }

        let final_dn = self.planner.apply(&self.client, &dn, &plan).await?;
        if plan.rename.is_some() {
            // Member references to the old DN are stale now.
            self.groups.invalidate();
        }
        Ok(encode_id(&final_dn))
    }

    /// Delete a contact, its child entries first.
    #[instrument(skip(self))]
    pub async fn delete_record(&self, id: &str) -> StoreResult<()> {
        let result = self.delete_inner(id).await;
        self.track(result)
    }

    async fn delete_inner(&self, id: &str) -> StoreResult<()> {
        let dn = decode_id(id)?;
        let children = self.client.list_entries(&dn, ANY_FILTER, &[]).await?;
        for child in children {
            self.client
                .delete(&child.dn)
                .await
                .map_err(|err| StoreError::save_with_source("sub-entry removal", err.to_string(), err))?;
        }
        self.client
            .delete(&dn)
            .await
            .map_err(|err| StoreError::save_with_source("delete", err.to_string(), err))?;
        self.groups.invalidate();
        info!(dn = %dn, "contact deleted");
        Ok(())
    }

    /// All groups of this source.
    pub async fn list_groups(&self) -> StoreResult<Vec<GroupRecord>> {
        let result = self.groups.list_groups().await;
        self.track(result)
    }

    /// A single group by identifier.
    pub async fn get_group(&self, id: &str) -> StoreResult<GroupRecord> {
        let result = self.groups.get_group(id).await;
        self.track(result)
    }

    /// Select the group subsequent listings are scoped to, or clear the
    /// selection.
    pub async fn set_group(&self, id: Option<&str>) -> StoreResult<()> {
        let result = match id {
            None => {
                *self.active_group.lock().expect("store lock poisoned") = None;
                Ok(())
            }
            Some(id) => match self.groups.get_group(id).await {
                Ok(group) => {
                    *self.active_group.lock().expect("store lock poisoned") = Some(group);
                    Ok(())
                }
                Err(err) => Err(err),
            },
        };
        self.track(result)
    }

    /// Create a group and return its record.
    #[instrument(skip(self))]
    pub async fn create_group(&self, name: &str) -> StoreResult<GroupRecord> {
        let result = self.create_group_inner(name).await;
        self.track(result)
    }

    async fn create_group_inner(&self, name: &str) -> StoreResult<GroupRecord> {
        let name_attr = self.config.groups.name_attr.to_lowercase();
        let dn = format!(
            "{name_attr}={},{}",
            escape_dn_value(name),
            self.config.group_base_dn()
        );
        let mut attrs = AttrMap::new();
        attrs.insert(
            "objectclass".to_string(),
            self.config.groups.object_classes.clone(),
        );
        attrs.insert(name_attr, vec![name.to_string()]);
        self.client
            .add(&dn, &attrs)
            .await
            .map_err(|err| StoreError::save_with_source("group creation", err.to_string(), err))?;
        self.groups.invalidate();
        info!(dn = %dn, "group created");
        Ok(GroupRecord {
            id: encode_id(&dn),
            name: name.to_string(),
            dn,
            emails: Vec::new(),
            filter: None,
            variant: None,
        })
    }

    /// Rename a group. Returns the record under its new identifier.
    #[instrument(skip(self))]
    pub async fn rename_group(&self, id: &str, new_name: &str) -> StoreResult<GroupRecord> {
        let result = self.rename_group_inner(id, new_name).await;
        self.track(result)
    }

    async fn rename_group_inner(&self, id: &str, new_name: &str) -> StoreResult<GroupRecord> {
        let dn = decode_id(id)?;
        let name_attr = self.config.groups.name_attr.to_lowercase();
        let new_rdn = format!("{name_attr}={}", escape_dn_value(new_name));
        self.client
            .rename(&dn, &new_rdn, None, true)
            .await
            .map_err(|err| StoreError::save_with_source("group rename", err.to_string(), err))?;
        let new_dn = match parent_dn(&dn) {
            Some(parent) => format!("{new_rdn},{parent}"),
            None => new_rdn,
        };
        self.groups.invalidate();
        Ok(GroupRecord {
            id: encode_id(&new_dn),
            name: new_name.to_string(),
            dn: new_dn,
            emails: Vec::new(),
            filter: None,
            variant: None,
        })
    }

    /// Delete a group.
    #[instrument(skip(self))]
    pub async fn delete_group(&self, id: &str) -> StoreResult<()> {
        let result = self.delete_group_inner(id).await;
        self.track(result)
    }

    async fn delete_group_inner(&self, id: &str) -> StoreResult<()> {
        let dn = decode_id(id)?;
        self.client
            .delete(&dn)
            .await
            .map_err(|err| StoreError::save_with_source("group removal", err.to_string(), err))?;
        self.groups.invalidate();

        let mut active = self.active_group.lock().expect("store lock poisoned");
        if active.as_ref().is_some_and(|g| g.id == id) {
            *active = None;
        }
        Ok(())
    }

    /// Add contacts to a static group. Returns how many were added.
    #[instrument(skip(self, contact_ids))]
    pub async fn add_to_group(
        &self,
        group_id: &str,
        contact_ids: &[String],
    ) -> StoreResult<usize> {
        let result = self
            .change_membership(group_id, contact_ids, true)
            .await;
        self.track(result)
    }

    /// Remove contacts from a static group. Returns how many were removed.
    #[instrument(skip(self, contact_ids))]
    pub async fn remove_from_group(
        &self,
        group_id: &str,
        contact_ids: &[String],
    ) -> StoreResult<usize> {
        let result = self
            .change_membership(group_id, contact_ids, false)
            .await;
        self.track(result)
    }

    async fn change_membership(
        &self,
        group_id: &str,
        contact_ids: &[String],
        add: bool,
    ) -> StoreResult<usize> {
        let group = self.groups.get_group(group_id).await?;
        if group.dn.is_empty() {
            return Err(StoreError::invalid_data(
                "filter-defined groups have no explicit membership",
            ));
        }
        // Classification is cached with the listing; read the entry only
        // when the record has none yet.
        let variant = match group.variant {
            Some(variant) => variant,
            None => {
                let entry = self
                    .client
                    .read_entry(&group.dn, ANY_FILTER, &[])
                    .await?
                    .ok_or_else(|| StoreError::not_found(group_id))?;
                group_variant(&entry, &self.config.groups)
            }
        };
        let GroupVariant::Static { member_attr } = variant else {
            return Err(StoreError::invalid_data(
                "dynamic group membership is derived, not assigned",
            ));
        };

        let mut dns: Vec<String> = Vec::new();
        for id in contact_ids {
            dns.push(decode_id(id)?);
        }
        let count = dns.len();
        let mut attrs = AttrMap::new();
        attrs.insert(member_attr, dns);

        let (step, result) = if add {
            ("group membership add", self.client.mod_add(&group.dn, &attrs).await)
        } else {
            (
                "group membership removal",
                self.client.mod_delete(&group.dn, &attrs).await,
            )
        };
        result.map_err(|err| StoreError::save_with_source(step, err.to_string(), err))?;
        self.groups.invalidate();
        Ok(count)
    }

    /// One page of a group's resolved members.
    #[instrument(skip(self))]
    pub async fn list_group_members(
        &self,
        id: &str,
        request: &PageRequest,
    ) -> StoreResult<RecordPage> {
        let result = self.list_members_inner(id, request).await;
        self.track(result)
    }

    async fn list_members_inner(
        &self,
        id: &str,
        request: &PageRequest,
    ) -> StoreResult<RecordPage> {
        let group = self.groups.get_group(id).await?;
        let members = self
            .groups
            .resolve_members(&group, self.config.filter.as_deref())
            .await?;
        let window = self
            .pager
            .window_members(members, &self.member_sort_attr(), request);
        Ok(self.decode_window(window))
    }

    fn base_filter(&self) -> &str {
        self.config.filter.as_deref().unwrap_or(ANY_FILTER)
    }

    fn member_sort_attr(&self) -> String {
        self.config
            .sort_attr
            .clone()
            .unwrap_or_else(|| self.config.name_attr.clone())
    }

    fn selected_group(&self) -> Option<GroupRecord> {
        self.active_group
            .lock()
            .expect("store lock poisoned")
            .clone()
    }

    fn decode_window(&self, window: ResultWindow) -> RecordPage {
        RecordPage {
            first: window.first,
            total: window.total,
            records: window
                .records
                .iter()
                .map(|entry| self.codec.decode(entry))
                .collect(),
        }
    }

    fn track<T>(&self, result: StoreResult<T>) -> StoreResult<T> {
        if let Err(err) = &result {
            *self.last_error.lock().expect("store lock poisoned") =
                Some(LastError::from(err));
        }
        result
    }
}

/// Whether a logical field (under its base or any subtyped key) carries a
/// non-empty value.
fn has_value(record: &LogicalRecord, field: &str) -> bool {
    let prefix = format!("{field}:");
    record
        .fields
        .iter()
        .any(|(key, value)| (key == field || key.starts_with(&prefix)) && !value.is_empty())
}
