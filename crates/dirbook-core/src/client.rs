//! DirectoryClient collaborator trait
//!
//! The wire-level directory protocol (connection establishment, bind
//! sequencing, primitive search/add/modify/delete/rename calls) lives behind
//! this trait. The adapter core only ever issues these calls sequentially and
//! checks every result; a failed call is surfaced immediately and never
//! retried here.

use async_trait::async_trait;

use crate::entry::{AttrMap, DirectoryEntry, Scope, SearchOptions, SearchOutcome};
use crate::error::StoreResult;

/// Primitive operations of a hierarchical directory service.
///
/// Server-side result windowing is requested per call through
/// [`SearchOptions::vlv`] rather than connection-level state.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Establish a connection to the given host.
    async fn connect(&self, host: &str) -> StoreResult<()>;

    /// Simple bind with the given DN and password.
    async fn bind(&self, dn: &str, password: &str) -> StoreResult<()>;

    /// SASL bind with the given identity, password and optional
    /// authorization id.
    async fn sasl_bind(
        &self,
        identity: &str,
        password: &str,
        authz_id: Option<&str>,
    ) -> StoreResult<()>;

    /// Search below `base` with the given scope and filter.
    async fn search(
        &self,
        base: &str,
        scope: Scope,
        filter: &str,
        options: &SearchOptions,
    ) -> StoreResult<SearchOutcome>;

    /// Count matching entries without materializing them (dn-only search).
    async fn count(&self, base: &str, scope: Scope, filter: &str) -> StoreResult<usize>;

    /// Read a single entry by DN, `None` when it does not exist or does not
    /// match the filter.
    async fn read_entry(
        &self,
        dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> StoreResult<Option<DirectoryEntry>>;

    /// List the direct children of `base` matching the filter.
    async fn list_entries(
        &self,
        base: &str,
        filter: &str,
        attributes: &[String],
    ) -> StoreResult<Vec<DirectoryEntry>>;

    /// Add a new entry.
    async fn add(&self, dn: &str, attrs: &AttrMap) -> StoreResult<()>;

    /// Add values to existing attributes.
    async fn mod_add(&self, dn: &str, attrs: &AttrMap) -> StoreResult<()>;

    /// Replace attribute values.
    async fn mod_replace(&self, dn: &str, attrs: &AttrMap) -> StoreResult<()>;

    /// Delete attribute values; an empty value list removes the attribute.
    async fn mod_delete(&self, dn: &str, attrs: &AttrMap) -> StoreResult<()>;

    /// Rename an entry to a new RDN, optionally moving it under a new parent.
    async fn rename(
        &self,
        dn: &str,
        new_rdn: &str,
        new_parent: Option<&str>,
        delete_old: bool,
    ) -> StoreResult<()>;

    /// Delete an entry.
    async fn delete(&self, dn: &str) -> StoreResult<()>;
}
