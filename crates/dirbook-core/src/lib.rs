//! # dirbook-core
//!
//! Collaborator abstractions for the dirbook directory-backed contact store:
//! the [`DirectoryClient`] trait behind which the wire-level directory
//! protocol lives, the [`Cache`] storage trait, the raw entry model, the
//! shared error taxonomy, and the reversible record-identifier codec.
//!
//! The adapter logic itself (schema mapping, group resolution, search and
//! mutation planning) lives in the `dirbook-ldap` crate.

pub mod cache;
pub mod client;
pub mod entry;
pub mod error;
pub mod ids;
pub mod memory;

// Re-exports
pub use cache::{Cache, MemoryCache};
pub use client::DirectoryClient;
pub use entry::{
    parent_dn, AttrMap, DirectoryEntry, Scope, SearchOptions, SearchOutcome, VlvWindow,
};
pub use error::{LastError, StoreError, StoreResult};
pub use ids::{decode_id, encode_id};
pub use memory::MemoryDirectory;
