//! # dirbook-ldap
//!
//! Directory-backed contact store: maps a deployment-defined logical contact
//! schema onto directory entries and exposes listing, search, group and
//! mutation operations over any [`dirbook_core::DirectoryClient`].
//!
//! The entry point is [`ContactStore`], built once per source from a
//! [`DirectoryConfig`]:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dirbook_core::{MemoryCache, MemoryDirectory};
//! use dirbook_ldap::{ContactStore, DirectoryConfig};
//!
//! # async fn example() -> dirbook_core::StoreResult<()> {
//! let config = DirectoryConfig::new("ldap.example.com", "ou=people,dc=example,dc=com")
//!     .with_bind("cn=admin,dc=example,dc=com", "secret")
//!     .with_field("name", "cn")
//!     .with_field("surname", "sn")
//!     .with_field("email", "mail:*");
//!
//! let store = ContactStore::new(
//!     config,
//!     Arc::new(MemoryDirectory::new()),
//!     Arc::new(MemoryCache::new()),
//! )?;
//! store.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod autovalue;
pub mod codec;
pub mod config;
pub mod filter;
pub mod groups;
pub mod mutation;
pub mod pager;
pub mod record;
pub mod schema;
pub mod store;

// Re-exports
pub use codec::{is_group_entry, RecordCodec};
pub use config::{DirectoryConfig, GroupConfig, StaticGroupFilter};
pub use filter::{FilterBuilder, MatchMode, SearchSpec};
pub use groups::{GroupCache, GroupRecord, GroupResolver, GroupVariant};
pub use mutation::{escape_dn_value, MutationPlan, MutationPlanner};
pub use pager::{PageRequest, Paginator, ResultWindow};
pub use record::{FieldValue, LogicalRecord, RecordKind};
pub use schema::{FieldCatalog, FieldSpec};
pub use store::{ContactStore, RecordPage};
