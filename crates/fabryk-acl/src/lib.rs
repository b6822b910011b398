//! Resource-scoped access control for Fabryk.
//!
//! This crate answers "may this actor do X to this resource?" from ordered
//! grant and deny entries attached to each resource. Deny entries are
//! evaluated before allow entries, and anything not explicitly allowed is
//! refused.
//!
//! # Features
//!
//! - `acl-sqlite`: Enable SQLite-backed entry storage via `sqlx`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       fabryk-acl                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  AuthorizationGate (ModifyPolicy + batch validation)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  AccessEngine (evaluate / check / add / remove / reorder)   │
//! │  └── DecisionCache (LRU, invalidated per resource)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SubjectRegistry            │  ResourceRegistry             │
//! │  ├── EveryoneResolver       │  └── StaticResourceResolver   │
//! │  └── DirectoryResolver      │                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EntryStore trait                                           │
//! │  ├── MemoryEntryStore (always available)                    │
//! │  └── SqliteEntryStore (feature: acl-sqlite)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PermissionCatalog (interned permission names)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use fabryk_acl::{
//!     AccessEngine, AclConfig, DirectoryResolver, Principal, ResourceKey,
//!     SimpleResource, StaticDirectory,
//! };
//! use std::sync::Arc;
//!
//! let accounts = Arc::new(StaticDirectory::new(["bob"]));
//! let engine = AccessEngine::builder(AclConfig::default())
//!     .with_subject_resolver(Arc::new(DirectoryResolver::new("account", accounts)))
//!     .build()
//!     .await?;
//!
//! let news = SimpleResource::new(ResourceKey::new("board", "news"), ["read", "post"]);
//! engine.add(&news, &["account:bob"], &["read"], None, false).await?;
//!
//! let bob = Principal::named("account", "bob");
//! assert!(engine.check(&bob, &news, "read").await);
//! ```

// Core modules
pub mod error;
pub mod permission;
pub mod types;

// Subjects and resources
pub mod resource;
pub mod subject;

// Storage, evaluation and administration
pub mod cache;
pub mod config;
pub mod engine;
pub mod gate;
pub mod store;

// Re-exports: core types
pub use error::{
    AclError, ErrorKind, Rejections, Result, SubjectRejection, SubjectRejectionReason,
};
pub use permission::{Permission, PermissionCatalog, ALL};
pub use types::{Entry, EntryId, EntryKey, ResourceKey, SubjectRef};

// Re-exports: subjects and resources
pub use resource::{
    Resource, ResourceRegistry, ResourceResolver, SimpleResource, StaticResourceResolver,
    DEFAULT_MODE,
};
pub use subject::{
    Actor, DirectoryResolver, EveryoneResolver, Principal, StaticDirectory, SubjectDirectory,
    SubjectRegistry, SubjectResolver,
};

// Re-exports: engine and gate
pub use cache::DecisionCache;
pub use config::{AclConfig, CacheConfig, StoreBackend, StoreConfig};
pub use engine::{AccessEngine, AccessEngineBuilder, Decision, Validated};
pub use gate::{AllowAll, AuthorizationGate, FnPolicy, ModifyPolicy};

// Re-exports: storage
pub use store::{create_entry_store, EntryStore, MemoryEntryStore};

// Feature-gated re-exports
#[cfg(feature = "acl-sqlite")]
pub use store::SqliteEntryStore;
