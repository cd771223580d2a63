//! In-memory storage backend for Portcullis.
//!
//! This crate provides in-memory implementations of the `PolicyStore` and
//! `EventStore` traits from `portcullis-policy`, using a papaya lock-free
//! HashMap for concurrent policy access. Policies are held in their
//! *persisted* document form and decoded through the condition registry on
//! every read, so the backend exercises the same round-trip path as the
//! PostgreSQL backend and mirrors its candidate-narrowing semantics exactly.
//!
//! Intended for tests, local development, and embedding.
//!
//! # Example
//!
//! ```ignore
//! use portcullis_memory::InMemoryPolicyStore;
//! use portcullis_policy::{AccessRequest, PolicyStore};
//!
//! let store = InMemoryPolicyStore::new("eliving");
//!
//! let created = store.create(policy).await?;
//! let candidates = store
//!     .find_request_candidates(&AccessRequest::new("groups:editors", "room:5", "enter"))
//!     .await?;
//! ```

mod event;
mod policy;

pub use event::InMemoryEventStore;
pub use policy::InMemoryPolicyStore;

// Re-export the storage traits for convenience
pub use portcullis_policy::{EventStore, PolicyStore};
