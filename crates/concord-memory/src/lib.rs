//! # concord-memory
//!
//! Optional persistence for Concord runs.
//!
//! - [`store::SqliteStore`] — relational run history (generations, agent
//!   profiles, episodes, transcripts, created agents) with forward-only
//!   schema migrations and pre-migration backups
//! - [`vector::VectorMemory`] — bounded cosine-similarity retrieval over
//!   strategy-outcome embeddings

pub mod store;
pub mod vector;

pub use store::SqliteStore;
pub use vector::{SimilarStrategy, StrategyRecord, VectorMemory};
