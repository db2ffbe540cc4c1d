//! Persona aggregation and storage.
//!
//! Raw records recovered from model output are cleaned and numbered by the
//! aggregator, then written to disk by the store.

pub mod aggregator;
pub mod store;

pub use aggregator::{dedup_last_wins, Aggregation, IdentityNormalizer, PersonaAggregator, TextNormalizer};
pub use store::{PersistedPaths, PersonaStore};
