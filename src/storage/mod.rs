//! Storage layer - SQLite + USearch hybrid storage
//!
//! Two independent stores share one strategy: SQLite is the source of
//! truth, USearch keeps one HNSW index file per embedding axis, and the
//! SQLite rowid is the key tying the halves together.
//!
//! - [`ObjectStorage`] - objects and scenes, three axes
//! - [`PeopleStorage`] - people, face axis plus optional pose axis

pub mod objects;
pub mod people;
pub mod types;

mod manifest;
mod vectors;

pub use objects::ObjectStorage;
pub use people::PeopleStorage;
pub use types::{ObjectHit, ObjectRecord, PersonHit, PersonRecord, SceneHit, SceneRecord};
