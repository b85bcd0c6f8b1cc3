//! cairn - spatial memory for embodied agents
//!
//! Stores what an agent has seen (objects, scenes, people) anchored to
//! SLAM coordinates, and answers the questions perception asks later:
//! "what looks like this crop", "which scene is this view", "who is this
//! face", "what scenes are near this position", "what lives in the
//! kitchen".
//!
//! # Architecture
//!
//! Dual storage strategy per store:
//! - SQLite holds the records themselves (identifiers, coordinates,
//!   references, embedding bytes)
//! - USearch keeps one HNSW index file per embedding axis for cosine
//!   nearest-neighbor search, keyed by SQLite rowid
//!
//! Everything is synchronous and single-threaded; each store owns its
//! directory exclusively while open.
//!
//! # Example
//!
//! ```no_run
//! use cairn::{ObjectRecord, ObjectStorage};
//!
//! let mut storage = ObjectStorage::open("cairn_db")?;
//!
//! storage.upsert_object(&ObjectRecord {
//!     id: "mug_01".to_string(),
//!     xyz: [1.0, 2.0, 0.0],
//!     image_ref: "images/mug_01.png".to_string(),
//!     image_embedding: vec![0.0; 128],
//!     location_embedding: vec![0.0; 64],
//!     scene_id: Some("kitchen_01".to_string()),
//! })?;
//!
//! let hits = storage.query_by_image_embedding(&vec![0.0; 128], 5)?;
//! for hit in hits {
//!     println!("{} at {:?} (distance {})", hit.id, hit.xyz, hit.distance);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod config;
pub mod similarity;
pub mod storage;

pub use config::{ObjectStoreConfig, PeopleStoreConfig};
pub use storage::types::{
    ObjectHit, ObjectRecord, PersonHit, PersonRecord, SceneHit, SceneRecord,
};
pub use storage::{ObjectStorage, PeopleStorage};
