//! Store configuration
//!
//! Each store owns one directory on disk and a fixed dimensionality per
//! embedding axis. Dimensions are locked in when the store directory is
//! first created; reopening with different values is an error.

use std::path::PathBuf;

/// Configuration for [`ObjectStorage`](crate::ObjectStorage)
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStoreConfig {
    /// Directory holding the SQLite database and index files
    pub persist_dir: PathBuf,
    /// Dimensionality of object image embeddings
    pub image_dimensions: usize,
    /// Dimensionality of object location-context embeddings
    pub location_dimensions: usize,
    /// Dimensionality of scene embeddings
    pub scene_dimensions: usize,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from("cairn_db"),
            image_dimensions: 128,
            location_dimensions: 64,
            scene_dimensions: 256,
        }
    }
}

impl ObjectStoreConfig {
    /// Configuration rooted at `persist_dir` with default dimensions
    pub fn new<P: Into<PathBuf>>(persist_dir: P) -> Self {
        Self {
            persist_dir: persist_dir.into(),
            ..Default::default()
        }
    }
}

/// Configuration for [`PeopleStorage`](crate::PeopleStorage)
#[derive(Debug, Clone, PartialEq)]
pub struct PeopleStoreConfig {
    /// Directory holding the SQLite database and index files
    pub persist_dir: PathBuf,
    /// Dimensionality of face embeddings
    pub face_dimensions: usize,
    /// Dimensionality of pose embeddings
    pub pose_dimensions: usize,
}

impl Default for PeopleStoreConfig {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from("cairn_people_db"),
            face_dimensions: 512,
            pose_dimensions: 256,
        }
    }
}

impl PeopleStoreConfig {
    /// Configuration rooted at `persist_dir` with default dimensions
    pub fn new<P: Into<PathBuf>>(persist_dir: P) -> Self {
        Self {
            persist_dir: persist_dir.into(),
            ..Default::default()
        }
    }
}
