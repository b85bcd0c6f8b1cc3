//! Record and result types for the stores
//!
//! Plain data structs. Records are what callers write and read back;
//! hit types are the trimmed rows similarity queries return, with the
//! engine distance attached.

use serde::{Deserialize, Serialize};

/// A physical object anchored to SLAM coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Caller-chosen stable identifier, e.g. "mug_01"
    pub id: String,
    /// SLAM coordinates in meters
    pub xyz: [f32; 3],
    /// Path or URI of the source image crop
    pub image_ref: String,
    /// Visual appearance axis
    pub image_embedding: Vec<f32>,
    /// Surrounding-context axis
    pub location_embedding: Vec<f32>,
    /// Scene this object belongs to, if assigned. Soft reference: the
    /// scene does not have to exist in the scenes table.
    pub scene_id: Option<String>,
}

/// A spatial region such as a room or a mapped area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRecord {
    /// Caller-chosen stable identifier, e.g. "kitchen_01"
    pub id: String,
    /// Representative SLAM coordinates in meters, typically the centroid
    pub xyz: [f32; 3],
    /// Path or URI of a representative image
    pub image_ref: String,
    /// Whole-scene appearance axis
    pub embedding: Vec<f32>,
}

/// A person the agent has encountered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    /// Caller-chosen stable identifier
    pub id: String,
    /// SLAM coordinates of the last known position, in meters
    pub xyz: [f32; 3],
    /// Free-form description of when the person was seen
    pub timeframe: Option<String>,
    /// Pointer to an external conversation log
    pub chat_history_ref: Option<String>,
    /// Identity axis, always present
    pub face_embedding: Vec<f32>,
    /// Body-configuration axis. Absent when no pose was captured; such
    /// records are invisible to pose queries.
    pub pose_embedding: Option<Vec<f32>>,
}

/// Object row returned by similarity queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectHit {
    pub id: String,
    pub xyz: [f32; 3],
    pub image_ref: String,
    pub scene_id: Option<String>,
    /// Cosine distance to the query, ascending and >= 0.0
    pub distance: f32,
}

/// Scene row returned by similarity and coordinate queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneHit {
    pub id: String,
    pub xyz: [f32; 3],
    pub image_ref: String,
    /// Distance to the query: cosine distance for embedding queries,
    /// Euclidean meters for coordinate search. Ascending and >= 0.0.
    pub distance: f32,
}

/// Person row returned by similarity queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonHit {
    pub id: String,
    pub xyz: [f32; 3],
    pub timeframe: Option<String>,
    pub chat_history_ref: Option<String>,
    /// Cosine distance to the query, ascending and >= 0.0
    pub distance: f32,
}
