//! Object and scene storage
//!
//! Dual storage strategy: SQLite is the source of truth for records, and
//! USearch keeps one HNSW index file per embedding axis for similarity
//! search, keyed by SQLite rowid. Objects carry two axes (image and
//! location context), scenes carry one.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use usearch::Index;

use crate::config::ObjectStoreConfig;
use crate::similarity::euclidean_distance;
use crate::storage::manifest::StoreManifest;
use crate::storage::types::{ObjectHit, ObjectRecord, SceneHit, SceneRecord};
use crate::storage::vectors::{
    blob_to_embedding, check_query, embedding_blob, open_index, rebuild_index, remove_vector,
    save_index, upsert_vector,
};

const OBJECTS_DB: &str = "objects.db";
const IMAGE_COLLECTION: &str = "objects_image";
const LOCATION_COLLECTION: &str = "objects_location";
const SCENE_COLLECTION: &str = "scenes";

/// Persistent store for objects and scenes
///
/// Owns one directory:
/// - `objects.db` - SQLite tables `objects` and `scenes`
/// - `objects_image.usearch` / `objects_location.usearch` - object axes
/// - `scenes.usearch` - scene axis
/// - `manifest.json` - dimensionality contract, checked on reopen
pub struct ObjectStorage {
    config: ObjectStoreConfig,
    db: Connection,
    image_index: Index,
    location_index: Index,
    scene_index: Index,
}

impl ObjectStorage {
    /// Open or create a store rooted at `dir` with default dimensions
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open_with_config(ObjectStoreConfig::new(dir.as_ref()))
    }

    /// Open or create a store with explicit configuration
    ///
    /// Fails before touching any engine file when `config` disagrees with
    /// the dimensions the store was created with.
    pub fn open_with_config(config: ObjectStoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.persist_dir).with_context(|| {
            format!(
                "Failed to create storage directory: {}",
                config.persist_dir.display()
            )
        })?;

        StoreManifest::check_or_write(
            &config.persist_dir,
            &[
                (IMAGE_COLLECTION, config.image_dimensions),
                (LOCATION_COLLECTION, config.location_dimensions),
                (SCENE_COLLECTION, config.scene_dimensions),
            ],
        )?;

        let db = Connection::open(config.persist_dir.join(OBJECTS_DB))
            .context("Failed to open object database")?;
        Self::init_schema(&db)?;

        let image_index = open_index(
            &config.persist_dir.join(format!("{IMAGE_COLLECTION}.usearch")),
            config.image_dimensions,
        )?;
        let location_index = open_index(
            &config
                .persist_dir
                .join(format!("{LOCATION_COLLECTION}.usearch")),
            config.location_dimensions,
        )?;
        let scene_index = open_index(
            &config.persist_dir.join(format!("{SCENE_COLLECTION}.usearch")),
            config.scene_dimensions,
        )?;

        let mut storage = Self {
            config,
            db,
            image_index,
            location_index,
            scene_index,
        };
        storage.recover_indices()?;
        Ok(storage)
    }

    fn init_schema(db: &Connection) -> Result<()> {
        // AUTOINCREMENT keeps rowids from being reused after deletes, so a
        // stale index entry can never resolve to the wrong record
        db.execute(
            "CREATE TABLE IF NOT EXISTS objects (
                rowid INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT UNIQUE NOT NULL,
                x REAL NOT NULL,
                y REAL NOT NULL,
                z REAL NOT NULL,
                image_ref TEXT NOT NULL,
                scene_id TEXT,
                image_embedding BLOB NOT NULL,
                location_embedding BLOB NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create objects table")?;

        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_objects_scene ON objects(scene_id)",
            [],
        )
        .context("Failed to create scene index")?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS scenes (
                rowid INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT UNIQUE NOT NULL,
                x REAL NOT NULL,
                y REAL NOT NULL,
                z REAL NOT NULL,
                image_ref TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create scenes table")?;

        Ok(())
    }

    fn index_path(&self, collection: &str) -> PathBuf {
        self.config
            .persist_dir
            .join(format!("{collection}.usearch"))
    }

    /// Insert or fully replace an object
    ///
    /// Replacement covers every field including both embeddings. The SQLite
    /// rowid stays stable across replacements, so the index entries are
    /// re-keyed in place.
    pub fn upsert_object(&mut self, record: &ObjectRecord) -> Result<()> {
        self.validate_object(record)?;

        let now = chrono::Utc::now().to_rfc3339();
        let rowid: i64 = self.db.query_row(
            "INSERT INTO objects (id, x, y, z, image_ref, scene_id, image_embedding, location_embedding, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(id) DO UPDATE SET
                 x = excluded.x,
                 y = excluded.y,
                 z = excluded.z,
                 image_ref = excluded.image_ref,
                 scene_id = excluded.scene_id,
                 image_embedding = excluded.image_embedding,
                 location_embedding = excluded.location_embedding,
                 updated_at = excluded.updated_at
             RETURNING rowid",
            params![
                record.id,
                record.xyz[0] as f64,
                record.xyz[1] as f64,
                record.xyz[2] as f64,
                record.image_ref,
                record.scene_id,
                embedding_blob(&record.image_embedding),
                embedding_blob(&record.location_embedding),
                now,
            ],
            |row| row.get(0),
        )?;

        upsert_vector(&self.image_index, rowid as u64, &record.image_embedding)?;
        upsert_vector(
            &self.location_index,
            rowid as u64,
            &record.location_embedding,
        )?;

        save_index(&self.image_index, &self.index_path(IMAGE_COLLECTION))?;
        save_index(&self.location_index, &self.index_path(LOCATION_COLLECTION))?;
        Ok(())
    }

    /// Insert or fully replace a scene
    pub fn upsert_scene(&mut self, record: &SceneRecord) -> Result<()> {
        self.validate_scene(record)?;

        let now = chrono::Utc::now().to_rfc3339();
        let rowid: i64 = self.db.query_row(
            "INSERT INTO scenes (id, x, y, z, image_ref, embedding, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(id) DO UPDATE SET
                 x = excluded.x,
                 y = excluded.y,
                 z = excluded.z,
                 image_ref = excluded.image_ref,
                 embedding = excluded.embedding,
                 updated_at = excluded.updated_at
             RETURNING rowid",
            params![
                record.id,
                record.xyz[0] as f64,
                record.xyz[1] as f64,
                record.xyz[2] as f64,
                record.image_ref,
                embedding_blob(&record.embedding),
                now,
            ],
            |row| row.get(0),
        )?;

        upsert_vector(&self.scene_index, rowid as u64, &record.embedding)?;
        save_index(&self.scene_index, &self.index_path(SCENE_COLLECTION))?;
        Ok(())
    }

    /// Find objects that look like the query image crop
    ///
    /// Returns up to `limit` hits ordered by ascending cosine distance.
    pub fn query_by_image_embedding(&self, query: &[f32], limit: usize) -> Result<Vec<ObjectHit>> {
        self.query_objects(
            &self.image_index,
            self.config.image_dimensions,
            query,
            limit,
        )
    }

    /// Find objects whose surroundings look like the query context
    ///
    /// Returns up to `limit` hits ordered by ascending cosine distance.
    pub fn query_by_location_embedding(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ObjectHit>> {
        self.query_objects(
            &self.location_index,
            self.config.location_dimensions,
            query,
            limit,
        )
    }

    /// Find scenes that look like the query view
    ///
    /// Returns up to `limit` hits ordered by ascending cosine distance.
    pub fn query_by_scene_embedding(&self, query: &[f32], limit: usize) -> Result<Vec<SceneHit>> {
        check_query(self.config.scene_dimensions, query)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let matches = self
            .scene_index
            .search(query, limit)
            .context("Failed to search scene index")?;

        let mut hits = Vec::with_capacity(matches.keys.len());
        for (key, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            if let Some(hit) = self.scene_hit_by_rowid(*key as i64, distance.max(0.0))? {
                hits.push(hit);
            }
        }
        Ok(hits)
    }

    /// Find scenes whose anchor point lies within `radius` meters of `xyz`
    ///
    /// Returns up to `limit` hits ordered by ascending Euclidean distance.
    /// The boundary is inclusive: a scene exactly `radius` away is a hit.
    pub fn find_scenes_by_slam_coords(
        &self,
        xyz: [f32; 3],
        radius: f32,
        limit: usize,
    ) -> Result<Vec<SceneHit>> {
        let mut stmt = self
            .db
            .prepare("SELECT id, x, y, z, image_ref FROM scenes")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut hits = Vec::new();
        for (id, x, y, z, image_ref) in rows {
            let scene_xyz = [x as f32, y as f32, z as f32];
            let distance = euclidean_distance(&scene_xyz, &xyz);
            if distance <= radius {
                hits.push(SceneHit {
                    id,
                    xyz: scene_xyz,
                    image_ref,
                    distance,
                });
            }
        }

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// All objects assigned to a scene, ordered by id
    ///
    /// Unknown scene ids simply return an empty list.
    pub fn get_objects_by_scene(&self, scene_id: &str) -> Result<Vec<ObjectRecord>> {
        let mut stmt = self.db.prepare(
            "SELECT id, x, y, z, image_ref, scene_id, image_embedding, location_embedding
             FROM objects WHERE scene_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![scene_id], object_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(hydrate_object).collect()
    }

    /// Fetch one object by id, embeddings included
    pub fn get_object(&self, id: &str) -> Result<Option<ObjectRecord>> {
        let row = self
            .db
            .query_row(
                "SELECT id, x, y, z, image_ref, scene_id, image_embedding, location_embedding
                 FROM objects WHERE id = ?1",
                params![id],
                object_row,
            )
            .optional()?;

        row.map(hydrate_object).transpose()
    }

    /// Fetch one scene by id, embedding included
    pub fn get_scene(&self, id: &str) -> Result<Option<SceneRecord>> {
        let row = self
            .db
            .query_row(
                "SELECT id, x, y, z, image_ref, embedding FROM scenes WHERE id = ?1",
                params![id],
                scene_row,
            )
            .optional()?;

        row.map(hydrate_scene).transpose()
    }

    /// Remove an object and its index entries. Unknown ids are a no-op.
    pub fn delete_object(&mut self, id: &str) -> Result<()> {
        let rowid: Option<i64> = self
            .db
            .query_row(
                "SELECT rowid FROM objects WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let rowid = match rowid {
            Some(rowid) => rowid,
            None => return Ok(()),
        };

        self.db
            .execute("DELETE FROM objects WHERE rowid = ?1", params![rowid])?;
        remove_vector(&self.image_index, rowid as u64)?;
        remove_vector(&self.location_index, rowid as u64)?;
        save_index(&self.image_index, &self.index_path(IMAGE_COLLECTION))?;
        save_index(&self.location_index, &self.index_path(LOCATION_COLLECTION))?;
        Ok(())
    }

    /// Remove a scene and its index entry. Unknown ids are a no-op.
    ///
    /// Objects pointing at the scene keep their `scene_id`; the reference
    /// is soft.
    pub fn delete_scene(&mut self, id: &str) -> Result<()> {
        let rowid: Option<i64> = self
            .db
            .query_row(
                "SELECT rowid FROM scenes WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let rowid = match rowid {
            Some(rowid) => rowid,
            None => return Ok(()),
        };

        self.db
            .execute("DELETE FROM scenes WHERE rowid = ?1", params![rowid])?;
        remove_vector(&self.scene_index, rowid as u64)?;
        save_index(&self.scene_index, &self.index_path(SCENE_COLLECTION))?;
        Ok(())
    }

    /// Number of stored objects
    pub fn count_objects(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM objects", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Number of stored scenes
    pub fn count_scenes(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM scenes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn validate_object(&self, record: &ObjectRecord) -> Result<()> {
        if record.id.is_empty() {
            bail!("Object id must not be empty");
        }
        if record.xyz.iter().any(|v| !v.is_finite()) {
            bail!(
                "Object '{}' has non-finite coordinates: {:?}",
                record.id,
                record.xyz
            );
        }
        if record.image_embedding.len() != self.config.image_dimensions {
            bail!(
                "Image embedding dimension mismatch for object '{}': expected {}, got {}",
                record.id,
                self.config.image_dimensions,
                record.image_embedding.len()
            );
        }
        if record.location_embedding.len() != self.config.location_dimensions {
            bail!(
                "Location embedding dimension mismatch for object '{}': expected {}, got {}",
                record.id,
                self.config.location_dimensions,
                record.location_embedding.len()
            );
        }
        Ok(())
    }

    fn validate_scene(&self, record: &SceneRecord) -> Result<()> {
        if record.id.is_empty() {
            bail!("Scene id must not be empty");
        }
        if record.xyz.iter().any(|v| !v.is_finite()) {
            bail!(
                "Scene '{}' has non-finite coordinates: {:?}",
                record.id,
                record.xyz
            );
        }
        if record.embedding.len() != self.config.scene_dimensions {
            bail!(
                "Scene embedding dimension mismatch for scene '{}': expected {}, got {}",
                record.id,
                self.config.scene_dimensions,
                record.embedding.len()
            );
        }
        Ok(())
    }

    fn query_objects(
        &self,
        index: &Index,
        dimensions: usize,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ObjectHit>> {
        check_query(dimensions, query)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let matches = index
            .search(query, limit)
            .context("Failed to search object index")?;

        let mut hits = Vec::with_capacity(matches.keys.len());
        for (key, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            // Cosine distance can come back as -0.0 from float error
            if let Some(hit) = self.object_hit_by_rowid(*key as i64, distance.max(0.0))? {
                hits.push(hit);
            }
        }
        Ok(hits)
    }

    fn object_hit_by_rowid(&self, rowid: i64, distance: f32) -> Result<Option<ObjectHit>> {
        let hit = self
            .db
            .query_row(
                "SELECT id, x, y, z, image_ref, scene_id FROM objects WHERE rowid = ?1",
                params![rowid],
                |row| {
                    Ok(ObjectHit {
                        id: row.get(0)?,
                        xyz: [
                            row.get::<_, f64>(1)? as f32,
                            row.get::<_, f64>(2)? as f32,
                            row.get::<_, f64>(3)? as f32,
                        ],
                        image_ref: row.get(4)?,
                        scene_id: row.get(5)?,
                        distance,
                    })
                },
            )
            .optional()?;
        Ok(hit)
    }

    fn scene_hit_by_rowid(&self, rowid: i64, distance: f32) -> Result<Option<SceneHit>> {
        let hit = self
            .db
            .query_row(
                "SELECT id, x, y, z, image_ref FROM scenes WHERE rowid = ?1",
                params![rowid],
                |row| {
                    Ok(SceneHit {
                        id: row.get(0)?,
                        xyz: [
                            row.get::<_, f64>(1)? as f32,
                            row.get::<_, f64>(2)? as f32,
                            row.get::<_, f64>(3)? as f32,
                        ],
                        image_ref: row.get(4)?,
                        distance,
                    })
                },
            )
            .optional()?;
        Ok(hit)
    }

    /// Rebuild any index whose entry count disagrees with SQLite
    ///
    /// Covers missing or deleted index files. SQLite is the source of
    /// truth; index files are derived state.
    fn recover_indices(&mut self) -> Result<()> {
        let object_count = self.count_objects()?;
        if self.image_index.size() != object_count || self.location_index.size() != object_count {
            let (image_rows, location_rows) = self.object_embedding_rows()?;
            if self.image_index.size() != object_count {
                self.image_index = rebuild_index(
                    &self.index_path(IMAGE_COLLECTION),
                    self.config.image_dimensions,
                    &image_rows,
                )?;
            }
            if self.location_index.size() != object_count {
                self.location_index = rebuild_index(
                    &self.index_path(LOCATION_COLLECTION),
                    self.config.location_dimensions,
                    &location_rows,
                )?;
            }
        }

        let scene_count = self.count_scenes()?;
        if self.scene_index.size() != scene_count {
            let rows = self.scene_embedding_rows()?;
            self.scene_index = rebuild_index(
                &self.index_path(SCENE_COLLECTION),
                self.config.scene_dimensions,
                &rows,
            )?;
        }

        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn object_embedding_rows(&self) -> Result<(Vec<(i64, Vec<f32>)>, Vec<(i64, Vec<f32>)>)> {
        let mut stmt = self
            .db
            .prepare("SELECT rowid, image_embedding, location_embedding FROM objects")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut image_rows = Vec::with_capacity(rows.len());
        let mut location_rows = Vec::with_capacity(rows.len());
        for (rowid, image_blob, location_blob) in rows {
            image_rows.push((rowid, blob_to_embedding(&image_blob)?));
            location_rows.push((rowid, blob_to_embedding(&location_blob)?));
        }
        Ok((image_rows, location_rows))
    }

    fn scene_embedding_rows(&self) -> Result<Vec<(i64, Vec<f32>)>> {
        let mut stmt = self.db.prepare("SELECT rowid, embedding FROM scenes")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (rowid, blob) in rows {
            out.push((rowid, blob_to_embedding(&blob)?));
        }
        Ok(out)
    }
}

fn object_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(ObjectRecord, Vec<u8>, Vec<u8>)> {
    Ok((
        ObjectRecord {
            id: row.get(0)?,
            xyz: [
                row.get::<_, f64>(1)? as f32,
                row.get::<_, f64>(2)? as f32,
                row.get::<_, f64>(3)? as f32,
            ],
            image_ref: row.get(4)?,
            scene_id: row.get(5)?,
            image_embedding: Vec::new(),
            location_embedding: Vec::new(),
        },
        row.get(6)?,
        row.get(7)?,
    ))
}

fn hydrate_object(
    (mut record, image_blob, location_blob): (ObjectRecord, Vec<u8>, Vec<u8>),
) -> Result<ObjectRecord> {
    record.image_embedding = blob_to_embedding(&image_blob)?;
    record.location_embedding = blob_to_embedding(&location_blob)?;
    Ok(record)
}

fn scene_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(SceneRecord, Vec<u8>)> {
    Ok((
        SceneRecord {
            id: row.get(0)?,
            xyz: [
                row.get::<_, f64>(1)? as f32,
                row.get::<_, f64>(2)? as f32,
                row.get::<_, f64>(3)? as f32,
            ],
            image_ref: row.get(4)?,
            embedding: Vec::new(),
        },
        row.get(5)?,
    ))
}

fn hydrate_scene((mut record, blob): (SceneRecord, Vec<u8>)) -> Result<SceneRecord> {
    record.embedding = blob_to_embedding(&blob)?;
    Ok(record)
}
