//! People storage
//!
//! Same dual storage strategy as the object store, with one twist: every
//! person has a face embedding, but the pose embedding is optional. A
//! person without a pose simply has no entry in the pose index and is
//! invisible to pose queries.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use usearch::Index;

use crate::config::PeopleStoreConfig;
use crate::storage::manifest::StoreManifest;
use crate::storage::types::{PersonHit, PersonRecord};
use crate::storage::vectors::{
    blob_to_embedding, check_query, embedding_blob, open_index, rebuild_index, remove_vector,
    save_index, upsert_vector,
};

const PEOPLE_DB: &str = "people.db";
const FACE_COLLECTION: &str = "people_face";
const POSE_COLLECTION: &str = "people_pose";

/// Persistent store for people
///
/// Owns one directory:
/// - `people.db` - SQLite table `people`
/// - `people_face.usearch` / `people_pose.usearch` - embedding axes
/// - `manifest.json` - dimensionality contract, checked on reopen
pub struct PeopleStorage {
    config: PeopleStoreConfig,
    db: Connection,
    face_index: Index,
    pose_index: Index,
}

impl PeopleStorage {
    /// Open or create a store rooted at `dir` with default dimensions
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open_with_config(PeopleStoreConfig::new(dir.as_ref()))
    }

    /// Open or create a store with explicit configuration
    ///
    /// Fails before touching any engine file when `config` disagrees with
    /// the dimensions the store was created with.
    pub fn open_with_config(config: PeopleStoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.persist_dir).with_context(|| {
            format!(
                "Failed to create storage directory: {}",
                config.persist_dir.display()
            )
        })?;

        StoreManifest::check_or_write(
            &config.persist_dir,
            &[
                (FACE_COLLECTION, config.face_dimensions),
                (POSE_COLLECTION, config.pose_dimensions),
            ],
        )?;

        let db = Connection::open(config.persist_dir.join(PEOPLE_DB))
            .context("Failed to open people database")?;
        Self::init_schema(&db)?;

        let face_index = open_index(
            &config.persist_dir.join(format!("{FACE_COLLECTION}.usearch")),
            config.face_dimensions,
        )?;
        let pose_index = open_index(
            &config.persist_dir.join(format!("{POSE_COLLECTION}.usearch")),
            config.pose_dimensions,
        )?;

        let mut storage = Self {
            config,
            db,
            face_index,
            pose_index,
        };
        storage.recover_indices()?;
        Ok(storage)
    }

    fn init_schema(db: &Connection) -> Result<()> {
        // AUTOINCREMENT keeps rowids from being reused after deletes, so a
        // stale index entry can never resolve to the wrong record
        db.execute(
            "CREATE TABLE IF NOT EXISTS people (
                rowid INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT UNIQUE NOT NULL,
                x REAL NOT NULL,
                y REAL NOT NULL,
                z REAL NOT NULL,
                timeframe TEXT,
                chat_history_ref TEXT,
                face_embedding BLOB NOT NULL,
                pose_embedding BLOB,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create people table")?;

        Ok(())
    }

    fn index_path(&self, collection: &str) -> PathBuf {
        self.config
            .persist_dir
            .join(format!("{collection}.usearch"))
    }

    /// Insert or fully replace a person
    ///
    /// Replacement covers every field. Re-upserting without a pose
    /// embedding drops the person from the pose axis.
    pub fn upsert_person(&mut self, record: &PersonRecord) -> Result<()> {
        self.validate_person(record)?;

        let now = chrono::Utc::now().to_rfc3339();
        let pose_blob = record.pose_embedding.as_deref().map(embedding_blob);
        let rowid: i64 = self.db.query_row(
            "INSERT INTO people (id, x, y, z, timeframe, chat_history_ref, face_embedding, pose_embedding, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(id) DO UPDATE SET
                 x = excluded.x,
                 y = excluded.y,
                 z = excluded.z,
                 timeframe = excluded.timeframe,
                 chat_history_ref = excluded.chat_history_ref,
                 face_embedding = excluded.face_embedding,
                 pose_embedding = excluded.pose_embedding,
                 updated_at = excluded.updated_at
             RETURNING rowid",
            params![
                record.id,
                record.xyz[0] as f64,
                record.xyz[1] as f64,
                record.xyz[2] as f64,
                record.timeframe,
                record.chat_history_ref,
                embedding_blob(&record.face_embedding),
                pose_blob,
                now,
            ],
            |row| row.get(0),
        )?;

        upsert_vector(&self.face_index, rowid as u64, &record.face_embedding)?;
        match &record.pose_embedding {
            Some(pose) => upsert_vector(&self.pose_index, rowid as u64, pose)?,
            None => remove_vector(&self.pose_index, rowid as u64)?,
        }

        save_index(&self.face_index, &self.index_path(FACE_COLLECTION))?;
        save_index(&self.pose_index, &self.index_path(POSE_COLLECTION))?;
        Ok(())
    }

    /// Find people whose face matches the query
    ///
    /// Returns up to `limit` hits ordered by ascending cosine distance.
    pub fn query_by_face_embedding(&self, query: &[f32], limit: usize) -> Result<Vec<PersonHit>> {
        self.query_people(&self.face_index, self.config.face_dimensions, query, limit)
    }

    /// Find people whose body configuration matches the query
    ///
    /// Only people stored with a pose embedding can be returned.
    pub fn query_by_pose_embedding(&self, query: &[f32], limit: usize) -> Result<Vec<PersonHit>> {
        self.query_people(&self.pose_index, self.config.pose_dimensions, query, limit)
    }

    /// Fetch one person by id, embeddings included
    pub fn get_person(&self, id: &str) -> Result<Option<PersonRecord>> {
        let row = self
            .db
            .query_row(
                "SELECT id, x, y, z, timeframe, chat_history_ref, face_embedding, pose_embedding
                 FROM people WHERE id = ?1",
                params![id],
                person_row,
            )
            .optional()?;

        row.map(hydrate_person).transpose()
    }

    /// Fetch one person by face identifier
    ///
    /// Face identifiers are the person id in this store, so this is an
    /// alias for [`get_person`](Self::get_person), kept for callers that
    /// address people by recognized face.
    pub fn get_person_by_face_id(&self, face_id: &str) -> Result<Option<PersonRecord>> {
        self.get_person(face_id)
    }

    /// Remove a person and their index entries. Unknown ids are a no-op.
    pub fn delete_person(&mut self, id: &str) -> Result<()> {
        let rowid: Option<i64> = self
            .db
            .query_row(
                "SELECT rowid FROM people WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let rowid = match rowid {
            Some(rowid) => rowid,
            None => return Ok(()),
        };

        self.db
            .execute("DELETE FROM people WHERE rowid = ?1", params![rowid])?;
        remove_vector(&self.face_index, rowid as u64)?;
        remove_vector(&self.pose_index, rowid as u64)?;
        save_index(&self.face_index, &self.index_path(FACE_COLLECTION))?;
        save_index(&self.pose_index, &self.index_path(POSE_COLLECTION))?;
        Ok(())
    }

    /// Number of stored people
    pub fn count_people(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM people", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn validate_person(&self, record: &PersonRecord) -> Result<()> {
        if record.id.is_empty() {
            bail!("Person id must not be empty");
        }
        if record.xyz.iter().any(|v| !v.is_finite()) {
            bail!(
                "Person '{}' has non-finite coordinates: {:?}",
                record.id,
                record.xyz
            );
        }
        if record.face_embedding.len() != self.config.face_dimensions {
            bail!(
                "Face embedding dimension mismatch for person '{}': expected {}, got {}",
                record.id,
                self.config.face_dimensions,
                record.face_embedding.len()
            );
        }
        if let Some(pose) = &record.pose_embedding {
            if pose.len() != self.config.pose_dimensions {
                bail!(
                    "Pose embedding dimension mismatch for person '{}': expected {}, got {}",
                    record.id,
                    self.config.pose_dimensions,
                    pose.len()
                );
            }
        }
        Ok(())
    }

    fn query_people(
        &self,
        index: &Index,
        dimensions: usize,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<PersonHit>> {
        check_query(dimensions, query)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let matches = index
            .search(query, limit)
            .context("Failed to search people index")?;

        let mut hits = Vec::with_capacity(matches.keys.len());
        for (key, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            // Cosine distance can come back as -0.0 from float error
            if let Some(hit) = self.person_hit_by_rowid(*key as i64, distance.max(0.0))? {
                hits.push(hit);
            }
        }
        Ok(hits)
    }

    fn person_hit_by_rowid(&self, rowid: i64, distance: f32) -> Result<Option<PersonHit>> {
        let hit = self
            .db
            .query_row(
                "SELECT id, x, y, z, timeframe, chat_history_ref FROM people WHERE rowid = ?1",
                params![rowid],
                |row| {
                    Ok(PersonHit {
                        id: row.get(0)?,
                        xyz: [
                            row.get::<_, f64>(1)? as f32,
                            row.get::<_, f64>(2)? as f32,
                            row.get::<_, f64>(3)? as f32,
                        ],
                        timeframe: row.get(4)?,
                        chat_history_ref: row.get(5)?,
                        distance,
                    })
                },
            )
            .optional()?;
        Ok(hit)
    }

    /// Rebuild any index whose entry count disagrees with SQLite
    ///
    /// The pose index only covers rows that have a pose embedding.
    fn recover_indices(&mut self) -> Result<()> {
        let face_count = self.count_people()?;
        if self.face_index.size() != face_count {
            let rows = self.face_embedding_rows()?;
            self.face_index = rebuild_index(
                &self.index_path(FACE_COLLECTION),
                self.config.face_dimensions,
                &rows,
            )?;
        }

        let pose_count: i64 = self.db.query_row(
            "SELECT COUNT(*) FROM people WHERE pose_embedding IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        if self.pose_index.size() != pose_count as usize {
            let rows = self.pose_embedding_rows()?;
            self.pose_index = rebuild_index(
                &self.index_path(POSE_COLLECTION),
                self.config.pose_dimensions,
                &rows,
            )?;
        }

        Ok(())
    }

    fn face_embedding_rows(&self) -> Result<Vec<(i64, Vec<f32>)>> {
        let mut stmt = self
            .db
            .prepare("SELECT rowid, face_embedding FROM people")?;
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

    fn pose_embedding_rows(&self) -> Result<Vec<(i64, Vec<f32>)>> {
        let mut stmt = self
            .db
            .prepare("SELECT rowid, pose_embedding FROM people WHERE pose_embedding IS NOT NULL")?;
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

fn person_row(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<(PersonRecord, Vec<u8>, Option<Vec<u8>>)> {
    Ok((
        PersonRecord {
            id: row.get(0)?,
            xyz: [
                row.get::<_, f64>(1)? as f32,
                row.get::<_, f64>(2)? as f32,
                row.get::<_, f64>(3)? as f32,
            ],
            timeframe: row.get(4)?,
            chat_history_ref: row.get(5)?,
            face_embedding: Vec::new(),
            pose_embedding: None,
        },
        row.get(6)?,
        row.get(7)?,
    ))
}

fn hydrate_person(
    (mut record, face_blob, pose_blob): (PersonRecord, Vec<u8>, Option<Vec<u8>>),
) -> Result<PersonRecord> {
    record.face_embedding = blob_to_embedding(&face_blob)?;
    record.pose_embedding = match pose_blob {
        Some(blob) => Some(blob_to_embedding(&blob)?),
        None => None,
    };
    Ok(record)
}
