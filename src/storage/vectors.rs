//! Shared USearch index plumbing and embedding byte codec
//!
//! Every store keeps one HNSW index file per embedding axis, keyed by the
//! SQLite rowid of the record. These helpers cover the lifecycle the stores
//! share: create, load, grow, re-key, persist, and rebuild from rows.

use anyhow::{bail, Context, Result};
use std::path::Path;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};
use zerocopy::AsBytes;

/// Initial slot reservation for a fresh index
pub(crate) const INITIAL_CAPACITY: usize = 1000;

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("Index path is not valid UTF-8: {}", path.display()))
}

/// Create an empty cosine index for the given dimensionality
pub(crate) fn create_index(dimensions: usize) -> Result<Index> {
    let options = IndexOptions {
        dimensions,
        metric: MetricKind::Cos,
        quantization: ScalarKind::F32,
        ..Default::default()
    };

    let index = Index::new(&options).context("Failed to create USearch index")?;
    index
        .reserve(INITIAL_CAPACITY)
        .context("Failed to reserve USearch index capacity")?;
    Ok(index)
}

/// Create an index and load its file if one exists on disk
pub(crate) fn open_index(path: &Path, dimensions: usize) -> Result<Index> {
    let index = create_index(dimensions)?;
    if path.exists() {
        index
            .load(path_str(path)?)
            .with_context(|| format!("Failed to load USearch index: {}", path.display()))?;
    }
    Ok(index)
}

/// Persist an index to its file
pub(crate) fn save_index(index: &Index, path: &Path) -> Result<()> {
    index
        .save(path_str(path)?)
        .with_context(|| format!("Failed to save USearch index: {}", path.display()))?;
    Ok(())
}

/// Add a vector under `key`, replacing any vector already stored there
///
/// USearch rejects duplicate keys, so replacement is remove-then-add.
pub(crate) fn upsert_vector(index: &Index, key: u64, vector: &[f32]) -> Result<()> {
    if index.contains(key) {
        index
            .remove(key)
            .context("Failed to remove stale vector from USearch index")?;
    }

    if index.size() >= index.capacity() {
        // Loaded files can come back with zero spare capacity
        let target = (index.capacity() * 2).max(INITIAL_CAPACITY);
        index
            .reserve(target)
            .context("Failed to grow USearch index capacity")?;
    }

    index
        .add(key, vector)
        .context("Failed to add vector to USearch index")?;
    Ok(())
}

/// Remove the vector under `key` if one is present
pub(crate) fn remove_vector(index: &Index, key: u64) -> Result<()> {
    if index.contains(key) {
        index
            .remove(key)
            .context("Failed to remove vector from USearch index")?;
    }
    Ok(())
}

/// Build a fresh index from `(rowid, embedding)` rows and persist it
///
/// Used at open time when an index file is missing or out of step with
/// SQLite, which is the source of truth.
pub(crate) fn rebuild_index(
    path: &Path,
    dimensions: usize,
    rows: &[(i64, Vec<f32>)],
) -> Result<Index> {
    let index = create_index(dimensions)?;
    if rows.len() > index.capacity() {
        index
            .reserve(rows.len())
            .context("Failed to reserve USearch index capacity")?;
    }

    for (rowid, embedding) in rows {
        index
            .add(*rowid as u64, embedding)
            .context("Failed to add vector while rebuilding USearch index")?;
    }

    save_index(&index, path)?;
    Ok(index)
}

/// Validate a query vector against the axis dimensionality
pub(crate) fn check_query(expected: usize, query: &[f32]) -> Result<()> {
    if query.len() != expected {
        bail!(
            "Query embedding dimension mismatch: expected {}, got {}",
            expected,
            query.len()
        );
    }
    Ok(())
}

/// View an embedding as native-endian bytes for BLOB storage
pub(crate) fn embedding_blob(embedding: &[f32]) -> &[u8] {
    embedding.as_bytes()
}

/// Decode an embedding BLOB written by [`embedding_blob`]
pub(crate) fn blob_to_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        bail!(
            "Embedding blob length {} is not a multiple of 4",
            blob.len()
        );
    }

    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
