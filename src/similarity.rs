//! Similarity and distance metrics
//!
//! Euclidean distance backs the SLAM-coordinate radius search; cosine
//! similarity is the counterpart of the engine's cosine distance, exported
//! for callers that want to re-score hits against their own embeddings.

/// Compute Euclidean (L2) distance between two points or vectors
///
/// Returns a value >= 0.0. Used for radius search over SLAM coordinates,
/// where both arguments are 3-element slices in meters.
///
/// # Panics
/// Panics if the slices have different lengths
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(
        a.len(),
        b.len(),
        "Vectors must have same dimension: {} vs {}",
        a.len(),
        b.len()
    );

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Compute cosine similarity between two embedding vectors
///
/// Returns a value between -1.0 and 1.0. The engine reports cosine
/// *distance*, so `similarity = 1.0 - distance` for any query hit.
///
/// # Panics
/// Panics if the slices have different lengths
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(
        a.len(),
        b.len(),
        "Vectors must have same dimension: {} vs {}",
        a.len(),
        b.len()
    );

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    // Zero-magnitude vectors have no direction
    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}
