//! Integration tests for the object/scene store

use anyhow::Result;
use cairn::similarity::cosine_similarity;
use cairn::{ObjectRecord, ObjectStorage, ObjectStoreConfig, SceneRecord};
use tempfile::TempDir;

const IMAGE_DIMS: usize = 8;
const LOCATION_DIMS: usize = 6;
const SCENE_DIMS: usize = 8;

fn open_store(dir: &TempDir) -> Result<ObjectStorage> {
    ObjectStorage::open_with_config(ObjectStoreConfig {
        persist_dir: dir.path().to_path_buf(),
        image_dimensions: IMAGE_DIMS,
        location_dimensions: LOCATION_DIMS,
        scene_dimensions: SCENE_DIMS,
    })
}

fn random_embedding(dims: usize) -> Vec<f32> {
    (0..dims).map(|_| fastrand::f32() * 2.0 - 1.0).collect()
}

/// One-hot vector with a 1.0 at `hot`
fn axis_embedding(dims: usize, hot: usize) -> Vec<f32> {
    let mut v = vec![0.0; dims];
    v[hot] = 1.0;
    v
}

fn object(id: &str, xyz: [f32; 3], scene_id: Option<&str>, image_hot: usize) -> ObjectRecord {
    ObjectRecord {
        id: id.to_string(),
        xyz,
        image_ref: format!("images/{id}.png"),
        image_embedding: axis_embedding(IMAGE_DIMS, image_hot),
        location_embedding: axis_embedding(LOCATION_DIMS, image_hot % LOCATION_DIMS),
        scene_id: scene_id.map(str::to_string),
    }
}

fn scene(id: &str, xyz: [f32; 3], hot: usize) -> SceneRecord {
    SceneRecord {
        id: id.to_string(),
        xyz,
        image_ref: format!("scenes/{id}.png"),
        embedding: axis_embedding(SCENE_DIMS, hot),
    }
}

#[test]
fn test_kitchen_scenario() -> Result<()> {
    let dir = TempDir::new()?;
    let mut storage = open_store(&dir)?;

    storage.upsert_scene(&scene("kitchen_01", [2.0, 2.5, 0.0], 0))?;
    storage.upsert_scene(&scene("bathroom_01", [8.0, 1.0, 0.0], 1))?;

    storage.upsert_object(&object("mug_01", [1.0, 2.0, 0.0], Some("kitchen_01"), 0))?;
    storage.upsert_object(&object("bottle_01", [3.5, -1.2, 0.0], Some("kitchen_01"), 1))?;

    // Scene membership is exactly the two kitchen objects; the bathroom
    // is mapped but has nothing in it yet
    let kitchen = storage.get_objects_by_scene("kitchen_01")?;
    let ids: Vec<&str> = kitchen.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["bottle_01", "mug_01"]);
    assert!(storage.get_objects_by_scene("bathroom_01")?.is_empty());

    // A mug-like crop finds the mug first
    let mut query = axis_embedding(IMAGE_DIMS, 0);
    query[1] = 0.1;
    let hits = storage.query_by_image_embedding(&query, 3)?;
    assert_eq!(hits[0].id, "mug_01");
    assert_eq!(hits[0].xyz, [1.0, 2.0, 0.0]);
    assert_eq!(hits[0].scene_id.as_deref(), Some("kitchen_01"));

    // Standing in the kitchen, only the kitchen is within a meter
    let nearby = storage.find_scenes_by_slam_coords([2.0, 2.5, 0.0], 1.0, 10)?;
    let ids: Vec<&str> = nearby.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["kitchen_01"]);

    // A towel shows up later in the bathroom
    storage.upsert_object(&object("towel_01", [8.1, 1.1, 1.2], Some("bathroom_01"), 2))?;
    let bathroom = storage.get_objects_by_scene("bathroom_01")?;
    assert_eq!(bathroom.len(), 1);
    assert_eq!(bathroom[0].id, "towel_01");

    Ok(())
}

#[test]
fn test_delete_object_removes_scene_membership() -> Result<()> {
    let dir = TempDir::new()?;
    let mut storage = open_store(&dir)?;

    storage.upsert_scene(&scene("kitchen_01", [2.0, 2.5, 0.0], 0))?;
    storage.upsert_object(&object("mug_01", [1.0, 2.0, 0.0], Some("kitchen_01"), 0))?;
    storage.upsert_object(&object("bottle_01", [3.5, -1.2, 0.0], Some("kitchen_01"), 1))?;

    storage.delete_object("mug_01")?;

    // The scene keeps only the surviving member
    let kitchen = storage.get_objects_by_scene("kitchen_01")?;
    let ids: Vec<&str> = kitchen.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["bottle_01"]);
    assert_eq!(storage.get_object("mug_01")?, None);
    Ok(())
}

#[test]
fn test_roundtrip_preserves_embeddings_exactly() -> Result<()> {
    fastrand::seed(11);
    let dir = TempDir::new()?;
    let mut storage = open_store(&dir)?;

    let record = ObjectRecord {
        id: "obj_exact".to_string(),
        xyz: [0.125, -3.5, 7.25],
        image_ref: "images/obj_exact.png".to_string(),
        image_embedding: random_embedding(IMAGE_DIMS),
        location_embedding: random_embedding(LOCATION_DIMS),
        scene_id: None,
    };
    storage.upsert_object(&record)?;

    // Bitwise equality, not approximate: the store must not re-encode floats
    let loaded = storage.get_object("obj_exact")?.unwrap();
    assert_eq!(loaded, record);
    Ok(())
}

#[test]
fn test_image_ranking_agrees_with_brute_force_cosine() -> Result<()> {
    fastrand::seed(42);
    let dir = TempDir::new()?;
    let mut storage = open_store(&dir)?;

    let mut stored: Vec<(String, Vec<f32>)> = Vec::new();
    for i in 0..6 {
        let id = format!("obj_{i}");
        let embedding = random_embedding(IMAGE_DIMS);
        storage.upsert_object(&ObjectRecord {
            id: id.clone(),
            xyz: [i as f32, 0.0, 0.0],
            image_ref: format!("images/{id}.png"),
            image_embedding: embedding.clone(),
            location_embedding: random_embedding(LOCATION_DIMS),
            scene_id: None,
        })?;
        stored.push((id, embedding));
    }

    let query = random_embedding(IMAGE_DIMS);
    let hits = storage.query_by_image_embedding(&query, 3)?;
    assert_eq!(hits.len(), 3);

    let best = stored
        .iter()
        .max_by(|a, b| {
            cosine_similarity(&query, &a.1)
                .partial_cmp(&cosine_similarity(&query, &b.1))
                .unwrap()
        })
        .unwrap();
    assert_eq!(hits[0].id, best.0, "engine top hit disagrees with brute force");

    // Engine distance is cosine distance: similarity = 1 - distance
    let expected = cosine_similarity(&query, &best.1);
    assert!(
        (1.0 - hits[0].distance - expected).abs() < 1e-3,
        "distance {} does not match similarity {}",
        hits[0].distance,
        expected
    );
    Ok(())
}

#[test]
fn test_hits_are_sorted_bounded_and_non_negative() -> Result<()> {
    fastrand::seed(7);
    let dir = TempDir::new()?;
    let mut storage = open_store(&dir)?;

    for i in 0..10 {
        storage.upsert_object(&ObjectRecord {
            id: format!("obj_{i}"),
            xyz: [0.0, 0.0, 0.0],
            image_ref: String::new(),
            image_embedding: random_embedding(IMAGE_DIMS),
            location_embedding: random_embedding(LOCATION_DIMS),
            scene_id: None,
        })?;
    }

    let query = random_embedding(IMAGE_DIMS);
    let hits = storage.query_by_image_embedding(&query, 3)?;
    assert_eq!(hits.len(), 3);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    assert!(hits.iter().all(|h| h.distance >= 0.0));

    // Asking for more than exists returns everything, still sorted
    let all = storage.query_by_image_embedding(&query, 50)?;
    assert_eq!(all.len(), 10);
    assert!(all.windows(2).all(|w| w[0].distance <= w[1].distance));
    Ok(())
}

#[test]
fn test_radius_containment() -> Result<()> {
    let dir = TempDir::new()?;
    let mut storage = open_store(&dir)?;

    let positions = [
        ("s0", [0.0, 0.0, 0.0]),
        ("s1", [0.5, 0.5, 0.0]),
        ("s2", [1.0, 0.0, 0.0]),
        ("s3", [3.0, 0.0, 0.0]),
        ("s4", [0.0, 0.0, 5.0]),
    ];
    for (i, (id, xyz)) in positions.iter().enumerate() {
        storage.upsert_scene(&scene(id, *xyz, i % SCENE_DIMS))?;
    }

    let center = [0.0, 0.0, 0.0];
    let radius = 1.0;
    let hits = storage.find_scenes_by_slam_coords(center, radius, 10)?;

    // Every hit is inside the (inclusive) radius
    for hit in &hits {
        assert!(hit.distance <= radius, "{} escaped the radius", hit.id);
    }

    // s3 and s4 lie outside and never appear
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["s0", "s1", "s2"]);

    // A tighter limit keeps the nearest hits
    let top = storage.find_scenes_by_slam_coords(center, radius, 2)?;
    let ids: Vec<&str> = top.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["s0", "s1"]);
    Ok(())
}

#[test]
fn test_location_axis_is_independent_of_image_axis() -> Result<()> {
    let dir = TempDir::new()?;
    let mut storage = open_store(&dir)?;

    // mug looks like axis 0 but sits in axis-1 surroundings;
    // bottle looks like axis 1 but sits in axis-0 surroundings
    let mut mug = object("mug_01", [0.0, 0.0, 0.0], None, 0);
    mug.location_embedding = axis_embedding(LOCATION_DIMS, 1);
    let mut bottle = object("bottle_01", [0.0, 0.0, 0.0], None, 1);
    bottle.location_embedding = axis_embedding(LOCATION_DIMS, 0);
    storage.upsert_object(&mug)?;
    storage.upsert_object(&bottle)?;

    let by_image = storage.query_by_image_embedding(&axis_embedding(IMAGE_DIMS, 0), 1)?;
    assert_eq!(by_image[0].id, "mug_01");

    let by_location = storage.query_by_location_embedding(&axis_embedding(LOCATION_DIMS, 0), 1)?;
    assert_eq!(by_location[0].id, "bottle_01");
    Ok(())
}

#[test]
fn test_queries_on_empty_store() -> Result<()> {
    let dir = TempDir::new()?;
    let storage = open_store(&dir)?;

    assert!(storage
        .query_by_image_embedding(&vec![0.0; IMAGE_DIMS], 5)?
        .is_empty());
    assert!(storage
        .query_by_scene_embedding(&vec![0.0; SCENE_DIMS], 5)?
        .is_empty());
    assert!(storage
        .find_scenes_by_slam_coords([0.0, 0.0, 0.0], 10.0, 5)?
        .is_empty());
    assert!(storage.get_objects_by_scene("anything")?.is_empty());
    Ok(())
}

#[test]
fn test_scene_query_by_embedding() -> Result<()> {
    let dir = TempDir::new()?;
    let mut storage = open_store(&dir)?;

    storage.upsert_scene(&scene("kitchen_01", [2.0, 2.5, 0.0], 0))?;
    storage.upsert_scene(&scene("bathroom_01", [8.0, 1.0, 0.0], 1))?;

    let mut query = axis_embedding(SCENE_DIMS, 1);
    query[0] = 0.2;
    let hits = storage.query_by_scene_embedding(&query, 2)?;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "bathroom_01");
    assert_eq!(hits[0].xyz, [8.0, 1.0, 0.0]);
    assert!(hits[0].distance <= hits[1].distance);
    Ok(())
}
