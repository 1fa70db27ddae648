use eigenface_core::{
    CachePolicy, DistanceMetric, FaceSpaceRegistry, RegistryConfig, TrainingGroup,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WIDTH: usize = 8;
const HEIGHT: usize = 8;
const GROUP_SIZE: usize = 4;
const GROUPS: usize = 3;

fn synthetic_faces(seed: u64) -> Vec<(String, Vec<f64>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..GROUP_SIZE * GROUPS)
        .map(|i| {
            let pixels = (0..WIDTH * HEIGHT).map(|_| rng.gen_range(0.0..255.0)).collect();
            (format!("subject{i:02}.pgm"), pixels)
        })
        .collect()
}

fn groups(faces: &[(String, Vec<f64>)]) -> Vec<TrainingGroup> {
    faces
        .chunks(GROUP_SIZE)
        .map(|chunk| TrainingGroup {
            faces: chunk.iter().map(|(_, p)| p.clone()).collect(),
            identifiers: chunk.iter().map(|(id, _)| id.clone()).collect(),
            width: WIDTH,
            height: HEIGHT,
        })
        .collect()
}

#[test]
fn test_every_training_face_recognizes_itself() {
    let faces = synthetic_faces(2024);
    let config = RegistryConfig { group_size: GROUP_SIZE, ..RegistryConfig::default() };
    let mut registry = FaceSpaceRegistry::new(config);
    registry.build_from(groups(&faces)).unwrap();
    assert_eq!(registry.len(), GROUPS);

    for (id, pixels) in &faces {
        let recognition = registry.recognize(pixels).unwrap().expect("registry not empty");
        assert_eq!(recognition.identifier(), Some(id.as_str()));
        assert!(recognition.distance() < 1e-6, "{id}: {}", recognition.distance());
    }
}

#[test]
fn test_slightly_perturbed_face_still_matches() {
    let faces = synthetic_faces(7);
    let config = RegistryConfig {
        group_size: GROUP_SIZE,
        metric: DistanceMetric::Manhattan,
        ..RegistryConfig::default()
    };
    let mut registry = FaceSpaceRegistry::new(config);
    registry.build_from(groups(&faces)).unwrap();

    let mut rng = StdRng::seed_from_u64(99);
    let (id, pixels) = &faces[5];
    let noisy: Vec<f64> = pixels.iter().map(|p| p + rng.gen_range(-0.5..0.5)).collect();

    let recognition = registry.recognize(&noisy).unwrap().unwrap();
    assert_eq!(recognition.identifier(), Some(id.as_str()));
    assert!(recognition.distance() > 0.0);
}

#[test]
fn test_cached_registry_answers_identically() {
    let dir = tempfile::tempdir().unwrap();
    let faces = synthetic_faces(11);
    let config = RegistryConfig {
        group_size: GROUP_SIZE,
        threshold: Some(50.0),
        cache_dir: Some(dir.path().to_path_buf()),
        ..RegistryConfig::default()
    };

    let mut fresh = FaceSpaceRegistry::new(config.clone());
    let report = fresh.build_with_policy(groups(&faces), CachePolicy::Refresh).unwrap();
    assert_eq!(report.built, GROUPS);

    let mut cached = FaceSpaceRegistry::new(config);
    let report = cached.build_from(groups(&faces)).unwrap();
    assert_eq!(report.loaded, GROUPS);

    let query = &faces[9].1;
    let a = fresh.recognize(query).unwrap().unwrap();
    let b = cached.recognize(query).unwrap().unwrap();
    assert_eq!(a, b);
    assert!(a.accepted);
}
