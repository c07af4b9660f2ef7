mod common;

use std::fs;

use photosearch::Error;
use photosearch::index::FlatIndex;
use rstest::*;
use tempfile::TempDir;

const DIM: usize = 32;

#[fixture]
fn vectors() -> Vec<Vec<f32>> {
    common::random_unit_vectors(50, DIM, 42)
}

#[fixture]
fn index(vectors: Vec<Vec<f32>>) -> FlatIndex {
    let mut index = FlatIndex::new(DIM);
    for v in &vectors {
        index.add(v).unwrap();
    }
    index
}

#[rstest]
fn count_grows_by_one(vectors: Vec<Vec<f32>>) {
    let mut index = FlatIndex::new(DIM);
    for (i, v) in vectors.iter().enumerate() {
        assert_eq!(index.add(v).unwrap(), i);
        assert_eq!(index.count(), i + 1);
    }
}

#[rstest]
fn self_query_scores_one(index: FlatIndex, vectors: Vec<Vec<f32>>) {
    for (i, v) in vectors.iter().enumerate() {
        let result = index.search(v, 1).unwrap();
        assert_eq!(result[0].ordinal, i);
        assert!((result[0].score - 1.0).abs() < 1e-5);
    }
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(10)]
#[case(50)]
#[case(100)]
fn returns_min_k_n_sorted(index: FlatIndex, vectors: Vec<Vec<f32>>, #[case] k: usize) {
    let result = index.search(&vectors[7], k).unwrap();
    assert_eq!(result.len(), k.min(50));
    assert!(result.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn empty_index_returns_nothing() {
    let index = FlatIndex::new(DIM);
    assert!(index.search(&vec![0.0; DIM], 5).unwrap().is_empty());
}

#[test]
fn wrong_dimension_is_rejected() {
    let mut index = FlatIndex::new(3);
    assert!(matches!(
        index.add(&[1.0, 0.0]),
        Err(Error::DimensionMismatch { expected: 3, actual: 2 })
    ));
    assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 1).is_err());
    assert_eq!(index.count(), 0);
}

#[test]
fn parallel_direction_outranks_orthogonal() {
    let v1 = [1.0, 0.0, 0.0];
    let v2 = [1.0, 0.0, 0.0];
    let v3 = [0.0, 1.0, 0.0];
    let mut index = FlatIndex::new(3);
    for v in [v1, v2, v3] {
        index.add(&v).unwrap();
    }

    let result = index.search(&v1, 3).unwrap();
    let ordinals: Vec<_> = result.iter().map(|n| n.ordinal).collect();
    assert_eq!(ordinals, [0, 1, 2]);
    assert!((result[0].score - 1.0).abs() < 1e-5);
    assert!((result[1].score - 1.0).abs() < 1e-5);
    assert!(result[2].score < result[1].score);
}

#[rstest]
fn save_and_load_round_trip(index: FlatIndex, vectors: Vec<Vec<f32>>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index.bin");
    index.save(&path).unwrap();

    let loaded = FlatIndex::load(&path).unwrap();
    assert_eq!(loaded.count(), index.count());
    assert_eq!(loaded.dimension(), DIM);
    for q in vectors.iter().take(5) {
        assert_eq!(loaded.search(q, 10).unwrap(), index.search(q, 10).unwrap());
    }
}

#[test]
fn parallel_search_matches_sequential() {
    let vectors = common::random_unit_vectors(5000, 8, 7);
    let mut index = FlatIndex::new(8);
    for v in &vectors {
        index.add(v).unwrap();
    }
    let result = index.search(&vectors[4321], 5).unwrap();
    assert_eq!(result[0].ordinal, 4321);
    assert!(result.windows(2).all(|w| w[0].score >= w[1].score));
}

#[rstest]
fn truncated_file_is_corrupt(index: FlatIndex) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index.bin");
    index.save(&path).unwrap();

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
    assert!(matches!(FlatIndex::load(&path), Err(Error::Corrupt(_))));

    fs::write(&path, b"JUNKJUNKJUNK").unwrap();
    assert!(matches!(FlatIndex::load(&path), Err(Error::Corrupt(_))));
}
