//! Dataset sources for the benchmark runner.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{LoaderError, Result};
use crate::types::DatasetVector;

/// Generate `n` seeded vectors of dimension `dims` with values in [-1, 1].
pub fn random_vectors(n: usize, dims: usize, seed: u64) -> Vec<DatasetVector> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| DatasetVector::new(i as u64, (0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect()))
        .collect()
}

/// Pick `count` query vectors from `vectors`, perturbed by uniform noise of
/// at most `noise` per coordinate.
pub fn sample_queries(vectors: &[DatasetVector], count: usize, noise: f32, seed: u64) -> Vec<Vec<f32>> {
    if vectors.is_empty() {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let base = &vectors[rng.gen_range(0..vectors.len())];
            base.values
                .iter()
                .map(|&x| if noise > 0.0 { x + rng.gen_range(-noise..noise) } else { x })
                .collect()
        })
        .collect()
}

/// Load a JSON file holding an array of vectors (`[[f32, ...], ...]`).
/// Rows are numbered by position and must share one dimension.
pub fn load_json(path: &Path) -> Result<Vec<DatasetVector>> {
    let contents = std::fs::read_to_string(path)?;
    let rows: Vec<Vec<f32>> = serde_json::from_str(&contents)?;

    if let Some(first) = rows.first() {
        let dims = first.len();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != dims) {
            return Err(LoaderError::Config(format!(
                "{}: row {i} has {} dimensions, expected {dims}",
                path.display(),
                row.len()
            )));
        }
    }
    Ok(DatasetVector::enumerate(rows))
}
