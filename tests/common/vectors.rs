use index_loader::DatasetVector;

/// `n` vectors of dimension `dims` where vector `i` sits at `i` on every
/// axis, so nearest-neighbor order around any vector is known in advance.
pub fn line_vectors(n: usize, dims: usize) -> Vec<DatasetVector> {
    (0..n)
        .map(|i| DatasetVector::new(i as u64, vec![i as f32; dims]))
        .collect()
}

pub fn identifiers(vectors: &[DatasetVector]) -> Vec<u64> {
    vectors.iter().map(|v| v.identifier).collect()
}
