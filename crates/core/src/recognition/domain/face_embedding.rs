/// Fixed-length feature vector describing one face.
///
/// Two embeddings of the same person lie closer together in Euclidean
/// space than embeddings of different people.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceEmbedding(Vec<f32>);

impl FaceEmbedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    /// Euclidean distance, accumulated in f64.
    ///
    /// Callers must compare embeddings of equal dimension.
    pub fn distance(&self, other: &FaceEmbedding) -> f64 {
        debug_assert_eq!(self.dimension(), other.dimension());
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| {
                let d = *a as f64 - *b as f64;
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }
}

impl From<Vec<f32>> for FaceEmbedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}
