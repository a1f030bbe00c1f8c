use crate::recognition::domain::face_embedding::FaceEmbedding;
use crate::shared::frame::Frame;

/// Domain interface for turning a face crop into an embedding.
///
/// `Ok(None)` means the provider could not produce a vector for this crop
/// (too small, degenerate). Callers skip the candidate; it is not an error.
pub trait EmbeddingProvider: Send {
    fn embed(&mut self, region: &Frame) -> Result<Option<FaceEmbedding>, Box<dyn std::error::Error>>;
}
