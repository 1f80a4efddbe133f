//! Contract for the external face-recognition provider.

use crate::error::ProviderError;
use crate::types::{DetectedFace, SearchCandidate};
use async_trait::async_trait;

/// Detection, search and face-collection membership, as consumed by the
/// workflows. Implementations own their own timeouts; the workflows never retry.
#[async_trait]
pub trait FaceProvider: Send + Sync {
    /// Detect faces with age, gender and emotion attributes.
    /// An image without a face yields an empty list, not an error.
    async fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>, ProviderError>;

    /// Search the shared face collection, best candidate first.
    async fn search(&self, image: &[u8]) -> Result<Vec<SearchCandidate>, ProviderError>;

    /// Make a detected face token searchable.
    async fn add_to_collection(&self, face_token: &str) -> Result<(), ProviderError>;
}
