//! Identity resolution: decide whether an image shows a registered user or
//! a stranger, and record strangers.

use crate::error::IdentityError;
use crate::notify::AlertNotifier;
use crate::provider::FaceProvider;
use crate::store::IdentityStore;
use crate::types::{DetectedFace, FaceAttributes, NewVisitor, Resolution, Visitor};
use std::sync::Arc;

/// Minimum search confidence (0 to 100) for a candidate to count as a match.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 85.0;

pub struct ResolutionEngine {
    provider: Arc<dyn FaceProvider>,
    store: Arc<dyn IdentityStore>,
    notifier: Arc<dyn AlertNotifier>,
    threshold: f64,
}

impl ResolutionEngine {
    pub fn new(
        provider: Arc<dyn FaceProvider>,
        store: Arc<dyn IdentityStore>,
        notifier: Arc<dyn AlertNotifier>,
    ) -> Self {
        Self {
            provider,
            store,
            notifier,
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Attributes of the primary face, without any identity lookup.
    pub async fn describe(&self, image: &[u8]) -> Result<FaceAttributes, IdentityError> {
        if image.is_empty() {
            return Err(IdentityError::NoImageSupplied);
        }
        Ok(self.primary_face(image).await?.attributes)
    }

    /// Resolve an image to a registered user, or record it as a visitor.
    ///
    /// A visitor row is written only on [`Resolution::VisitorRecorded`]. The
    /// provider's face collection is never modified.
    pub async fn resolve(&self, image: &[u8]) -> Result<Resolution, IdentityError> {
        if image.is_empty() {
            return Err(IdentityError::NoImageSupplied);
        }

        let candidates = self.provider.search(image).await?;
        match candidates.first() {
            Some(best) if best.confidence >= self.threshold => {
                if let Some(user) = self.store.find_user_by_face(&best.face_token).await? {
                    let face = self.primary_face(image).await?;
                    let current_emotion = face.attributes.emotion.dominant().map(str::to_owned);
                    tracing::info!(
                        user_id = %user.id,
                        confidence = best.confidence,
                        current_emotion = current_emotion.as_deref().unwrap_or("unknown"),
                        "resolve: registered user matched"
                    );
                    return Ok(Resolution::UserMatched {
                        user,
                        current_emotion,
                    });
                }
                // The collection knows a face the store does not: treat as a stranger.
                tracing::warn!(
                    face_token = %best.face_token,
                    confidence = best.confidence,
                    "resolve: matched face token has no registered user"
                );
            }
            Some(best) => {
                tracing::debug!(
                    confidence = best.confidence,
                    threshold = self.threshold,
                    "resolve: best candidate below threshold"
                );
            }
            None => tracing::debug!("resolve: no search candidates"),
        }

        let visitor = self.record_visitor(image).await?;
        Ok(Resolution::VisitorRecorded(visitor))
    }

    async fn record_visitor(&self, image: &[u8]) -> Result<Visitor, IdentityError> {
        let face = self.primary_face(image).await?;
        let visitor = self
            .store
            .insert_visitor(NewVisitor::from_attributes(face.attributes))
            .await?;
        tracing::info!(
            visitor_id = %visitor.id,
            dominant_emotion = visitor.dominant_emotion.as_deref().unwrap_or("unknown"),
            "resolve: visitor recorded"
        );
        self.dispatch_alert(visitor.clone());
        Ok(visitor)
    }

    /// Fire-and-forget: the resolution never waits on, or fails because of, delivery.
    fn dispatch_alert(&self, visitor: Visitor) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            match notifier.notify(&visitor).await {
                Ok(()) => tracing::info!(visitor_id = %visitor.id, "visitor alert sent"),
                Err(e) => {
                    tracing::warn!(visitor_id = %visitor.id, error = %e, "visitor alert failed")
                }
            }
        });
    }

    async fn primary_face(&self, image: &[u8]) -> Result<DetectedFace, IdentityError> {
        self.provider
            .detect(image)
            .await?
            .into_iter()
            .next()
            .ok_or(IdentityError::NoFaceDetected)
    }
}
