//! secureface-core: Visitor recognition workflows.
//!
//! Resolves uploaded images to registered users or strangers, and enrolls
//! new users, against an external face provider and an identity store.

pub mod enrollment;
pub mod error;
pub mod notify;
pub mod provider;
pub mod resolution;
pub mod store;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use enrollment::EnrollmentWorkflow;
pub use error::{IdentityError, NotifyError, ProviderError, StoreError};
pub use notify::AlertNotifier;
pub use provider::FaceProvider;
pub use resolution::{ResolutionEngine, DEFAULT_MATCH_THRESHOLD};
pub use store::IdentityStore;
pub use types::{
    DetectedFace, EmotionScores, FaceAttributes, NewUser, NewVisitor, Profile, RegistrationForm,
    Resolution, SearchCandidate, User, Visitor, UNKNOWN_VISITOR_NAME,
};
