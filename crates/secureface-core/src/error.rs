use thiserror::Error;

/// Failure talking to the face-recognition provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("request to face provider failed: {0}")]
    Request(String),
    #[error("face provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("unexpected face provider response: {0}")]
    InvalidResponse(String),
    #[error("face provider rejected face token {face_token}: {reason}")]
    CollectionRejected { face_token: String, reason: String },
}

/// Failure reading or writing the identity store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("face {0} is already registered")]
    DuplicateFace(String),
    #[error("identity store error: {0}")]
    Backend(String),
}

/// Failure delivering a visitor alert. Only ever logged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotifyError {
    #[error("alert delivery failed: {0}")]
    Delivery(String),
}

/// Every way a resolution or enrollment can fail.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IdentityError {
    #[error("no image supplied")]
    NoImageSupplied,
    #[error("invalid registration input: {0}")]
    InvalidRegistrationInput(String),
    #[error("no face detected in the image")]
    NoFaceDetected,
    #[error("face provider unavailable: {0}")]
    ProviderUnavailable(#[from] ProviderError),
    #[error("face {0} is already registered")]
    DuplicateFace(String),
    #[error("store failure: {0}")]
    StoreFailure(String),
}

impl From<StoreError> for IdentityError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateFace(face_id) => IdentityError::DuplicateFace(face_id),
            StoreError::Backend(msg) => IdentityError::StoreFailure(msg),
        }
    }
}

impl IdentityError {
    /// True for failures the caller can fix by resubmitting (new photo, missing field).
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            IdentityError::NoImageSupplied
                | IdentityError::InvalidRegistrationInput(_)
                | IdentityError::NoFaceDetected
        )
    }
}
