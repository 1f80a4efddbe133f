//! Enrollment: make a face searchable and register it as a user.

use crate::error::IdentityError;
use crate::provider::FaceProvider;
use crate::store::IdentityStore;
use crate::types::{NewUser, RegistrationForm, User};
use std::sync::Arc;

pub struct EnrollmentWorkflow {
    provider: Arc<dyn FaceProvider>,
    store: Arc<dyn IdentityStore>,
}

impl EnrollmentWorkflow {
    pub fn new(provider: Arc<dyn FaceProvider>, store: Arc<dyn IdentityStore>) -> Self {
        Self { provider, store }
    }

    /// Register the face in `image` under the submitted profile.
    ///
    /// Input is validated before any external call. The face token is added
    /// to the provider collection before the user row is written, so a stored
    /// user always refers to a searchable face. If the write fails after that,
    /// the token stays in the collection without a user.
    pub async fn enroll(&self, image: &[u8], form: &RegistrationForm) -> Result<User, IdentityError> {
        if image.is_empty() {
            return Err(IdentityError::NoImageSupplied);
        }
        let profile = form
            .validate()
            .map_err(IdentityError::InvalidRegistrationInput)?;

        let face = self
            .provider
            .detect(image)
            .await?
            .into_iter()
            .next()
            .ok_or(IdentityError::NoFaceDetected)?;
        let face_token = face.face_token;

        self.provider.add_to_collection(&face_token).await?;
        tracing::debug!(face_token = %face_token, "enroll: face added to collection");

        let new_user = NewUser {
            name: profile.name,
            age: profile.age,
            gender: profile.gender,
            face_id: face_token.clone(),
        };
        match self.store.insert_user(new_user).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, face_id = %user.face_id, "enroll: user registered");
                Ok(user)
            }
            Err(e) => {
                tracing::error!(
                    face_token = %face_token,
                    error = %e,
                    "enroll: user not stored; face token remains in collection"
                );
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{face, FakeProvider, MemoryStore};

    const IMAGE: &[u8] = b"\x89PNG\r\n\x1a\npng";

    fn form(name: Option<&str>, age: Option<&str>, gender: Option<&str>) -> RegistrationForm {
        RegistrationForm {
            name: name.map(Into::into),
            age: age.map(Into::into),
            gender: gender.map(Into::into),
        }
    }

    fn valid_form() -> RegistrationForm {
        form(Some("Ada"), Some("36"), Some("Female"))
    }

    fn provider_with_token(token: &str) -> Arc<FakeProvider> {
        Arc::new(FakeProvider::new().with_faces(vec![face(token, 35, "Female", &[("neutral", 90.0)])]))
    }

    #[tokio::test]
    async fn test_enroll_registers_user_and_collection() {
        let provider = provider_with_token("tok-ada");
        let store = Arc::new(MemoryStore::new());

        let user = EnrollmentWorkflow::new(provider.clone(), store.clone())
            .enroll(IMAGE, &valid_form())
            .await
            .unwrap();

        assert_eq!(user.face_id, "tok-ada");
        assert_eq!(user.name, "Ada");
        assert_eq!(user.age, 36);
        assert_eq!(provider.collection(), vec!["tok-ada".to_string()]);
        assert_eq!(store.users().len(), 1);
    }

    #[tokio::test]
    async fn test_enroll_missing_fields_makes_no_calls() {
        let cases = [
            form(None, Some("36"), Some("Female")),
            form(Some("Ada"), None, Some("Female")),
            form(Some("Ada"), Some("36"), None),
            form(Some(""), Some("36"), Some("Female")),
        ];
        for case in cases {
            let provider = provider_with_token("tok-ada");
            let store = Arc::new(MemoryStore::new());

            let err = EnrollmentWorkflow::new(provider.clone(), store.clone())
                .enroll(IMAGE, &case)
                .await
                .unwrap_err();

            assert!(matches!(err, IdentityError::InvalidRegistrationInput(_)), "{case:?}");
            assert_eq!(provider.total_calls(), 0);
            assert_eq!(store.calls(), 0);
        }
    }

    #[tokio::test]
    async fn test_enroll_empty_image_makes_no_calls() {
        let provider = provider_with_token("tok-ada");
        let store = Arc::new(MemoryStore::new());

        let err = EnrollmentWorkflow::new(provider.clone(), store.clone())
            .enroll(b"", &valid_form())
            .await
            .unwrap_err();

        assert_eq!(err, IdentityError::NoImageSupplied);
        assert_eq!(provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_enroll_no_face() {
        let provider = Arc::new(FakeProvider::new());
        let store = Arc::new(MemoryStore::new());

        let err = EnrollmentWorkflow::new(provider.clone(), store.clone())
            .enroll(IMAGE, &valid_form())
            .await
            .unwrap_err();

        assert_eq!(err, IdentityError::NoFaceDetected);
        assert_eq!(provider.add_calls(), 0);
        assert!(store.users().is_empty());
    }

    #[tokio::test]
    async fn test_enroll_collection_failure_persists_nothing() {
        let provider = Arc::new(
            FakeProvider::new()
                .with_faces(vec![face("tok-ada", 35, "Female", &[])])
                .failing_collection(),
        );
        let store = Arc::new(MemoryStore::new());

        let err = EnrollmentWorkflow::new(provider.clone(), store.clone())
            .enroll(IMAGE, &valid_form())
            .await
            .unwrap_err();

        assert!(matches!(err, IdentityError::ProviderUnavailable(_)));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_enroll_detect_failure() {
        let provider = Arc::new(FakeProvider::new().failing_detect());
        let store = Arc::new(MemoryStore::new());

        let err = EnrollmentWorkflow::new(provider.clone(), store.clone())
            .enroll(IMAGE, &valid_form())
            .await
            .unwrap_err();

        assert!(matches!(err, IdentityError::ProviderUnavailable(_)));
        assert_eq!(provider.add_calls(), 0);
    }

    #[tokio::test]
    async fn test_enroll_duplicate_face() {
        let provider = provider_with_token("tok-ada");
        let store = Arc::new(MemoryStore::new().with_user(NewUser {
            name: "Ada".into(),
            age: 36,
            gender: "Female".into(),
            face_id: "tok-ada".into(),
        }));

        let err = EnrollmentWorkflow::new(provider.clone(), store.clone())
            .enroll(IMAGE, &form(Some("Impostor"), Some("40"), Some("Male")))
            .await
            .unwrap_err();

        assert_eq!(err, IdentityError::DuplicateFace("tok-ada".into()));
        let users = store.users();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "Ada");
    }

    #[tokio::test]
    async fn test_enroll_store_failure_leaves_orphaned_token() {
        let provider = provider_with_token("tok-ada");
        let store = Arc::new(MemoryStore::new().failing_writes());

        let err = EnrollmentWorkflow::new(provider.clone(), store.clone())
            .enroll(IMAGE, &valid_form())
            .await
            .unwrap_err();

        assert!(matches!(err, IdentityError::StoreFailure(_)));
        assert_eq!(provider.collection(), vec!["tok-ada".to_string()]);
        assert!(store.users().is_empty());
    }
}
