//! In-memory doubles for the provider, store and notifier contracts.
//!
//! Every double counts its calls so tests can assert which collaborators a
//! workflow touched.

use crate::error::{NotifyError, ProviderError, StoreError};
use crate::notify::AlertNotifier;
use crate::provider::FaceProvider;
use crate::store::IdentityStore;
use crate::types::{
    DetectedFace, EmotionScores, FaceAttributes, NewUser, NewVisitor, SearchCandidate, User,
    Visitor,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Build a detected face with the given attribute estimates.
pub fn face(token: &str, age: u32, gender: &str, emotion: &[(&str, f64)]) -> DetectedFace {
    DetectedFace {
        face_token: token.to_string(),
        attributes: FaceAttributes {
            age: Some(age),
            gender: Some(gender.to_string()),
            emotion: emotion.iter().map(|(l, s)| (*l, *s)).collect::<EmotionScores>(),
        },
    }
}

pub fn candidate(token: &str, confidence: f64) -> SearchCandidate {
    SearchCandidate {
        face_token: token.to_string(),
        confidence,
    }
}

#[derive(Default)]
pub struct FakeProvider {
    faces: Vec<DetectedFace>,
    candidates: Vec<SearchCandidate>,
    fail_detect: bool,
    fail_search: bool,
    fail_collection: bool,
    collection: Mutex<Vec<String>>,
    detect_calls: AtomicUsize,
    search_calls: AtomicUsize,
    add_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faces(mut self, faces: Vec<DetectedFace>) -> Self {
        self.faces = faces;
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<SearchCandidate>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn failing_detect(mut self) -> Self {
        self.fail_detect = true;
        self
    }

    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub fn failing_collection(mut self) -> Self {
        self.fail_collection = true;
        self
    }

    /// Face tokens added to the collection so far.
    pub fn collection(&self) -> Vec<String> {
        self.collection.lock().unwrap().clone()
    }

    pub fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn add_calls(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.detect_calls() + self.search_calls() + self.add_calls()
    }
}

#[async_trait]
impl FaceProvider for FakeProvider {
    async fn detect(&self, _image: &[u8]) -> Result<Vec<DetectedFace>, ProviderError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_detect {
            return Err(ProviderError::Request("connection refused".into()));
        }
        Ok(self.faces.clone())
    }

    async fn search(&self, _image: &[u8]) -> Result<Vec<SearchCandidate>, ProviderError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_search {
            return Err(ProviderError::Api {
                status: 403,
                message: "AUTHENTICATION_ERROR".into(),
            });
        }
        Ok(self.candidates.clone())
    }

    async fn add_to_collection(&self, face_token: &str) -> Result<(), ProviderError> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_collection {
            return Err(ProviderError::CollectionRejected {
                face_token: face_token.to_string(),
                reason: "INVALID_FACE_TOKEN".into(),
            });
        }
        self.collection.lock().unwrap().push(face_token.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<Vec<User>>,
    visitors: Mutex<Vec<Visitor>>,
    fail_writes: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user without counting it as a call.
    pub fn with_user(self, user: NewUser) -> Self {
        let user = materialize_user(user, self.users.lock().unwrap().len());
        self.users.lock().unwrap().push(user);
        self
    }

    pub fn failing_writes(self) -> Self {
        self.fail_writes.store(true, Ordering::SeqCst);
        self
    }

    pub fn users(&self) -> Vec<User> {
        self.users.lock().unwrap().clone()
    }

    pub fn visitors(&self) -> Vec<Visitor> {
        self.visitors.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk I/O error".into()));
        }
        Ok(())
    }
}

fn materialize_user(user: NewUser, seq: usize) -> User {
    User {
        id: format!("user-{seq}"),
        name: user.name,
        age: user.age,
        gender: user.gender,
        face_id: user.face_id,
        registered_at: Utc::now(),
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_user_by_face(&self, face_id: &str) -> Result<Option<User>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.face_id == face_id)
            .cloned())
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.face_id == user.face_id) {
            return Err(StoreError::DuplicateFace(user.face_id));
        }
        let user = materialize_user(user, users.len());
        users.push(user.clone());
        Ok(user)
    }

    async fn insert_visitor(&self, visitor: NewVisitor) -> Result<Visitor, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;
        let mut visitors = self.visitors.lock().unwrap();
        let visitor = Visitor {
            id: uuid::Uuid::new_v4().to_string(),
            name: visitor.name,
            age: visitor.age,
            gender: visitor.gender,
            emotion: visitor.emotion,
            dominant_emotion: visitor.dominant_emotion,
            detected_at: Utc::now(),
        };
        visitors.push(visitor.clone());
        Ok(visitor)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.users())
    }

    async fn recent_visitors(&self, limit: usize) -> Result<Vec<Visitor>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.visitors().into_iter().rev().take(limit).collect())
    }
}

/// Forwards every alerted visitor to a channel.
pub struct RecordingNotifier {
    tx: mpsc::UnboundedSender<Visitor>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Visitor>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, fail: false }, rx)
    }

    /// Records the visitor, then reports a delivery failure.
    pub fn failing() -> (Self, mpsc::UnboundedReceiver<Visitor>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, fail: true }, rx)
    }
}

#[async_trait]
impl AlertNotifier for RecordingNotifier {
    async fn notify(&self, visitor: &Visitor) -> Result<(), NotifyError> {
        let _ = self.tx.send(visitor.clone());
        if self.fail {
            return Err(NotifyError::Delivery("smtp relay unreachable".into()));
        }
        Ok(())
    }
}

/// Never completes; proves the caller does not wait for delivery.
pub struct StalledNotifier;

#[async_trait]
impl AlertNotifier for StalledNotifier {
    async fn notify(&self, _visitor: &Visitor) -> Result<(), NotifyError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}
