//! Contract for durable user and visitor records.

use crate::error::StoreError;
use crate::types::{NewUser, NewVisitor, User, Visitor};
use async_trait::async_trait;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_user_by_face(&self, face_id: &str) -> Result<Option<User>, StoreError>;

    /// Persist a user. A `face_id` already in use fails with
    /// [`StoreError::DuplicateFace`] and leaves the store unchanged.
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn insert_visitor(&self, visitor: NewVisitor) -> Result<Visitor, StoreError>;

    /// All users, oldest registration first.
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Most recent visitors, newest first.
    async fn recent_visitors(&self, limit: usize) -> Result<Vec<Visitor>, StoreError>;
}
