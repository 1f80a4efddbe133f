use crate::error::NotifyError;
use crate::types::Visitor;
use async_trait::async_trait;

/// Delivers a "stranger detected" alert.
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, visitor: &Visitor) -> Result<(), NotifyError>;
}
