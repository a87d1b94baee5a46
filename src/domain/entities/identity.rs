//! Identity provider trait.
//!
//! Authentication and session issuance live outside this service; the
//! synchronization core only needs to turn a handshake token into a user id.

use async_trait::async_trait;

use crate::domain::UserId;
use crate::shared::error::AuthError;

/// Resolves handshake credentials to an authenticated identity.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<UserId, AuthError>;
}
