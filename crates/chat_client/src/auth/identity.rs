use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

/// The external identity provider that owns the sign-in session.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The provider's current credential, or `None` when no identity session
    /// is active.
    async fn current_token(&self) -> anyhow::Result<Option<String>>;

    /// Whether an identity session is active.
    async fn is_signed_in(&self) -> bool;
}

/// Identity provider whose credential is set by the host shell after its own
/// sign-in flow.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    token: RwLock<Option<String>>,
}

impl StaticIdentityProvider {
    /// A provider with no active session.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    pub fn sign_in(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    pub fn sign_out(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn current_token(&self) -> anyhow::Result<Option<String>> {
        Ok(self
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn is_signed_in(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
