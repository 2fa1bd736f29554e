use anyhow::Result;
use async_trait::async_trait;

/// User id the core falls back to when there is no session.
pub const GUEST_USER_ID: &str = "guest";

/// Source of the signed-in user's identifier.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Short name used for logging.
    fn name(&self) -> &'static str;

    /// Current user id, or `None` when nobody is signed in.
    async fn current_user(&self) -> Result<Option<String>>;
}

/// Provider for sessionless use; every caller is the guest.
pub struct GuestIdentity;

#[async_trait]
impl IdentityProvider for GuestIdentity {
    fn name(&self) -> &'static str {
        "guest"
    }

    async fn current_user(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Provider returning a fixed, configured user id.
pub struct StaticIdentity {
    user_id: String,
}

impl StaticIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn current_user(&self) -> Result<Option<String>> {
        let id = self.user_id.trim();
        Ok((!id.is_empty()).then(|| id.to_string()))
    }
}
