use super::config::IdentityConfig;

/// Supplies the user identity attached to config requests
///
/// Both values are optional. `None` or an empty string means the
/// corresponding header is left off the request.
pub trait UserIdentity: Send + Sync {
    fn user_id(&self) -> Option<String>;
    fn token(&self) -> Option<String>;
}

/// Identity with no user ID and no token
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousIdentity;

impl UserIdentity for AnonymousIdentity {
    fn user_id(&self) -> Option<String> {
        None
    }

    fn token(&self) -> Option<String> {
        None
    }
}

/// Fixed identity, typically read from the agent config file
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user_id: Option<String>,
    token: Option<String>,
}

impl StaticIdentity {
    pub fn new(user_id: Option<String>, token: Option<String>) -> Self {
        Self { user_id, token }
    }
}

impl From<&IdentityConfig> for StaticIdentity {
    fn from(config: &IdentityConfig) -> Self {
        Self::new(config.user_id.clone(), config.token.clone())
    }
}

impl UserIdentity for StaticIdentity {
    fn user_id(&self) -> Option<String> {
        self.user_id.clone()
    }

    fn token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// Drop values that are present but empty
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
