use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Internal user id. Never leaves the server inside a session token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.0.fmt(f) }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    #[serde(skip_serializing)]
    pub provider_subject: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A verified sign-in handed over by the OAuth provider integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInAssertion {
    pub provider: String,
    pub subject: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "avatarUrl")]
    pub image: Option<String>,
}

/// Mutable profile fields, refreshed on every sign-in.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<&SignInAssertion> for UserProfile {
    fn from(a: &SignInAssertion) -> Self {
        Self { email: a.email.clone(), name: a.name.clone(), avatar_url: a.image.clone() }
    }
}
