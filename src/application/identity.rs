use anyhow::Result;
use async_trait::async_trait;

use super::session::SessionTokens;
use crate::domain::{
    repository::UserRepository,
    user::{SignInAssertion, User, UserId, UserProfile},
};

/// Maps external sign-ins and session tokens onto internal users.
#[async_trait]
pub trait IdentityResolver: Send + Sync + 'static {
    /// `Ok(false)` denies the sign-in; it is not an error.
    async fn sign_in(&self, assertion: &SignInAssertion) -> Result<bool>;
    /// Signs in and mints a session token when the sign-in is accepted.
    async fn issue_session(&self, assertion: &SignInAssertion) -> Result<Option<String>>;
    /// A token that does not verify, or whose subject has no user, resolves to `None`.
    async fn resolve(&self, token: &str) -> Result<Option<UserId>>;
    async fn profile(&self, id: &UserId) -> Result<Option<User>>;
}

#[derive(Clone)]
pub struct IdentityResolverImpl<U: UserRepository> {
    users: U,
    tokens: SessionTokens,
    provider: String,
}

impl<U: UserRepository> IdentityResolverImpl<U> {
    pub fn new(users: U, tokens: SessionTokens, provider: impl Into<String>) -> Self {
        Self { users, tokens, provider: provider.into() }
    }
}

#[async_trait]
impl<U: UserRepository> IdentityResolver for IdentityResolverImpl<U> {
    async fn sign_in(&self, assertion: &SignInAssertion) -> Result<bool> {
        if assertion.provider != self.provider {
            tracing::warn!(provider = %assertion.provider, "sign-in denied for unsupported provider");
            return Ok(false);
        }
        let user = self.users.upsert(&assertion.subject, UserProfile::from(assertion)).await?;
        tracing::info!(user_id = %user.id, "signed in");
        Ok(true)
    }

    async fn issue_session(&self, assertion: &SignInAssertion) -> Result<Option<String>> {
        if !self.sign_in(assertion).await? { return Ok(None); }
        self.tokens.issue(&assertion.subject).map(Some)
    }

    async fn resolve(&self, token: &str) -> Result<Option<UserId>> {
        let Some(claims) = self.tokens.verify(token) else { return Ok(None) };
        Ok(self.users.find_by_subject(&claims.sub).await?.map(|u| u.id))
    }

    async fn profile(&self, id: &UserId) -> Result<Option<User>> {
        self.users.find_by_id(id).await
    }
}
