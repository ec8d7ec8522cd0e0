use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::{CredentialClient, Identity, IdentityClient, Roles};
use crate::{
    auth::AuthClient,
    provider::{role_session_name, CredentialProvider, WebIdentityProof, WebRole},
    Credentials, Error,
};

/// Assumes a role with an OIDC token from an identity provider.
pub(crate) struct WebRoleClient {
    auth: AuthClient,
    provider: CredentialProvider<WebRole>,
    role_session_name: Option<String>,
}

impl WebRoleClient {
    pub(crate) fn new(
        auth: AuthClient,
        provider: CredentialProvider<WebRole>,
        role_session_name: Option<String>,
    ) -> Self {
        Self {
            auth,
            provider,
            role_session_name,
        }
    }
}

#[async_trait::async_trait]
impl IdentityClient for WebRoleClient {
    async fn identity(&self) -> Result<Identity, Error> {
        self.auth.identity().await
    }

    async fn roles(&self) -> Result<Roles, Error> {
        Err(Error::Unsupported("OIDC clients are not role aware"))
    }
}

#[async_trait::async_trait]
impl CredentialClient for WebRoleClient {
    async fn credentials_with_cancellation(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Credentials, Error> {
        tracing::debug!(
            role_arn = %self.provider.operation().role_arn,
            vendor = ?self.auth.vendor(),
            "obtaining web identity role credentials"
        );
        self.provider
            .retrieve(cancel, || async {
                let token = self.auth.identity_token(cancel).await?;
                let username = self.auth.known_username().await;
                Ok(WebIdentityProof {
                    token,
                    role_session_name: role_session_name(
                        self.role_session_name.as_deref(),
                        username.as_deref(),
                    ),
                })
            })
            .await
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.provider.expires_at()
    }

    async fn clear_cache(&self) -> Result<(), Error> {
        self.provider.clear_cache().await
    }
}
