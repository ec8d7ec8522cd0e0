use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::{CredentialClient, Identity, IdentityClient, Roles};
use crate::{
    auth::AuthClient,
    provider::{CredentialProvider, SamlRole},
    Credentials, Error,
};

/// Assumes a role with a SAML assertion from an identity provider.
pub(crate) struct SamlRoleClient {
    auth: AuthClient,
    provider: CredentialProvider<SamlRole>,
}

impl SamlRoleClient {
    pub(crate) fn new(auth: AuthClient, provider: CredentialProvider<SamlRole>) -> Self {
        Self { auth, provider }
    }
}

#[async_trait::async_trait]
impl IdentityClient for SamlRoleClient {
    async fn identity(&self) -> Result<Identity, Error> {
        self.auth.identity().await
    }

    async fn roles(&self) -> Result<Roles, Error> {
        self.auth.roles().await
    }
}

#[async_trait::async_trait]
impl CredentialClient for SamlRoleClient {
    async fn credentials_with_cancellation(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Credentials, Error> {
        tracing::debug!(
            role_arn = %self.provider.operation().role_arn,
            vendor = ?self.auth.vendor(),
            "obtaining SAML role credentials"
        );
        self.provider
            .retrieve(cancel, || self.auth.saml_assertion())
            .await
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.provider.expires_at()
    }

    async fn clear_cache(&self) -> Result<(), Error> {
        self.provider.clear_cache().await
    }
}
