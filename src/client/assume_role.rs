use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::{caller_identity, AwsClient, CredentialClient, Identity, IdentityClient, Roles};
use crate::{
    auth::MfaInputProvider,
    provider::{mfa_code, role_session_name, AssumeRole, AssumeRoleProof, CredentialProvider},
    Credentials, Error,
};

/// Assumes a role with credentials from a profile or another client.
///
/// When built on top of another client, identity questions are answered by that client. It is
/// only borrowed for that purpose; its credentials reach this client through the STS client.
pub(crate) struct AssumeRoleClient {
    provider: CredentialProvider<AssumeRole>,
    ident: Option<Weak<dyn AwsClient>>,
    role_session_name: Option<String>,
    mfa_code: Option<String>,
    mfa_input: Arc<dyn MfaInputProvider>,
}

impl AssumeRoleClient {
    pub(crate) fn new(
        provider: CredentialProvider<AssumeRole>,
        role_session_name: Option<String>,
        mfa_code: Option<String>,
        mfa_input: Arc<dyn MfaInputProvider>,
    ) -> Self {
        Self {
            provider,
            ident: None,
            role_session_name,
            mfa_code,
            mfa_input,
        }
    }

    /// Answer identity questions with `ident`.
    #[must_use]
    pub(crate) fn with_ident(self, ident: &Arc<dyn AwsClient>) -> Self {
        Self {
            ident: Some(Arc::downgrade(ident)),
            ..self
        }
    }

    fn ident(&self) -> Result<Option<Arc<dyn AwsClient>>, Error> {
        self.ident
            .as_ref()
            .map(|ident| {
                ident
                    .upgrade()
                    .ok_or(Error::Unsupported("identity client is no longer available"))
            })
            .transpose()
    }

    async fn session_name(&self) -> String {
        if self.role_session_name.is_some() {
            return role_session_name(self.role_session_name.as_deref(), None);
        }
        let username = match self.identity().await {
            Ok(identity) => Some(identity.username),
            Err(error) => {
                tracing::debug!("no identity for role session name: {error}");
                None
            }
        };
        role_session_name(None, username.as_deref())
    }
}

#[async_trait::async_trait]
impl IdentityClient for AssumeRoleClient {
    async fn identity(&self) -> Result<Identity, Error> {
        match self.ident()? {
            Some(ident) => ident.identity().await,
            None => caller_identity(self.provider.sts().as_ref()).await,
        }
    }

    async fn roles(&self) -> Result<Roles, Error> {
        match self.ident()? {
            Some(ident) => ident.roles().await,
            None => Err(Error::Unsupported("assume role clients are not role aware")),
        }
    }
}

#[async_trait::async_trait]
impl CredentialClient for AssumeRoleClient {
    async fn credentials_with_cancellation(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Credentials, Error> {
        let operation = self.provider.operation();
        tracing::debug!(
            role_arn = %operation.role_arn,
            delegated = self.ident.is_some(),
            "obtaining assume role credentials"
        );
        self.provider
            .retrieve(cancel, || async {
                let role_session_name = self.session_name().await;
                let mfa_code = mfa_code(
                    operation.mfa_serial.as_deref(),
                    self.mfa_code.as_deref(),
                    &self.mfa_input,
                )
                .await?;
                Ok(AssumeRoleProof {
                    role_session_name,
                    mfa_code,
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
