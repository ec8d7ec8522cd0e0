use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::{caller_identity, CredentialClient, Identity, IdentityClient, Roles};
use crate::{
    auth::MfaInputProvider,
    provider::{mfa_code, CredentialProvider, SessionToken},
    Credentials, Error,
};

/// Obtains session credentials for an IAM user, with MFA when a device is configured.
pub(crate) struct SessionTokenClient {
    provider: CredentialProvider<SessionToken>,
    mfa_code: Option<String>,
    mfa_input: Arc<dyn MfaInputProvider>,
}

impl SessionTokenClient {
    pub(crate) fn new(
        provider: CredentialProvider<SessionToken>,
        mfa_code: Option<String>,
        mfa_input: Arc<dyn MfaInputProvider>,
    ) -> Self {
        Self {
            provider,
            mfa_code,
            mfa_input,
        }
    }
}

#[async_trait::async_trait]
impl IdentityClient for SessionTokenClient {
    async fn identity(&self) -> Result<Identity, Error> {
        caller_identity(self.provider.sts().as_ref()).await
    }

    async fn roles(&self) -> Result<Roles, Error> {
        Err(Error::Unsupported("session token clients are not role aware"))
    }
}

#[async_trait::async_trait]
impl CredentialClient for SessionTokenClient {
    async fn credentials_with_cancellation(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Credentials, Error> {
        let mfa_serial = self.provider.operation().mfa_serial.as_deref();
        self.provider
            .retrieve(cancel, || {
                mfa_code(mfa_serial, self.mfa_code.as_deref(), &self.mfa_input)
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
