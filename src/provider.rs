//! Turning federation proofs and IAM credentials into temporary credentials.
//!
//! A [`CredentialProvider`] performs one kind of STS call (an [`Operation`]) and keeps its result,
//! in memory and optionally in a cache file, until it expires. The proof for the call (an
//! assertion, a token, an MFA code) is only requested when no fresh credentials are held.

use std::{
    fmt,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::{
    assertion::{OidcIdentityToken, SamlAssertion},
    auth::MfaInputProvider,
    cache::{self, CredentialCache},
    client::AwsClient,
    sts::{
        AssumeRoleRequest, AssumeRoleWithSamlRequest, AssumeRoleWithWebIdentityRequest,
        GetSessionTokenRequest, Sts, StsCredentials,
    },
    Credentials, Error,
};

/// The default lifetime of role credentials.
pub const ASSUME_ROLE_DURATION_DEFAULT: Duration = Duration::from_secs(60 * 60);

/// The default lifetime of session token credentials.
pub const SESSION_TOKEN_DURATION_DEFAULT: Duration = Duration::from_secs(12 * 60 * 60);

/// The longest lifetime AWS allows for credentials of a role assumed with role credentials.
pub const CHAINED_ROLE_DURATION_MAX: Duration = Duration::from_secs(60 * 60);

const DURATION_MIN: Duration = Duration::from_secs(15 * 60);
const ASSUME_ROLE_DURATION_MAX: Duration = Duration::from_secs(12 * 60 * 60);
const SESSION_TOKEN_DURATION_MAX: Duration = Duration::from_secs(36 * 60 * 60);

const ROLE_SESSION_NAME_MIN: usize = 2;
const ROLE_SESSION_NAME_MAX: usize = 64;

/// An STS call producing credentials from a proof of identity.
#[async_trait::async_trait]
pub(crate) trait Operation: fmt::Debug + Send + Sync {
    /// What the caller has to supply to make the call.
    type Proof: Send;

    /// Recorded as the credentials' provider name.
    const PROVIDER_NAME: &'static str;

    /// The longest lifetime STS grants for this call.
    const DURATION_MAX: Duration;

    async fn call(
        &self,
        sts: &dyn Sts,
        duration_seconds: i32,
        proof: Self::Proof,
    ) -> Result<StsCredentials, Error>;
}

/// `AssumeRoleWithSAML`, proven by a SAML assertion.
#[derive(Debug)]
pub(crate) struct SamlRole {
    pub(crate) role_arn: String,
}

#[async_trait::async_trait]
impl Operation for SamlRole {
    type Proof = SamlAssertion;

    const PROVIDER_NAME: &'static str = "SamlRoleProvider";
    const DURATION_MAX: Duration = ASSUME_ROLE_DURATION_MAX;

    async fn call(
        &self,
        sts: &dyn Sts,
        duration_seconds: i32,
        saml: SamlAssertion,
    ) -> Result<StsCredentials, Error> {
        if saml.is_empty() {
            return Err(Error::Protocol(
                "identity provider did not return a SAML assertion".to_string(),
            ));
        }

        sts.assume_role_with_saml(AssumeRoleWithSamlRequest {
            role_arn: self.role_arn.clone(),
            principal_arn: saml.principal_arn(&self.role_arn)?,
            saml_assertion: saml.as_str().to_string(),
            duration_seconds,
        })
        .await
        .map_err(Error::Api)
    }
}

/// `AssumeRoleWithWebIdentity`, proven by an OIDC token.
#[derive(Debug)]
pub(crate) struct WebRole {
    pub(crate) role_arn: String,
}

pub(crate) struct WebIdentityProof {
    pub(crate) token: OidcIdentityToken,
    pub(crate) role_session_name: String,
}

#[async_trait::async_trait]
impl Operation for WebRole {
    type Proof = WebIdentityProof;

    const PROVIDER_NAME: &'static str = "WebRoleProvider";
    const DURATION_MAX: Duration = ASSUME_ROLE_DURATION_MAX;

    async fn call(
        &self,
        sts: &dyn Sts,
        duration_seconds: i32,
        proof: WebIdentityProof,
    ) -> Result<StsCredentials, Error> {
        sts.assume_role_with_web_identity(AssumeRoleWithWebIdentityRequest {
            role_arn: self.role_arn.clone(),
            role_session_name: proof.role_session_name,
            web_identity_token: proof.token.as_str().to_string(),
            duration_seconds,
        })
        .await
        .map_err(Error::Api)
    }
}

/// `AssumeRole`, signed by the STS client's own credentials.
#[derive(Debug)]
pub(crate) struct AssumeRole {
    pub(crate) role_arn: String,
    pub(crate) external_id: Option<String>,
    pub(crate) mfa_serial: Option<String>,
}

pub(crate) struct AssumeRoleProof {
    pub(crate) role_session_name: String,
    pub(crate) mfa_code: Option<String>,
}

#[async_trait::async_trait]
impl Operation for AssumeRole {
    type Proof = AssumeRoleProof;

    const PROVIDER_NAME: &'static str = "AssumeRoleProvider";
    const DURATION_MAX: Duration = ASSUME_ROLE_DURATION_MAX;

    async fn call(
        &self,
        sts: &dyn Sts,
        duration_seconds: i32,
        proof: AssumeRoleProof,
    ) -> Result<StsCredentials, Error> {
        sts.assume_role(AssumeRoleRequest {
            role_arn: self.role_arn.clone(),
            role_session_name: proof.role_session_name,
            duration_seconds,
            external_id: self.external_id.clone(),
            serial_number: self.mfa_serial.clone(),
            token_code: proof.mfa_code,
        })
        .await
        .map_err(Error::Api)
    }
}

/// `GetSessionToken`, signed by long-lived IAM credentials.
#[derive(Debug)]
pub(crate) struct SessionToken {
    pub(crate) mfa_serial: Option<String>,
}

#[async_trait::async_trait]
impl Operation for SessionToken {
    /// The MFA code, when an MFA device is configured.
    type Proof = Option<String>;

    const PROVIDER_NAME: &'static str = "SessionTokenProvider";
    const DURATION_MAX: Duration = SESSION_TOKEN_DURATION_MAX;

    async fn call(
        &self,
        sts: &dyn Sts,
        duration_seconds: i32,
        mfa_code: Option<String>,
    ) -> Result<StsCredentials, Error> {
        sts.get_session_token(GetSessionTokenRequest {
            duration_seconds,
            serial_number: self.mfa_serial.clone(),
            token_code: mfa_code,
        })
        .await
        .map_err(Error::Api)
    }
}

/// Obtains and holds credentials from one [`Operation`].
pub(crate) struct CredentialProvider<O> {
    operation: O,
    sts: Arc<dyn Sts>,
    duration: Duration,
    cache: Option<CredentialCache>,
    signer: Option<Arc<dyn AwsClient>>,
    current: Mutex<Option<Credentials>>,
}

impl<O: Operation> CredentialProvider<O> {
    pub(crate) fn new(
        operation: O,
        sts: Arc<dyn Sts>,
        duration: Duration,
        cache: Option<CredentialCache>,
    ) -> Self {
        Self {
            operation,
            sts,
            duration,
            cache,
            signer: None,
            current: Mutex::new(None),
        }
    }

    /// Marks `sts` as signing with `client`'s credentials.
    ///
    /// They are obtained with the caller's cancellation token before each STS call, so the
    /// signing step only ever sees held credentials.
    pub(crate) fn signed_by(mut self, client: &Arc<dyn AwsClient>) -> Self {
        self.signer = Some(Arc::clone(client));
        self
    }

    pub(crate) fn operation(&self) -> &O {
        &self.operation
    }

    pub(crate) fn sts(&self) -> &Arc<dyn Sts> {
        &self.sts
    }

    /// The requested lifetime, clamped to what STS accepts for the operation.
    pub(crate) fn duration_seconds(&self) -> i32 {
        let duration = self.duration.clamp(DURATION_MIN, O::DURATION_MAX);
        i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
    }

    /// Fresh credentials, from memory, the cache file, or a new STS call.
    ///
    /// `proof` is only invoked when an STS call is needed. Failing to write the cache file is
    /// logged and otherwise ignored.
    pub(crate) async fn retrieve<F, Fut>(
        &self,
        cancel: &CancellationToken,
        proof: F,
    ) -> Result<Credentials, Error>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<O::Proof, Error>> + Send,
    {
        if let Some(credentials) = self.held() {
            return Ok(credentials);
        }

        let credentials = match &self.cache {
            Some(cache) => cache.get_or_init(|| self.fetch(cancel, proof)).await?,
            None => self.fetch(cancel, proof).await?,
        };

        *self.lock() = Some(credentials.clone());
        Ok(credentials)
    }

    /// When the held credentials expire, without making any calls.
    pub(crate) fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.lock()
            .as_ref()
            .map(|credentials| credentials.expires_at)
    }

    /// Forget the held credentials and delete the cache file, if any.
    pub(crate) async fn clear_cache(&self) -> Result<(), Error> {
        self.lock().take();
        if let Some(cache) = &self.cache {
            cache.clear().await.map_err(|source| Error::Io {
                path: cache.path().to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    async fn fetch<F, Fut>(
        &self,
        cancel: &CancellationToken,
        proof: F,
    ) -> Result<Credentials, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<O::Proof, Error>>,
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let proof = proof().await?;

        if let Some(signer) = &self.signer {
            signer.credentials_with_cancellation(cancel).await?;
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tracing::debug!(
            provider = O::PROVIDER_NAME,
            operation = ?self.operation,
            duration = self.duration_seconds(),
            "requesting credentials"
        );
        let credentials = self
            .operation
            .call(&*self.sts, self.duration_seconds(), proof)
            .await?;
        tracing::debug!(
            access_key_id = %credentials.access_key_id,
            expires_at = %credentials.expires_at,
            "received credentials"
        );

        Ok(Credentials::issued(credentials, O::PROVIDER_NAME))
    }

    fn held(&self) -> Option<Credentials> {
        self.lock()
            .as_ref()
            .filter(|credentials| cache::is_fresh(*credentials))
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Credentials>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The MFA code to send along with `mfa_serial`, read from `input` unless one was configured.
pub(crate) async fn mfa_code(
    mfa_serial: Option<&str>,
    configured: Option<&str>,
    input: &Arc<dyn MfaInputProvider>,
) -> Result<Option<String>, Error> {
    if mfa_serial.is_none() {
        return Ok(None);
    }
    match configured {
        Some(code) => Ok(Some(code.to_string())),
        None => Ok(Some(crate::auth::read_mfa_code(input).await?)),
    }
}

/// A role session name acceptable to STS (`[\w+=,.@-]{2,64}`).
///
/// The configured name wins, then the user's name, then a generated name.
pub(crate) fn role_session_name(configured: Option<&str>, username: Option<&str>) -> String {
    configured
        .and_then(sanitise_role_session_name)
        .or_else(|| username.and_then(sanitise_role_session_name))
        .unwrap_or_else(|| format!("{}-{}", env!("CARGO_PKG_NAME"), Utc::now().timestamp()))
}

fn sanitise_role_session_name(name: &str) -> Option<String> {
    let name: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || "_+=,.@-".contains(*c))
        .take(ROLE_SESSION_NAME_MAX)
        .collect();
    (name.len() >= ROLE_SESSION_NAME_MIN).then_some(name)
}
