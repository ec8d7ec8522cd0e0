//! Cleaned up AWS STS API.
//!
//! Credential providers talk to STS through the [`Sts`] trait, and obtain implementations from an
//! [`StsConnector`]. [`SdkConnector`] (the default) uses `aws-sdk-sts`; tests and embedders can
//! substitute their own.

use std::{fmt, sync::Arc};

use aws_config::{identity::IdentityCache, BehaviorVersion, SdkConfig};
use aws_sdk_sts::error::DisplayErrorContext;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;

use crate::{aws_sdk::ClientCredentialsProvider, client::AwsClient, Region};

/// The AWS credentials STS uses to sign a request.
#[derive(Clone)]
pub enum CredentialSource {
    /// Unsigned requests, for the federated `AssumeRoleWith*` operations.
    Anonymous,

    /// Credentials from the AWS shared config and credentials files (or the environment), using
    /// the given profile or the default one.
    Profile(Option<String>),

    /// Credentials obtained by another client.
    Client(Arc<dyn AwsClient>),
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Profile(profile) => f.debug_tuple("Profile").field(profile).finish(),
            Self::Client(_) => f.debug_tuple("Client").field(&"_").finish(),
        }
    }
}

/// Creates STS clients.
pub trait StsConnector: Send + Sync + 'static {
    /// An STS client signing requests with `source`, in `region` (or the default region).
    fn connect(&self, source: CredentialSource, region: Option<&Region>) -> Arc<dyn Sts>;
}

/// The STS operations used to obtain credentials.
///
/// Errors are rendered messages, surfaced to users as [`Error::Api`](crate::Error::Api).
#[async_trait::async_trait]
pub trait Sts: Send + Sync {
    /// Call `AssumeRoleWithSAML`.
    async fn assume_role_with_saml(
        &self,
        request: AssumeRoleWithSamlRequest,
    ) -> Result<StsCredentials, String>;

    /// Call `AssumeRoleWithWebIdentity`.
    async fn assume_role_with_web_identity(
        &self,
        request: AssumeRoleWithWebIdentityRequest,
    ) -> Result<StsCredentials, String>;

    /// Call `AssumeRole`.
    async fn assume_role(&self, request: AssumeRoleRequest) -> Result<StsCredentials, String>;

    /// Call `GetSessionToken`.
    async fn get_session_token(
        &self,
        request: GetSessionTokenRequest,
    ) -> Result<StsCredentials, String>;

    /// Call `GetCallerIdentity`.
    async fn get_caller_identity(&self) -> Result<CallerIdentity, String>;
}

/// Parameters for `AssumeRoleWithSAML`.
#[non_exhaustive]
pub struct AssumeRoleWithSamlRequest {
    /// The role to assume.
    pub role_arn: String,
    /// The SAML provider trusted by the role.
    pub principal_arn: String,
    /// The base64-encoded assertion.
    pub saml_assertion: String,
    /// The requested credential lifetime.
    pub duration_seconds: i32,
}

impl fmt::Debug for AssumeRoleWithSamlRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AssumeRoleWithSamlRequest")
            .field("role_arn", &self.role_arn)
            .field("principal_arn", &self.principal_arn)
            .field("duration_seconds", &self.duration_seconds)
            .finish_non_exhaustive()
    }
}

/// Parameters for `AssumeRoleWithWebIdentity`.
#[non_exhaustive]
pub struct AssumeRoleWithWebIdentityRequest {
    /// The role to assume.
    pub role_arn: String,
    /// The name of the role session.
    pub role_session_name: String,
    /// The OIDC token.
    pub web_identity_token: String,
    /// The requested credential lifetime.
    pub duration_seconds: i32,
}

impl fmt::Debug for AssumeRoleWithWebIdentityRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AssumeRoleWithWebIdentityRequest")
            .field("role_arn", &self.role_arn)
            .field("role_session_name", &self.role_session_name)
            .field("duration_seconds", &self.duration_seconds)
            .finish_non_exhaustive()
    }
}

/// Parameters for `AssumeRole`.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct AssumeRoleRequest {
    /// The role to assume.
    pub role_arn: String,
    /// The name of the role session.
    pub role_session_name: String,
    /// The requested credential lifetime.
    pub duration_seconds: i32,
    /// The external ID required by the role's trust policy.
    pub external_id: Option<String>,
    /// The MFA device serial number.
    pub serial_number: Option<String>,
    /// The MFA code.
    pub token_code: Option<String>,
}

/// Parameters for `GetSessionToken`.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct GetSessionTokenRequest {
    /// The requested credential lifetime.
    pub duration_seconds: i32,
    /// The MFA device serial number.
    pub serial_number: Option<String>,
    /// The MFA code.
    pub token_code: Option<String>,
}

/// Temporary credentials returned by STS.
#[derive(Clone, PartialEq, Eq)]
pub struct StsCredentials {
    /// The access key ID.
    pub access_key_id: String,
    /// The secret access key.
    pub secret_access_key: String,
    /// The session token.
    pub session_token: String,
    /// When the credentials expire.
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for StsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("StsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// The result of `GetCallerIdentity`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallerIdentity {
    /// The account of the caller.
    pub account: String,
    /// The ARN of the caller.
    pub arn: String,
    /// The unique ID of the caller.
    pub user_id: String,
}

/// Connects to STS with `aws-sdk-sts`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SdkConnector;

impl StsConnector for SdkConnector {
    fn connect(&self, source: CredentialSource, region: Option<&Region>) -> Arc<dyn Sts> {
        Arc::new(Client {
            source,
            region: region.cloned(),
            inner: OnceCell::new(),
        })
    }
}

/// An `aws-sdk-sts` client, configured on first use.
struct Client {
    source: CredentialSource,
    region: Option<Region>,
    inner: OnceCell<aws_sdk_sts::Client>,
}

impl Client {
    async fn inner(&self) -> &aws_sdk_sts::Client {
        self.inner
            .get_or_init(|| async {
                aws_sdk_sts::Client::new(&sdk_config(&self.source, self.region.as_ref()).await)
            })
            .await
    }
}

async fn sdk_config(source: &CredentialSource, region: Option<&Region>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(region.to_sts());
    }

    let loader = match source {
        CredentialSource::Anonymous => loader.no_credentials(),
        CredentialSource::Profile(Some(profile)) => loader.profile_name(profile),
        CredentialSource::Profile(None) => loader,
        // The client keeps its own cache, and its credentials can be replaced under us.
        CredentialSource::Client(client) => loader
            .credentials_provider(ClientCredentialsProvider::new(Arc::clone(client)))
            .identity_cache(IdentityCache::no_cache()),
    };
    loader.load().await
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Client")
            .field("source", &self.source)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

macro_rules! invalid_res {
    ($op:literal, $msg:literal) => {
        concat!("invalid ", $op, " response: ", $msg)
    };
}

#[async_trait::async_trait]
impl Sts for Client {
    async fn assume_role_with_saml(
        &self,
        request: AssumeRoleWithSamlRequest,
    ) -> Result<StsCredentials, String> {
        let res = self
            .inner()
            .await
            .assume_role_with_saml()
            .role_arn(request.role_arn)
            .principal_arn(request.principal_arn)
            .saml_assertion(request.saml_assertion)
            .duration_seconds(request.duration_seconds)
            .send()
            .await
            .map_err(|error| DisplayErrorContext(error).to_string())?;
        res.credentials()
            .ok_or(invalid_res!("AssumeRoleWithSAML", "missing credentials"))?
            .try_into()
    }

    async fn assume_role_with_web_identity(
        &self,
        request: AssumeRoleWithWebIdentityRequest,
    ) -> Result<StsCredentials, String> {
        let res = self
            .inner()
            .await
            .assume_role_with_web_identity()
            .role_arn(request.role_arn)
            .role_session_name(request.role_session_name)
            .web_identity_token(request.web_identity_token)
            .duration_seconds(request.duration_seconds)
            .send()
            .await
            .map_err(|error| DisplayErrorContext(error).to_string())?;
        res.credentials()
            .ok_or(invalid_res!("AssumeRoleWithWebIdentity", "missing credentials"))?
            .try_into()
    }

    async fn assume_role(&self, request: AssumeRoleRequest) -> Result<StsCredentials, String> {
        let res = self
            .inner()
            .await
            .assume_role()
            .role_arn(request.role_arn)
            .role_session_name(request.role_session_name)
            .duration_seconds(request.duration_seconds)
            .set_external_id(request.external_id)
            .set_serial_number(request.serial_number)
            .set_token_code(request.token_code)
            .send()
            .await
            .map_err(|error| DisplayErrorContext(error).to_string())?;
        res.credentials()
            .ok_or(invalid_res!("AssumeRole", "missing credentials"))?
            .try_into()
    }

    async fn get_session_token(
        &self,
        request: GetSessionTokenRequest,
    ) -> Result<StsCredentials, String> {
        let res = self
            .inner()
            .await
            .get_session_token()
            .duration_seconds(request.duration_seconds)
            .set_serial_number(request.serial_number)
            .set_token_code(request.token_code)
            .send()
            .await
            .map_err(|error| DisplayErrorContext(error).to_string())?;
        res.credentials()
            .ok_or(invalid_res!("GetSessionToken", "missing credentials"))?
            .try_into()
    }

    async fn get_caller_identity(&self) -> Result<CallerIdentity, String> {
        let res = self
            .inner()
            .await
            .get_caller_identity()
            .send()
            .await
            .map_err(|error| DisplayErrorContext(error).to_string())?;
        Ok(CallerIdentity {
            account: res
                .account
                .ok_or(invalid_res!("GetCallerIdentity", "missing account"))?,
            arn: res
                .arn
                .ok_or(invalid_res!("GetCallerIdentity", "missing arn"))?,
            user_id: res
                .user_id
                .ok_or(invalid_res!("GetCallerIdentity", "missing user_id"))?,
        })
    }
}

impl TryFrom<&aws_sdk_sts::types::Credentials> for StsCredentials {
    type Error = String;

    fn try_from(credentials: &aws_sdk_sts::types::Credentials) -> Result<Self, Self::Error> {
        let expiration = credentials.expiration();
        Ok(Self {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expires_at: DateTime::from_timestamp(expiration.secs(), expiration.subsec_nanos())
                .ok_or_else(|| format!("invalid STS response: bad expiration {expiration}"))?,
        })
    }
}
