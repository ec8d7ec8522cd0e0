//! Clients combining an identity source with a credential provider.
//!
//! Every client is an [`AwsClient`]: it can say who the user is ([`IdentityClient`]) and obtain
//! temporary credentials for them ([`CredentialClient`]). Clients are built by the
//! [`Factory`](crate::Factory).

mod assume_role;
mod saml_role;
mod session_token;
mod web_role;

use std::fmt;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

pub(crate) use self::{
    assume_role::AssumeRoleClient, saml_role::SamlRoleClient, session_token::SessionTokenClient,
    web_role::WebRoleClient,
};
use crate::{arn::Arn, sts::Sts, Credentials, Error};

const AWS_IDENTITY_PROVIDER: &str = "AWSIdentityProvider";

/// Whether an identity is a user or an assumed role.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum IdentityType {
    /// A user, of an identity provider or IAM.
    User,

    /// An IAM role session.
    Role,
}

impl fmt::Display for IdentityType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Role => "role",
        })
    }
}

/// Who the user is, according to an identity provider or AWS.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Identity {
    /// Whether the identity is a user or a role.
    pub identity_type: IdentityType,

    /// The name of the identity provider (`AWSIdentityProvider` for IAM).
    pub provider: String,

    /// The user's name.
    pub username: String,
}

impl Identity {
    fn from_caller_arn(arn: &str) -> Self {
        let resource = Arn::parse(arn).map_or(arn, |arn| arn.resource);
        let mut segments = resource.split('/');
        let (identity_type, username) = match segments.next() {
            Some("assumed-role") => (IdentityType::Role, segments.next()),
            _ => (IdentityType::User, resource.rsplit('/').next()),
        };

        Self {
            identity_type,
            provider: AWS_IDENTITY_PROVIDER.to_string(),
            username: username.unwrap_or(resource).to_string(),
        }
    }
}

/// The ARNs of roles a user may assume.
pub type Roles = Vec<String>;

/// Identity information about the user.
#[async_trait::async_trait]
pub trait IdentityClient: Send + Sync {
    /// Who the user is.
    ///
    /// # Errors
    ///
    /// Fails if the identity provider or AWS cannot be asked, or if gathering the username from
    /// the user fails.
    async fn identity(&self) -> Result<Identity, Error>;

    /// The roles the user may assume.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for clients that don't know about roles.
    async fn roles(&self) -> Result<Roles, Error>;
}

/// Temporary AWS credentials for the user.
#[async_trait::async_trait]
pub trait CredentialClient: Send + Sync {
    /// Obtain credentials, reusing held or cached ones while they are fresh.
    ///
    /// # Errors
    ///
    /// See [`Error`] for the ways this can fail.
    async fn credentials(&self) -> Result<Credentials, Error> {
        self.credentials_with_cancellation(&CancellationToken::new())
            .await
    }

    /// Like [`credentials`](Self::credentials), giving up with [`Error::Cancelled`] once `cancel`
    /// is cancelled.
    ///
    /// Cancellation is checked between requests; a request in flight is not interrupted.
    ///
    /// # Errors
    ///
    /// See [`Error`] for the ways this can fail.
    async fn credentials_with_cancellation(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Credentials, Error>;

    /// When the held credentials expire, without making any requests.
    ///
    /// `None` until credentials have been obtained by this client.
    fn expires_at(&self) -> Option<DateTime<Utc>>;

    /// Forget held credentials and delete their cache file. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Fails if the cache file exists but cannot be deleted.
    async fn clear_cache(&self) -> Result<(), Error>;
}

/// A client for both identity and credentials.
pub trait AwsClient: IdentityClient + CredentialClient {}

impl<T: IdentityClient + CredentialClient + ?Sized> AwsClient for T {}

/// The IAM identity whose credentials `sts` signs requests with.
pub(crate) async fn caller_identity(sts: &dyn Sts) -> Result<Identity, Error> {
    let caller = sts.get_caller_identity().await.map_err(Error::Api)?;
    tracing::debug!(account = %caller.account, arn = %caller.arn, "resolved caller identity");
    Ok(Identity::from_caller_arn(&caller.arn))
}
