use std::{fmt, sync::Arc};

use aws_credential_types::provider::{
    error::CredentialsError, future::ProvideCredentials as ProvideCredentialsFut,
    ProvideCredentials,
};

use crate::{client::AwsClient, Credentials};

const PROVIDER_NAME: &str = "AwsFederationFlow";

/// Provide credentials for the AWS SDK from any [`AwsClient`].
///
/// Every call asks the client, which answers from its held or cached credentials while they are
/// fresh. Failures are converted to [`CredentialsError::ProviderError`], stopping resolution if
/// the provider is part of a credentials chain.
///
/// ```no_run
/// # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use aws_federation_flow::{ClientConfig, ClientCredentialsProvider, Factory};
///
/// let factory = Factory::builder().build()?;
/// let client = factory.get(&ClientConfig {
///     saml_url: Some("https://idp.example.com/app/aws/sso/saml".to_string()),
///     role_arn: Some("arn:aws:iam::123456789012:role/Developer".to_string()),
///     ..ClientConfig::default()
/// })?;
///
/// let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
///     .credentials_provider(ClientCredentialsProvider::new(client))
///     .load()
///     .await;
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct ClientCredentialsProvider(Arc<dyn AwsClient>);

impl ClientCredentialsProvider {
    /// Provide credentials from `client`.
    #[must_use]
    pub fn new(client: Arc<dyn AwsClient>) -> Self {
        Self(client)
    }
}

impl fmt::Debug for ClientCredentialsProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("ClientCredentialsProvider")
            .field(&"_")
            .finish()
    }
}

impl ProvideCredentials for ClientCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> ProvideCredentialsFut<'a>
    where
        Self: 'a,
    {
        ProvideCredentialsFut::new(async {
            let creds = self
                .0
                .credentials()
                .await
                .map(Into::into)
                .map_err(CredentialsError::provider_error)?;

            Ok(creds)
        })
    }
}

impl From<Credentials> for aws_credential_types::Credentials {
    fn from(creds: Credentials) -> Self {
        aws_credential_types::Credentials::new(
            creds.access_key_id,
            creds.secret_access_key,
            Some(creds.session_token),
            Some(creds.expires_at.into()),
            PROVIDER_NAME,
        )
    }
}
