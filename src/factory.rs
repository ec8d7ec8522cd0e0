//! Choosing and composing clients from configuration.

use std::{fmt, path::PathBuf, sync::Arc};

use crate::{
    arn::Arn,
    auth::{
        decode_password, AuthClient, AuthenticationConfig, CredentialInputProvider,
        MfaInputProvider, PasswordCodec, PlainText, TerminalPrompt, Vendor,
    },
    cache::{cache_file_name, CredentialCache},
    client::{AssumeRoleClient, AwsClient, SamlRoleClient, SessionTokenClient, WebRoleClient},
    config::{non_empty, shared_config_dir},
    cookies::{CookieJar, COOKIE_FILE},
    http::Transport,
    provider::{
        AssumeRole, CredentialProvider, SamlRole, SessionToken, WebRole,
        ASSUME_ROLE_DURATION_DEFAULT, CHAINED_ROLE_DURATION_MAX,
    },
    sts::{CredentialSource, SdkConnector, StsConnector},
    ClientConfig, Error,
};

const SESSION_TOKEN_CACHE: &str = "session_token";
const ASSUME_ROLE_CACHE: &str = "assume_role";
const SAML_ROLE_CACHE: &str = "saml_role";
const WEB_ROLE_CACHE: &str = "web_role";

/// Builds the right [`AwsClient`] for a [`ClientConfig`].
///
/// The client is chosen by the first of these that applies:
///
/// 1. A SAML URL is configured: assume `role_arn` with a SAML assertion.
/// 2. A web identity URL is configured: assume `role_arn` with an OIDC token.
/// 3. A role ARN is configured: assume it with IAM credentials.
/// 4. Otherwise: get session token credentials for the IAM user.
///
/// A profile name that is a role ARN is taken as the role ARN. With a jump role, federated
/// credentials are obtained for the jump role and then used to assume `role_arn`.
///
/// Building clients makes no network calls. Identity providers and STS are only contacted when
/// a client is asked for something.
///
/// ```no_run
/// # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use aws_federation_flow::{ClientConfig, Factory};
///
/// let factory = Factory::builder().build()?;
/// let client = factory.get(&ClientConfig {
///     saml_url: Some("https://idp.example.com/app/aws/sso/saml".to_string()),
///     saml_provider: Some("okta".to_string()),
///     role_arn: Some("arn:aws:iam::123456789012:role/Developer".to_string()),
///     ..ClientConfig::default()
/// })?;
///
/// println!("available roles: {:?}", client.roles().await?);
/// let credentials = client.credentials().await?;
/// println!("credentials expire at {}", credentials.expires_at);
/// # Ok(()) }
/// ```
pub struct Factory {
    cache_dir: Option<PathBuf>,
    cookies: Arc<CookieJar>,
    connector: Arc<dyn StsConnector>,
    credential_input: Arc<dyn CredentialInputProvider>,
    mfa_input: Arc<dyn MfaInputProvider>,
    password_codec: Arc<dyn PasswordCodec>,
}

impl Factory {
    /// A builder with default settings.
    #[must_use]
    pub fn builder() -> FactoryBuilder {
        FactoryBuilder::default()
    }

    /// The cookie jar shared by all identity provider clients.
    #[must_use]
    pub fn cookie_jar(&self) -> &CookieJar {
        &self.cookies
    }

    /// Build a client for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` is invalid.
    pub fn get(&self, config: &ClientConfig) -> Result<Arc<dyn AwsClient>, Error> {
        let mut config = config.clone();
        if config.profile_name.as_deref().is_some_and(Arn::is_arn) {
            tracing::debug!("profile name is a role ARN, using it as the role");
            config.role_arn = config.profile_name.take();
        }
        config.validate()?;
        tracing::debug!(?config, "configuring client");

        if non_empty(config.saml_url.as_deref()).is_some() {
            self.saml_client(&config)
        } else if non_empty(config.web_identity_url.as_deref()).is_some() {
            self.web_client(&config)
        } else if non_empty(config.role_arn.as_deref()).is_some() {
            Ok(self.role_client(&config))
        } else {
            let profile = non_empty(config.profile_name.as_deref());
            Ok(Arc::new(self.session_client(&config, profile)))
        }
    }

    fn saml_client(&self, config: &ClientConfig) -> Result<Arc<dyn AwsClient>, Error> {
        tracing::debug!("configuring SAML client");
        let url = config.saml_url.as_deref().unwrap_or_default();
        let auth_config = AuthenticationConfig {
            username: config.saml_username.clone(),
            password: self.password(url, config.saml_password.as_deref()),
            mfa_type: config.mfa_type,
            mfa_code: config.mfa_code.clone(),
            federated_username: config.federated_username.clone(),
            ..self.auth_config()
        };
        let auth = AuthClient::new(
            Vendor::from_provider(config.saml_provider.as_deref()),
            url,
            Transport::new(&self.cookies),
            auth_config,
        )?;

        let (role_arn, cache) = match non_empty(config.jump_role_arn.as_deref()) {
            Some(jump_role) => (jump_role, self.cache(SAML_ROLE_CACHE, None, Some(jump_role))),
            None => (
                config.role_arn.as_deref().unwrap_or_default(),
                self.cache(
                    SAML_ROLE_CACHE,
                    config.profile_name.as_deref(),
                    config.role_arn.as_deref(),
                ),
            ),
        };
        let provider = CredentialProvider::new(
            SamlRole {
                role_arn: role_arn.to_string(),
            },
            self.connector
                .connect(CredentialSource::Anonymous, config.region.as_ref()),
            config.role_credential_duration(),
            cache,
        );

        let client: Arc<dyn AwsClient> = Arc::new(SamlRoleClient::new(auth, provider));
        if non_empty(config.jump_role_arn.as_deref()).is_some() {
            tracing::debug!("jump role found, using SAML client as base client");
            return Ok(self.chained_client(config, client));
        }
        Ok(client)
    }

    fn web_client(&self, config: &ClientConfig) -> Result<Arc<dyn AwsClient>, Error> {
        tracing::debug!("configuring web identity client");
        let url = config.web_identity_url.as_deref().unwrap_or_default();
        let auth_config = AuthenticationConfig {
            username: config.web_identity_username.clone(),
            password: self.password(url, config.web_identity_password.as_deref()),
            mfa_type: config.mfa_type,
            mfa_code: config.mfa_code.clone(),
            federated_username: config.federated_username.clone(),
            client_id: config.web_identity_client_id.clone(),
            redirect_uri: config.web_identity_redirect_uri.clone(),
            scopes: config.web_identity_scopes.clone(),
            token_file: config.web_identity_token_file.clone(),
            ..self.auth_config()
        };
        let auth = AuthClient::new(
            Vendor::from_provider(config.web_identity_provider.as_deref()),
            url,
            Transport::new(&self.cookies),
            auth_config,
        )?;

        let (role_arn, cache) = match non_empty(config.jump_role_arn.as_deref()) {
            Some(jump_role) => (jump_role, self.cache(WEB_ROLE_CACHE, None, Some(jump_role))),
            None => (
                config.role_arn.as_deref().unwrap_or_default(),
                self.cache(
                    WEB_ROLE_CACHE,
                    config.profile_name.as_deref(),
                    config.role_arn.as_deref(),
                ),
            ),
        };
        let provider = CredentialProvider::new(
            WebRole {
                role_arn: role_arn.to_string(),
            },
            self.connector
                .connect(CredentialSource::Anonymous, config.region.as_ref()),
            config.role_credential_duration(),
            cache,
        );

        let client: Arc<dyn AwsClient> = Arc::new(WebRoleClient::new(
            auth,
            provider,
            config.role_session_name.clone(),
        ));
        if non_empty(config.jump_role_arn.as_deref()).is_some() {
            tracing::debug!("jump role found, using web identity client as base client");
            return Ok(self.chained_client(config, client));
        }
        Ok(client)
    }

    /// Assume the target role with credentials from the federated `base` client.
    fn chained_client(
        &self,
        config: &ClientConfig,
        base: Arc<dyn AwsClient>,
    ) -> Arc<dyn AwsClient> {
        let provider = CredentialProvider::new(
            AssumeRole {
                role_arn: config.role_arn.clone().unwrap_or_default(),
                external_id: config.external_id.clone(),
                mfa_serial: None,
            },
            self.connector.connect(
                CredentialSource::Client(Arc::clone(&base)),
                config.region.as_ref(),
            ),
            config
                .role_credential_duration()
                .min(CHAINED_ROLE_DURATION_MAX),
            self.cache(
                ASSUME_ROLE_CACHE,
                config.profile_name.as_deref(),
                config.role_arn.as_deref(),
            ),
        )
        .signed_by(&base);

        Arc::new(
            AssumeRoleClient::new(
                provider,
                config.role_session_name.clone(),
                None,
                Arc::clone(&self.mfa_input),
            )
            .with_ident(&base),
        )
    }

    fn role_client(&self, config: &ClientConfig) -> Arc<dyn AwsClient> {
        tracing::debug!("configuring assume role client");
        let profile = non_empty(config.src_profile.as_deref())
            .or_else(|| non_empty(config.profile_name.as_deref()));
        let cache = self.cache(
            ASSUME_ROLE_CACHE,
            config.profile_name.as_deref(),
            config.role_arn.as_deref(),
        );
        let operation = |mfa_serial: Option<String>| AssumeRole {
            role_arn: config.role_arn.clone().unwrap_or_default(),
            external_id: config.external_id.clone(),
            mfa_serial,
        };

        if config.role_credential_duration() <= ASSUME_ROLE_DURATION_DEFAULT {
            tracing::debug!("default or lower role duration, using session token credentials");
            let session: Arc<dyn AwsClient> = Arc::new(self.session_client(config, profile));
            let provider = CredentialProvider::new(
                operation(None),
                self.connector.connect(
                    CredentialSource::Client(Arc::clone(&session)),
                    config.region.as_ref(),
                ),
                config.role_credential_duration(),
                cache,
            )
            .signed_by(&session);
            let client = AssumeRoleClient::new(
                provider,
                config.role_session_name.clone(),
                None,
                Arc::clone(&self.mfa_input),
            );
            return Arc::new(client.with_ident(&session));
        }

        let provider = CredentialProvider::new(
            operation(config.mfa_serial.clone().filter(|serial| !serial.is_empty())),
            self.connector.connect(
                CredentialSource::Profile(profile.map(str::to_string)),
                config.region.as_ref(),
            ),
            config.role_credential_duration(),
            cache,
        );
        Arc::new(AssumeRoleClient::new(
            provider,
            config.role_session_name.clone(),
            config.mfa_code.clone(),
            Arc::clone(&self.mfa_input),
        ))
    }

    fn session_client(&self, config: &ClientConfig, profile: Option<&str>) -> SessionTokenClient {
        tracing::debug!(?profile, "configuring session token client");
        let provider = CredentialProvider::new(
            SessionToken {
                mfa_serial: config.mfa_serial.clone().filter(|serial| !serial.is_empty()),
            },
            self.connector.connect(
                CredentialSource::Profile(profile.map(str::to_string)),
                config.region.as_ref(),
            ),
            config.session_token_duration(),
            self.cache(SESSION_TOKEN_CACHE, profile, None),
        );
        SessionTokenClient::new(
            provider,
            config.mfa_code.clone(),
            Arc::clone(&self.mfa_input),
        )
    }

    fn auth_config(&self) -> AuthenticationConfig {
        AuthenticationConfig::new(
            Arc::clone(&self.credential_input),
            Arc::clone(&self.mfa_input),
        )
    }

    fn password(&self, url: &str, password: Option<&str>) -> Option<String> {
        non_empty(password).map(|password| decode_password(&*self.password_codec, url, password))
    }

    fn cache(
        &self,
        prefix: &str,
        profile: Option<&str>,
        role_arn: Option<&str>,
    ) -> Option<CredentialCache> {
        let dir = self.cache_dir.as_deref()?;
        let path = cache_file_name(dir, prefix, profile, role_arn);
        tracing::debug!(path = %path.display(), "using credential cache");
        Some(CredentialCache::new(path))
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Factory")
            .field("cache_dir", &self.cache_dir)
            .field("cookies", &self.cookies)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Factory`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use aws_federation_flow::{CookieJar, Factory, InputError};
///
/// let factory = Factory::builder()
///     // keep cache files in "$PWD/.cache" instead of next to the AWS config file
///     .cache_dir(".cache")
///     // don't remember identity provider sessions between runs
///     .cookie_jar(CookieJar::in_memory())
///     // never prompt for MFA codes
///     .mfa_input(|| Err::<String, _>(InputError::new("MFA codes must be configured")))
///     .build()
///     .expect("cache dir is set");
/// ```
#[must_use]
#[allow(clippy::module_name_repetitions)]
pub struct FactoryBuilder {
    cache: bool,
    cache_dir: Option<PathBuf>,
    cookie_jar: Option<Arc<CookieJar>>,
    connector: Arc<dyn StsConnector>,
    credential_input: Arc<dyn CredentialInputProvider>,
    mfa_input: Arc<dyn MfaInputProvider>,
    password_codec: Arc<dyn PasswordCodec>,
}

impl Default for FactoryBuilder {
    fn default() -> Self {
        Self {
            cache: true,
            cache_dir: None,
            cookie_jar: None,
            connector: Arc::new(SdkConnector),
            credential_input: Arc::new(TerminalPrompt),
            mfa_input: Arc::new(TerminalPrompt),
            password_codec: Arc::new(PlainText),
        }
    }
}

impl FactoryBuilder {
    /// Whether to cache credentials in files (default `true`).
    ///
    /// Cached credentials are reused, without contacting the identity provider or STS, until
    /// they are about to expire.
    pub fn cache(self, enabled: bool) -> Self {
        Self {
            cache: enabled,
            ..self
        }
    }

    /// Set the cache directory.
    ///
    /// Credential caches and the cookie jar are kept here. By default they are kept next to the
    /// AWS shared config file (located with `AWS_CONFIG_FILE`, or `~/.aws/config`).
    pub fn cache_dir(self, path: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: Some(path.into()),
            ..self
        }
    }

    /// Set the cookie jar for identity provider sessions.
    ///
    /// By default the jar is loaded from the cache directory.
    pub fn cookie_jar(self, jar: CookieJar) -> Self {
        Self {
            cookie_jar: Some(Arc::new(jar)),
            ..self
        }
    }

    /// Set how STS is reached. By default `aws-sdk-sts` is used, see [`SdkConnector`].
    pub fn sts_connector(self, connector: impl StsConnector) -> Self {
        Self {
            connector: Arc::new(connector),
            ..self
        }
    }

    /// Set where missing usernames and passwords come from (default [`TerminalPrompt`]).
    pub fn credential_input(self, provider: impl CredentialInputProvider) -> Self {
        Self {
            credential_input: Arc::new(provider),
            ..self
        }
    }

    /// Set where MFA codes come from (default [`TerminalPrompt`]).
    pub fn mfa_input(self, provider: impl MfaInputProvider) -> Self {
        Self {
            mfa_input: Arc::new(provider),
            ..self
        }
    }

    /// Set how configured passwords are decoded (default [`PlainText`]).
    pub fn password_codec(self, codec: impl PasswordCodec) -> Self {
        Self {
            password_codec: Arc::new(codec),
            ..self
        }
    }

    /// Build the [`Factory`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the default cache directory is needed but the AWS shared
    /// config file cannot be located.
    pub fn build(self) -> Result<Factory, Error> {
        let dir = match (&self.cache_dir, self.cache || self.cookie_jar.is_none()) {
            (Some(dir), _) => Some(dir.clone()),
            (None, true) => Some(shared_config_dir()?),
            (None, false) => None,
        };

        let cookies = match (self.cookie_jar, &dir) {
            (Some(jar), _) => jar,
            (None, Some(dir)) => Arc::new(CookieJar::load(dir.join(COOKIE_FILE))),
            (None, None) => Arc::new(CookieJar::in_memory()),
        };

        Ok(Factory {
            cache_dir: dir.filter(|_| self.cache),
            cookies,
            connector: self.connector,
            credential_input: self.credential_input,
            mfa_input: self.mfa_input,
            password_codec: self.password_codec,
        })
    }
}
