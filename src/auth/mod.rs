//! Identity provider clients.
//!
//! An [`AuthClient`] talks to one identity provider, holding whatever the provider last issued
//! (a SAML assertion or an OIDC token) until it expires. The SAML and OAuth flows live in their
//! own modules and share the configuration and state defined here.

mod input;
mod oauth;
mod saml;
mod vendor;

use std::{fmt, path::PathBuf, sync::Arc};

use tokio::sync::Mutex;
use url::Url;

pub(crate) use self::input::{decode_password, read_mfa_code};
pub use self::{
    input::{CredentialInputProvider, MfaInputProvider, PasswordCodec, PlainText, TerminalPrompt},
    vendor::Vendor,
};
use crate::{
    assertion::{OidcIdentityToken, SamlAssertion},
    client::{Identity, IdentityType, Roles},
    config::{non_empty, parse_idp_url},
    http::Transport,
    Error, MfaType,
};

/// Per-client settings for talking to an identity provider.
///
/// Built once by the factory. Only credential gathering fills in values afterwards.
#[derive(Clone)]
pub(crate) struct AuthenticationConfig {
    pub(crate) username: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) mfa_type: MfaType,
    pub(crate) mfa_code: Option<String>,
    pub(crate) mfa_input: Arc<dyn MfaInputProvider>,
    pub(crate) credential_input: Arc<dyn CredentialInputProvider>,
    pub(crate) federated_username: Option<String>,
    pub(crate) client_id: Option<String>,
    pub(crate) redirect_uri: Option<String>,
    pub(crate) scopes: Vec<String>,
    pub(crate) token_file: Option<PathBuf>,
}

impl AuthenticationConfig {
    pub(crate) fn new(
        credential_input: Arc<dyn CredentialInputProvider>,
        mfa_input: Arc<dyn MfaInputProvider>,
    ) -> Self {
        Self {
            username: None,
            password: None,
            mfa_type: MfaType::default(),
            mfa_code: None,
            mfa_input,
            credential_input,
            federated_username: None,
            client_id: None,
            redirect_uri: None,
            scopes: Vec::new(),
            token_file: None,
        }
    }

    fn is_oauth(&self) -> bool {
        non_empty(self.client_id.as_deref()).is_some()
            && non_empty(self.redirect_uri.as_deref()).is_some()
    }

    /// Fill in a missing username, password or MFA code from the input providers.
    ///
    /// Values that are already set are kept, so calling this again is a no-op.
    pub(crate) async fn gather_credentials(&mut self) -> Result<(), Error> {
        if self.username.is_none() || self.password.is_none() {
            let (username, password) = input::read_username_password(
                &self.credential_input,
                self.username.clone(),
                self.password.clone(),
            )
            .await?;
            self.username = Some(username);
            self.password = Some(password);
        }

        if self.mfa_type == MfaType::Code && self.mfa_code.is_none() {
            self.mfa_code = Some(input::read_mfa_code(&self.mfa_input).await?);
        }

        Ok(())
    }
}

impl fmt::Debug for AuthenticationConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AuthenticationConfig")
            .field("username", &self.username)
            .field("mfa_type", &self.mfa_type)
            .field("federated_username", &self.federated_username)
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("token_file", &self.token_file)
            .finish_non_exhaustive()
    }
}

struct AuthState {
    config: AuthenticationConfig,
    saml: Option<SamlAssertion>,
    token: Option<OidcIdentityToken>,
}

/// A client for one identity provider.
pub(crate) struct AuthClient {
    vendor: Vendor,
    url: Url,
    transport: Transport,
    state: Mutex<AuthState>,
}

impl AuthClient {
    pub(crate) fn new(
        vendor: Vendor,
        url: &str,
        transport: Transport,
        config: AuthenticationConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            vendor,
            url: parse_idp_url(url)?,
            transport,
            state: Mutex::new(AuthState {
                config,
                saml: None,
                token: None,
            }),
        })
    }

    pub(crate) fn vendor(&self) -> Vendor {
        self.vendor
    }

    /// The user authenticating with the identity provider.
    ///
    /// Prefers the session name carried by a held SAML assertion, then the configured federated
    /// username, over the login username.
    pub(crate) async fn identity(&self) -> Result<Identity, Error> {
        let mut state = self.state.lock().await;
        if state.config.username.is_none() {
            state.config.gather_credentials().await?;
        }

        let saml_name = state
            .saml
            .as_ref()
            .filter(|saml| !saml.is_empty())
            .and_then(|saml| saml.role_session_name().ok());
        let username = saml_name
            .or_else(|| state.config.federated_username.clone())
            .or_else(|| state.config.username.clone())
            .unwrap_or_default();

        Ok(Identity {
            identity_type: IdentityType::User,
            provider: self.vendor.name().to_string(),
            username,
        })
    }

    /// The federated or login username, if known without asking the user.
    pub(crate) async fn known_username(&self) -> Option<String> {
        let state = self.state.lock().await;
        non_empty(state.config.federated_username.as_deref())
            .or_else(|| non_empty(state.config.username.as_deref()))
            .map(str::to_string)
    }

    /// The roles offered by the held (or a newly requested) SAML assertion.
    pub(crate) async fn roles(&self) -> Result<Roles, Error> {
        if self.state.lock().await.config.is_oauth() {
            return Err(Error::Unsupported("OIDC clients are not role aware"));
        }

        let saml = self.saml_assertion().await?;
        if saml.is_empty() {
            return Ok(Vec::new());
        }
        Ok(saml
            .roles()?
            .into_iter()
            .map(|role| role.role_arn)
            .collect())
    }
}

impl fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AuthClient")
            .field("vendor", &self.vendor)
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}
