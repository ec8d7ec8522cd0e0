use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

use url::Url;

use crate::{
    arn::Arn,
    provider::{ASSUME_ROLE_DURATION_DEFAULT, SESSION_TOKEN_DURATION_DEFAULT},
    Error, Region,
};

const AWS_CONFIG_FILE: &str = "AWS_CONFIG_FILE";
const AWS_CONFIG_FILE_DEFAULT: &[&str] = &[".aws", "config"];

/// How the identity provider expects multi-factor authentication to be supplied.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MfaType {
    /// No MFA is requested.
    None,

    /// A one-time code is gathered from the user (or configuration) and submitted.
    Code,

    /// The identity provider drives MFA itself (push notification, default factor, ...).
    #[default]
    Auto,
}

impl FromStr for MfaType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "code" => Ok(Self::Code),
            "auto" | "" => Ok(Self::Auto),
            other => Err(Error::Config(format!("unknown MFA type {other}"))),
        }
    }
}

/// Fully resolved configuration for obtaining credentials.
///
/// Loading and merging configuration files is up to the caller; this is the result. Passwords
/// may be encoded, in which case they are decoded by the factory's
/// [`PasswordCodec`](crate::PasswordCodec) keyed by the identity provider URL.
#[derive(Clone, Default)]
pub struct ClientConfig {
    /// The profile name, or a role ARN to be used as the target role.
    pub profile_name: Option<String>,

    /// The region for AWS STS calls.
    pub region: Option<Region>,

    /// The role to obtain credentials for.
    pub role_arn: Option<String>,

    /// An intermediate role assumed with federated credentials before `role_arn`.
    pub jump_role_arn: Option<String>,

    /// The profile providing IAM credentials for assume role and session token calls.
    pub src_profile: Option<String>,

    /// The session name for assume role calls.
    pub role_session_name: Option<String>,

    /// The external ID for assume role calls.
    pub external_id: Option<String>,

    /// The serial number (or ARN) of the IAM user's MFA device.
    pub mfa_serial: Option<String>,

    /// A pre-supplied MFA code.
    pub mfa_code: Option<String>,

    /// How MFA is supplied to the identity provider.
    pub mfa_type: MfaType,

    /// The requested duration of role credentials.
    pub credentials_duration: Option<Duration>,

    /// The requested duration of session token credentials.
    pub session_token_duration: Option<Duration>,

    /// The SAML identity provider URL.
    pub saml_url: Option<String>,

    /// The username for the SAML identity provider.
    pub saml_username: Option<String>,

    /// The (possibly encoded) password for the SAML identity provider.
    pub saml_password: Option<String>,

    /// The kind of SAML identity provider (`okta`, `keycloak`, ...).
    pub saml_provider: Option<String>,

    /// The OIDC identity provider URL.
    pub web_identity_url: Option<String>,

    /// The username for the OIDC identity provider.
    pub web_identity_username: Option<String>,

    /// The (possibly encoded) password for the OIDC identity provider.
    pub web_identity_password: Option<String>,

    /// The kind of OIDC identity provider (`okta`, `keycloak`, ...).
    pub web_identity_provider: Option<String>,

    /// The OAuth client ID.
    pub web_identity_client_id: Option<String>,

    /// The OAuth redirect URI registered for the client.
    pub web_identity_redirect_uri: Option<String>,

    /// Scopes requested in addition to `openid`.
    pub web_identity_scopes: Vec<String>,

    /// A file holding a pre-issued web identity token.
    pub web_identity_token_file: Option<PathBuf>,

    /// The username to display for federated identities.
    pub federated_username: Option<String>,
}

impl ClientConfig {
    /// The requested role credential duration, or the default of one hour.
    #[must_use]
    pub fn role_credential_duration(&self) -> Duration {
        self.credentials_duration
            .unwrap_or(ASSUME_ROLE_DURATION_DEFAULT)
    }

    /// The requested session token duration, or the default of twelve hours.
    #[must_use]
    pub fn session_token_duration(&self) -> Duration {
        self.session_token_duration
            .unwrap_or(SESSION_TOKEN_DURATION_DEFAULT)
    }

    /// Check the configuration for errors that no amount of network traffic would fix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<(), Error> {
        let saml_url = non_empty(self.saml_url.as_deref());
        let web_url = non_empty(self.web_identity_url.as_deref());

        if saml_url.is_some() && web_url.is_some() {
            return Err(Error::Config(
                "SAML and web identity URLs are mutually exclusive".to_string(),
            ));
        }
        if let Some(url) = saml_url {
            parse_idp_url(url)?;
        }
        if let Some(url) = web_url {
            parse_idp_url(url)?;
            if self.web_identity_token_file.is_none() {
                let client_id = non_empty(self.web_identity_client_id.as_deref());
                let redirect_uri = non_empty(self.web_identity_redirect_uri.as_deref());
                if client_id.is_none() || redirect_uri.is_none() {
                    return Err(Error::Config(
                        "web identity requires an OAuth client ID and redirect URI".to_string(),
                    ));
                }
            }
        }

        for (name, value) in [
            ("role ARN", &self.role_arn),
            ("jump role ARN", &self.jump_role_arn),
        ] {
            if let Some(value) = non_empty(value.as_deref()) {
                if !Arn::parse(value).is_some_and(|arn| arn.is_role()) {
                    return Err(Error::Config(format!("invalid {name} {value}")));
                }
            }
        }

        if non_empty(self.jump_role_arn.as_deref()).is_some()
            && saml_url.is_none()
            && web_url.is_none()
        {
            return Err(Error::Config(
                "a jump role requires a SAML or web identity URL".to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("profile_name", &self.profile_name)
            .field("region", &self.region)
            .field("role_arn", &self.role_arn)
            .field("jump_role_arn", &self.jump_role_arn)
            .field("src_profile", &self.src_profile)
            .field("mfa_serial", &self.mfa_serial)
            .field("mfa_type", &self.mfa_type)
            .field("credentials_duration", &self.credentials_duration)
            .field("session_token_duration", &self.session_token_duration)
            .field("saml_url", &self.saml_url)
            .field("saml_username", &self.saml_username)
            .field("saml_provider", &self.saml_provider)
            .field("web_identity_url", &self.web_identity_url)
            .field("web_identity_username", &self.web_identity_username)
            .field("web_identity_provider", &self.web_identity_provider)
            .field("web_identity_client_id", &self.web_identity_client_id)
            .field("web_identity_redirect_uri", &self.web_identity_redirect_uri)
            .finish_non_exhaustive()
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

pub(crate) fn parse_idp_url(url: &str) -> Result<Url, Error> {
    let parsed =
        Url::parse(url).map_err(|error| Error::Config(format!("invalid URL {url}: {error}")))?;
    if !parsed.scheme().starts_with("http") {
        return Err(Error::Config(format!("invalid client URL {url}")));
    }
    Ok(parsed)
}

/// The directory holding the AWS shared config file, where cache files are kept.
pub(crate) fn shared_config_dir() -> Result<PathBuf, Error> {
    let file = match read_env(AWS_CONFIG_FILE).map_err(|error| {
        Error::Config(format!(
            "invalid path in environment variable {AWS_CONFIG_FILE}: {error}"
        ))
    })? {
        Some(path) => PathBuf::from(path),
        None => {
            let mut path = dirs_next::home_dir()
                .ok_or_else(|| Error::Config("could not determine home directory".to_string()))?;
            for segment in AWS_CONFIG_FILE_DEFAULT {
                path.push(segment);
            }
            path
        }
    };

    Ok(file
        .parent()
        .map_or_else(|| PathBuf::from("."), PathBuf::from))
}

fn read_env(name: &str) -> Result<Option<String>, String> {
    env::var(name).map(Some).or_else(|error| match error {
        env::VarError::NotPresent => Ok(None),
        env::VarError::NotUnicode(data) => Err(format!("{data:?} contains invalid UTF-8")),
    })
}
