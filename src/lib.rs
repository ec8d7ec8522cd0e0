#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, clippy::pedantic)]

//! Federated AWS credentials.
//!
//! Obtains temporary AWS credentials by logging in to a SAML or OIDC identity provider and
//! exchanging what it issues with AWS STS, or from IAM credentials via `AssumeRole` and
//! `GetSessionToken`. A [`Factory`] picks the right client for a [`ClientConfig`], optionally
//! chaining a federated "jump" role into a target role.
//!
//! Credentials are cached in files next to the AWS shared config file, and identity provider
//! sessions are kept in a persistent [`CookieJar`], so repeated calls usually need no logins.
//!
//! ```no_run
//! # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use aws_federation_flow::{ClientConfig, Factory};
//!
//! let factory = Factory::builder().build()?;
//! let client = factory.get(&ClientConfig {
//!     web_identity_url: Some("https://idp.example.com/oauth2/default".to_string()),
//!     web_identity_provider: Some("okta".to_string()),
//!     web_identity_client_id: Some("0oa1example".to_string()),
//!     web_identity_redirect_uri: Some("http://localhost:8080/callback".to_string()),
//!     role_arn: Some("arn:aws:iam::123456789012:role/Developer".to_string()),
//!     ..ClientConfig::default()
//! })?;
//!
//! let credentials = client.credentials().await?;
//! println!("{credentials:?}");
//! # Ok(()) }
//! ```

mod arn;
mod assertion;
mod auth;
mod aws_sdk;
mod cache;
mod client;
mod config;
mod cookies;
mod credentials;
mod error;
mod factory;
mod http;
mod provider;
mod region;
mod sts;

pub use crate::{
    assertion::{OidcIdentityToken, SamlAssertion, SamlRole},
    auth::{
        CredentialInputProvider, MfaInputProvider, PasswordCodec, PlainText, TerminalPrompt,
        Vendor,
    },
    aws_sdk::ClientCredentialsProvider,
    client::{AwsClient, CredentialClient, Identity, IdentityClient, IdentityType, Roles},
    config::{ClientConfig, MfaType},
    cookies::CookieJar,
    credentials::Credentials,
    error::{Error, InputError},
    factory::{Factory, FactoryBuilder},
    provider::{
        ASSUME_ROLE_DURATION_DEFAULT, CHAINED_ROLE_DURATION_MAX, SESSION_TOKEN_DURATION_DEFAULT,
    },
    region::Region,
    sts::{
        AssumeRoleRequest, AssumeRoleWithSamlRequest, AssumeRoleWithWebIdentityRequest,
        CallerIdentity, CredentialSource, GetSessionTokenRequest, SdkConnector, Sts,
        StsConnector, StsCredentials,
    },
};

const _: () = assert!(
    const_str::equal!(env!("CARGO_PKG_VERSION_MAJOR"), "0"),
    "client naming scheme needs updated for 1.0"
);
const CLIENT_NAME: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "@",
    "0.",
    env!("CARGO_PKG_VERSION_MINOR")
);
