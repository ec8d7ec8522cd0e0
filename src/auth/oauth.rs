use std::path::Path;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use reqwest::{header::LOCATION, StatusCode};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{AuthClient, AuthenticationConfig};
use crate::{
    assertion::OidcIdentityToken,
    http::{read_limited, Redirects},
    Error,
};

const AUTHORIZE_STAGE: &str = "oAuth authorize";
const TOKEN_STAGE: &str = "oAuth token";
const TOKEN_RESPONSE_LIMIT: usize = 64 * 1024;
const CODE_VERIFIER_LEN: usize = 64;

type QueryPairs = Vec<(String, String)>;

/// The query of an authorization code request with PKCE.
#[derive(Debug, serde::Serialize)]
struct AuthorizeRequest {
    client_id: String,
    code_challenge: String,
    code_challenge_method: &'static str,
    redirect_uri: String,
    response_type: &'static str,
    state: String,
    scope: String,
}

#[derive(serde::Deserialize)]
struct OauthToken {
    access_token: Option<String>,
    id_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
}

impl AuthClient {
    /// The OIDC token for the configured identity provider.
    ///
    /// A held token is returned until it expires. A configured token file is read in preference
    /// to running the authorization code flow.
    pub(crate) async fn identity_token(
        &self,
        cancel: &CancellationToken,
    ) -> Result<OidcIdentityToken, Error> {
        let mut state = self.state.lock().await;
        if let Some(token) = state.token.as_ref().filter(|token| token.is_fresh()) {
            tracing::debug!("using held identity token");
            return Ok(token.clone());
        }

        let token = match &state.config.token_file {
            Some(path) => read_token_file(path).await?,
            None => self.authorization_code_flow(&state.config, cancel).await?,
        };

        state.token = Some(token.clone());
        Ok(token)
    }

    async fn authorization_code_flow(
        &self,
        config: &AuthenticationConfig,
        cancel: &CancellationToken,
    ) -> Result<OidcIdentityToken, Error> {
        let verifier = code_verifier();
        let request = pkce_authz_request(config, &code_challenge(&verifier));

        check_cancelled(cancel)?;
        let query = self
            .oauth_authorize(
                self.vendor.authorize_endpoint(&self.url),
                &request,
                self.vendor.follows_authorize_redirect(),
            )
            .await?;
        let code = authorization_code(&query, &request.state)?;

        check_cancelled(cancel)?;
        let token = self
            .oauth_token(
                self.vendor.token_endpoint(&self.url),
                &request,
                &code,
                &verifier,
            )
            .await?;
        tracing::debug!(token_type = ?token.token_type, "received oAuth token");

        let selected = self
            .vendor
            .select_token(token.id_token.as_deref(), token.access_token.as_deref())
            .ok_or_else(|| {
                Error::Protocol("oAuth token response has no usable token".to_string())
            })?;
        Ok(OidcIdentityToken::new(selected).or_expires_in(token.expires_in))
    }

    /// Request an authorization code, returning the query of the redirect back to the client.
    ///
    /// When following redirects, the redirect policy stops at the first redirect to the redirect
    /// URI, which is usually unreachable and never requested. Without following, the identity
    /// provider must answer with a `302`.
    async fn oauth_authorize(
        &self,
        endpoint: Url,
        request: &AuthorizeRequest,
        follow_redirect: bool,
    ) -> Result<QueryPairs, Error> {
        let redirects = if follow_redirect {
            Redirects::FollowUntil(&request.redirect_uri)
        } else {
            Redirects::None
        };

        let response = self
            .transport
            .client(redirects)?
            .get(endpoint)
            .query(request)
            .send()
            .await
            .map_err(Error::transport(AUTHORIZE_STAGE))?;

        let status = response.status();
        let accepted = if follow_redirect {
            status.is_redirection()
        } else {
            status == StatusCode::FOUND
        };
        if !accepted {
            return Err(Error::Status {
                stage: AUTHORIZE_STAGE,
                status,
            });
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|location| location.to_str().ok())
            .ok_or_else(|| {
                Error::Protocol("oAuth authorize response has no Location header".to_string())
            })?;
        let location = response.url().join(location).map_err(|error| {
            Error::Protocol(format!("invalid oAuth authorize redirect {location}: {error}"))
        })?;
        Ok(query_pairs(&location))
    }

    async fn oauth_token(
        &self,
        endpoint: Url,
        request: &AuthorizeRequest,
        code: &str,
        verifier: &str,
    ) -> Result<OauthToken, Error> {
        let form = [
            ("client_id", request.client_id.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", request.redirect_uri.as_str()),
        ];

        let response = self
            .transport
            .client(Redirects::Follow)?
            .post(endpoint)
            .form(&form)
            .send()
            .await
            .map_err(Error::transport(TOKEN_STAGE))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                stage: TOKEN_STAGE,
                status,
            });
        }

        let body = read_limited(TOKEN_STAGE, response, TOKEN_RESPONSE_LIMIT).await?;
        serde_json::from_slice(&body)
            .map_err(|error| Error::Protocol(format!("invalid oAuth token response: {error}")))
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), Error> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

fn code_verifier() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_VERIFIER_LEN)
        .map(char::from)
        .collect()
}

fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn pkce_authz_request(config: &AuthenticationConfig, challenge: &str) -> AuthorizeRequest {
    // Only needs to be echoed back, it is not a security control.
    let state = format!(
        "{}.{}.{challenge}",
        Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        rand::random::<u32>(),
    );

    let scope = std::iter::once("openid")
        .chain(config.scopes.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");

    AuthorizeRequest {
        client_id: config.client_id.clone().unwrap_or_default(),
        code_challenge: challenge.to_string(),
        code_challenge_method: "S256",
        redirect_uri: config.redirect_uri.clone().unwrap_or_default(),
        response_type: "code",
        state: URL_SAFE_NO_PAD.encode(state),
        scope,
    }
}

fn authorization_code(query: &[(String, String)], expected_state: &str) -> Result<String, Error> {
    let param = |name: &str| {
        query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    };

    if let Some(error) = param("error") {
        return Err(Error::Protocol(format!(
            "authorization failed: {error}: {}",
            param("error_description").unwrap_or_default()
        )));
    }
    if param("state").is_some_and(|state| state != expected_state) {
        return Err(Error::Protocol(
            "oAuth authorize state does not match request".to_string(),
        ));
    }
    param("code")
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::Protocol("oAuth authorize response has no code".to_string()))
}

fn query_pairs(url: &Url) -> QueryPairs {
    url.query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

async fn read_token_file(path: &Path) -> Result<OidcIdentityToken, Error> {
    let token = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(OidcIdentityToken::new(token.trim()))
}
