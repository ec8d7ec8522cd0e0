//! HTTP plumbing shared by the identity provider flows.

use std::sync::Arc;

use reqwest::{redirect::Policy, Response};

use crate::{CookieJar, Error, CLIENT_NAME};

const MAX_REDIRECTS: usize = 10;

/// How a request treats HTTP redirects.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Redirects<'a> {
    /// Return redirect responses to the caller.
    None,

    /// Follow redirects to the final response.
    Follow,

    /// Follow redirects, stopping at (and returning) the first one whose target starts with the
    /// given prefix.
    FollowUntil(&'a str),
}

/// Builds HTTP clients that share one cookie jar.
///
/// The jar is saved when its last holder is dropped, so it stays alive (and unsaved) for as long
/// as any identity provider client can still receive cookies.
#[derive(Clone)]
pub(crate) struct Transport {
    jar: Arc<CookieJar>,
}

impl Transport {
    pub(crate) fn new(jar: &Arc<CookieJar>) -> Self {
        Self {
            jar: Arc::clone(jar),
        }
    }

    pub(crate) fn client(&self, redirects: Redirects<'_>) -> Result<reqwest::Client, Error> {
        let policy = match redirects {
            Redirects::None => Policy::none(),
            Redirects::Follow => Policy::limited(MAX_REDIRECTS),
            Redirects::FollowUntil(prefix) => {
                let prefix = prefix.to_string();
                Policy::custom(move |attempt| {
                    if attempt.url().as_str().starts_with(&prefix) {
                        attempt.stop()
                    } else if attempt.previous().len() > MAX_REDIRECTS {
                        attempt.error("too many redirects")
                    } else {
                        attempt.follow()
                    }
                })
            }
        };

        reqwest::Client::builder()
            .cookie_provider(self.jar.store())
            .redirect(policy)
            .user_agent(CLIENT_NAME)
            .build()
            .map_err(Error::transport("HTTP client"))
    }
}

/// Reject responses with a client or server error status.
pub(crate) fn error_for_status(stage: &'static str, response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        Err(Error::Status { stage, status })
    } else {
        Ok(response)
    }
}

/// Read at most `limit` bytes of the response body, failing if it is longer.
pub(crate) async fn read_limited(
    stage: &'static str,
    mut response: Response,
    limit: usize,
) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(Error::transport(stage))? {
        if body.len() + chunk.len() > limit {
            return Err(Error::Protocol(format!(
                "{stage} response exceeds {limit} bytes"
            )));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
