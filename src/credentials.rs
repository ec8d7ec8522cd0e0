use std::fmt;

use chrono::{DateTime, Utc};

use crate::{cache::Expiry, sts::StsCredentials};

/// Temporary AWS credentials, as returned to callers and stored in cache files.
///
/// The secret and session token are not printed in `Debug` output.
#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Credentials {
    /// The access key ID.
    pub access_key_id: String,

    /// The secret access key.
    pub secret_access_key: String,

    /// The session token.
    pub session_token: String,

    /// When the credentials expire.
    pub expires_at: DateTime<Utc>,

    /// Which kind of STS call produced the credentials (`SamlRoleProvider`, `WebRoleProvider`,
    /// `AssumeRoleProvider` or `SessionTokenProvider`).
    pub provider_name: String,
}

impl Credentials {
    pub(crate) fn issued(credentials: StsCredentials, provider_name: &str) -> Self {
        Self {
            access_key_id: credentials.access_key_id,
            secret_access_key: credentials.secret_access_key,
            session_token: credentials.session_token,
            expires_at: credentials.expires_at,
            provider_name: provider_name.to_string(),
        }
    }

    /// Whether the credentials have expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("expires_at", &self.expires_at)
            .field("provider_name", &self.provider_name)
            .finish_non_exhaustive()
    }
}

impl Expiry for Credentials {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}
