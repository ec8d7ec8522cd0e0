//! Federation proofs obtained from an identity provider.

use std::{fmt, sync::OnceLock};

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use chrono::{DateTime, Utc};

use crate::Error;

const ROLE_ATTRIBUTE: &str = "https://aws.amazon.com/SAML/Attributes/Role";
const ROLE_SESSION_NAME_ATTRIBUTE: &str = "https://aws.amazon.com/SAML/Attributes/RoleSessionName";

/// A base64-encoded SAML assertion, as posted by an identity provider.
///
/// An empty assertion means the identity provider did not (yet) authenticate the user. Derived
/// fields are parsed from the XML on first use.
#[derive(Default)]
pub struct SamlAssertion {
    encoded: String,
    details: OnceLock<Result<SamlDetails, String>>,
}

#[derive(Clone, Debug)]
struct SamlDetails {
    expires_at: DateTime<Utc>,
    role_session_name: Option<String>,
    roles: Vec<SamlRole>,
}

/// A role that the assertion allows to be assumed, with the SAML provider trusted by the role.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SamlRole {
    /// The ARN of the IAM role.
    pub role_arn: String,

    /// The ARN of the IAM SAML provider.
    pub principal_arn: String,
}

impl SamlAssertion {
    /// Wrap a base64-encoded assertion.
    pub fn new(encoded: impl Into<String>) -> Self {
        Self {
            encoded: encoded.into(),
            details: OnceLock::new(),
        }
    }

    /// The assertion as it was received (base64-encoded XML).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// Whether the identity provider returned no assertion.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.encoded.is_empty()
    }

    /// Decode the assertion into its XML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the assertion is not base64-encoded UTF-8.
    pub fn decode(&self) -> Result<String, Error> {
        let bytes = STANDARD
            .decode(self.encoded.trim())
            .map_err(|error| Error::Protocol(format!("SAML assertion is not base64: {error}")))?;
        String::from_utf8(bytes)
            .map_err(|error| Error::Protocol(format!("SAML assertion is not UTF-8: {error}")))
    }

    /// When the assertion stops being accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the assertion cannot be parsed or carries no expiry.
    pub fn expires_at(&self) -> Result<DateTime<Utc>, Error> {
        self.details().map(|details| details.expires_at)
    }

    /// The role session name asserted by the identity provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the assertion cannot be parsed or has no role session name attribute.
    pub fn role_session_name(&self) -> Result<String, Error> {
        self.details()?
            .role_session_name
            .clone()
            .ok_or_else(|| Error::Protocol("SAML assertion has no RoleSessionName".to_string()))
    }

    /// The roles that may be assumed with this assertion.
    ///
    /// # Errors
    ///
    /// Returns an error if the assertion cannot be parsed.
    pub fn roles(&self) -> Result<Vec<SamlRole>, Error> {
        self.details().map(|details| details.roles.clone())
    }

    /// The SAML provider ARN paired with `role_arn` in this assertion.
    ///
    /// # Errors
    ///
    /// Returns an error if the assertion cannot be parsed or does not grant `role_arn`.
    pub fn principal_arn(&self, role_arn: &str) -> Result<String, Error> {
        self.details()?
            .roles
            .iter()
            .find(|role| role.role_arn == role_arn)
            .map(|role| role.principal_arn.clone())
            .ok_or_else(|| {
                Error::Protocol(format!("role {role_arn} is not granted by the SAML assertion"))
            })
    }

    /// A non-empty assertion whose expiry is still in the future.
    pub(crate) fn is_fresh(&self) -> bool {
        !self.is_empty()
            && self
                .expires_at()
                .is_ok_and(|expires_at| expires_at > Utc::now())
    }

    fn details(&self) -> Result<&SamlDetails, Error> {
        self.details
            .get_or_init(|| {
                let xml = self.decode().map_err(|error| error.to_string())?;
                parse_details(&xml)
            })
            .as_ref()
            .map_err(|error| Error::Protocol(error.clone()))
    }
}

impl Clone for SamlAssertion {
    fn clone(&self) -> Self {
        Self::new(self.encoded.clone())
    }
}

impl PartialEq for SamlAssertion {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
    }
}

impl Eq for SamlAssertion {}

impl fmt::Debug for SamlAssertion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SamlAssertion")
            .field("len", &self.encoded.len())
            .finish_non_exhaustive()
    }
}

fn parse_details(xml: &str) -> Result<SamlDetails, String> {
    let doc =
        roxmltree::Document::parse(xml).map_err(|error| format!("invalid SAML XML: {error}"))?;

    let not_on_or_after = |element: &str| {
        doc.descendants()
            .filter(|node| node.tag_name().name() == element)
            .find_map(|node| node.attribute("NotOnOrAfter"))
    };
    let expires_at = not_on_or_after("Conditions")
        .or_else(|| not_on_or_after("SubjectConfirmationData"))
        .ok_or("SAML assertion has no NotOnOrAfter")?;
    let expires_at = DateTime::parse_from_rfc3339(expires_at)
        .map_err(|error| format!("invalid SAML NotOnOrAfter {expires_at}: {error}"))?
        .with_timezone(&Utc);

    let attribute_values = |name: &str| -> Vec<String> {
        doc.descendants()
            .filter(|node| {
                node.tag_name().name() == "Attribute" && node.attribute("Name") == Some(name)
            })
            .flat_map(|node| node.children())
            .filter(|node| node.tag_name().name() == "AttributeValue")
            .filter_map(|node| node.text())
            .map(|text| text.trim().to_string())
            .collect()
    };

    let roles = attribute_values(ROLE_ATTRIBUTE)
        .iter()
        .filter_map(|value| parse_role(value))
        .collect();
    let role_session_name = attribute_values(ROLE_SESSION_NAME_ATTRIBUTE).into_iter().next();

    Ok(SamlDetails {
        expires_at,
        role_session_name,
        roles,
    })
}

// Identity providers disagree on the order of the pair, so sort it out by ARN shape.
fn parse_role(value: &str) -> Option<SamlRole> {
    let (first, second) = value.split_once(',')?;
    let (first, second) = (first.trim(), second.trim());
    if first.contains(":saml-provider/") {
        Some(SamlRole {
            role_arn: second.to_string(),
            principal_arn: first.to_string(),
        })
    } else {
        Some(SamlRole {
            role_arn: first.to_string(),
            principal_arn: second.to_string(),
        })
    }
}

/// An OIDC identity (or access) token issued by an identity provider.
#[derive(Clone)]
pub struct OidcIdentityToken {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl OidcIdentityToken {
    /// Wrap a token, deriving its expiry from the JWT `exp` claim when it has one.
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let expires_at = jwt_expiry(&token);
        Self { token, expires_at }
    }

    /// Use `expires_in` seconds from now as the expiry, unless the token carries its own.
    #[must_use]
    pub(crate) fn or_expires_in(self, expires_in: Option<i64>) -> Self {
        let expires_at = self.expires_at.or_else(|| {
            expires_in.map(|secs| Utc::now() + chrono::Duration::seconds(secs))
        });
        Self { expires_at, ..self }
    }

    /// The raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// When the token expires, if that could be determined.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Tokens with an unknown expiry are never considered fresh.
    pub(crate) fn is_fresh(&self) -> bool {
        !self.token.is_empty()
            && self
                .expires_at
                .is_some_and(|expires_at| expires_at > Utc::now())
    }
}

impl fmt::Debug for OidcIdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("OidcIdentityToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    #[derive(serde::Deserialize)]
    struct Claims {
        exp: Option<i64>,
    }

    let payload = token.split('.').nth(1)?;
    let payload = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&payload).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}
