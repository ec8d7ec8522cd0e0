use std::sync::Arc;

use dialoguer::{Input, Password};

use crate::InputError;

/// A source of usernames and passwords for identity provider logins.
///
/// The trait is implemented for functions taking the already configured username and password
/// (either may be absent) and returning the complete pair, so a non-interactive provider could
/// look like:
///
/// ```
/// use aws_federation_flow::{CredentialInputProvider, InputError};
///
/// fn from_env() -> impl CredentialInputProvider {
///     |username: Option<&str>, _password: Option<&str>| -> Result<(String, String), InputError> {
///         let username = match username {
///             Some(username) => username.to_string(),
///             None => std::env::var("IDP_USER").map_err(InputError::new)?,
///         };
///         let password = std::env::var("IDP_PASSWORD").map_err(InputError::new)?;
///         Ok((username, password))
///     }
/// }
/// ```
///
/// Implementations may block; they are called from a blocking-capable thread.
pub trait CredentialInputProvider: Send + Sync + 'static {
    /// Complete the username and password, prompting for whichever is missing.
    ///
    /// # Errors
    ///
    /// Any error is propagated to the caller of the operation that needed the credentials.
    fn read_username_password(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<(String, String), InputError>;
}

impl<F> CredentialInputProvider for F
where
    F: Fn(Option<&str>, Option<&str>) -> Result<(String, String), InputError>
        + Send
        + Sync
        + 'static,
{
    fn read_username_password(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<(String, String), InputError> {
        self(username, password)
    }
}

/// A source of one-time MFA codes.
///
/// Implemented for `Fn() -> Result<String, InputError>`.
pub trait MfaInputProvider: Send + Sync + 'static {
    /// Read an MFA code.
    ///
    /// # Errors
    ///
    /// Any error is propagated to the caller of the operation that needed the code.
    fn read_mfa_code(&self) -> Result<String, InputError>;
}

impl<F> MfaInputProvider for F
where
    F: Fn() -> Result<String, InputError> + Send + Sync + 'static,
{
    fn read_mfa_code(&self) -> Result<String, InputError> {
        self()
    }
}

/// Prompts on the controlling terminal.
///
/// This is the default for both [`CredentialInputProvider`] and [`MfaInputProvider`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalPrompt;

impl CredentialInputProvider for TerminalPrompt {
    fn read_username_password(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<(String, String), InputError> {
        let username = match username {
            Some(username) => username.to_string(),
            None => Input::<String>::new()
                .with_prompt("Username")
                .interact_text()
                .map_err(InputError::new)?,
        };
        let password = match password {
            Some(password) => password.to_string(),
            None => Password::new()
                .with_prompt("Password")
                .interact()
                .map_err(InputError::new)?,
        };
        Ok((username, password))
    }
}

impl MfaInputProvider for TerminalPrompt {
    fn read_mfa_code(&self) -> Result<String, InputError> {
        Input::<String>::new()
            .with_prompt("Enter MFA Code")
            .interact_text()
            .map_err(InputError::new)
    }
}

/// Decodes passwords stored obfuscated in configuration.
///
/// Implemented for `Fn(&str, &str) -> Result<String, E>`.
pub trait PasswordCodec: Send + Sync + 'static {
    /// Decode `encoded`, the password configured for the identity provider at `key`.
    ///
    /// # Errors
    ///
    /// A failure is not fatal: the encoded value is then used as the password.
    fn decode(
        &self,
        key: &str,
        encoded: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;
}

impl<F, E> PasswordCodec for F
where
    F: Fn(&str, &str) -> Result<String, E> + Send + Sync + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn decode(
        &self,
        key: &str,
        encoded: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        self(key, encoded).map_err(Into::into)
    }
}

/// Passwords are configured as-is.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainText;

impl PasswordCodec for PlainText {
    fn decode(
        &self,
        _key: &str,
        encoded: &str,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        Ok(encoded.to_string())
    }
}

pub(crate) fn decode_password(codec: &dyn PasswordCodec, key: &str, encoded: &str) -> String {
    codec.decode(key, encoded).unwrap_or_else(|error| {
        tracing::debug!("using password as configured, failed to decode it: {error}");
        encoded.to_string()
    })
}

// Prompts block on the terminal, so they run on the blocking pool.
pub(crate) async fn read_username_password(
    provider: &Arc<dyn CredentialInputProvider>,
    username: Option<String>,
    password: Option<String>,
) -> Result<(String, String), InputError> {
    let provider = Arc::clone(provider);
    tokio::task::spawn_blocking(move || {
        provider.read_username_password(username.as_deref(), password.as_deref())
    })
    .await
    .map_err(InputError::new)?
}

pub(crate) async fn read_mfa_code(
    provider: &Arc<dyn MfaInputProvider>,
) -> Result<String, InputError> {
    let provider = Arc::clone(provider);
    tokio::task::spawn_blocking(move || provider.read_mfa_code())
        .await
        .map_err(InputError::new)?
}
