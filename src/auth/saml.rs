use scraper::{ElementRef, Html};
use url::Url;

use super::{AuthClient, AuthenticationConfig};
use crate::{
    assertion::SamlAssertion,
    http::{error_for_status, Redirects},
    Error,
};

const SAML_STAGE: &str = "SAML request";
const FORM_STAGE: &str = "login form";
const SAML_RESPONSE: &str = "SAMLResponse";
const MFA_FIELDS: &[&str] = &["otp", "code", "totp", "mfa_code"];

impl AuthClient {
    /// The SAML assertion for the configured identity provider.
    ///
    /// A held assertion is returned as-is until it expires. Otherwise the identity provider is
    /// asked for a new one, logging in through its form if it presents one. An empty assertion
    /// means the identity provider did not hand one out.
    pub(crate) async fn saml_assertion(&self) -> Result<SamlAssertion, Error> {
        let mut state = self.state.lock().await;
        if let Some(saml) = state.saml.as_ref().filter(|saml| saml.is_fresh()) {
            tracing::debug!("using held SAML assertion");
            return Ok(saml.clone());
        }

        let client = self.transport.client(self.vendor.saml_redirects())?;
        tracing::debug!(url = %self.url, "requesting SAML assertion");
        let response = client
            .get(self.url.clone())
            .send()
            .await
            .map_err(Error::transport(SAML_STAGE))?;
        let response = error_for_status(SAML_STAGE, response)?;
        let page_url = response.url().clone();
        let body = response.text().await.map_err(Error::transport(SAML_STAGE))?;

        let saml = match scan_page(&body, &page_url) {
            Page::Assertion(saml) => saml,
            Page::LoginForm(form) => {
                tracing::debug!(action = %form.action, "submitting identity provider login form");
                state.config.gather_credentials().await?;
                self.submit_login(form, &state.config).await?
            }
            Page::Other => SamlAssertion::default(),
        };

        if saml.is_empty() {
            tracing::debug!("identity provider response did not contain a SAML assertion");
        } else {
            tracing::trace!(assertion = saml.as_str(), "received SAML assertion");
            match saml.roles() {
                Ok(roles) => tracing::debug!(?roles, "received SAML assertion"),
                Err(error) => tracing::debug!("received unparseable SAML assertion: {error}"),
            }
        }

        state.saml = Some(saml.clone());
        Ok(saml)
    }

    async fn submit_login(
        &self,
        form: LoginForm,
        config: &AuthenticationConfig,
    ) -> Result<SamlAssertion, Error> {
        let mut fields = form.fields;
        if let (Some(field), Some(username)) = (form.username_field, &config.username) {
            fields.push((field, username.clone()));
        }
        fields.push((
            form.password_field,
            config.password.clone().unwrap_or_default(),
        ));
        if let (Some(field), Some(code)) = (form.mfa_field, &config.mfa_code) {
            fields.push((field, code.clone()));
        }

        let response = self
            .transport
            .client(Redirects::Follow)?
            .post(form.action)
            .form(&fields)
            .send()
            .await
            .map_err(Error::transport(FORM_STAGE))?;
        let response = error_for_status(FORM_STAGE, response)?;
        let page_url = response.url().clone();
        let body = response.text().await.map_err(Error::transport(FORM_STAGE))?;

        match scan_page(&body, &page_url) {
            Page::Assertion(saml) => Ok(saml),
            Page::LoginForm(_) | Page::Other => Ok(SamlAssertion::default()),
        }
    }
}

#[derive(Debug)]
enum Page {
    Assertion(SamlAssertion),
    LoginForm(LoginForm),
    Other,
}

#[derive(Debug, Eq, PartialEq)]
struct LoginForm {
    action: Url,
    fields: Vec<(String, String)>,
    username_field: Option<String>,
    password_field: String,
    mfa_field: Option<String>,
}

// The parsed document is not `Send`, so everything needed later is copied out here.
fn scan_page(body: &str, page_url: &Url) -> Page {
    let document = Html::parse_document(body);
    let root = document.root_element();

    let saml = elements(root, "input")
        .find(|input| input.value().attr("name") == Some(SAML_RESPONSE))
        .map(|input| input.value().attr("value").unwrap_or_default());
    if let Some(saml) = saml {
        return Page::Assertion(SamlAssertion::new(saml));
    }

    let page = elements(root, "form")
        .find_map(|form| login_form(form, page_url))
        .map_or(Page::Other, Page::LoginForm);
    page
}

fn login_form(form: ElementRef<'_>, page_url: &Url) -> Option<LoginForm> {
    let mut fields = Vec::new();
    let mut username_field = None;
    let mut password_field = None;
    let mut mfa_field = None;

    for input in elements(form, "input") {
        let input = input.value();
        let Some(name) = input.attr("name").filter(|name| !name.is_empty()) else {
            continue;
        };
        let kind = input.attr("type").unwrap_or("text").to_ascii_lowercase();
        match kind.as_str() {
            "hidden" => fields.push((
                name.to_string(),
                input.attr("value").unwrap_or_default().to_string(),
            )),
            "password" => password_field = Some(name.to_string()),
            "text" | "email" | "tel" | "number" => {
                if MFA_FIELDS.contains(&name.to_ascii_lowercase().as_str()) {
                    mfa_field = Some(name.to_string());
                } else if username_field.is_none() {
                    username_field = Some(name.to_string());
                }
            }
            _ => {}
        }
    }

    let action = match form.value().attr("action").filter(|action| !action.is_empty()) {
        Some(action) => page_url.join(action).ok()?,
        None => page_url.clone(),
    };

    Some(LoginForm {
        action,
        fields,
        username_field,
        password_field: password_field?,
        mfa_field,
    })
}

fn elements<'a>(
    root: ElementRef<'a>,
    name: &'a str,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    root.descendants()
        .filter_map(ElementRef::wrap)
        .filter(move |element| element.value().name() == name)
}
