#![allow(dead_code)]

use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use aws_federation_flow::{
    AssumeRoleRequest, AssumeRoleWithSamlRequest, AssumeRoleWithWebIdentityRequest,
    CallerIdentity, CookieJar, CredentialSource, Factory, FactoryBuilder, GetSessionTokenRequest,
    InputError, Region, Sts, StsConnector, StsCredentials,
};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use chrono::{DateTime, Duration, SecondsFormat, Utc};

pub const ACCOUNT: &str = "123456789012";
pub const PROVIDER: &str = "arn:aws:iam::123456789012:saml-provider/Corp";
pub const ADMIN_ROLE: &str = "arn:aws:iam::123456789012:role/Admin";
pub const JUMP_ROLE: &str = "arn:aws:iam::123456789012:role/Jump";
pub const TARGET_ROLE: &str = "arn:aws:iam::123456789012:role/Target";

/// Serve `router` on an ephemeral local port, returning its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}")
}

/// A factory builder that never prompts, caching in `dir` and recording STS calls in `sts`.
///
/// Without a cookie jar of its own, the factory keeps its cookies in `dir`.
pub fn factory_builder(dir: &Path, sts: &RecordingConnector) -> FactoryBuilder {
    Factory::builder()
        .cache_dir(dir)
        .sts_connector(sts.clone())
        .credential_input(|_: Option<&str>, _: Option<&str>| {
            Err::<(String, String), _>(InputError::new("unexpected credential prompt"))
        })
        .mfa_input(|| Err::<String, _>(InputError::new("unexpected MFA prompt")))
}

/// A factory that never prompts and keeps its cookies in memory.
pub fn factory(dir: &Path, sts: &RecordingConnector) -> Factory {
    factory_builder(dir, sts)
        .cookie_jar(CookieJar::in_memory())
        .build()
        .unwrap()
}

pub fn saml_assertion(expires_at: DateTime<Utc>, roles: &[&str]) -> String {
    let values: String = roles
        .iter()
        .map(|role| format!("<saml2:AttributeValue>{role},{PROVIDER}</saml2:AttributeValue>"))
        .collect();
    STANDARD.encode(format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<saml2p:Response xmlns:saml2p="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml2="urn:oasis:names:tc:SAML:2.0:assertion">
  <saml2:Assertion>
    <saml2:Conditions NotBefore="2020-01-01T00:00:00Z" NotOnOrAfter="{expires}"/>
    <saml2:AttributeStatement>
      <saml2:Attribute Name="https://aws.amazon.com/SAML/Attributes/Role">{values}</saml2:Attribute>
      <saml2:Attribute Name="https://aws.amazon.com/SAML/Attributes/RoleSessionName">
        <saml2:AttributeValue>jane.doe@example.com</saml2:AttributeValue>
      </saml2:Attribute>
    </saml2:AttributeStatement>
  </saml2:Assertion>
</saml2p:Response>"#,
        expires = expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    ))
}

pub fn saml_page(assertion: &str) -> String {
    format!(
        r#"<html><body onload="document.forms[0].submit()">
<form method="post" action="https://signin.aws.amazon.com/saml">
<input type="hidden" name="SAMLResponse" value="{assertion}">
<input type="hidden" name="RelayState" value="">
</form></body></html>"#
    )
}

pub fn jwt(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
    let claims = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"jane","exp":{exp}}}"#));
    format!("{header}.{claims}.")
}

/// Counts requests to an identity provider route.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// An STS call, with the credentials that signed it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    AssumeRoleWithSaml {
        role_arn: String,
        principal_arn: String,
        duration_seconds: i32,
    },
    AssumeRoleWithWebIdentity {
        role_arn: String,
        role_session_name: String,
        web_identity_token: String,
        duration_seconds: i32,
    },
    AssumeRole {
        signer: String,
        role_arn: String,
        role_session_name: String,
        duration_seconds: i32,
        serial_number: Option<String>,
        token_code: Option<String>,
    },
    GetSessionToken {
        signer: String,
        duration_seconds: i32,
        serial_number: Option<String>,
        token_code: Option<String>,
    },
    GetCallerIdentity {
        signer: String,
    },
}

/// Connects to a fake STS that records calls and issues numbered credentials.
#[derive(Clone, Default)]
pub struct RecordingConnector {
    calls: Arc<Mutex<Vec<Call>>>,
    issued: Arc<AtomicUsize>,
}

impl RecordingConnector {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl StsConnector for RecordingConnector {
    fn connect(&self, source: CredentialSource, _region: Option<&Region>) -> Arc<dyn Sts> {
        Arc::new(RecordingSts {
            source,
            connector: self.clone(),
        })
    }
}

struct RecordingSts {
    source: CredentialSource,
    connector: RecordingConnector,
}

impl RecordingSts {
    /// Who signs requests: a profile name, or the access key obtained from another client.
    async fn signer(&self) -> Result<String, String> {
        match &self.source {
            CredentialSource::Anonymous => Ok("anonymous".to_string()),
            CredentialSource::Profile(profile) => Ok(format!(
                "profile:{}",
                profile.as_deref().unwrap_or("default")
            )),
            CredentialSource::Client(client) => client
                .credentials()
                .await
                .map(|credentials| credentials.access_key_id)
                .map_err(|error| error.to_string()),
        }
    }

    fn record(&self, call: Call) -> StsCredentials {
        self.connector.calls.lock().unwrap().push(call);
        let n = self.connector.issued.fetch_add(1, Ordering::SeqCst) + 1;
        StsCredentials {
            access_key_id: format!("ASIA{n:04}"),
            secret_access_key: format!("secret{n}"),
            session_token: format!("token{n}"),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }
}

#[async_trait::async_trait]
impl Sts for RecordingSts {
    async fn assume_role_with_saml(
        &self,
        request: AssumeRoleWithSamlRequest,
    ) -> Result<StsCredentials, String> {
        Ok(self.record(Call::AssumeRoleWithSaml {
            role_arn: request.role_arn,
            principal_arn: request.principal_arn,
            duration_seconds: request.duration_seconds,
        }))
    }

    async fn assume_role_with_web_identity(
        &self,
        request: AssumeRoleWithWebIdentityRequest,
    ) -> Result<StsCredentials, String> {
        Ok(self.record(Call::AssumeRoleWithWebIdentity {
            role_arn: request.role_arn,
            role_session_name: request.role_session_name,
            web_identity_token: request.web_identity_token,
            duration_seconds: request.duration_seconds,
        }))
    }

    async fn assume_role(&self, request: AssumeRoleRequest) -> Result<StsCredentials, String> {
        let signer = self.signer().await?;
        Ok(self.record(Call::AssumeRole {
            signer,
            role_arn: request.role_arn,
            role_session_name: request.role_session_name,
            duration_seconds: request.duration_seconds,
            serial_number: request.serial_number,
            token_code: request.token_code,
        }))
    }

    async fn get_session_token(
        &self,
        request: GetSessionTokenRequest,
    ) -> Result<StsCredentials, String> {
        let signer = self.signer().await?;
        Ok(self.record(Call::GetSessionToken {
            signer,
            duration_seconds: request.duration_seconds,
            serial_number: request.serial_number,
            token_code: request.token_code,
        }))
    }

    async fn get_caller_identity(&self) -> Result<CallerIdentity, String> {
        let signer = self.signer().await?;
        self.connector
            .calls
            .lock()
            .unwrap()
            .push(Call::GetCallerIdentity {
                signer: signer.clone(),
            });
        let arn = if signer.starts_with("profile:") {
            format!("arn:aws:iam::{ACCOUNT}:user/jane")
        } else {
            format!("arn:aws:sts::{ACCOUNT}:assumed-role/Jump/jane")
        };
        Ok(CallerIdentity {
            account: ACCOUNT.to_string(),
            arn,
            user_id: "AIDAEXAMPLE".to_string(),
        })
    }
}
