mod common;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use aws_federation_flow::{ClientConfig, Error};
use axum::{
    extract::{Query, State},
    http::{header::LOCATION, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use common::{
    factory, jwt, serve, Call, Counter, RecordingConnector, ADMIN_ROLE, JUMP_ROLE, TARGET_ROLE,
};

// Nothing listens here; the flow must not need to reach it.
const REDIRECT_URI: &str = "http://127.0.0.1:9/callback";

#[derive(Clone, Default)]
struct Okta {
    id_token: String,
    code_challenge: Arc<Mutex<Option<String>>>,
    token_requests: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

async fn authorize(
    State(okta): State<Okta>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    assert_eq!(query["client_id"], "0oa1example");
    assert_eq!(query["response_type"], "code");
    assert_eq!(query["code_challenge_method"], "S256");
    assert_eq!(query["redirect_uri"], REDIRECT_URI);
    assert!(query["scope"].starts_with("openid"));
    *okta.code_challenge.lock().unwrap() = Some(query["code_challenge"].clone());

    let location = format!("{REDIRECT_URI}?code=authz-code&state={}", query["state"]);
    (StatusCode::FOUND, [(LOCATION, location)])
}

async fn token(
    State(okta): State<Okta>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    okta.token_requests.lock().unwrap().push(form);
    Json(serde_json::json!({
        "token_type": "Bearer",
        "expires_in": 3600,
        "access_token": "opaque-access-token",
        "id_token": okta.id_token,
    }))
}

async fn okta() -> (String, Okta) {
    let okta = Okta {
        id_token: jwt(Utc::now().timestamp() + 600),
        ..Okta::default()
    };
    let router = Router::new()
        .route("/oauth2/default/v1/authorize", get(authorize))
        .route("/oauth2/default/v1/token", post(token))
        .with_state(okta.clone());
    let url = serve(router).await;
    (format!("{url}/oauth2/default"), okta)
}

/// How the generic identity provider answers token requests.
#[derive(Clone)]
enum TokenReply {
    Token(String),
    Status(StatusCode),
    Oversized,
    Malformed,
}

/// An identity provider without vendor quirks: authorization must be a bare `302`.
#[derive(Clone)]
struct Generic {
    authorize_status: StatusCode,
    reply: TokenReply,
    token_requests: Counter,
}

async fn generic_authorize(
    State(idp): State<Generic>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if idp.authorize_status != StatusCode::FOUND {
        return (idp.authorize_status, Html("<p>Sign in to continue</p>")).into_response();
    }
    let location = format!("{REDIRECT_URI}?code=generic-code&state={}", query["state"]);
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}

async fn generic_token(State(idp): State<Generic>) -> Response {
    idp.token_requests.hit();
    match idp.reply {
        TokenReply::Token(token) => Json(serde_json::json!({
            "token_type": "Bearer",
            "expires_in": 3600,
            "id_token": token,
        }))
        .into_response(),
        TokenReply::Status(status) => (status, "token endpoint unavailable").into_response(),
        TokenReply::Oversized => Json(serde_json::json!({
            "id_token": "x".repeat(70 * 1024),
        }))
        .into_response(),
        TokenReply::Malformed => (StatusCode::OK, r#"{"id_token": "#).into_response(),
    }
}

async fn generic(authorize_status: StatusCode, reply: TokenReply) -> (String, Generic) {
    let idp = Generic {
        authorize_status,
        reply,
        token_requests: Counter::default(),
    };
    let router = Router::new()
        .route("/oauth/authorize", get(generic_authorize))
        .route("/oauth/token", post(generic_token))
        .with_state(idp.clone());
    let url = serve(router).await;
    (format!("{url}/oauth"), idp)
}

fn generic_config(url: String) -> ClientConfig {
    ClientConfig {
        web_identity_url: Some(url),
        web_identity_client_id: Some("client".to_string()),
        web_identity_redirect_uri: Some(REDIRECT_URI.to_string()),
        web_identity_username: Some("jane".to_string()),
        role_arn: Some(ADMIN_ROLE.to_string()),
        ..ClientConfig::default()
    }
}

/// The error a generic web identity client gives for `reply`, checking nothing reached STS.
async fn token_error(reply: TokenReply) -> Error {
    let (url, idp) = generic(StatusCode::FOUND, reply).await;
    let dir = tempfile::tempdir().unwrap();
    let sts = RecordingConnector::default();
    let client = factory(dir.path(), &sts).get(&generic_config(url)).unwrap();

    let error = client.credentials().await.unwrap_err();
    assert_eq!(idp.token_requests.get(), 1);
    assert!(sts.calls().is_empty());
    assert!(!dir.path().join("web_role_123456789012-Admin").exists());
    error
}

fn web_config(url: String) -> ClientConfig {
    ClientConfig {
        web_identity_url: Some(url),
        web_identity_provider: Some("okta".to_string()),
        web_identity_client_id: Some("0oa1example".to_string()),
        web_identity_redirect_uri: Some(REDIRECT_URI.to_string()),
        web_identity_username: Some("jane@example.com".to_string()),
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn okta_authorization_code_flow() {
    let (url, okta) = okta().await;
    let dir = tempfile::tempdir().unwrap();
    let sts = RecordingConnector::default();
    let client = factory(dir.path(), &sts)
        .get(&ClientConfig {
            role_arn: Some(ADMIN_ROLE.to_string()),
            ..web_config(url)
        })
        .unwrap();

    let credentials = client.credentials().await.unwrap();
    assert_eq!(credentials.provider_name, "WebRoleProvider");
    assert_eq!(
        sts.calls(),
        vec![Call::AssumeRoleWithWebIdentity {
            role_arn: ADMIN_ROLE.to_string(),
            role_session_name: "jane@example.com".to_string(),
            web_identity_token: okta.id_token.clone(),
            duration_seconds: 60 * 60,
        }]
    );

    let token_requests = okta.token_requests.lock().unwrap().clone();
    assert_eq!(token_requests.len(), 1);
    let form = &token_requests[0];
    assert_eq!(form["grant_type"], "authorization_code");
    assert_eq!(form["code"], "authz-code");
    assert_eq!(form["redirect_uri"], REDIRECT_URI);
    assert_eq!(form["code_verifier"].len(), 64);
    assert!(okta.code_challenge.lock().unwrap().is_some());
    assert!(dir.path().join("web_role_123456789012-Admin").is_file());

    let identity = client.identity().await.unwrap();
    assert_eq!(identity.provider, "Okta");
    assert_eq!(identity.username, "jane@example.com");
    assert!(matches!(client.roles().await, Err(Error::Unsupported(_))));
}

#[tokio::test]
async fn web_identity_jump_role() {
    let (url, okta) = okta().await;
    let dir = tempfile::tempdir().unwrap();
    let sts = RecordingConnector::default();
    let client = factory(dir.path(), &sts)
        .get(&ClientConfig {
            jump_role_arn: Some(JUMP_ROLE.to_string()),
            role_arn: Some(TARGET_ROLE.to_string()),
            role_session_name: Some("jane-ci".to_string()),
            ..web_config(url)
        })
        .unwrap();

    let credentials = client.credentials().await.unwrap();
    assert_eq!(credentials.access_key_id, "ASIA0002");
    assert_eq!(
        sts.calls(),
        vec![
            Call::AssumeRoleWithWebIdentity {
                role_arn: JUMP_ROLE.to_string(),
                role_session_name: "jane-ci".to_string(),
                web_identity_token: okta.id_token.clone(),
                duration_seconds: 60 * 60,
            },
            Call::AssumeRole {
                signer: "ASIA0001".to_string(),
                role_arn: TARGET_ROLE.to_string(),
                role_session_name: "jane-ci".to_string(),
                duration_seconds: 60 * 60,
                serial_number: None,
                token_code: None,
            },
        ]
    );
    assert!(dir.path().join("web_role_123456789012-Jump").is_file());
    assert_eq!(client.identity().await.unwrap().provider, "Okta");
}

#[tokio::test]
async fn token_file_skips_the_identity_provider() {
    let dir = tempfile::tempdir().unwrap();
    let token_file = dir.path().join("token");
    let token = jwt(Utc::now().timestamp() + 600);
    std::fs::write(&token_file, &token).unwrap();

    let sts = RecordingConnector::default();
    let client = factory(dir.path(), &sts)
        .get(&ClientConfig {
            web_identity_url: Some("https://idp.invalid/oauth2/default".to_string()),
            web_identity_token_file: Some(token_file),
            role_arn: Some(ADMIN_ROLE.to_string()),
            role_session_name: Some("batch".to_string()),
            ..ClientConfig::default()
        })
        .unwrap();

    client.credentials().await.unwrap();
    assert!(matches!(
        &sts.calls()[..],
        [Call::AssumeRoleWithWebIdentity { web_identity_token, .. }] if *web_identity_token == token
    ));
}

#[tokio::test]
async fn okta_redirects_are_followed_up_to_the_redirect_uri() {
    async fn authorize(Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
        let location = format!("/oauth2/default/v1/consent?state={}", query["state"]);
        (StatusCode::FOUND, [(LOCATION, location)])
    }

    async fn consent(
        State(consents): State<Counter>,
        Query(query): Query<HashMap<String, String>>,
    ) -> impl IntoResponse {
        consents.hit();
        let location = format!("{REDIRECT_URI}?code=authz-code&state={}", query["state"]);
        (StatusCode::SEE_OTHER, [(LOCATION, location)])
    }

    let okta = Okta {
        id_token: jwt(Utc::now().timestamp() + 600),
        ..Okta::default()
    };
    let consents = Counter::default();
    let router = Router::new()
        .route("/oauth2/default/v1/authorize", get(authorize))
        .route(
            "/oauth2/default/v1/consent",
            get(consent).with_state(consents.clone()),
        )
        .route("/oauth2/default/v1/token", post(token))
        .with_state(okta.clone());
    let url = serve(router).await;
    let dir = tempfile::tempdir().unwrap();
    let sts = RecordingConnector::default();
    let client = factory(dir.path(), &sts)
        .get(&ClientConfig {
            role_arn: Some(ADMIN_ROLE.to_string()),
            ..web_config(format!("{url}/oauth2/default"))
        })
        .unwrap();

    client.credentials().await.unwrap();
    assert_eq!(consents.get(), 1);
    assert_eq!(okta.token_requests.lock().unwrap()[0]["code"], "authz-code");
    assert!(matches!(
        &sts.calls()[..],
        [Call::AssumeRoleWithWebIdentity { web_identity_token, .. }]
            if *web_identity_token == okta.id_token
    ));
}

#[tokio::test]
async fn generic_authorization_takes_a_bare_redirect() {
    let token = jwt(Utc::now().timestamp() + 600);
    let (url, idp) = generic(StatusCode::FOUND, TokenReply::Token(token.clone())).await;
    let dir = tempfile::tempdir().unwrap();
    let sts = RecordingConnector::default();
    let client = factory(dir.path(), &sts).get(&generic_config(url)).unwrap();

    let credentials = client.credentials().await.unwrap();
    assert_eq!(credentials.provider_name, "WebRoleProvider");
    assert_eq!(idp.token_requests.get(), 1);
    assert_eq!(
        sts.calls(),
        vec![Call::AssumeRoleWithWebIdentity {
            role_arn: ADMIN_ROLE.to_string(),
            role_session_name: "jane".to_string(),
            web_identity_token: token,
            duration_seconds: 60 * 60,
        }]
    );
    assert_eq!(client.identity().await.unwrap().provider, "GenericIdP");
}

#[tokio::test]
async fn generic_authorization_rejects_other_responses() {
    let (url, idp) = generic(StatusCode::OK, TokenReply::Token(String::new())).await;
    let dir = tempfile::tempdir().unwrap();
    let sts = RecordingConnector::default();
    let client = factory(dir.path(), &sts).get(&generic_config(url)).unwrap();

    let error = client.credentials().await.unwrap_err();
    assert!(
        matches!(
            error,
            Error::Status { stage: "oAuth authorize", status } if status == StatusCode::OK
        ),
        "{error}"
    );
    assert_eq!(idp.token_requests.get(), 0);
    assert!(sts.calls().is_empty());
}

#[tokio::test]
async fn token_endpoint_failures_are_reported() {
    let error = token_error(TokenReply::Status(StatusCode::INTERNAL_SERVER_ERROR)).await;
    assert!(
        matches!(
            error,
            Error::Status { stage: "oAuth token", status }
                if status == StatusCode::INTERNAL_SERVER_ERROR
        ),
        "{error}"
    );

    let error = token_error(TokenReply::Oversized).await;
    assert!(matches!(error, Error::Protocol(_)), "{error}");

    let error = token_error(TokenReply::Malformed).await;
    assert!(
        matches!(&error, Error::Protocol(message) if message.starts_with("invalid oAuth token")),
        "{error}"
    );
}
