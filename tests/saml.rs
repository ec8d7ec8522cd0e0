mod common;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use aws_federation_flow::{ClientConfig, Error, IdentityType};
use axum::{
    extract::State,
    http::{
        header::{COOKIE, LOCATION, SET_COOKIE},
        HeaderMap, StatusCode,
    },
    response::{Html, IntoResponse},
    routing::{get, post},
    Form, Router,
};
use chrono::Utc;
use common::{
    factory, factory_builder, saml_assertion, saml_page, serve, Call, Counter, RecordingConnector,
    ADMIN_ROLE, JUMP_ROLE, PROVIDER, TARGET_ROLE,
};
use tokio_util::sync::CancellationToken;

const LOGIN_PAGE: &str = r#"<html><body>
<form method="post" action="/login">
<input type="hidden" name="csrf" value="t">
<input type="text" name="user">
<input type="password" name="pass">
<input type="submit" value="Sign in">
</form></body></html>"#;

fn fresh_saml_page(roles: &[&str]) -> String {
    saml_page(&saml_assertion(Utc::now() + chrono::Duration::minutes(5), roles))
}

/// An identity provider that hands out an assertion granting `roles` on every request.
async fn idp(roles: &'static [&'static str]) -> (String, Counter) {
    async fn saml(
        State((roles, counter)): State<(&'static [&'static str], Counter)>,
    ) -> Html<String> {
        counter.hit();
        let expires_at = Utc::now() + chrono::Duration::minutes(5);
        Html(saml_page(&saml_assertion(expires_at, roles)))
    }

    let counter = Counter::default();
    let router = Router::new()
        .route("/app/aws/sso/saml", get(saml))
        .with_state((roles, counter.clone()));
    let url = serve(router).await;
    (format!("{url}/app/aws/sso/saml"), counter)
}

#[tokio::test]
async fn saml_role_credentials_are_cached() {
    let (saml_url, requests) = idp(&[ADMIN_ROLE, TARGET_ROLE]).await;
    let dir = tempfile::tempdir().unwrap();
    let sts = RecordingConnector::default();
    let config = ClientConfig {
        saml_url: Some(saml_url),
        saml_username: Some("jane".to_string()),
        role_arn: Some(ADMIN_ROLE.to_string()),
        credentials_duration: Some(Duration::from_secs(2 * 60 * 60)),
        ..ClientConfig::default()
    };

    let client = factory(dir.path(), &sts).get(&config).unwrap();
    assert_eq!(requests.get(), 0, "building a client makes no requests");

    let credentials = client.credentials().await.unwrap();
    assert_eq!(credentials.access_key_id, "ASIA0001");
    assert_eq!(credentials.provider_name, "SamlRoleProvider");
    assert_eq!(
        sts.calls(),
        vec![Call::AssumeRoleWithSaml {
            role_arn: ADMIN_ROLE.to_string(),
            principal_arn: PROVIDER.to_string(),
            duration_seconds: 7200,
        }]
    );
    assert!(dir.path().join("saml_role_123456789012-Admin").is_file());

    let identity = client.identity().await.unwrap();
    assert_eq!(identity.identity_type, IdentityType::User);
    assert_eq!(identity.provider, "GenericIdP");
    assert_eq!(identity.username, "jane.doe@example.com");

    // A new client for the same role reads the cache file instead of logging in again.
    let client = factory(dir.path(), &sts).get(&config).unwrap();
    let cached = client.credentials().await.unwrap();
    assert_eq!(cached.access_key_id, "ASIA0001");
    assert_eq!(requests.get(), 1);
    assert_eq!(sts.calls().len(), 1);

    client.clear_cache().await.unwrap();
    assert!(!dir.path().join("saml_role_123456789012-Admin").exists());
    client.clear_cache().await.unwrap();
}

#[tokio::test]
async fn roles_reuse_the_held_assertion() {
    let (saml_url, requests) = idp(&[ADMIN_ROLE, TARGET_ROLE]).await;
    let dir = tempfile::tempdir().unwrap();
    let sts = RecordingConnector::default();
    let client = factory(dir.path(), &sts)
        .get(&ClientConfig {
            saml_url: Some(saml_url),
            ..ClientConfig::default()
        })
        .unwrap();

    let roles = client.roles().await.unwrap();
    assert_eq!(roles, vec![ADMIN_ROLE.to_string(), TARGET_ROLE.to_string()]);
    assert_eq!(client.roles().await.unwrap(), roles);
    assert_eq!(requests.get(), 1);
    assert!(sts.calls().is_empty());
}

#[tokio::test]
async fn missing_saml_response_is_an_empty_assertion() {
    async fn landing(State(counter): State<Counter>) -> Html<&'static str> {
        counter.hit();
        Html("<html><body><p>Welcome back!</p></body></html>")
    }

    let requests = Counter::default();
    let url = serve(
        Router::new()
            .route("/saml", get(landing))
            .with_state(requests.clone()),
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let sts = RecordingConnector::default();
    let client = factory(dir.path(), &sts)
        .get(&ClientConfig {
            saml_url: Some(format!("{url}/saml")),
            role_arn: Some(ADMIN_ROLE.to_string()),
            ..ClientConfig::default()
        })
        .unwrap();

    assert_eq!(client.roles().await.unwrap(), Vec::<String>::new());
    assert!(matches!(
        client.credentials().await,
        Err(Error::Protocol(_))
    ));
    assert!(sts.calls().is_empty());
    assert!(!dir.path().join("saml_role_123456789012-Admin").exists());
}

#[tokio::test]
async fn jump_role_chains_into_target_role() {
    let (saml_url, requests) = idp(&[JUMP_ROLE]).await;
    let dir = tempfile::tempdir().unwrap();
    let sts = RecordingConnector::default();
    let config = ClientConfig {
        saml_url: Some(saml_url),
        saml_username: Some("jane".to_string()),
        jump_role_arn: Some(JUMP_ROLE.to_string()),
        role_arn: Some(TARGET_ROLE.to_string()),
        credentials_duration: Some(Duration::from_secs(8 * 60 * 60)),
        ..ClientConfig::default()
    };

    let client = factory(dir.path(), &sts).get(&config).unwrap();
    let credentials = client.credentials().await.unwrap();

    assert_eq!(credentials.access_key_id, "ASIA0002");
    assert_eq!(credentials.provider_name, "AssumeRoleProvider");
    assert_eq!(
        sts.calls(),
        vec![
            Call::AssumeRoleWithSaml {
                role_arn: JUMP_ROLE.to_string(),
                principal_arn: PROVIDER.to_string(),
                duration_seconds: 8 * 60 * 60,
            },
            Call::AssumeRole {
                signer: "ASIA0001".to_string(),
                role_arn: TARGET_ROLE.to_string(),
                role_session_name: "jane".to_string(),
                duration_seconds: 60 * 60,
                serial_number: None,
                token_code: None,
            },
        ]
    );
    assert!(dir.path().join("saml_role_123456789012-Jump").is_file());
    assert!(dir.path().join("assume_role_123456789012-Target").is_file());

    // Identity and roles come from the SAML stage.
    let identity = client.identity().await.unwrap();
    assert_eq!(identity.provider, "GenericIdP");
    assert_eq!(identity.username, "jane.doe@example.com");
    assert_eq!(client.roles().await.unwrap(), vec![JUMP_ROLE.to_string()]);
    assert_eq!(requests.get(), 1);
}

#[tokio::test]
async fn login_form_is_submitted_with_configured_credentials() {
    type Posts = Arc<Mutex<Vec<HashMap<String, String>>>>;

    async fn saml(headers: HeaderMap) -> Html<String> {
        let signed_in = headers
            .get(COOKIE)
            .and_then(|cookie| cookie.to_str().ok())
            .is_some_and(|cookie| cookie.contains("sid=s3ss10n"));
        if signed_in {
            Html(fresh_saml_page(&[ADMIN_ROLE]))
        } else {
            Html(LOGIN_PAGE.to_string())
        }
    }

    async fn login(
        State(posts): State<Posts>,
        Form(fields): Form<HashMap<String, String>>,
    ) -> impl IntoResponse {
        posts.lock().unwrap().push(fields);
        (
            StatusCode::SEE_OTHER,
            [(LOCATION, "/app/saml"), (SET_COOKIE, "sid=s3ss10n; Path=/")],
        )
    }

    let posts = Posts::default();
    let url = serve(
        Router::new()
            .route("/app/saml", get(saml))
            .route("/login", post(login))
            .with_state(posts.clone()),
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let sts = RecordingConnector::default();
    let client = factory(dir.path(), &sts)
        .get(&ClientConfig {
            saml_url: Some(format!("{url}/app/saml")),
            saml_username: Some("jane".to_string()),
            saml_password: Some("pw".to_string()),
            role_arn: Some(ADMIN_ROLE.to_string()),
            ..ClientConfig::default()
        })
        .unwrap();

    let credentials = client.credentials().await.unwrap();
    assert_eq!(credentials.provider_name, "SamlRoleProvider");

    let posts = posts.lock().unwrap().clone();
    assert_eq!(
        posts,
        vec![HashMap::from([
            ("csrf".to_string(), "t".to_string()),
            ("user".to_string(), "jane".to_string()),
            ("pass".to_string(), "pw".to_string()),
        ])]
    );
    assert!(matches!(
        sts.calls().as_slice(),
        [Call::AssumeRoleWithSaml { role_arn, principal_arn, .. }]
            if role_arn == ADMIN_ROLE && principal_arn == PROVIDER
    ));
}

#[tokio::test]
async fn cookies_are_saved_once_the_last_client_is_dropped() {
    async fn saml() -> impl IntoResponse {
        (
            [(SET_COOKIE, "sid=abc123; Path=/")],
            Html(fresh_saml_page(&[ADMIN_ROLE])),
        )
    }

    let url = serve(Router::new().route("/saml", get(saml))).await;
    let dir = tempfile::tempdir().unwrap();
    let cookie_file = dir.path().join(".aws_federation_flow.cookies");
    let sts = RecordingConnector::default();

    // The factory is dropped at the end of this statement.
    let client = factory_builder(dir.path(), &sts)
        .build()
        .unwrap()
        .get(&ClientConfig {
            saml_url: Some(format!("{url}/saml")),
            role_arn: Some(ADMIN_ROLE.to_string()),
            ..ClientConfig::default()
        })
        .unwrap();

    client.credentials().await.unwrap();
    assert!(!cookie_file.exists());

    drop(client);
    let saved = std::fs::read_to_string(&cookie_file).unwrap();
    assert!(saved.contains("abc123"), "{saved}");
}

#[tokio::test]
async fn cancellation_reaches_the_jump_role_stage() {
    async fn saml(State(cancel): State<CancellationToken>) -> Html<String> {
        cancel.cancel();
        Html(fresh_saml_page(&[JUMP_ROLE]))
    }

    let cancel = CancellationToken::new();
    let url = serve(
        Router::new()
            .route("/saml", get(saml))
            .with_state(cancel.clone()),
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let sts = RecordingConnector::default();
    let client = factory(dir.path(), &sts)
        .get(&ClientConfig {
            saml_url: Some(format!("{url}/saml")),
            jump_role_arn: Some(JUMP_ROLE.to_string()),
            role_arn: Some(TARGET_ROLE.to_string()),
            role_session_name: Some("ops".to_string()),
            ..ClientConfig::default()
        })
        .unwrap();

    let error = client
        .credentials_with_cancellation(&cancel)
        .await
        .unwrap_err();
    assert!(matches!(error, Error::Cancelled), "{error}");
    assert!(sts.calls().is_empty());
    assert!(!dir.path().join("saml_role_123456789012-Jump").exists());
}
