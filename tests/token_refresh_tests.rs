use miette::{IntoDiagnostic, Result};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use procountor::Client;


use test_utils::{TOKEN_PATH, requests_to};

const INVOICE_PATH: &str = "/supported/api/invoices/42";

/// A 401 triggers exactly one refresh and one retry, which succeeds with the new token
#[tokio::test]
async fn test_unauthorized_request_is_retried_with_new_token() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;
    test_utils::mount_tokens(&server, &["tok1", "tok2"]).await;

    Mock::given(method("GET"))
        .and(path(INVOICE_PATH))
        .and(header("authorization", "Bearer tok1"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(INVOICE_PATH))
        .and(header("authorization", "Bearer tok2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42})))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(test_utils::client_credentials(), test_utils::mock_config(&server))
        .await
        .into_diagnostic()?;
    let before = client.session().access_token().await;

    let response = client.get_invoice(42).await.into_diagnostic()?;

    assert_eq!(
        serde_json::to_value(&response).into_diagnostic()?,
        json!({"status": 200, "content": {"id": 42}})
    );
    let after = client.session().access_token().await;
    assert_ne!(before.secret(), after.secret());
    assert_eq!(after.secret(), "tok2");
    assert_eq!(requests_to(&server, INVOICE_PATH).await, 2);
    assert_eq!(requests_to(&server, TOKEN_PATH).await, 2);

    Ok(())
}

/// A second 401 is handed to the caller instead of retrying again
#[tokio::test]
async fn test_second_unauthorized_is_surfaced() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;
    test_utils::mount_tokens(&server, &["tok1", "tok2"]).await;

    Mock::given(method("GET"))
        .and(path(INVOICE_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("still unauthorized"))
        .expect(2)
        .mount(&server)
        .await;

    let client = Client::new(test_utils::client_credentials(), test_utils::mock_config(&server))
        .await
        .into_diagnostic()?;
    let response = client.get_invoice(42).await.into_diagnostic()?;

    assert_eq!(response.status, 401);
    assert_eq!(response.message.as_deref(), Some("still unauthorized"));
    assert!(response.content.is_none());
    assert_eq!(requests_to(&server, TOKEN_PATH).await, 2);

    Ok(())
}

/// A failed refresh during the retry is fatal
#[tokio::test]
async fn test_failed_refresh_is_an_error() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok1"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(INVOICE_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(test_utils::client_credentials(), test_utils::mock_config(&server))
        .await
        .into_diagnostic()?;
    let error = client.get_invoice(42).await.unwrap_err();

    assert!(matches!(error, procountor::Error::Authentication { .. }));
    assert!(error.to_string().contains("check your credentials"));

    Ok(())
}

/// Manual refresh re-runs the client credentials exchange and replaces the token
#[tokio::test]
async fn test_manual_refresh_replaces_token() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;
    test_utils::mount_tokens(&server, &["tok1", "tok2"]).await;

    let client = Client::new(test_utils::client_credentials(), test_utils::mock_config(&server))
        .await
        .into_diagnostic()?;
    let token = client.refresh_access_token().await.into_diagnostic()?;

    assert_eq!(token.access_token().secret(), "tok2");
    assert!(token.refresh_token().is_none());
    assert_eq!(client.session().access_token().await.secret(), "tok2");

    Ok(())
}

/// The resource owner flow logs in, exchanges the code, and refreshes with the refresh token
#[tokio::test]
async fn test_resource_owner_flow() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(test_utils::AUTHORIZATION_PATH))
        .and(body_string_contains("response_type=code"))
        .and(body_string_contains("username=alice"))
        .and(body_string_contains("company_id=1234567"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "https://example.com/callback?code=abc123"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at1",
            "refresh_token": "rt1",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "at2"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(test_utils::resource_owner(), test_utils::mock_config(&server))
        .await
        .into_diagnostic()?;
    let token = client.session().token().await;
    assert_eq!(token.access_token().secret(), "at1");
    assert_eq!(token.refresh_token().unwrap().secret(), "rt1");

    let token = client.refresh_access_token().await.into_diagnostic()?;
    assert_eq!(token.access_token().secret(), "at2");
    assert_eq!(token.refresh_token().unwrap().secret(), "rt1");

    Ok(())
}

/// A restored session sends the stored token without authenticating first
#[tokio::test]
async fn test_restored_session_skips_authentication() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/supported/api/sessioninfo"))
        .and(header("authorization", "Bearer stored"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"companyId": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::from_tokens(
        test_utils::client_credentials(),
        test_utils::mock_config(&server),
        procountor::Token::new("stored", None),
    )
    .into_diagnostic()?;
    let response = client.get_session_info().await.into_diagnostic()?;

    assert_eq!(response.json(), Some(&json!({"companyId": 1})));
    assert_eq!(requests_to(&server, TOKEN_PATH).await, 0);

    Ok(())
}

/// A relative `Location` is resolved against the authorization endpoint
#[tokio::test]
async fn test_relative_redirect_location_is_resolved() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(test_utils::AUTHORIZATION_PATH))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "/callback?code=abc123"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("code=abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "at1"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(test_utils::resource_owner(), test_utils::mock_config(&server))
        .await
        .into_diagnostic()?;
    assert_eq!(client.session().access_token().await.secret(), "at1");

    Ok(())
}

/// With resource owner credentials a 401 is retried after a refresh token grant
#[tokio::test]
async fn test_resource_owner_retry_uses_refresh_token() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "at2"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(INVOICE_PATH))
        .and(header("authorization", "Bearer at1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(INVOICE_PATH))
        .and(header("authorization", "Bearer at2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42})))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::from_tokens(
        test_utils::resource_owner(),
        test_utils::mock_config(&server),
        procountor::Token::new("at1", Some("rt1".to_string())),
    )
    .into_diagnostic()?;
    let response = client.get_invoice(42).await.into_diagnostic()?;

    assert_eq!(response.json(), Some(&json!({"id": 42})));
    assert_eq!(requests_to(&server, test_utils::AUTHORIZATION_PATH).await, 0);
    let token = client.session().token().await;
    assert_eq!(token.access_token().secret(), "at2");
    assert_eq!(token.refresh_token().unwrap().secret(), "rt1");

    Ok(())
}

/// Without a refresh token the resource owner logs in again, more than once if needed
#[tokio::test]
async fn test_resource_owner_without_refresh_token_logs_in_again() -> Result<()> {
    test_utils::do_setup();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(test_utils::AUTHORIZATION_PATH))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "https://example.com/callback?code=abc123"),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "at1"})))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(INVOICE_PATH))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(INVOICE_PATH))
        .and(header("authorization", "Bearer at1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42})))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::from_tokens(
        test_utils::resource_owner(),
        test_utils::mock_config(&server),
        procountor::Token::new("stale", None),
    )
    .into_diagnostic()?;

    let response = client.get_invoice(42).await.into_diagnostic()?;
    assert_eq!(response.status, 200);

    let token = client.refresh_access_token().await.into_diagnostic()?;
    assert_eq!(token.access_token().secret(), "at1");
    assert_eq!(requests_to(&server, test_utils::AUTHORIZATION_PATH).await, 2);

    Ok(())
}
