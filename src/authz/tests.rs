use std::collections::HashMap;

use chrono::{Duration, Utc};

use super::*;
use crate::clients::mock::MockIamClient;
use crate::clients::ClientError;
use crate::domain::{Session, User};
use crate::proto::envoy::service::auth::v3::attribute_context;
use crate::proto::envoy::service::auth::v3::AttributeContext;

fn identity() -> Identity {
    let now = Utc::now();
    let user_id = Uuid::new_v4();
    Identity {
        session: Session {
            session_id: Uuid::new_v4(),
            user_id,
            created_at: now,
            expires_at: now + Duration::hours(1),
        },
        user: User {
            user_id,
            login: "ripley".to_string(),
            email: "ripley@nostromo.example".to_string(),
        },
    }
}

fn check_request(headers: &[(&str, &str)]) -> CheckRequest {
    CheckRequest {
        attributes: Some(AttributeContext {
            request: Some(attribute_context::Request {
                http: Some(attribute_context::HttpRequest {
                    method: "GET".to_string(),
                    path: "/api/v1/orders".to_string(),
                    headers: headers
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<HashMap<_, _>>(),
                    ..Default::default()
                }),
            }),
        }),
    }
}

async fn setup() -> (SessionAuthorizer, Arc<MockIamClient>, Identity) {
    let iam = Arc::new(MockIamClient::new());
    let identity = identity();
    iam.insert(identity.clone()).await;
    (SessionAuthorizer::new(iam.clone()), iam, identity)
}

fn header_map(headers: &[HeaderValueOption]) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|h| h.header.as_ref())
        .map(|h| (h.key.clone(), h.value.clone()))
        .collect()
}

fn assert_denied(response: &CheckResponse, message: &str) {
    let status = response.status.as_ref().unwrap();
    assert_eq!(status.code, 16);
    assert_eq!(status.message, message);

    let Some(check_response::HttpResponse::DeniedResponse(denied)) = &response.http_response
    else {
        panic!("expected denied response, got {:?}", response.http_response);
    };
    assert_eq!(
        denied.status.as_ref().map(|s| s.code),
        Some(StatusCode::Unauthorized as i32)
    );
    let headers = header_map(&denied.headers);
    assert_eq!(headers["Content-Type"], "application/json");
    assert_eq!(headers["X-Auth-Status"], "denied");

    let body: serde_json::Value = serde_json::from_str(&denied.body).unwrap();
    assert_eq!(body, serde_json::json!({ "error": message }));
}

// ============================================================================
// Cookie parsing
// ============================================================================

#[test]
fn test_session_cookie_among_others() {
    assert_eq!(
        session_from_cookie_header("theme=dark; X-Session-Uuid=abc ; lang=en"),
        Some("abc".to_string())
    );
}

#[test]
fn test_session_cookie_missing() {
    assert_eq!(session_from_cookie_header("theme=dark; lang=en"), None);
    assert_eq!(session_from_cookie_header(""), None);
}

#[test]
fn test_session_cookie_name_is_case_sensitive() {
    assert_eq!(session_from_cookie_header("x-session-uuid=abc"), None);
}

#[test]
fn test_session_cookie_percent_decoded() {
    assert_eq!(
        session_from_cookie_header("X-Session-Uuid=%7Babc%7D"),
        Some("{abc}".to_string())
    );
}

#[test]
fn test_session_cookie_undecodable_kept_raw() {
    // %FF is not valid UTF-8 once decoded
    assert_eq!(
        session_from_cookie_header("X-Session-Uuid=%FFabc"),
        Some("%FFabc".to_string())
    );
}

// ============================================================================
// Check
// ============================================================================

#[tokio::test]
async fn test_valid_session_allowed() {
    let (authorizer, iam, identity) = setup().await;
    let cookie = format!("X-Session-Uuid={}", identity.session.session_id);

    let response = authorizer
        .authorize(check_request(&[("cookie", &cookie), ("authorization", "Bearer x")]))
        .await;

    assert_eq!(response.status.as_ref().unwrap().code, 0);
    let Some(check_response::HttpResponse::OkResponse(ok)) = response.http_response else {
        panic!("expected ok response");
    };
    let headers = header_map(&ok.headers);
    assert_eq!(headers["X-User-Uuid"], identity.user.user_id.to_string());
    assert_eq!(headers["X-User-Login"], "ripley");
    assert_eq!(ok.headers_to_remove, vec!["cookie", "authorization"]);
    assert_eq!(iam.call_count().await, 1);
}

#[tokio::test]
async fn test_cookie_header_name_case_insensitive() {
    let (authorizer, _, identity) = setup().await;
    let cookie = format!("X-Session-Uuid={}", identity.session.session_id);

    let response = authorizer.authorize(check_request(&[("Cookie", &cookie)])).await;

    assert_eq!(response.status.unwrap().code, 0);
}

#[tokio::test]
async fn test_missing_cookie_denied_without_iam_call() {
    let (authorizer, iam, _) = setup().await;

    let response = authorizer.authorize(check_request(&[])).await;

    assert_denied(&response, "missing session");
    assert_eq!(iam.call_count().await, 0);
}

#[tokio::test]
async fn test_empty_cookie_denied() {
    let (authorizer, iam, _) = setup().await;

    let response = authorizer
        .authorize(check_request(&[("cookie", "X-Session-Uuid=")]))
        .await;

    assert_denied(&response, "missing session");
    assert_eq!(iam.call_count().await, 0);
}

#[tokio::test]
async fn test_malformed_session_denied() {
    let (authorizer, _, _) = setup().await;

    let response = authorizer
        .authorize(check_request(&[("cookie", "X-Session-Uuid=not-a-uuid")]))
        .await;

    assert_denied(&response, "invalid session");
}

#[tokio::test]
async fn test_unknown_session_denied() {
    let (authorizer, _, _) = setup().await;
    let cookie = format!("X-Session-Uuid={}", Uuid::new_v4());

    let response = authorizer.authorize(check_request(&[("cookie", &cookie)])).await;

    assert_denied(&response, "invalid session");
}

#[tokio::test]
async fn test_iam_unavailable_denied() {
    let (authorizer, iam, identity) = setup().await;
    iam.set_fail_with(Some(ClientError::Unavailable("down".to_string())))
        .await;
    let cookie = format!("X-Session-Uuid={}", identity.session.session_id);

    let response = authorizer.authorize(check_request(&[("cookie", &cookie)])).await;

    assert_denied(&response, "invalid session");
}

#[tokio::test]
async fn test_missing_http_attributes_denied() {
    let (authorizer, iam, _) = setup().await;

    let response = authorizer.authorize(CheckRequest { attributes: None }).await;

    assert_denied(&response, "malformed request");
    assert_eq!(iam.call_count().await, 0);
}

#[tokio::test]
async fn test_grpc_check_never_errors() {
    let (authorizer, _, _) = setup().await;

    let response = Authorization::check(&authorizer, Request::new(check_request(&[])))
        .await
        .unwrap()
        .into_inner();

    assert_denied(&response, "missing session");
}
