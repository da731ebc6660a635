//! Session authorization for the API gateway.
//!
//! Implements the Envoy `ext_authz` `Check` call. A request is allowed when
//! its `X-Session-Uuid` cookie names a live IAM session; the proxy then
//! forwards it with the caller's identity in `X-User-Uuid` / `X-User-Login`
//! and with the credentials stripped. Everything else is a 401.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::clients::IamClient;
use crate::domain::Identity;
use crate::proto::envoy::service::auth::v3::authorization_server::Authorization;
use crate::proto::envoy::service::auth::v3::{
    check_response, CheckRequest, CheckResponse, DeniedHttpResponse, HeaderValue,
    HeaderValueOption, HttpStatus, OkHttpResponse, RpcStatus, StatusCode,
};

/// Cookie carrying the session id.
pub const SESSION_COOKIE: &str = "X-Session-Uuid";
pub const USER_UUID_HEADER: &str = "X-User-Uuid";
pub const USER_LOGIN_HEADER: &str = "X-User-Login";
pub const AUTH_STATUS_HEADER: &str = "X-Auth-Status";

/// Request headers removed before forwarding an allowed request.
pub const STRIPPED_HEADERS: [&str; 2] = ["cookie", "authorization"];

/// gRPC status codes carried in `CheckResponse.status`.
const GRPC_OK: i32 = 0;
const GRPC_UNAUTHENTICATED: i32 = 16;

/// Extract the session id from a `Cookie` header value.
///
/// The value is percent-decoded; if that fails the raw value is used.
pub fn session_from_cookie_header(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == SESSION_COOKIE)
        .map(|(_, raw)| {
            let raw = raw.trim();
            urlencoding::decode(raw)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| raw.to_string())
        })
}

/// The `ext_authz` check backed by IAM `whoami`.
#[derive(Clone)]
pub struct SessionAuthorizer {
    iam: Arc<dyn IamClient>,
}

impl SessionAuthorizer {
    pub fn new(iam: Arc<dyn IamClient>) -> Self {
        Self { iam }
    }

    /// Decide a check request. Never fails; every problem is a deny.
    #[tracing::instrument(name = "authz.check", skip_all)]
    pub async fn authorize(&self, request: CheckRequest) -> CheckResponse {
        let Some(http) = request
            .attributes
            .and_then(|a| a.request)
            .and_then(|r| r.http)
        else {
            warn!("Check request without HTTP attributes");
            return deny("malformed request");
        };

        let session = http
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("cookie"))
            .and_then(|(_, value)| session_from_cookie_header(value))
            .filter(|s| !s.is_empty());
        let Some(session) = session else {
            debug!(path = %http.path, "No session cookie");
            return deny("missing session");
        };

        let Ok(session_id) = Uuid::parse_str(&session) else {
            debug!(path = %http.path, "Malformed session id");
            return deny("invalid session");
        };

        match self.iam.whoami(session_id).await {
            Ok(identity) => {
                debug!(
                    %session_id,
                    user_id = %identity.user.user_id,
                    path = %http.path,
                    "Request allowed"
                );
                allow(&identity)
            }
            Err(e) if e.is_transient() => {
                error!(%session_id, error = %e, "IAM unreachable, denying");
                deny("invalid session")
            }
            Err(e) => {
                debug!(%session_id, error = %e, "Session rejected");
                deny("invalid session")
            }
        }
    }
}

#[tonic::async_trait]
impl Authorization for SessionAuthorizer {
    async fn check(
        &self,
        request: Request<CheckRequest>,
    ) -> Result<Response<CheckResponse>, Status> {
        Ok(Response::new(self.authorize(request.into_inner()).await))
    }
}

fn header(key: &str, value: impl Into<String>) -> HeaderValueOption {
    HeaderValueOption {
        header: Some(HeaderValue {
            key: key.to_string(),
            value: value.into(),
        }),
    }
}

fn allow(identity: &Identity) -> CheckResponse {
    CheckResponse {
        status: Some(RpcStatus {
            code: GRPC_OK,
            message: String::new(),
        }),
        http_response: Some(check_response::HttpResponse::OkResponse(OkHttpResponse {
            headers: vec![
                header(USER_UUID_HEADER, identity.user.user_id.to_string()),
                header(USER_LOGIN_HEADER, identity.user.login.clone()),
            ],
            headers_to_remove: STRIPPED_HEADERS.iter().map(|h| h.to_string()).collect(),
        })),
    }
}

fn deny(message: &str) -> CheckResponse {
    CheckResponse {
        status: Some(RpcStatus {
            code: GRPC_UNAUTHENTICATED,
            message: message.to_string(),
        }),
        http_response: Some(check_response::HttpResponse::DeniedResponse(
            DeniedHttpResponse {
                status: Some(HttpStatus {
                    code: StatusCode::Unauthorized as i32,
                }),
                headers: vec![
                    header("Content-Type", "application/json"),
                    header(AUTH_STATUS_HEADER, "denied"),
                ],
                body: serde_json::json!({ "error": message }).to_string(),
            },
        )),
    }
}

#[cfg(test)]
mod tests;
