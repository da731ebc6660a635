//! In-memory IAM service.
//!
//! Users are stored with argon2 password hashes. Sessions live for
//! `session_ttl`. Expired sessions are dropped when resolved and swept on
//! every login.

use std::collections::HashMap;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tonic::{Request, Response, Status};
use tracing::{debug, info};
use uuid::Uuid;

use crate::clients::convert::{identity_to_proto, parse_uuid};
use crate::clients::{ClientError, IamClient, Result};
use crate::domain::{Identity, Session, User};
use crate::proto::iam::v1::iam_service_server::IamService;
use crate::proto::iam::v1::{
    LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, WhoamiRequest,
    WhoamiResponse,
};

/// IAM configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IamConfig {
    pub session_ttl_secs: u64,
}

impl Default for IamConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 24 * 60 * 60,
        }
    }
}

struct Account {
    user: User,
    password_hash: String,
}

#[derive(Default)]
struct Directory {
    accounts: HashMap<Uuid, Account>,
    logins: HashMap<String, Uuid>,
    sessions: HashMap<Uuid, Session>,
}

/// Users and sessions held in memory.
pub struct IamDirectory {
    state: RwLock<Directory>,
    session_ttl: Duration,
}

impl IamDirectory {
    pub fn new(config: &IamConfig) -> Self {
        // Capped at ten years to stay within chrono's range.
        let ttl = config.session_ttl_secs.min(10 * 365 * 24 * 60 * 60) as i64;
        Self::with_session_ttl(Duration::seconds(ttl))
    }

    pub fn with_session_ttl(session_ttl: Duration) -> Self {
        Self {
            state: RwLock::new(Directory::default()),
            session_ttl,
        }
    }

    /// Create a user. Logins are unique.
    pub async fn register(&self, login: &str, email: &str, password: &str) -> Result<Uuid> {
        if login.is_empty() {
            return Err(ClientError::InvalidArgument("login is required".to_string()));
        }
        if password.is_empty() {
            return Err(ClientError::InvalidArgument(
                "password is required".to_string(),
            ));
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| ClientError::Internal(format!("password hashing failed: {e}")))?
            .to_string();

        let mut state = self.state.write().await;
        if state.logins.contains_key(login) {
            return Err(ClientError::InvalidArgument(format!(
                "login '{login}' is taken"
            )));
        }

        let user = User {
            user_id: Uuid::new_v4(),
            login: login.to_string(),
            email: email.to_string(),
        };
        let user_id = user.user_id;
        state.logins.insert(login.to_string(), user_id);
        state.accounts.insert(
            user_id,
            Account {
                user,
                password_hash,
            },
        );

        info!(%user_id, login, "User registered");
        Ok(user_id)
    }

    /// Verify credentials and open a session.
    ///
    /// The hash is checked on the blocking pool with no lock held, so
    /// concurrent `resolve` calls never wait on argon2.
    pub async fn login(&self, login: &str, password: &str) -> Result<Session> {
        let denied = || ClientError::Unauthenticated("invalid login or password".to_string());

        let (user_id, password_hash) = {
            let state = self.state.read().await;
            let user_id = *state.logins.get(login).ok_or_else(denied)?;
            let account = state.accounts.get(&user_id).ok_or_else(denied)?;
            (user_id, account.password_hash.clone())
        };

        let password = password.to_string();
        let verified =
            tokio::task::spawn_blocking(move || check_password(&password, &password_hash))
                .await
                .map_err(|e| ClientError::Internal(format!("password check aborted: {e}")))??;
        if !verified {
            return Err(denied());
        }

        let now = Utc::now();
        let session = Session {
            session_id: Uuid::new_v4(),
            user_id,
            created_at: now,
            expires_at: now + self.session_ttl,
        };

        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, s| !s.is_expired(now));
        let swept = before - state.sessions.len();
        if swept > 0 {
            debug!(swept, "Expired sessions swept");
        }
        state.sessions.insert(session.session_id, session.clone());
        drop(state);

        info!(%user_id, session_id = %session.session_id, "Session opened");
        Ok(session)
    }

    /// Sessions currently held, expired or not.
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Resolve a live session.
    pub async fn resolve(&self, session_id: Uuid) -> Result<Identity> {
        let not_found = || ClientError::NotFound(format!("session {session_id}"));

        let mut state = self.state.write().await;
        let session = state.sessions.get(&session_id).cloned().ok_or_else(not_found)?;
        if session.is_expired(Utc::now()) {
            state.sessions.remove(&session_id);
            debug!(%session_id, "Session expired");
            return Err(not_found());
        }

        let account = state.accounts.get(&session.user_id).ok_or_else(not_found)?;
        Ok(Identity {
            user: account.user.clone(),
            session,
        })
    }
}

fn check_password(password: &str, password_hash: &str) -> Result<bool> {
    let hash = PasswordHash::new(password_hash)
        .map_err(|e| ClientError::Internal(format!("stored hash unreadable: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &hash)
        .is_ok())
}

#[async_trait]
impl IamClient for IamDirectory {
    async fn whoami(&self, session_id: Uuid) -> Result<Identity> {
        self.resolve(session_id).await
    }
}

#[tonic::async_trait]
impl IamService for IamDirectory {
    async fn whoami(
        &self,
        request: Request<WhoamiRequest>,
    ) -> std::result::Result<Response<WhoamiResponse>, Status> {
        let session_id = parse_uuid("session_uuid", &request.into_inner().session_uuid)?;
        let identity = self.resolve(session_id).await?;
        Ok(Response::new(identity_to_proto(&identity)))
    }

    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> std::result::Result<Response<LoginResponse>, Status> {
        let request = request.into_inner();
        let session = IamDirectory::login(self, &request.login, &request.password).await?;
        Ok(Response::new(LoginResponse {
            session_uuid: session.session_id.to_string(),
        }))
    }

    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> std::result::Result<Response<RegisterResponse>, Status> {
        let request = request.into_inner();
        let info = request
            .info
            .ok_or_else(|| Status::invalid_argument("info is required"))?;
        let user_id = IamDirectory::register(self, &info.login, &info.email, &request.password).await?;
        Ok(Response::new(RegisterResponse {
            user_uuid: user_id.to_string(),
        }))
    }
}
