//! IAM sessions and users, as consumed by the authorization check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// An expired session is treated as absent.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: Uuid,
    pub login: String,
    pub email: String,
}

/// Result of a successful `whoami`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub session: Session,
    pub user: User,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_expiry() {
        let now = Utc::now();
        let session = Session {
            session_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            created_at: now - Duration::hours(1),
            expires_at: now,
        };
        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + Duration::seconds(1)));
    }
}
