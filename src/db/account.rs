/// Account database models
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Account record as stored in the database
#[derive(Debug, Clone, FromRow)]
pub struct AccountRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub password_hash: String,
    pub refresh_token: Option<String>,
    pub refresh_issued_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Session state of an account
///
/// An account has at most one live refresh token. Logging in replaces it,
/// rotating replaces it, logging out removes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    Active {
        refresh_token: String,
        issued_at: DateTime<Utc>,
    },
}

impl SessionState {
    pub fn refresh_token(&self) -> Option<&str> {
        match self {
            SessionState::NoSession => None,
            SessionState::Active { refresh_token, .. } => Some(refresh_token),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active { .. })
    }
}

/// Account loaded from the credential store
///
/// Holds the password hash, so it is deliberately not `Serialize`. Use
/// [`crate::account::PublicProfile`] for anything leaving the process.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub password_hash: String,
    pub session: SessionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        let session = match row.refresh_token {
            Some(refresh_token) => SessionState::Active {
                refresh_token,
                issued_at: row.refresh_issued_at.unwrap_or(row.updated_at),
            },
            None => SessionState::NoSession,
        };

        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            full_name: row.full_name,
            avatar: row.avatar,
            cover_image: row.cover_image,
            password_hash: row.password_hash,
            session,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Watch history entry joined with its video and the video owner
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    pub video_id: String,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub owner_id: String,
    pub owner_username: String,
    pub owner_full_name: String,
    pub owner_avatar: String,
}

/// Video record
#[derive(Debug, Clone, FromRow)]
pub struct VideoRow {
    pub id: String,
    pub owner_id: String,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(refresh_token: Option<&str>) -> AccountRow {
        let now = Utc::now();
        AccountRow {
            id: "id-1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            full_name: "Alice".to_string(),
            avatar: "http://media/a.png".to_string(),
            cover_image: None,
            password_hash: "$argon2id$...".to_string(),
            refresh_token: refresh_token.map(str::to_string),
            refresh_issued_at: refresh_token.map(|_| now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_session_state_from_row() {
        let account = Account::from(row(None));
        assert_eq!(account.session, SessionState::NoSession);
        assert_eq!(account.session.refresh_token(), None);

        let account = Account::from(row(Some("tok")));
        assert!(account.session.is_active());
        assert_eq!(account.session.refresh_token(), Some("tok"));
    }

    #[test]
    fn test_missing_issued_at_falls_back_to_updated_at() {
        let mut r = row(Some("tok"));
        r.refresh_issued_at = None;
        let updated_at = r.updated_at;

        match Account::from(r).session {
            SessionState::Active { issued_at, .. } => assert_eq!(issued_at, updated_at),
            SessionState::NoSession => panic!("expected active session"),
        }
    }
}
