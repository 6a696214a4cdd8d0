/// SQLite-backed store implementations
use crate::{
    db::account::{Account, AccountRow, HistoryRow, SessionState, VideoRow},
    error::{HubError, HubResult},
    graph::{HistoryEntry, OwnerSummary},
    store::{
        with_stream_timeout, with_timeout, CredentialStore, ExpectedToken, ProfileUpdate,
        SubscriptionEdgeStore, WatchHistoryStore,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use sqlx::SqlitePool;
use std::time::Duration;

const ACCOUNT_COLUMNS: &str = "id, username, email, full_name, avatar, cover_image, password_hash,
     refresh_token, refresh_issued_at, created_at, updated_at";

/// Turn a unique-constraint failure into `Conflict`
fn conflict_on_unique(err: HubError, message: &str) -> HubError {
    match err {
        HubError::Database(sqlx::Error::Database(ref db)) if db.is_unique_violation() => {
            HubError::Conflict(message.to_string())
        }
        other => other,
    }
}

/// Account store
#[derive(Clone)]
pub struct SqliteAccountStore {
    db: SqlitePool,
    timeout: Duration,
}

impl SqliteAccountStore {
    pub fn new(db: SqlitePool, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    async fn fetch_account(&self, operation: &str, sql: &str, arg: &str) -> HubResult<Option<Account>> {
        let row = with_timeout(
            self.timeout,
            operation,
            sqlx::query_as::<_, AccountRow>(sql)
                .bind(arg)
                .fetch_optional(&self.db),
        )
        .await?;

        Ok(row.map(Account::from))
    }

    /// Insert a video record
    pub async fn insert_video(&self, video: &VideoRow) -> HubResult<()> {
        with_timeout(
            self.timeout,
            "insert_video",
            sqlx::query(
                "INSERT INTO video (id, owner_id, video_file, thumbnail, title, description, duration, views, is_published, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )
            .bind(&video.id)
            .bind(&video.owner_id)
            .bind(&video.video_file)
            .bind(&video.thumbnail)
            .bind(&video.title)
            .bind(&video.description)
            .bind(video.duration)
            .bind(video.views)
            .bind(video.is_published)
            .bind(video.created_at)
            .execute(&self.db),
        )
        .await?;

        Ok(())
    }

    /// Append a video to an account's watch history
    pub async fn append_watch_history(&self, account_id: &str, video_id: &str) -> HubResult<()> {
        with_timeout(
            self.timeout,
            "append_watch_history",
            sqlx::query(
                "INSERT INTO watch_history (account_id, video_id, watched_at) VALUES (?1, ?2, ?3)",
            )
            .bind(account_id)
            .bind(video_id)
            .bind(Utc::now())
            .execute(&self.db),
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CredentialStore for SqliteAccountStore {
    async fn find_by_identifier(&self, identifier: &str) -> HubResult<Option<Account>> {
        let identifier = identifier.trim();
        let handle = identifier.to_lowercase();

        // A handle match wins over an email match
        let row = with_timeout(
            self.timeout,
            "find_by_identifier",
            sqlx::query_as::<_, AccountRow>(&format!(
                "SELECT {} FROM account WHERE username = ?1 OR email = ?2
                 ORDER BY (username = ?1) DESC LIMIT 1",
                ACCOUNT_COLUMNS
            ))
            .bind(&handle)
            .bind(identifier)
            .fetch_optional(&self.db),
        )
        .await?;

        Ok(row.map(Account::from))
    }

    async fn find_by_handle(&self, handle: &str) -> HubResult<Option<Account>> {
        let handle = handle.trim().to_lowercase();
        self.fetch_account(
            "find_by_handle",
            &format!("SELECT {} FROM account WHERE username = ?1", ACCOUNT_COLUMNS),
            &handle,
        )
        .await
    }

    async fn find_by_id(&self, id: &str) -> HubResult<Option<Account>> {
        self.fetch_account(
            "find_by_id",
            &format!("SELECT {} FROM account WHERE id = ?1", ACCOUNT_COLUMNS),
            id,
        )
        .await
    }

    async fn identity_taken(&self, handle: &str, email: &str) -> HubResult<bool> {
        let count: i64 = with_timeout(
            self.timeout,
            "identity_taken",
            sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE username = ?1 OR email = ?2")
                .bind(handle.trim().to_lowercase())
                .bind(email.trim())
                .fetch_one(&self.db),
        )
        .await?;

        Ok(count > 0)
    }

    async fn insert(&self, account: &Account) -> HubResult<()> {
        let refresh_issued_at = match &account.session {
            SessionState::Active { issued_at, .. } => Some(*issued_at),
            SessionState::NoSession => None,
        };

        with_timeout(
            self.timeout,
            "insert_account",
            sqlx::query(
                "INSERT INTO account (id, username, email, full_name, avatar, cover_image, password_hash,
                                      refresh_token, refresh_issued_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )
            .bind(&account.id)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.full_name)
            .bind(&account.avatar)
            .bind(&account.cover_image)
            .bind(&account.password_hash)
            .bind(account.session.refresh_token())
            .bind(refresh_issued_at)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&self.db),
        )
        .await
        .map_err(|e| conflict_on_unique(e, "User with email or username already exists"))?;

        Ok(())
    }

    async fn update_refresh_token(
        &self,
        id: &str,
        expected: ExpectedToken<'_>,
        new_token: &str,
        issued_at: DateTime<Utc>,
    ) -> HubResult<bool> {
        let query = match expected {
            ExpectedToken::Any => sqlx::query(
                "UPDATE account SET refresh_token = ?1, refresh_issued_at = ?2 WHERE id = ?3",
            )
            .bind(new_token)
            .bind(issued_at)
            .bind(id),
            ExpectedToken::Matching(current) => sqlx::query(
                "UPDATE account SET refresh_token = ?1, refresh_issued_at = ?2
                 WHERE id = ?3 AND refresh_token = ?4",
            )
            .bind(new_token)
            .bind(issued_at)
            .bind(id)
            .bind(current),
        };

        let result = with_timeout(self.timeout, "update_refresh_token", query.execute(&self.db)).await?;

        Ok(result.rows_affected() == 1)
    }

    async fn clear_refresh_token(&self, id: &str) -> HubResult<()> {
        with_timeout(
            self.timeout,
            "clear_refresh_token",
            sqlx::query(
                "UPDATE account SET refresh_token = NULL, refresh_issued_at = NULL WHERE id = ?1",
            )
            .bind(id)
            .execute(&self.db),
        )
        .await?;

        Ok(())
    }

    async fn update_profile_fields(
        &self,
        id: &str,
        fields: &ProfileUpdate,
    ) -> HubResult<Option<Account>> {
        let result = with_timeout(
            self.timeout,
            "update_profile_fields",
            sqlx::query(
                "UPDATE account SET
                    full_name = COALESCE(?1, full_name),
                    email = COALESCE(?2, email),
                    avatar = COALESCE(?3, avatar),
                    cover_image = COALESCE(?4, cover_image),
                    updated_at = ?5
                 WHERE id = ?6",
            )
            .bind(&fields.full_name)
            .bind(&fields.email)
            .bind(&fields.avatar)
            .bind(&fields.cover_image)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db),
        )
        .await
        .map_err(|e| conflict_on_unique(e, "Email already registered"))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(id).await
    }

    async fn update_password_hash(&self, id: &str, password_hash: &str) -> HubResult<bool> {
        let result = with_timeout(
            self.timeout,
            "update_password_hash",
            sqlx::query("UPDATE account SET password_hash = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(password_hash)
                .bind(Utc::now())
                .bind(id)
                .execute(&self.db),
        )
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        Self {
            video_id: row.video_id,
            video_file: row.video_file,
            thumbnail: row.thumbnail,
            title: row.title,
            description: row.description,
            duration: row.duration,
            views: row.views,
            created_at: row.created_at,
            owner: OwnerSummary {
                id: row.owner_id,
                username: row.owner_username,
                full_name: row.owner_full_name,
                avatar: row.owner_avatar,
            },
        }
    }
}

impl WatchHistoryStore for SqliteAccountStore {
    fn watch_history<'a>(&'a self, viewer_id: &'a str) -> BoxStream<'a, HubResult<HistoryEntry>> {
        // Inner joins drop entries whose video or owner no longer exists
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT v.id AS video_id, v.video_file AS video_file, v.thumbnail AS thumbnail,
                    v.title AS title, v.description AS description, v.duration AS duration,
                    v.views AS views, v.created_at AS created_at,
                    o.id AS owner_id, o.username AS owner_username,
                    o.full_name AS owner_full_name, o.avatar AS owner_avatar
             FROM watch_history wh
             JOIN video v ON v.id = wh.video_id
             JOIN account o ON o.id = v.owner_id
             WHERE wh.account_id = ?1
             ORDER BY wh.position ASC",
        )
        .bind(viewer_id)
        .fetch(&self.db)
        .map(|row| row.map(HistoryEntry::from).map_err(HubError::from))
        .boxed();

        with_stream_timeout(self.timeout, "watch_history", rows)
    }
}

/// Subscription edge store
#[derive(Clone)]
pub struct SqliteSubscriptionStore {
    db: SqlitePool,
    timeout: Duration,
}

impl SqliteSubscriptionStore {
    pub fn new(db: SqlitePool, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    /// Record that `subscriber_id` follows `channel_id`
    ///
    /// Repeated calls add repeated edges.
    pub async fn insert_edge(&self, subscriber_id: &str, channel_id: &str) -> HubResult<()> {
        with_timeout(
            self.timeout,
            "insert_edge",
            sqlx::query(
                "INSERT INTO subscription (subscriber_id, channel_id, created_at) VALUES (?1, ?2, ?3)",
            )
            .bind(subscriber_id)
            .bind(channel_id)
            .bind(Utc::now())
            .execute(&self.db),
        )
        .await?;

        Ok(())
    }

    async fn count(&self, operation: &str, sql: &str, arg: &str) -> HubResult<u64> {
        let count: i64 = with_timeout(
            self.timeout,
            operation,
            sqlx::query_scalar(sql).bind(arg).fetch_one(&self.db),
        )
        .await?;

        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl SubscriptionEdgeStore for SqliteSubscriptionStore {
    async fn count_where_channel(&self, channel_id: &str) -> HubResult<u64> {
        self.count(
            "count_where_channel",
            "SELECT COUNT(*) FROM subscription WHERE channel_id = ?1",
            channel_id,
        )
        .await
    }

    async fn count_where_subscriber(&self, subscriber_id: &str) -> HubResult<u64> {
        self.count(
            "count_where_subscriber",
            "SELECT COUNT(*) FROM subscription WHERE subscriber_id = ?1",
            subscriber_id,
        )
        .await
    }

    async fn exists_edge(&self, subscriber_id: &str, channel_id: &str) -> HubResult<bool> {
        let exists: i64 = with_timeout(
            self.timeout,
            "exists_edge",
            sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM subscription WHERE subscriber_id = ?1 AND channel_id = ?2)",
            )
            .bind(subscriber_id)
            .bind(channel_id)
            .fetch_one(&self.db),
        )
        .await?;

        Ok(exists != 0)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::db;
    use futures::TryStreamExt;

    async fn stores() -> (SqliteAccountStore, SqliteSubscriptionStore) {
        let pool = db::create_memory_pool().await.unwrap();
        let timeout = Duration::from_secs(5);
        (
            SqliteAccountStore::new(pool.clone(), timeout),
            SqliteSubscriptionStore::new(pool, timeout),
        )
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let (accounts, _) = stores().await;
        let account = sample_account("alice");
        accounts.insert(&account).await.unwrap();

        let by_id = accounts.find_by_id(&account.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "alice");

        let by_handle = accounts.find_by_handle("ALICE").await.unwrap().unwrap();
        assert_eq!(by_handle.id, account.id);

        let by_email = accounts
            .find_by_identifier("Alice@Example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, account.id);

        assert!(accounts.find_by_id("missing").await.unwrap().is_none());
        assert!(accounts.find_by_identifier("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_conflict() {
        let (accounts, _) = stores().await;
        accounts.insert(&sample_account("alice")).await.unwrap();

        let mut same_handle = sample_account("alice");
        same_handle.email = "other@example.com".to_string();
        let err = accounts.insert(&same_handle).await.unwrap_err();
        assert!(matches!(err, HubError::Conflict(_)));

        let mut same_email = sample_account("bob");
        same_email.email = "ALICE@example.com".to_string();
        let err = accounts.insert(&same_email).await.unwrap_err();
        assert!(matches!(err, HubError::Conflict(_)));

        assert!(accounts.identity_taken("Alice", "x@example.com").await.unwrap());
        assert!(accounts.identity_taken("x", "alice@example.com").await.unwrap());
        assert!(!accounts.identity_taken("carol", "carol@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_token_compare_and_set() {
        let (accounts, _) = stores().await;
        let account = sample_account("alice");
        accounts.insert(&account).await.unwrap();
        let now = Utc::now();

        assert!(accounts
            .update_refresh_token(&account.id, ExpectedToken::Any, "first", now)
            .await
            .unwrap());

        // Stale expectation loses
        assert!(!accounts
            .update_refresh_token(&account.id, ExpectedToken::Matching("other"), "second", now)
            .await
            .unwrap());

        assert!(accounts
            .update_refresh_token(&account.id, ExpectedToken::Matching("first"), "second", now)
            .await
            .unwrap());

        let stored = accounts.find_by_id(&account.id).await.unwrap().unwrap();
        assert_eq!(stored.session.refresh_token(), Some("second"));

        accounts.clear_refresh_token(&account.id).await.unwrap();
        let stored = accounts.find_by_id(&account.id).await.unwrap().unwrap();
        assert!(!stored.session.is_active());

        // Nothing to match against once cleared
        assert!(!accounts
            .update_refresh_token(&account.id, ExpectedToken::Matching("second"), "third", now)
            .await
            .unwrap());

        assert!(!accounts
            .update_refresh_token("missing", ExpectedToken::Any, "x", now)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_update_profile_fields() {
        let (accounts, _) = stores().await;
        let alice = sample_account("alice");
        let bob = sample_account("bob");
        accounts.insert(&alice).await.unwrap();
        accounts.insert(&bob).await.unwrap();

        let updated = accounts
            .update_profile_fields(
                &alice.id,
                &ProfileUpdate {
                    cover_image: Some("http://media/cover.png".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.cover_image.as_deref(), Some("http://media/cover.png"));
        assert_eq!(updated.full_name, alice.full_name);

        let err = accounts
            .update_profile_fields(
                &alice.id,
                &ProfileUpdate {
                    email: Some(bob.email.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Conflict(_)));

        let missing = accounts
            .update_profile_fields("missing", &ProfileUpdate::default())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_edge_counts_include_duplicates() {
        let (accounts, edges) = stores().await;
        let a = sample_account("a");
        let b = sample_account("b");
        let c = sample_account("c");
        for account in [&a, &b, &c] {
            accounts.insert(account).await.unwrap();
        }

        edges.insert_edge(&a.id, &c.id).await.unwrap();
        edges.insert_edge(&b.id, &c.id).await.unwrap();
        edges.insert_edge(&b.id, &c.id).await.unwrap();

        assert_eq!(edges.count_where_channel(&c.id).await.unwrap(), 3);
        assert_eq!(edges.count_where_subscriber(&b.id).await.unwrap(), 2);
        assert_eq!(edges.count_where_subscriber(&c.id).await.unwrap(), 0);
        assert!(edges.exists_edge(&a.id, &c.id).await.unwrap());
        assert!(!edges.exists_edge(&c.id, &a.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_watch_history_skips_missing_videos() {
        let (accounts, _) = stores().await;
        let viewer = sample_account("viewer");
        let owner = sample_account("owner");
        accounts.insert(&viewer).await.unwrap();
        accounts.insert(&owner).await.unwrap();

        accounts.insert_video(&sample_video("v1", &owner.id)).await.unwrap();
        accounts.append_watch_history(&viewer.id, "v1").await.unwrap();
        accounts.append_watch_history(&viewer.id, "gone").await.unwrap();
        accounts.append_watch_history(&viewer.id, "v1").await.unwrap();

        let entries: Vec<HistoryEntry> = accounts
            .watch_history(&viewer.id)
            .try_collect()
            .await
            .unwrap();

        let ids: Vec<&str> = entries.iter().map(|e| e.video_id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v1"]);
        assert_eq!(entries[0].owner.username, "owner");
    }

    #[tokio::test]
    async fn test_watch_history_times_out_on_starved_pool() {
        let pool = db::create_memory_pool().await.unwrap();
        let accounts = SqliteAccountStore::new(pool.clone(), Duration::from_millis(100));

        // Hold the only connection so the query cannot start
        let _held = pool.acquire().await.unwrap();

        let started = std::time::Instant::now();
        let result: HubResult<Vec<HistoryEntry>> =
            accounts.watch_history("viewer").try_collect().await;

        assert!(matches!(result, Err(HubError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
