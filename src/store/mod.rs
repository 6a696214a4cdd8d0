/// Store contracts consumed by the core
///
/// The session coordinator, account manager and graph reader only talk to
/// storage through these traits. [`sqlite`] provides the SQLite-backed
/// implementations used by the server.

pub mod sqlite;

pub use sqlite::{SqliteAccountStore, SqliteSubscriptionStore};

use crate::{
    db::account::Account,
    error::{HubError, HubResult},
    graph::HistoryEntry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use std::future::Future;
use std::time::Duration;

/// Precondition for a refresh token write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedToken<'a> {
    /// Overwrite whatever is stored
    Any,
    /// Write only if the stored token is exactly this value
    Matching(&'a str),
}

/// Partial profile update; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub cover_image: Option<String>,
}

/// Account persistence
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find an account by handle (case-insensitive) or email
    async fn find_by_identifier(&self, identifier: &str) -> HubResult<Option<Account>>;

    /// Find an account by handle (case-insensitive)
    async fn find_by_handle(&self, handle: &str) -> HubResult<Option<Account>>;

    async fn find_by_id(&self, id: &str) -> HubResult<Option<Account>>;

    /// Whether the handle or the email is already registered
    async fn identity_taken(&self, handle: &str, email: &str) -> HubResult<bool>;

    /// Insert a new account; duplicate handle or email fails with `Conflict`
    async fn insert(&self, account: &Account) -> HubResult<()>;

    /// Atomically replace the refresh token if `expected` still holds
    ///
    /// Returns false when the precondition failed or the account is gone.
    async fn update_refresh_token(
        &self,
        id: &str,
        expected: ExpectedToken<'_>,
        new_token: &str,
        issued_at: DateTime<Utc>,
    ) -> HubResult<bool>;

    async fn clear_refresh_token(&self, id: &str) -> HubResult<()>;

    /// Apply a profile update, returning the updated account if it exists
    async fn update_profile_fields(
        &self,
        id: &str,
        fields: &ProfileUpdate,
    ) -> HubResult<Option<Account>>;

    /// Replace the stored password hash; false if the account is gone
    async fn update_password_hash(&self, id: &str, password_hash: &str) -> HubResult<bool>;
}

/// Read access to the subscription relation
#[async_trait]
pub trait SubscriptionEdgeStore: Send + Sync {
    /// Number of edges pointing at `channel_id`, duplicates included
    async fn count_where_channel(&self, channel_id: &str) -> HubResult<u64>;

    /// Number of edges leaving `subscriber_id`, duplicates included
    async fn count_where_subscriber(&self, subscriber_id: &str) -> HubResult<u64>;

    async fn exists_edge(&self, subscriber_id: &str, channel_id: &str) -> HubResult<bool>;
}

/// Read access to watch history
pub trait WatchHistoryStore: Send + Sync {
    /// Stream a viewer's history in insertion order, joined with each video's owner
    fn watch_history<'a>(&'a self, viewer_id: &'a str) -> BoxStream<'a, HubResult<HistoryEntry>>;
}

/// Bound a store round-trip by `limit`
///
/// An elapsed deadline is reported as [`HubError::Timeout`]; the inner future
/// is dropped, which cancels the query.
pub async fn with_timeout<T, E, F>(limit: Duration, operation: &str, fut: F) -> HubResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: Into<HubError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            tracing::warn!("Store operation {} exceeded {:?}", operation, limit);
            Err(HubError::Timeout(format!(
                "{} did not complete within {:?}",
                operation, limit
            )))
        }
    }
}

/// Bound each item of a store stream by `limit`
///
/// The first item waits on connection acquisition, so a starved pool is
/// reported as [`HubError::Timeout`] too. The stream ends after a timeout.
pub fn with_stream_timeout<'a, T: Send + 'a>(
    limit: Duration,
    operation: &'static str,
    inner: BoxStream<'a, HubResult<T>>,
) -> BoxStream<'a, HubResult<T>> {
    stream::unfold(Some(inner), move |state| async move {
        let mut inner = state?;
        match tokio::time::timeout(limit, inner.next()).await {
            Ok(Some(item)) => Some((item, Some(inner))),
            Ok(None) => None,
            Err(_) => {
                tracing::warn!("Store stream {} exceeded {:?}", operation, limit);
                let err = HubError::Timeout(format!(
                    "{} did not complete within {:?}",
                    operation, limit
                ));
                Some((Err(err), None))
            }
        }
    })
    .boxed()
}
