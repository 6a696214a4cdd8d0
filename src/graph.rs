/// Relationship graph read model
///
/// Channel statistics are composed from explicit edge-store queries, and
/// watch history is resolved to videos annotated with their owner's public
/// fields.
use crate::{
    error::{HubError, HubResult},
    store::{CredentialStore, SubscriptionEdgeStore, WatchHistoryStore},
};
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Public view of a channel with its subscription statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProfile {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub subscriber_count: u64,
    pub subscribed_to_count: u64,
    pub is_subscribed: bool,
}

/// Public fields of a video owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSummary {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub avatar: String,
}

/// One watched video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub video_id: String,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub owner: OwnerSummary,
}

/// Reads channel statistics and watch history
pub struct GraphReader {
    accounts: Arc<dyn CredentialStore>,
    edges: Arc<dyn SubscriptionEdgeStore>,
    history: Arc<dyn WatchHistoryStore>,
}

impl GraphReader {
    pub fn new(
        accounts: Arc<dyn CredentialStore>,
        edges: Arc<dyn SubscriptionEdgeStore>,
        history: Arc<dyn WatchHistoryStore>,
    ) -> Self {
        Self {
            accounts,
            edges,
            history,
        }
    }

    /// Channel profile for `handle` as seen by `viewer_id`
    pub async fn channel_profile(
        &self,
        handle: &str,
        viewer_id: Option<&str>,
    ) -> HubResult<ChannelProfile> {
        let handle = handle.trim();
        if handle.is_empty() {
            return Err(HubError::InvalidInput("Username is missing".to_string()));
        }

        let channel = self
            .accounts
            .find_by_handle(handle)
            .await?
            .ok_or_else(|| HubError::NotFound("Channel does not exist".to_string()))?;

        let subscriber_count = self.edges.count_where_channel(&channel.id).await?;
        let subscribed_to_count = self.edges.count_where_subscriber(&channel.id).await?;
        let is_subscribed = match viewer_id {
            Some(viewer) => self.edges.exists_edge(viewer, &channel.id).await?,
            None => false,
        };

        tracing::debug!(
            "channel_profile: {} has {} subscribers, {} subscriptions",
            channel.username,
            subscriber_count,
            subscribed_to_count
        );

        Ok(ChannelProfile {
            id: channel.id,
            username: channel.username,
            full_name: channel.full_name,
            email: channel.email,
            avatar: channel.avatar,
            cover_image: channel.cover_image,
            subscriber_count,
            subscribed_to_count,
            is_subscribed,
        })
    }

    /// Watch history of `viewer_id`, oldest entry first
    ///
    /// The stream is finite and single-use; call again to re-read.
    pub async fn watch_history<'a>(
        &'a self,
        viewer_id: &'a str,
    ) -> HubResult<BoxStream<'a, HubResult<HistoryEntry>>> {
        if self.accounts.find_by_id(viewer_id).await?.is_none() {
            return Err(HubError::NotFound("User not found".to_string()));
        }

        Ok(self.history.watch_history(viewer_id))
    }
}
