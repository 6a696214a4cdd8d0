/// Channelhub
///
/// Account, session and subscription-graph backend for a media-sharing
/// service: registration, login with rotating refresh tokens, profile and
/// media updates, channel statistics and watch history.

pub mod account;
pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod graph;
pub mod media;
pub mod password;
pub mod server;
pub mod session;
pub mod store;
pub mod token;
