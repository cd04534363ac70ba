//! Notification feed client for a rental-booking platform.
//!
//! - [`api`] - Transport contract, wire formats and the reqwest client
//! - [`feed`] - Page window, selection, batch mutations, unread counter
//! - [`session`] - Per-visit session gate
//! - [`store`] - [`NotificationStore`](store::NotificationStore), which owns
//!   the feed state and commits background completions
//! - [`push`] - Push payload routing
//! - [`config`] - TOML configuration

pub mod api;
pub mod config;
pub mod feed;
pub mod push;
pub mod session;
pub mod store;
