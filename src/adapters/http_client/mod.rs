//! HTTP client adapter for the messaging API.

mod client;

pub use client::HttpMessagingClient;
