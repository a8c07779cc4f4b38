//! School Messaging - messaging core for a multi-role school application.
//!
//! Conversations between students, parents, teachers and staff: directory,
//! group rosters, message history, read state and file attachments. The
//! messaging API itself is reached through ports; `adapters` provides a
//! reqwest client for it and an axum reference server.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
