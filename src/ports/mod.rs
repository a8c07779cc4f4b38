//! Ports - Interfaces for external collaborators.
//!
//! Following hexagonal architecture, ports define the contracts between the
//! messaging core and the messaging API it talks to. Adapters implement
//! them (HTTP client, in-memory backend).
//!
//! - `ConversationGateway` - list/create/get/update/delete conversations
//! - `MessageGateway` - list and send messages
//! - `SeenGateway` - seen markers
//! - `UserDirectory` - participant search
//! - `FileUploader` - attachment uploads with progress

mod conversation_gateway;
mod file_uploader;
mod message_gateway;
mod seen_gateway;
mod user_directory;

pub use conversation_gateway::{ConversationGateway, ConversationUpdate};
pub use file_uploader::{FileUploader, ProgressReporter};
pub use message_gateway::MessageGateway;
pub use seen_gateway::SeenGateway;
pub use user_directory::{UserDirectory, UserSearchQuery};
