//! Application layer - client-side messaging components.
//!
//! This layer orchestrates domain operations and coordinates between ports.

pub mod messaging;

pub use messaging::{
    AttachmentPipeline, ConversationDirectory, ConversationSession, MessageStore,
    MessagingServices, ParticipantRoster, ReadTracker, SearchSettings, UserSearch,
};
