//! Messaging components.
//!
//! Each component owns one piece of client state and talks to the
//! collaborators only through ports:
//!
//! - [`ConversationDirectory`] - conversation list, search and creation
//! - [`ParticipantRoster`] - title resolution and group roster edits
//! - [`MessageStore`] - message history and single-flight sending
//! - [`AttachmentPipeline`] - file selection and upload
//! - [`ReadTracker`] - seen marking
//! - [`UserSearch`] - debounced participant search
//! - [`ConversationSession`] - one open thread, tying the above together

mod attachment_pipeline;
mod conversation_directory;
mod conversation_session;
mod message_store;
mod participant_roster;
mod read_tracker;
mod user_search;

pub use attachment_pipeline::{AttachmentPhase, AttachmentPipeline, AttachmentState};
pub use conversation_directory::{
    ConversationDirectory, CreateConversationCommand, DirectoryStatus,
};
pub use conversation_session::{
    ComposerView, ConversationSession, MessagingServices, SessionOutcome, SessionView,
};
pub use message_store::{
    ComposerPhase, DeliveryStatus, LoadStatus, MessageEntry, MessageRow, MessageStore,
};
pub use participant_roster::{ParticipantRoster, PendingRemoval, RosterEntry};
pub use read_tracker::ReadTracker;
pub use user_search::{SearchOutcome, SearchSettings, UserSearch};
