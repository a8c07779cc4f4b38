//! Messaging domain - conversations, rosters, messages, attachments and
//! read state.

mod attachment;
mod conversation;
mod errors;
mod message;
mod role;
mod routing;
mod seen;
mod user;

pub use attachment::{format_size, Attachment, PreviewStrategy, SelectedFile, UploadPolicy};
pub use conversation::{
    Conversation, ConversationDisplay, ConversationDraft, Participant, FALLBACK_DIRECT_TITLE,
    FALLBACK_GROUP_TITLE,
};
pub use errors::{MessagingError, NetworkError, ServerRejection, UploadError};
pub use message::{
    insertion_index, sort_chronologically, starts_sender_run, Message, MessageDraft,
};
pub use role::Role;
pub use routing::RoleRouter;
pub use seen::SeenMarker;
pub use user::{UserSummary, Viewer};
