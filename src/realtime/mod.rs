//! Live sessions and the events pushed to them

mod events;
mod registry;
mod socket;

pub use events::{
    ClientEvent, MessageDeleted, MessageView, NotificationEnvelope, NotificationView, PostPreview,
    PresenceUpdate, ReactionsChanged, RealtimeEvent, SeenReceipt, TypingIndicator,
};
pub use registry::{
    ConnectionId, Departure, Inbox, Outbox, Registration, SessionRegistry, conversation_room,
};
pub use socket::{close_all, realtime_handler};
