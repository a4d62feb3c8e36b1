//! Service layer
//!
//! Business rules between the HTTP/realtime surface and the store. Services
//! own their transactions and hand finished events to the session registry.

mod clan;
mod feed;
mod graph;
mod messaging;
pub mod notification;
mod post;
mod search;
mod user;
pub mod visibility;

pub use clan::{
    ClanService, ClanSettings, ClanView, InviteView, JoinOutcome, JoinRequestView, MemberView,
    parse_assignable_role,
};
pub use feed::{FeedItem, FeedKind, FeedService, clamp_limit, rank_score};
pub use graph::{FollowOutcome, GraphService};
pub use messaging::{ConversationView, MessageDraft, MessagingService};
pub use notification::NotificationService;
pub use post::{CommentView, LikeOutcome, PostDraft, PostService, extract_hashtags};
pub use search::{SearchResults, SearchService};
pub use user::{ProfileUpdate, ProfileView, UserService};
