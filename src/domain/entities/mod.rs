pub mod message;
pub mod pending_action;
pub mod post;
pub mod reconciliation;
pub mod story;

pub use message::{CachedMessage, MessageKind, MessagePatch};
pub use pending_action::{OutboxSummary, PendingAction};
pub use post::CachedPost;
pub use reconciliation::{MessageReconciliation, ProvisionalEcho};
pub use story::CachedStory;
