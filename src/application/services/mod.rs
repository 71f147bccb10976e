pub mod outbox_service;
pub mod poller;
pub mod reconciler;
pub mod sync_service;

pub use outbox_service::{OutboxService, OutgoingMessage, QueuedMessage};
pub use poller::{ConversationPoller, PollHandle};
pub use reconciler::{plan_message_reconciliation, Reconciler};
pub use sync_service::{
    FlushReport, HousekeepingReport, OutboxEvent, RetryPolicy, SyncEngine, SyncSettings,
    SyncStatus, SyncTrigger, SyncWorkerHandle,
};
