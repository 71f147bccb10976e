pub mod local_store;
pub mod reachability;
pub mod remote_api;

pub use local_store::LocalStore;
pub use reachability::ReachabilityProbe;
pub use remote_api::{RemoteAck, RemoteApiClient, RemoteError};
