mod cache;
mod connectivity;
mod engine;
mod executor;
mod queue;
mod reconcile;
mod refresh;
mod remote;

cfg_if::cfg_if! {
    if #[cfg(feature = "http")] {
        mod http;
        pub use http::HttpTodayApi;
    }
}

pub use cache::{Checkpoint, SnapshotCache};
pub use connectivity::{Connectivity, ConnectivityEvents};
pub use engine::{EngineOptions, TodayEngine};
pub use executor::{MutationError, MutationExecutor, MutationOutcome};
pub use queue::{DurableQueue, PendingMutation, TODAY_QUEUE_KEY};
pub use reconcile::{LostMutation, Reconciler, SyncReport};
pub use refresh::Refresher;
pub use remote::{RemoteError, TodayApi};
