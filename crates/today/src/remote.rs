use imkitchen_shared::today::{CompletionStatus, SlotAction, TodaySnapshot};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// No response came back: connection refused, DNS, timeout, abort.
    #[error("network unavailable: {0}")]
    Network(String),

    /// The request reached the server and was turned down.
    #[error("rejected by server ({}): {message}", status_label(.status))]
    Rejected {
        status: Option<u16>,
        message: String,
    },
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(status) => status.to_string(),
        None => "invalid response".to_owned(),
    }
}

impl RemoteError {
    pub fn is_network(&self) -> bool {
        matches!(self, RemoteError::Network(_))
    }
}

/// The authoritative "today" endpoints.
#[async_trait::async_trait]
pub trait TodayApi: Send + Sync {
    async fn fetch_today(&self) -> Result<TodaySnapshot, RemoteError>;

    async fn fetch_yesterday(&self) -> Result<TodaySnapshot, RemoteError>;

    /// Safe to repeat with the same status.
    async fn mark_slot_complete(
        &self,
        slot_id: &str,
        status: CompletionStatus,
    ) -> Result<(), RemoteError>;

    /// Clearing an unmarked slot succeeds.
    async fn clear_slot_completion(&self, slot_id: &str) -> Result<(), RemoteError>;
}

pub(crate) async fn dispatch(
    api: &dyn TodayApi,
    slot_id: &str,
    action: SlotAction,
) -> Result<(), RemoteError> {
    match action {
        SlotAction::Complete(status) => api.mark_slot_complete(slot_id, status).await,
        SlotAction::Uncomplete => api.clear_slot_completion(slot_id).await,
    }
}
