use std::sync::Arc;

use tokio::sync::watch;

/// Reachability as reported by the host platform's online/offline signal.
///
/// The monitor only records what it is told. It never probes the network, so
/// a request can still fail while it reports online.
#[derive(Clone)]
pub struct Connectivity {
    sender: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);

        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// Records a platform signal. Returns `true` only when the value actually
    /// changed, so repeated "online" signals are absorbed here.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                return false;
            }

            *current = online;
            true
        });

        if changed {
            tracing::info!(online, "connectivity changed");
        }

        changed
    }

    pub fn subscribe(&self) -> ConnectivityEvents {
        ConnectivityEvents {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Edge-triggered view over [`Connectivity`].
pub struct ConnectivityEvents {
    receiver: watch::Receiver<bool>,
}

impl ConnectivityEvents {
    /// Waits for the next offline to online transition that happens after
    /// this subscription was created. Returns `false` once the monitor is
    /// gone.
    pub async fn became_online(&mut self) -> bool {
        loop {
            if self.receiver.changed().await.is_err() {
                return false;
            }

            if *self.receiver.borrow_and_update() {
                return true;
            }
        }
    }
}
