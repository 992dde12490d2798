//! Process-wide "data changed" signal.
//!
//! A payload-free broadcast tick telling presentation layers to re-read
//! the store. The notifier is passed explicitly to whoever needs to emit
//! or observe it; there is no global registry.

use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 16;

/// Broadcast signal with no payload. Delivery order and timing relative
/// to other signals is unspecified beyond "after the triggering
/// transaction commits"; lagging subscribers miss ticks rather than
/// blocking the sender.
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<()>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        ChangeNotifier { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Emit the signal. A send with no subscribers is not an error.
    pub fn notify(&self) {
        let _ = self.tx.send(());
    }
}
