//! Per-vendor bounded channels carrying tee'd proxy events into the
//! orchestrator's consumer loop.

use tokio::sync::mpsc;
use tracing::warn;

/// Matches the original's `make(chan any, 4096)` capacity.
pub const CHANNEL_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
pub enum ProxyEvent {
    /// A streaming response has started.
    Open,
    /// One raw line (SSE mode) or one top-level array element (Google's
    /// JSON-array mode), still vendor-wire-format, not yet normalized.
    Raw(String),
    /// The vendor body finished (EOF on the tee, or the JSON array closed).
    Close,
}

#[derive(Clone)]
pub struct VendorChannel {
    tx: mpsc::Sender<ProxyEvent>,
}

impl VendorChannel {
    pub fn pair() -> (Self, mpsc::Receiver<ProxyEvent>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }

    /// Drops the event and logs rather than blocking the tee task when the
    /// consumer has fallen behind — a slow orchestrator must never stall the
    /// browser's view of the vendor response.
    pub fn send(&self, event: ProxyEvent, vendor: &str) {
        if self.tx.try_send(event).is_err() {
            warn!(vendor, "vendor channel full, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_until_receiver_drops() {
        let (chan, mut rx) = VendorChannel::pair();
        chan.send(ProxyEvent::Open, "doubao");
        chan.send(ProxyEvent::Raw("hi".into()), "doubao");
        chan.send(ProxyEvent::Close, "doubao");
        assert!(matches!(rx.recv().await, Some(ProxyEvent::Open)));
        assert!(matches!(rx.recv().await, Some(ProxyEvent::Raw(s)) if s == "hi"));
        assert!(matches!(rx.recv().await, Some(ProxyEvent::Close)));
    }

    #[test]
    fn send_on_full_channel_does_not_panic() {
        let (tx, _rx) = mpsc::channel(1);
        let chan = VendorChannel { tx };
        chan.send(ProxyEvent::Open, "doubao");
        chan.send(ProxyEvent::Open, "doubao");
        chan.send(ProxyEvent::Open, "doubao");
    }
}
