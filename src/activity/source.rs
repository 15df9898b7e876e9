use serde::Serialize;
use tokio::sync::broadcast;

const SIGNAL_CAPACITY: usize = 32;

/// A user interaction that counts as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySignal {
    PointerDown,
    PointerMove,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
}

/// Something that reports user interactions.
///
/// The monitor subscribes when it starts and drops the receiver when it
/// stops. A closed channel ends the subscription.
pub trait ActivitySource: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<ActivitySignal>;
}

/// In-process activity source.
///
/// # Example
///
/// ```rust
/// use warden::activity::{ActivityChannel, ActivitySignal};
///
/// let input = ActivityChannel::new();
/// input.notify(ActivitySignal::KeyPress);
/// ```
#[derive(Debug, Clone)]
pub struct ActivityChannel {
    sender: broadcast::Sender<ActivitySignal>,
}

impl ActivityChannel {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self { sender }
    }

    /// Reports an interaction. Returns how many subscribers received it.
    pub fn notify(&self, signal: ActivitySignal) -> usize {
        self.sender.send(signal).unwrap_or(0)
    }
}

impl Default for ActivityChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivitySource for ActivityChannel {
    fn subscribe(&self) -> broadcast::Receiver<ActivitySignal> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_delivers_to_subscribers() {
        let channel = ActivityChannel::new();
        assert_eq!(channel.notify(ActivitySignal::Click), 0);

        let mut rx = channel.subscribe();
        assert_eq!(channel.notify(ActivitySignal::Scroll), 1);
        assert_eq!(rx.recv().await.unwrap(), ActivitySignal::Scroll);
    }
}
