use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

use crate::events::RoomEvent;

/// Trait for receiving room events by callback.
/// Implementations must be Send + Sync (called from SDK and tokio threads).
///
/// Listeners run while the channel is locked: they must not emit on the
/// same channel or call back into the session controller.
pub trait RoomEventListener: Send + Sync {
    fn on_event(&self, event: &RoomEvent);
}

enum Subscriber {
    Listener(Arc<dyn RoomEventListener>),
    Stream(mpsc::UnboundedSender<RoomEvent>),
}

#[derive(Default)]
struct ChannelState {
    subscribers: Vec<Subscriber>,
    closed: bool,
}

/// Ordered fan-out of room events to every live subscriber.
///
/// Emission holds the channel lock for the whole fan-out, so events emitted
/// concurrently from SDK callback threads, the stats timer and the UI reach
/// every subscriber in one and the same order. Nothing is replayed to
/// subscribers that attach later.
#[derive(Clone, Default)]
pub struct RoomEventChannel {
    state: Arc<Mutex<ChannelState>>,
}

impl RoomEventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a callback listener.
    pub fn add_listener(&self, listener: Arc<dyn RoomEventListener>) {
        let mut state = self.lock();
        if !state.closed {
            state.subscribers.push(Subscriber::Listener(listener));
        }
    }

    /// Open a stream receiving every event emitted from now on.
    ///
    /// On a closed channel the stream ends immediately.
    pub fn subscribe(&self) -> RoomEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        if !state.closed {
            state.subscribers.push(Subscriber::Stream(tx));
        }
        RoomEventStream { rx }
    }

    pub fn emit(&self, event: RoomEvent) {
        let mut state = self.lock();
        if state.closed {
            tracing::debug!("dropping {} on closed room event channel", event.name());
            return;
        }
        tracing::debug!("emit room event: {event:?}");
        state.subscribers.retain(|subscriber| match subscriber {
            Subscriber::Listener(listener) => {
                listener.on_event(&event);
                true
            }
            Subscriber::Stream(tx) => tx.send(event.clone()).is_ok(),
        });
    }

    /// Unsubscribe everyone. Open streams end once drained and later
    /// emissions are discarded.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

/// Stream side of [`RoomEventChannel::subscribe`].
pub struct RoomEventStream {
    rx: mpsc::UnboundedReceiver<RoomEvent>,
}

impl RoomEventStream {
    pub async fn recv(&mut self) -> Option<RoomEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<RoomEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for RoomEventStream {
    type Item = RoomEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<RoomEvent>> {
        self.rx.poll_recv(cx)
    }
}
