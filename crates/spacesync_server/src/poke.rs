//! Poke delivery to async transports.

use spacesync_core::{ChangeNotifier, Subscription};
use spacesync_protocol::{PokeEvent, SpaceId};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Async stream of pokes for one space.
///
/// Backed by a notifier listener that forwards into an unbounded channel.
/// Dropping the stream unsubscribes the listener, which is how a transport
/// reacts to a client disconnect.
#[derive(Debug)]
pub struct PokeStream {
    space_id: SpaceId,
    receiver: mpsc::UnboundedReceiver<PokeEvent>,
    _subscription: Subscription,
}

impl PokeStream {
    pub(crate) fn open(notifier: &Arc<ChangeNotifier>, space_id: &SpaceId) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let event_space = space_id.clone();
        let subscription = notifier.add_listener(space_id, move || {
            // A closed receiver means the stream is being dropped.
            let _ = sender.send(PokeEvent::new(event_space.clone()));
        });

        Self {
            space_id: space_id.clone(),
            receiver,
            _subscription: subscription,
        }
    }

    /// Returns the space this stream watches.
    pub fn space_id(&self) -> &SpaceId {
        &self.space_id
    }

    /// Waits for the next poke.
    ///
    /// Returns `None` once the notifier has been dropped.
    pub async fn next(&mut self) -> Option<PokeEvent> {
        self.receiver.recv().await
    }

    /// Returns a poke that is already queued, without waiting.
    pub fn try_next(&mut self) -> Option<PokeEvent> {
        self.receiver.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn poke_is_forwarded() {
        let notifier = Arc::new(ChangeNotifier::new());
        let space = SpaceId::from("s");
        let mut stream = PokeStream::open(&notifier, &space);

        assert_eq!(notifier.poke(&space), 1);
        let event = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.space_id, space);
        assert_eq!(event.to_sse_frame(), "event: poke\ndata: \n\n");
    }

    #[test]
    fn drop_unsubscribes() {
        let notifier = Arc::new(ChangeNotifier::new());
        let space = SpaceId::from("s");
        let stream = PokeStream::open(&notifier, &space);
        assert_eq!(notifier.listener_count(&space), 1);
        drop(stream);
        assert_eq!(notifier.listener_count(&space), 0);
    }

    #[test]
    fn pokes_queue_up() {
        let notifier = Arc::new(ChangeNotifier::new());
        let space = SpaceId::from("s");
        let mut stream = PokeStream::open(&notifier, &space);
        notifier.poke(&space);
        notifier.poke(&space);
        assert!(stream.try_next().is_some());
        assert!(stream.try_next().is_some());
        assert!(stream.try_next().is_none());
    }
}
