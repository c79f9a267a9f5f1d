//! Change notification event.

use crate::ids::SpaceId;

/// "Something changed in this space, pull again."
///
/// A poke carries no payload on the wire; the space id only tells a
/// multiplexing transport which connection to write to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PokeEvent {
    /// Space that changed.
    pub space_id: SpaceId,
}

impl PokeEvent {
    /// Event name used on server-sent-event streams.
    pub const EVENT_NAME: &'static str = "poke";

    /// Creates a poke for `space_id`.
    pub fn new(space_id: impl Into<SpaceId>) -> Self {
        Self {
            space_id: space_id.into(),
        }
    }

    /// Renders the event as one server-sent-events frame.
    #[must_use]
    pub fn to_sse_frame(&self) -> String {
        format!("event: {}\ndata: \n\n", Self::EVENT_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_frame_has_empty_data() {
        let frame = PokeEvent::new("space-1").to_sse_frame();
        assert_eq!(frame, "event: poke\ndata: \n\n");
    }
}
