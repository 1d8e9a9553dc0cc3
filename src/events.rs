//! Bridge event union feeding the single-consumer synchronizer loop.
//!
//! Both asynchronous sources (link, playback engine) push here so state machine
//! mutations stay strictly ordered.

use crate::engine::StateChange;
use crate::protocol::InboundMessage;

/// Events emitted by the duplex link.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    Connected,
    Message(InboundMessage),
    Disconnected,
}

/// Everything the synchronizer reacts to, processed one at a time.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    Link(LinkEvent),
    Engine(StateChange),
    Shutdown,
}
