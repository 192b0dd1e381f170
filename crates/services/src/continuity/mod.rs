//! Peer-to-peer continuity: live sync of one study session across devices.

mod link;
mod session;
mod transport;
mod wire;

pub use link::LinkId;
pub use session::{
    ContinuityConfig, ContinuityEvent, ContinuityHandle, ContinuityRole, ContinuitySession,
    ContinuityStatus,
};
pub use transport::{
    LinkAcceptor, LinkChannel, LinkReceiver, LinkSender, MemoryTransport, RendezvousId, Transport,
    TransportError,
};
pub use wire::{DeviceInfo, DeviceKind, PeerMessage};
