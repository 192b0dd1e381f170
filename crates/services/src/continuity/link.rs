use std::fmt;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::transport::{LinkChannel, LinkSender};
use super::wire::{DeviceInfo, PeerMessage};

/// Identifier of one transport link within a continuity session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u64);

impl LinkId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Internal plumbing events produced by links and timers, consumed by the
/// session actor.
#[derive(Debug)]
pub(crate) enum LinkEvent {
    Inbound(LinkId, PeerMessage),
    Closed(LinkId),
    Accepted(LinkChannel, DeviceInfo),
    ProbeExpired(LinkId, u64),
}

/// One live transport connection to a peer, owned by the session actor.
///
/// A pump task forwards inbound messages into the actor's event queue and
/// reports the close when the stream ends. Sends never fail loudly: a closed
/// link just logs and drops the message, matching the transport contract.
pub(crate) struct ContinuityLink {
    id: LinkId,
    sender: LinkSender,
    device: Option<DeviceInfo>,
    outstanding_probe: Option<u64>,
    pump: JoinHandle<()>,
}

impl ContinuityLink {
    pub(crate) fn spawn(
        id: LinkId,
        channel: LinkChannel,
        device: Option<DeviceInfo>,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Self {
        let (sender, mut receiver) = channel.split();
        let pump = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                if events.send(LinkEvent::Inbound(id, message)).is_err() {
                    return;
                }
            }
            let _ = events.send(LinkEvent::Closed(id));
        });

        Self {
            id,
            sender,
            device,
            outstanding_probe: None,
            pump,
        }
    }

    #[must_use]
    pub(crate) fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    pub(crate) fn send(&self, message: PeerMessage) {
        if self.sender.send(message).is_err() {
            tracing::warn!(link = %self.id, "dropping message for closed link");
        }
    }

    /// Arm a liveness probe. Returns `false` when one is already in flight,
    /// in which case no new ping should be sent this round.
    pub(crate) fn begin_probe(&mut self, seq: u64) -> bool {
        if self.outstanding_probe.is_some() {
            return false;
        }
        self.outstanding_probe = Some(seq);
        true
    }

    /// A pong arrived on this link; cancel the armed probe.
    pub(crate) fn confirm_probe(&mut self) {
        self.outstanding_probe = None;
    }

    /// Whether the expired probe `seq` is still the one in flight.
    #[must_use]
    pub(crate) fn probe_matches(&self, seq: u64) -> bool {
        self.outstanding_probe == Some(seq)
    }

    /// Tear the link down; the remote side observes a close.
    pub(crate) fn close(self) {
        self.pump.abort();
    }
}

impl Drop for ContinuityLink {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
