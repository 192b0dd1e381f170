//! Transport abstraction for the continuity mesh.
//!
//! The engine never talks to sockets directly: it claims or connects to a
//! rendezvous identity through a [`Transport`]. The transport's atomic claim
//! semantics (exactly one claimant wins, the loser gets a definitive
//! [`TransportError::IdentityTaken`]) is the only synchronization primitive
//! leader election relies on.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::mpsc;

use quiz_core::model::{QuizId, UserId};

use super::wire::{DeviceInfo, PeerMessage};

/// Deterministic rendezvous address for one (quiz, user) pair.
///
/// Every device of the same user viewing the same quiz derives the same
/// identity, so whichever device claims it first becomes reachable by all
/// the others.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RendezvousId(String);

impl RendezvousId {
    /// Derive the identity from the quiz and user ids.
    #[must_use]
    pub fn derive(quiz_id: QuizId, user_id: UserId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(quiz_id.value().as_bytes());
        hasher.update(user_id.value().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RendezvousId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// Another device already claimed the identity and is still listening.
    #[error("rendezvous identity already claimed")]
    IdentityTaken,

    /// Nobody is listening on the identity.
    #[error("no listener at rendezvous identity")]
    NoListener,

    #[error("transport failure: {0}")]
    Failed(String),
}

/// Sending half of an established link. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LinkSender {
    tx: mpsc::UnboundedSender<PeerMessage>,
}

impl LinkSender {
    /// Queue a message for the remote side.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Failed` when the link is no longer open.
    pub fn send(&self, message: PeerMessage) -> Result<(), TransportError> {
        self.tx
            .send(message)
            .map_err(|_| TransportError::Failed("link closed".into()))
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Receiving half of an established link.
#[derive(Debug)]
pub struct LinkReceiver {
    rx: mpsc::UnboundedReceiver<PeerMessage>,
}

impl LinkReceiver {
    /// Next inbound message; `None` once the remote side is gone.
    pub async fn recv(&mut self) -> Option<PeerMessage> {
        self.rx.recv().await
    }
}

/// A bidirectional message channel to exactly one peer.
///
/// Dropping either half closes the link for the remote side.
#[derive(Debug)]
pub struct LinkChannel {
    sender: LinkSender,
    receiver: LinkReceiver,
}

impl LinkChannel {
    /// A connected pair of channels, one for each endpoint.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Self {
                sender: LinkSender { tx: a_tx },
                receiver: LinkReceiver { rx: b_rx },
            },
            Self {
                sender: LinkSender { tx: b_tx },
                receiver: LinkReceiver { rx: a_rx },
            },
        )
    }

    #[must_use]
    pub fn split(self) -> (LinkSender, LinkReceiver) {
        (self.sender, self.receiver)
    }
}

/// Pluggable rendezvous + messaging fabric.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Try to register the identity as this device's own address.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::IdentityTaken` when another live device holds
    /// the identity (the definitive signal that this device lost the
    /// election), or `TransportError::Failed` for fabric errors.
    async fn claim(&self, identity: &RendezvousId)
    -> Result<Box<dyn LinkAcceptor>, TransportError>;

    /// Open a link to whoever claimed the identity, introducing ourselves
    /// with `device`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::NoListener` when the identity is unclaimed
    /// or its holder is gone.
    async fn connect(
        &self,
        identity: &RendezvousId,
        device: DeviceInfo,
    ) -> Result<LinkChannel, TransportError>;
}

/// Inbound-connection stream owned by the identity holder.
#[async_trait]
pub trait LinkAcceptor: Send {
    /// Next inbound link, with the connecting device's self-description.
    /// `None` when the transport shut down.
    async fn accept(&mut self) -> Option<(LinkChannel, DeviceInfo)>;
}

type PendingLink = (LinkChannel, DeviceInfo);

/// In-process transport: a shared registry of claimed identities.
///
/// Claim atomicity comes from the registry mutex: exactly one claimant can
/// install its acceptor, and a dead holder (dropped acceptor) makes the
/// identity claimable again. This is the simulation fabric the integration
/// tests run the full mesh on.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    registry: Arc<Mutex<HashMap<RendezvousId, mpsc::UnboundedSender<PendingLink>>>>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryAcceptor {
    rx: mpsc::UnboundedReceiver<PendingLink>,
}

#[async_trait]
impl LinkAcceptor for MemoryAcceptor {
    async fn accept(&mut self) -> Option<(LinkChannel, DeviceInfo)> {
        self.rx.recv().await
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn claim(
        &self,
        identity: &RendezvousId,
    ) -> Result<Box<dyn LinkAcceptor>, TransportError> {
        let mut registry = self
            .registry
            .lock()
            .map_err(|_| TransportError::Failed("registry lock poisoned".into()))?;

        if let Some(existing) = registry.get(identity) {
            if !existing.is_closed() {
                return Err(TransportError::IdentityTaken);
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        registry.insert(identity.clone(), tx);
        Ok(Box::new(MemoryAcceptor { rx }))
    }

    async fn connect(
        &self,
        identity: &RendezvousId,
        device: DeviceInfo,
    ) -> Result<LinkChannel, TransportError> {
        let listener = {
            let registry = self
                .registry
                .lock()
                .map_err(|_| TransportError::Failed("registry lock poisoned".into()))?;
            registry.get(identity).cloned()
        };

        let Some(listener) = listener else {
            return Err(TransportError::NoListener);
        };

        let (ours, theirs) = LinkChannel::pair();
        listener
            .send((theirs, device))
            .map_err(|_| TransportError::NoListener)?;
        Ok(ours)
    }
}
