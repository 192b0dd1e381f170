//! Leader election and message relay for the continuity mesh.
//!
//! Every device derives the same rendezvous identity for a (quiz, user)
//! pair and races to claim it. The winner listens as the leader; losers
//! connect to the identity as followers, giving a star topology with the
//! leader as the only relay. A follower that loses its leader reconnects
//! once, then re-enters the claim race, so the mesh converges back to
//! exactly one leader while any device is alive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::link::{ContinuityLink, LinkEvent, LinkId};
use super::transport::{LinkAcceptor, LinkChannel, RendezvousId, Transport, TransportError};
use super::wire::{DeviceInfo, PeerMessage};

/// Timing knobs for the continuity mesh.
#[derive(Debug, Clone, Copy)]
pub struct ContinuityConfig {
    /// Cadence of liveness probes across all open links.
    pub ping_interval: Duration,
    /// Hard deadline for a matching pong before the link is force-closed.
    pub probe_timeout: Duration,
    /// Pause between claim/connect cycles while the mesh is unsettled.
    pub retry_delay: Duration,
}

impl Default for ContinuityConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(15),
            retry_delay: Duration::from_millis(250),
        }
    }
}

/// Role of this device in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuityRole {
    /// Racing for the rendezvous identity (also the disconnected state).
    Claiming,
    /// Holds the rendezvous identity and relays between followers.
    Leader,
    /// Connected to the leader.
    Follower,
}

/// Observable state of the mesh, published through a watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuityStatus {
    pub role: ContinuityRole,
    /// Number of open links (leader: followers; follower: 0 or 1).
    pub link_count: usize,
    /// Devices that introduced themselves on inbound links (leader side).
    pub peers: Vec<DeviceInfo>,
}

impl ContinuityStatus {
    fn claiming() -> Self {
        Self {
            role: ContinuityRole::Claiming,
            link_count: 0,
            peers: Vec::new(),
        }
    }

    /// Whether this device may write remote progress: it is the leader, or
    /// it has no peers at all (sole device).
    #[must_use]
    pub fn is_authority(&self) -> bool {
        matches!(self.role, ContinuityRole::Leader) || self.link_count == 0
    }
}

/// Events surfaced to the owning study session.
#[derive(Debug)]
pub enum ContinuityEvent {
    /// This device won the claim race and now relays for the mesh.
    BecameLeader,
    /// This device connected to an existing leader.
    ConnectedToLeader,
    /// A follower's link is ready; the session answers with an
    /// `initial_sync` and a `question_update` directed at `link`.
    FollowerJoined { link: LinkId, device: DeviceInfo },
    /// A link closed (clean close or failed liveness probe).
    PeerDisconnected,
    /// A state message to apply to the local session.
    Message { from: LinkId, message: PeerMessage },
}

enum Command {
    Broadcast(PeerMessage),
    SendTo(LinkId, PeerMessage),
    Teardown,
}

/// Control handle held by the session controller.
pub struct ContinuityHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<ContinuityStatus>,
    task: Option<JoinHandle<()>>,
}

impl ContinuityHandle {
    #[must_use]
    pub fn status(&self) -> ContinuityStatus {
        self.status_rx.borrow().clone()
    }

    #[must_use]
    pub fn is_authority(&self) -> bool {
        self.status_rx.borrow().is_authority()
    }

    /// Send a message to every open link.
    pub fn broadcast(&self, message: PeerMessage) {
        let _ = self.cmd_tx.send(Command::Broadcast(message));
    }

    /// Send a message to one specific link.
    pub fn send_to(&self, link: LinkId, message: PeerMessage) {
        let _ = self.cmd_tx.send(Command::SendTo(link, message));
    }

    /// Tear the mesh down: close every link, stop timers and tasks.
    pub async fn teardown(mut self) {
        let _ = self.cmd_tx.send(Command::Teardown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ContinuityHandle {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Teardown);
    }
}

enum Established {
    Leader(Box<dyn LinkAcceptor>),
    Follower(LinkChannel),
}

#[derive(PartialEq)]
enum Exit {
    Teardown,
    LeaderLost,
}

/// The continuity state machine, running as a dedicated task.
pub struct ContinuitySession {
    transport: Arc<dyn Transport>,
    identity: RendezvousId,
    device: DeviceInfo,
    config: ContinuityConfig,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ContinuityEvent>,
    status_tx: watch::Sender<ContinuityStatus>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    link_rx: mpsc::UnboundedReceiver<LinkEvent>,
    links: HashMap<LinkId, ContinuityLink>,
    role: ContinuityRole,
    next_link_id: u64,
    next_probe_seq: u64,
}

impl ContinuitySession {
    /// Start the mesh for one (quiz, user) rendezvous identity.
    ///
    /// Returns the control handle and the event stream the owning session
    /// drains on its own event loop.
    #[must_use]
    pub fn spawn(
        transport: Arc<dyn Transport>,
        identity: RendezvousId,
        device: DeviceInfo,
        config: ContinuityConfig,
    ) -> (ContinuityHandle, mpsc::UnboundedReceiver<ContinuityEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ContinuityStatus::claiming());
        let (link_tx, link_rx) = mpsc::unbounded_channel();

        let session = Self {
            transport,
            identity,
            device,
            config,
            cmd_rx,
            events: event_tx,
            status_tx,
            link_tx,
            link_rx,
            links: HashMap::new(),
            role: ContinuityRole::Claiming,
            next_link_id: 0,
            next_probe_seq: 0,
        };
        let task = tokio::spawn(session.run());

        (
            ContinuityHandle {
                cmd_tx,
                status_rx,
                task: Some(task),
            },
            event_rx,
        )
    }

    async fn run(mut self) {
        'lifecycle: loop {
            let Some(established) = self.establish().await else {
                break;
            };
            match established {
                Established::Leader(acceptor) => {
                    // Leaders never demote; they relay until teardown.
                    self.run_leader(acceptor).await;
                    break;
                }
                Established::Follower(channel) => {
                    let mut channel = Some(channel);
                    while let Some(link) = channel.take() {
                        match self.run_follower(link).await {
                            Exit::Teardown => break 'lifecycle,
                            Exit::LeaderLost => {
                                // One reconnect attempt before re-claiming.
                                match self
                                    .transport
                                    .connect(&self.identity, self.device.clone())
                                    .await
                                {
                                    Ok(new_link) => {
                                        self.send_event(ContinuityEvent::ConnectedToLeader);
                                        channel = Some(new_link);
                                    }
                                    Err(err) => {
                                        tracing::info!(
                                            error = %err,
                                            "leader unreachable, re-entering claim race"
                                        );
                                    }
                                }
                            }
                        }
                    }
                    // Fall through to a fresh claim attempt.
                }
            }
        }
        self.close_all_links();
    }

    /// Claim the rendezvous identity or connect to whoever holds it.
    ///
    /// Loops until the mesh is entered or teardown is requested (`None`).
    async fn establish(&mut self) -> Option<Established> {
        self.set_role(ContinuityRole::Claiming);
        loop {
            if self.teardown_requested() {
                return None;
            }

            match self.transport.claim(&self.identity).await {
                Ok(acceptor) => {
                    self.set_role(ContinuityRole::Leader);
                    tracing::info!(identity = %self.identity, "claimed rendezvous identity, acting as leader");
                    self.send_event(ContinuityEvent::BecameLeader);
                    return Some(Established::Leader(acceptor));
                }
                Err(TransportError::IdentityTaken) => {
                    match self
                        .transport
                        .connect(&self.identity, self.device.clone())
                        .await
                    {
                        Ok(channel) => {
                            self.set_role(ContinuityRole::Follower);
                            tracing::info!(identity = %self.identity, "joined existing leader as follower");
                            self.send_event(ContinuityEvent::ConnectedToLeader);
                            return Some(Established::Follower(channel));
                        }
                        Err(err) => {
                            tracing::debug!(error = %err, "lost claim race but leader unreachable, retrying");
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "rendezvous claim failed, retrying");
                }
            }

            if self.wait_retry().await {
                return None;
            }
        }
    }

    async fn run_leader(&mut self, mut acceptor: Box<dyn LinkAcceptor>) {
        let accept_tx = self.link_tx.clone();
        let accept_task = tokio::spawn(async move {
            while let Some((channel, device)) = acceptor.accept().await {
                if accept_tx.send(LinkEvent::Accepted(channel, device)).is_err() {
                    return;
                }
            }
        });

        let mut ping = tokio::time::interval(self.config.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Broadcast(message)) => self.broadcast(&message, None),
                    Some(Command::SendTo(link, message)) => self.direct_send(link, message),
                    Some(Command::Teardown) | None => break,
                },
                event = self.link_rx.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        LinkEvent::Accepted(channel, device) => self.register_follower(channel, device),
                        LinkEvent::Inbound(from, message) => self.on_leader_message(from, message),
                        LinkEvent::Closed(link) => self.remove_link(link),
                        LinkEvent::ProbeExpired(link, seq) => self.on_probe_expired(link, seq),
                    }
                },
                _ = ping.tick() => self.probe_links(),
            }
        }

        accept_task.abort();
        self.close_all_links();
    }

    async fn run_follower(&mut self, channel: LinkChannel) -> Exit {
        self.role = ContinuityRole::Follower;
        let leader_link = self.register_link(channel, None);
        self.publish_status();

        let mut ping = tokio::time::interval(self.config.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exit = loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Broadcast(message)) => self.broadcast(&message, None),
                    Some(Command::SendTo(link, message)) => self.direct_send(link, message),
                    Some(Command::Teardown) | None => break Exit::Teardown,
                },
                event = self.link_rx.recv() => {
                    let Some(event) = event else { break Exit::Teardown };
                    match event {
                        LinkEvent::Inbound(from, message) => self.on_follower_message(from, message),
                        LinkEvent::Closed(link) => self.remove_link(link),
                        LinkEvent::ProbeExpired(link, seq) => self.on_probe_expired(link, seq),
                        // Followers hold no acceptor.
                        LinkEvent::Accepted(..) => {}
                    }
                    if !self.links.contains_key(&leader_link) {
                        break Exit::LeaderLost;
                    }
                },
                _ = ping.tick() => self.probe_links(),
            }
        };

        self.close_all_links();
        if exit == Exit::LeaderLost {
            self.set_role(ContinuityRole::Claiming);
        }
        exit
    }

    // ─── Message handling ──────────────────────────────────────────────────

    fn on_leader_message(&mut self, from: LinkId, message: PeerMessage) {
        match message {
            PeerMessage::Ping => self.direct_send(from, PeerMessage::Pong),
            PeerMessage::Pong => {
                if let Some(link) = self.links.get_mut(&from) {
                    link.confirm_probe();
                }
            }
            PeerMessage::InitialSync { .. } => {
                tracing::warn!(link = %from, "unexpected initial_sync from follower, ignoring");
            }
            message => {
                // Adopt the change locally and star-relay it to every other
                // follower; the sender never sees its own message again.
                self.broadcast(&message, Some(from));
                self.send_event(ContinuityEvent::Message { from, message });
            }
        }
    }

    fn on_follower_message(&mut self, from: LinkId, message: PeerMessage) {
        match message {
            PeerMessage::Ping => self.direct_send(from, PeerMessage::Pong),
            PeerMessage::Pong => {
                if let Some(link) = self.links.get_mut(&from) {
                    link.confirm_probe();
                }
            }
            // Followers never relay; the topology stays a star.
            message => self.send_event(ContinuityEvent::Message { from, message }),
        }
    }

    // ─── Link management ───────────────────────────────────────────────────

    fn register_follower(&mut self, channel: LinkChannel, device: DeviceInfo) {
        let link = self.register_link(channel, Some(device.clone()));
        self.publish_status();
        tracing::info!(link = %link, label = %device.label, "follower joined");
        self.send_event(ContinuityEvent::FollowerJoined { link, device });
    }

    fn register_link(&mut self, channel: LinkChannel, device: Option<DeviceInfo>) -> LinkId {
        let id = LinkId::new(self.next_link_id);
        self.next_link_id += 1;
        let link = ContinuityLink::spawn(id, channel, device, self.link_tx.clone());
        self.links.insert(id, link);
        id
    }

    fn remove_link(&mut self, id: LinkId) {
        if self.links.remove(&id).is_some() {
            tracing::info!(link = %id, "peer disconnected");
            self.publish_status();
            self.send_event(ContinuityEvent::PeerDisconnected);
        }
    }

    fn close_all_links(&mut self) {
        for (_, link) in self.links.drain() {
            link.close();
        }
        self.publish_status();
    }

    fn broadcast(&self, message: &PeerMessage, except: Option<LinkId>) {
        for (id, link) in &self.links {
            if Some(*id) == except {
                continue;
            }
            link.send(message.clone());
        }
    }

    fn direct_send(&self, link: LinkId, message: PeerMessage) {
        if let Some(link) = self.links.get(&link) {
            link.send(message);
        }
    }

    // ─── Liveness ──────────────────────────────────────────────────────────

    fn probe_links(&mut self) {
        let timeout = self.config.probe_timeout;
        for (&id, link) in &mut self.links {
            let seq = self.next_probe_seq;
            if !link.begin_probe(seq) {
                continue;
            }
            self.next_probe_seq += 1;
            link.send(PeerMessage::Ping);

            let expiry_tx = self.link_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = expiry_tx.send(LinkEvent::ProbeExpired(id, seq));
            });
        }
    }

    fn on_probe_expired(&mut self, id: LinkId, seq: u64) {
        let Some(link) = self.links.get(&id) else {
            return;
        };
        if !link.probe_matches(seq) {
            return;
        }
        tracing::warn!(link = %id, "liveness probe timed out, closing link");
        if let Some(link) = self.links.remove(&id) {
            link.close();
        }
        self.publish_status();
        self.send_event(ContinuityEvent::PeerDisconnected);
    }

    // ─── Plumbing ──────────────────────────────────────────────────────────

    fn set_role(&mut self, role: ContinuityRole) {
        self.role = role;
        self.publish_status();
    }

    fn publish_status(&self) {
        let status = ContinuityStatus {
            role: self.role,
            link_count: self.links.len(),
            peers: self
                .links
                .values()
                .filter_map(|link| link.device().cloned())
                .collect(),
        };
        let _ = self.status_tx.send(status);
    }

    fn send_event(&self, event: ContinuityEvent) {
        let _ = self.events.send(event);
    }

    fn teardown_requested(&mut self) -> bool {
        loop {
            match self.cmd_rx.try_recv() {
                Ok(Command::Teardown) => return true,
                // No links yet; nothing to broadcast to.
                Ok(_) => {}
                Err(mpsc::error::TryRecvError::Empty) => return false,
                Err(mpsc::error::TryRecvError::Disconnected) => return true,
            }
        }
    }

    async fn wait_retry(&mut self) -> bool {
        tokio::select! {
            () = tokio::time::sleep(self.config.retry_delay) => false,
            cmd = self.cmd_rx.recv() => !matches!(cmd, Some(Command::Broadcast(_) | Command::SendTo(..))),
        }
    }
}
