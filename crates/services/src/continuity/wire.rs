//! Peer-to-peer wire protocol for live session continuity.

use serde::{Deserialize, Serialize};

use quiz_core::model::Question;
use quiz_core::reoccurrence::ReoccurrenceEntry;

/// Messages exchanged between devices of the same (quiz, user) pair.
///
/// JSON layout is part of the device-to-device contract: a `type` tag in
/// snake_case, payload fields in camelCase. Every message is safe to
/// re-apply except `answer_checked`, which receivers gate behind their
/// local "already checked" state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PeerMessage {
    /// Full state bootstrap, pushed by the leader to every new follower.
    InitialSync {
        /// Leader's study-timer origin as unix milliseconds; the follower
        /// adopts it wholesale.
        start_time: i64,
        correct_answers_count: u32,
        wrong_answers_count: u32,
        reoccurrences: Vec<ReoccurrenceEntry>,
    },
    /// Displayed question or answer selection changed on some device.
    QuestionUpdate {
        question: Question,
        selected_answers: Vec<usize>,
    },
    /// Grading was committed on some device.
    AnswerChecked,
    /// Liveness probe.
    Ping,
    /// Liveness ack, sent on the link the ping arrived on.
    Pong,
}

impl PeerMessage {
    /// Whether this message mutates session state (as opposed to liveness
    /// traffic), and therefore gets relayed by the leader.
    #[must_use]
    pub fn is_state_message(&self) -> bool {
        matches!(
            self,
            PeerMessage::InitialSync { .. }
                | PeerMessage::QuestionUpdate { .. }
                | PeerMessage::AnswerChecked
        )
    }
}

/// Self-reported identity of a device, carried in the connect handshake.
///
/// Purely cosmetic: it feeds the peer list a UI shows, never routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub label: String,
    pub kind: DeviceKind,
}

impl DeviceInfo {
    #[must_use]
    pub fn new(label: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            label: label.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Desktop,
    Mobile,
    Tablet,
    Unknown,
}
