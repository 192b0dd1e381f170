use serde::{Deserialize, Serialize};

use crate::model::{QuestionId, Quiz};

//
// ─── ENTRY ─────────────────────────────────────────────────────────────────────
//

/// Remaining required correct repetitions for one question.
///
/// A question is mastered iff `remaining == 0`. The serialized shape matches
/// the server payload and the continuity wire format (`id`, `reoccurrences`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReoccurrenceEntry {
    #[serde(rename = "id")]
    pub question_id: QuestionId,
    #[serde(rename = "reoccurrences")]
    pub remaining: u32,
}

impl ReoccurrenceEntry {
    #[must_use]
    pub fn new(question_id: QuestionId, remaining: u32) -> Self {
        Self {
            question_id,
            remaining,
        }
    }

    /// True once no further correct repetitions are required.
    #[must_use]
    pub fn is_mastered(&self) -> bool {
        self.remaining == 0
    }
}

//
// ─── TRACKER ───────────────────────────────────────────────────────────────────
//

/// The per-question repetition counter set driving question selection.
///
/// Pure data: no I/O, no hidden state. Counters never go below zero (correct
/// answers decrement with saturation) and grow by a configured penalty on
/// wrong answers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReoccurrenceTracker {
    entries: Vec<ReoccurrenceEntry>,
}

impl ReoccurrenceTracker {
    /// Fresh tracker with every question at `initial` repetitions.
    #[must_use]
    pub fn initialize(question_ids: impl IntoIterator<Item = QuestionId>, initial: u32) -> Self {
        Self {
            entries: question_ids
                .into_iter()
                .map(|id| ReoccurrenceEntry::new(id, initial))
                .collect(),
        }
    }

    /// Rebuild a tracker from persisted or peer-synced entries.
    #[must_use]
    pub fn from_entries(entries: Vec<ReoccurrenceEntry>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[ReoccurrenceEntry] {
        &self.entries
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<ReoccurrenceEntry> {
        self.entries
    }

    /// Remaining count for a question, if tracked.
    #[must_use]
    pub fn remaining(&self, question_id: QuestionId) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.question_id == question_id)
            .map(|e| e.remaining)
    }

    /// Record a grading result for a question.
    ///
    /// Correct answers decrement the counter, floored at zero; wrong answers
    /// add `wrong_penalty`. Returns `false` when the question id is not
    /// tracked, in which case nothing changes; callers treat that as a
    /// contract violation worth logging, not an error to propagate.
    pub fn record(&mut self, question_id: QuestionId, correct: bool, wrong_penalty: u32) -> bool {
        let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.question_id == question_id)
        else {
            return false;
        };

        if correct {
            entry.remaining = entry.remaining.saturating_sub(1);
        } else {
            entry.remaining += wrong_penalty;
        }
        true
    }

    /// True iff every tracked question is mastered.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.entries.iter().all(ReoccurrenceEntry::is_mastered)
    }

    /// Number of mastered questions.
    #[must_use]
    pub fn mastered_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_mastered()).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Align the tracker with the current quiz content.
    ///
    /// Entries whose question no longer exists are dropped; questions added
    /// since the snapshot are inserted at `initial` repetitions. Existing
    /// counters are kept as-is. Used when restoring progress after the quiz
    /// content version changed.
    pub fn reconcile(&mut self, quiz: &Quiz, initial: u32) {
        self.entries.retain(|e| quiz.question(e.question_id).is_some());
        for id in quiz.question_ids() {
            if self.remaining(id).is_none() {
                self.entries.push(ReoccurrenceEntry::new(id, initial));
            }
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
