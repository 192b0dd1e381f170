use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::QuestionId;
use crate::reoccurrence::ReoccurrenceEntry;

/// Snapshot of a study session, written on every question transition.
///
/// Two storage backends (local durable cache, remote API) may hold divergent
/// copies; reconciliation lives in the progress store, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    /// Question displayed when the snapshot was taken. `None` marks a
    /// snapshot taken before any question was shown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_question: Option<QuestionId>,
    pub correct_count: u32,
    pub wrong_count: u32,
    pub study_time_seconds: u64,
    pub reoccurrences: Vec<ReoccurrenceEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

impl SessionProgress {
    /// True when the snapshot carries nothing worth resuming.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.current_question.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_json() {
        let progress = SessionProgress {
            current_question: Some(QuestionId::new(7)),
            correct_count: 3,
            wrong_count: 1,
            study_time_seconds: 125,
            reoccurrences: vec![ReoccurrenceEntry::new(QuestionId::new(7), 2)],
            last_activity: None,
        };

        let json = serde_json::to_string(&progress).unwrap();
        let back: SessionProgress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, progress);
    }

    #[test]
    fn fresh_when_no_current_question() {
        let progress = SessionProgress {
            current_question: None,
            correct_count: 0,
            wrong_count: 0,
            study_time_seconds: 0,
            reoccurrences: Vec::new(),
            last_activity: None,
        };
        assert!(progress.is_fresh());
    }
}
