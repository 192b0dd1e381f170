use serde::{Deserialize, Serialize};

/// Per-user study settings, fetched from the server at session start.
///
/// The defaults double as the offline fallback when the settings request
/// fails: sync disabled, one repetition per question, one extra repetition
/// per wrong answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudySettings {
    pub sync_progress: bool,
    pub initial_reoccurrences: u32,
    pub wrong_answer_reoccurrences: u32,
}

impl Default for StudySettings {
    fn default() -> Self {
        Self {
            sync_progress: false,
            initial_reoccurrences: 1,
            wrong_answer_reoccurrences: 1,
        }
    }
}
