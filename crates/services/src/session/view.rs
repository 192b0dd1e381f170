use quiz_core::model::Question;

use crate::continuity::ContinuityStatus;

/// Where the session currently is in its lifecycle.
///
/// `Active` cycles between unchecked (selecting answers) and checked
/// (post-grade display); `Finished` is left only through a progress reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Active { checked: bool },
    Finished,
}

/// Render snapshot of a study session.
///
/// Everything an interface layer needs for one frame; the controller owns
/// the live state and hands out copies.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub phase: SessionPhase,
    /// Question on display, answers already in display order.
    pub question: Option<Question>,
    /// Selected answer indices, in display order of `question`.
    pub selection: Vec<usize>,
    pub correct_count: u32,
    pub wrong_count: u32,
    pub mastered: usize,
    pub total: usize,
    pub study_time_seconds: u64,
    /// Present when continuity is active for this session.
    pub continuity: Option<ContinuityStatus>,
}

impl SessionView {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, SessionPhase::Finished)
    }

    #[must_use]
    pub fn is_checked(&self) -> bool {
        matches!(self.phase, SessionPhase::Active { checked: true })
    }
}
