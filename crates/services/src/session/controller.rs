use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;

use quiz_core::model::{Question, QuizId, SessionProgress, StudySettings, UserId};
use quiz_core::reoccurrence::ReoccurrenceTracker;
use quiz_core::selector::{self, Selection};
use quiz_core::time::{Clock, StudyTimer};

use crate::api::QuizBackend;
use crate::continuity::{
    ContinuityConfig, ContinuityEvent, ContinuityHandle, ContinuitySession, DeviceInfo, LinkId,
    PeerMessage, RendezvousId, Transport,
};
use crate::error::{ApiError, SessionLoadError};
use crate::progress_store::{ProgressStore, VersionCheck};

use super::view::{SessionPhase, SessionView};

/// Identity and wiring for one study session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub quiz_id: QuizId,
    pub user_id: UserId,
    pub device: DeviceInfo,
    pub continuity: ContinuityConfig,
}

/// Notifications the interface layer reacts to: toasts and re-renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Quiz content version changed since the last visit on this device.
    ContentChanged { previous: i64, current: i64 },
    /// A continuity peer joined; `device` is known on the leader side only.
    PeerConnected { device: Option<DeviceInfo> },
    PeerDisconnected,
    /// Session state changed under a peer message; re-render.
    StateChanged,
}

/// Orchestrates one study session for one quiz.
///
/// Wires the reoccurrence tracker, question selector, progress store and
/// continuity mesh into a single state machine. All mutation happens on the
/// caller's task: the host drives user actions directly and drains
/// continuity events through [`SessionController::next_event`] /
/// [`SessionController::pump_events`], so no locking is needed anywhere.
pub struct SessionController {
    quiz: quiz_core::Quiz,
    settings: StudySettings,
    clock: Clock,
    store: ProgressStore,
    tracker: ReoccurrenceTracker,
    current: Option<Question>,
    selection: Vec<usize>,
    checked: bool,
    finished: bool,
    correct_count: u32,
    wrong_count: u32,
    timer: StudyTimer,
    continuity: Option<ContinuityHandle>,
    continuity_events: Option<mpsc::UnboundedReceiver<ContinuityEvent>>,
    pending: VecDeque<SessionEvent>,
}

impl SessionController {
    /// Load a session: quiz, settings and prior progress, resuming where the
    /// user left off. Starts the continuity mesh when progress sync is
    /// enabled and a transport is available.
    ///
    /// # Errors
    ///
    /// Returns `SessionLoadError::QuizUnavailable` when the quiz fetch fails
    /// (the only load-bearing request) and `SessionLoadError::SessionExpired`
    /// when credentials are gone. Settings and progress failures degrade to
    /// defaults and the local cache.
    pub async fn start(
        config: SessionConfig,
        backend: Arc<dyn QuizBackend>,
        store: ProgressStore,
        transport: Option<Arc<dyn Transport>>,
        clock: Clock,
    ) -> Result<Self, SessionLoadError> {
        let quiz = backend.fetch_quiz(config.quiz_id).await.map_err(|err| match err {
            ApiError::SessionExpired => SessionLoadError::SessionExpired,
            err => SessionLoadError::QuizUnavailable(err),
        })?;
        if quiz.is_empty() {
            return Err(SessionLoadError::EmptyQuiz);
        }

        let mut pending = VecDeque::new();
        if let VersionCheck::Changed { previous, current } =
            store.observe_version(quiz.id(), quiz.version()).await
        {
            tracing::info!(previous, current, "quiz content changed since last visit");
            pending.push_back(SessionEvent::ContentChanged { previous, current });
        }

        let settings = match backend.fetch_settings().await {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!(error = %err, "settings fetch failed, using defaults");
                StudySettings::default()
            }
        };

        let (continuity, continuity_events) = match (settings.sync_progress, transport) {
            (true, Some(transport)) => {
                let identity = RendezvousId::derive(config.quiz_id, config.user_id);
                let (handle, events) = ContinuitySession::spawn(
                    transport,
                    identity,
                    config.device.clone(),
                    config.continuity,
                );
                (Some(handle), Some(events))
            }
            _ => (None, None),
        };

        let now = clock.now();
        let mut controller = Self {
            quiz,
            settings,
            clock,
            store,
            tracker: ReoccurrenceTracker::default(),
            current: None,
            selection: Vec::new(),
            checked: false,
            finished: false,
            correct_count: 0,
            wrong_count: 0,
            timer: StudyTimer::started(now),
            continuity,
            continuity_events,
            pending,
        };

        let prior = controller
            .store
            .load(controller.quiz.id(), controller.settings.sync_progress)
            .await;
        match prior {
            Some(progress) if !progress.is_fresh() => controller.restore(progress),
            _ => controller.begin_fresh(),
        }

        Ok(controller)
    }

    // ─── User actions ──────────────────────────────────────────────────────

    /// Toggle an answer by display index while the question is unchecked.
    ///
    /// Single-select questions replace the selection (and clear it when the
    /// selected answer is clicked again); multi-select questions toggle
    /// membership. Every change is mirrored to peers immediately.
    pub fn toggle_answer(&mut self, index: usize) {
        if self.checked || self.finished {
            return;
        }
        let Some(question) = &self.current else {
            return;
        };
        if index >= question.answers().len() {
            return;
        }

        if question.multiple() {
            if let Some(pos) = self.selection.iter().position(|&i| i == index) {
                self.selection.remove(pos);
            } else {
                self.selection.push(index);
            }
        } else if self.selection.as_slice() == [index] {
            self.selection.clear();
        } else {
            self.selection = vec![index];
        }

        self.broadcast_question_update();
    }

    /// The main action button: grade the current selection, or move on to
    /// the next question once graded.
    pub async fn next_action(&mut self) {
        if self.finished {
            return;
        }
        if self.checked {
            self.advance().await;
        } else {
            self.check_answer(false).await;
        }
    }

    /// Skip to a fresh question without grading.
    pub async fn skip_question(&mut self) {
        if self.finished {
            return;
        }
        self.advance().await;
    }

    /// Wipe stored progress and restart the session from scratch. The only
    /// way out of the finished phase.
    pub async fn reset_progress(&mut self) {
        self.store
            .reset(self.quiz.id(), self.settings.sync_progress)
            .await;
        self.correct_count = 0;
        self.wrong_count = 0;
        self.selection.clear();
        self.checked = false;
        self.begin_fresh();
    }

    // ─── Event loop seam ───────────────────────────────────────────────────

    /// Wait for the next user-visible event, applying continuity traffic to
    /// session state on this task as it arrives. `None` once continuity is
    /// gone and nothing is pending.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let event = self.continuity_events.as_mut()?.recv().await?;
            if let Some(out) = self.apply_continuity(event).await {
                return Some(out);
            }
        }
    }

    /// Apply everything already queued without waiting; returns the
    /// user-visible events produced.
    pub async fn pump_events(&mut self) -> Vec<SessionEvent> {
        let mut out: Vec<SessionEvent> = self.pending.drain(..).collect();
        loop {
            let Some(rx) = self.continuity_events.as_mut() else {
                break;
            };
            let Ok(event) = rx.try_recv() else {
                break;
            };
            if let Some(event) = self.apply_continuity(event).await {
                out.push(event);
            }
        }
        out
    }

    /// Tear down the continuity mesh: links closed, timers cancelled.
    pub async fn teardown(&mut self) {
        self.continuity_events = None;
        if let Some(handle) = self.continuity.take() {
            handle.teardown().await;
        }
    }

    // ─── Views ─────────────────────────────────────────────────────────────

    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            phase: if self.finished {
                SessionPhase::Finished
            } else {
                SessionPhase::Active {
                    checked: self.checked,
                }
            },
            question: self.current.clone(),
            selection: self.selection.clone(),
            correct_count: self.correct_count,
            wrong_count: self.wrong_count,
            mastered: self.tracker.mastered_count(),
            total: self.tracker.len(),
            study_time_seconds: self.timer.elapsed_seconds(self.clock.now()),
            continuity: self.continuity.as_ref().map(ContinuityHandle::status),
        }
    }

    #[must_use]
    pub fn quiz(&self) -> &quiz_core::Quiz {
        &self.quiz
    }

    #[must_use]
    pub fn settings(&self) -> StudySettings {
        self.settings
    }

    #[must_use]
    pub fn tracker(&self) -> &ReoccurrenceTracker {
        &self.tracker
    }

    // ─── Internal transitions ──────────────────────────────────────────────

    fn restore(&mut self, progress: SessionProgress) {
        self.correct_count = progress.correct_count;
        self.wrong_count = progress.wrong_count;

        let mut tracker = ReoccurrenceTracker::from_entries(progress.reoccurrences);
        // Content may have changed since the snapshot: adopt new questions,
        // drop vanished ones, keep surviving counters.
        tracker.reconcile(&self.quiz, self.settings.initial_reoccurrences);
        self.tracker = tracker;
        self.timer = StudyTimer::resumed(self.clock.now(), progress.study_time_seconds);

        match progress
            .current_question
            .and_then(|id| self.quiz.question(id))
        {
            Some(question) => {
                self.current = Some(question.shuffled(&mut rand::rng()));
                self.finished = self.tracker.is_exhausted();
            }
            // Snapshot points at a question that no longer exists.
            None => self.pick_current(),
        }
    }

    fn begin_fresh(&mut self) {
        self.tracker = ReoccurrenceTracker::initialize(
            self.quiz.question_ids(),
            self.settings.initial_reoccurrences,
        );
        self.timer = StudyTimer::started(self.clock.now());
        self.pick_current();
    }

    fn pick_current(&mut self) {
        match selector::pick_default(&self.tracker, &self.quiz) {
            Selection::Question(question) => {
                self.current = Some(question);
                self.finished = false;
            }
            Selection::Finished => {
                self.current = None;
                self.finished = true;
            }
        }
    }

    async fn check_answer(&mut self, remote: bool) {
        if self.checked || self.finished {
            return;
        }
        let Some(question) = self.current.clone() else {
            // Grading with no question loaded; recover with a fresh pick.
            self.pick_current();
            return;
        };

        let correct = question.is_correct_selection(&self.selection);
        if correct {
            self.correct_count += 1;
        } else {
            self.wrong_count += 1;
        }
        if !self.tracker.record(
            question.id(),
            correct,
            self.settings.wrong_answer_reoccurrences,
        ) {
            tracing::warn!(question = %question.id(), "graded a question the tracker does not know");
        }
        self.checked = true;

        self.persist().await;
        if !remote {
            if let Some(handle) = &self.continuity {
                handle.broadcast(PeerMessage::AnswerChecked);
            }
        }
    }

    async fn advance(&mut self) {
        self.selection.clear();
        self.checked = false;
        self.pick_current();
        if self.finished {
            return;
        }
        self.persist().await;
        self.broadcast_question_update();
    }

    async fn persist(&mut self) {
        if self.finished {
            return;
        }
        let Some(question) = &self.current else {
            return;
        };
        let now = self.clock.now();
        let progress = SessionProgress {
            current_question: Some(question.id()),
            correct_count: self.correct_count,
            wrong_count: self.wrong_count,
            study_time_seconds: self.timer.elapsed_seconds(now),
            reoccurrences: self.tracker.entries().to_vec(),
            last_activity: Some(now),
        };
        let is_authority = self
            .continuity
            .as_ref()
            .is_none_or(ContinuityHandle::is_authority);
        self.store
            .save(
                self.quiz.id(),
                &progress,
                self.settings.sync_progress,
                is_authority,
            )
            .await;
    }

    fn broadcast_question_update(&self) {
        let (Some(handle), Some(question)) = (&self.continuity, &self.current) else {
            return;
        };
        handle.broadcast(PeerMessage::QuestionUpdate {
            question: question.clone(),
            selected_answers: self.selection.clone(),
        });
    }

    // ─── Continuity handling ───────────────────────────────────────────────

    async fn apply_continuity(&mut self, event: ContinuityEvent) -> Option<SessionEvent> {
        match event {
            // Role is visible through the view; no toast for winning a claim.
            ContinuityEvent::BecameLeader => None,
            ContinuityEvent::ConnectedToLeader => {
                Some(SessionEvent::PeerConnected { device: None })
            }
            ContinuityEvent::FollowerJoined { link, device } => {
                self.initial_sync_to(link);
                Some(SessionEvent::PeerConnected {
                    device: Some(device),
                })
            }
            ContinuityEvent::PeerDisconnected => Some(SessionEvent::PeerDisconnected),
            ContinuityEvent::Message { message, .. } => self.apply_peer_message(message).await,
        }
    }

    /// Push the full state to a freshly joined follower so it lands in the
    /// exact same visual state as this device.
    fn initial_sync_to(&self, link: LinkId) {
        let Some(handle) = &self.continuity else {
            return;
        };
        let Some(question) = &self.current else {
            tracing::warn!("no current question available for initial sync");
            return;
        };

        handle.send_to(
            link,
            PeerMessage::InitialSync {
                start_time: self.timer.origin_millis(),
                correct_answers_count: self.correct_count,
                wrong_answers_count: self.wrong_count,
                reoccurrences: self.tracker.entries().to_vec(),
            },
        );
        handle.send_to(
            link,
            PeerMessage::QuestionUpdate {
                question: question.clone(),
                selected_answers: self.selection.clone(),
            },
        );
    }

    async fn apply_peer_message(&mut self, message: PeerMessage) -> Option<SessionEvent> {
        match message {
            PeerMessage::InitialSync {
                start_time,
                correct_answers_count,
                wrong_answers_count,
                reoccurrences,
            } => {
                self.correct_count = correct_answers_count;
                self.wrong_count = wrong_answers_count;
                self.tracker = ReoccurrenceTracker::from_entries(reoccurrences);
                // Timer authority is ceded to the leader's clock origin.
                if let Some(timer) = StudyTimer::from_origin_millis(start_time) {
                    self.timer = timer;
                }
                Some(SessionEvent::StateChanged)
            }
            PeerMessage::QuestionUpdate {
                question,
                selected_answers,
            } => {
                self.current = Some(question);
                self.selection = selected_answers;
                self.checked = false;
                self.finished = false;
                self.persist().await;
                Some(SessionEvent::StateChanged)
            }
            PeerMessage::AnswerChecked => {
                // The checked guard keeps this idempotent; a relayed
                // duplicate cannot double-count.
                self.check_answer(true).await;
                Some(SessionEvent::StateChanged)
            }
            // Liveness traffic never leaves the mesh.
            PeerMessage::Ping | PeerMessage::Pong => None,
        }
    }
}
