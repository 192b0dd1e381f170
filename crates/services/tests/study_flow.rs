//! End-to-end study flow against the in-memory cache and a fake backend:
//! fresh start, grading, persistence gating, resume, and reset.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use quiz_core::model::{Answer, Question, QuestionId, QuizId, SessionProgress, StudySettings, UserId};
use services::api::QuizBackend;
use services::continuity::{ContinuityConfig, DeviceInfo, DeviceKind};
use services::error::ApiError;
use services::progress_store::ProgressStore;
use services::session::{SessionConfig, SessionController, SessionPhase};
use services::Clock;
use storage::repository::InMemoryCache;

struct FakeBackend {
    quiz: quiz_core::Quiz,
    settings: StudySettings,
    remote_progress: Mutex<Option<SessionProgress>>,
    remote_saves: AtomicU32,
}

impl FakeBackend {
    fn new(quiz: quiz_core::Quiz, settings: StudySettings) -> Self {
        Self {
            quiz,
            settings,
            remote_progress: Mutex::new(None),
            remote_saves: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl QuizBackend for FakeBackend {
    async fn fetch_quiz(&self, _quiz_id: QuizId) -> Result<quiz_core::Quiz, ApiError> {
        Ok(self.quiz.clone())
    }

    async fn fetch_settings(&self) -> Result<StudySettings, ApiError> {
        Ok(self.settings)
    }

    async fn fetch_progress(&self, _quiz_id: QuizId) -> Result<Option<SessionProgress>, ApiError> {
        Ok(self.remote_progress.lock().unwrap().clone())
    }

    async fn save_progress(
        &self,
        _quiz_id: QuizId,
        progress: &SessionProgress,
    ) -> Result<(), ApiError> {
        self.remote_saves.fetch_add(1, Ordering::SeqCst);
        *self.remote_progress.lock().unwrap() = Some(progress.clone());
        Ok(())
    }

    async fn delete_progress(&self, _quiz_id: QuizId) -> Result<(), ApiError> {
        *self.remote_progress.lock().unwrap() = None;
        Ok(())
    }
}

fn question(id: u64) -> Question {
    Question::new(
        QuestionId::new(id),
        format!("Q{id}"),
        false,
        vec![
            Answer::new("right", true),
            Answer::new("wrong", false),
        ],
    )
    .unwrap()
}

fn quiz(question_count: u64) -> quiz_core::Quiz {
    quiz_core::Quiz::new(
        QuizId::random(),
        "Flow quiz",
        1,
        (1..=question_count).map(question).collect(),
    )
}

fn config(quiz_id: QuizId) -> SessionConfig {
    SessionConfig {
        quiz_id,
        user_id: UserId::random(),
        device: DeviceInfo::new("Test PC", DeviceKind::Desktop),
        continuity: ContinuityConfig::default(),
    }
}

fn store_for(backend: &Arc<FakeBackend>, cache: &InMemoryCache) -> ProgressStore {
    ProgressStore::new(
        Arc::new(cache.clone()),
        Arc::new(cache.clone()),
        Arc::clone(backend) as Arc<dyn QuizBackend>,
    )
}

async fn answer_correctly(controller: &mut SessionController) {
    let question = controller.view().question.expect("active question");
    let right = question.answers().iter().position(|a| a.correct).unwrap();
    controller.toggle_answer(right);
    controller.next_action().await; // grade
    controller.next_action().await; // advance
}

async fn answer_wrong(controller: &mut SessionController) {
    let question = controller.view().question.expect("active question");
    let wrong = question.answers().iter().position(|a| !a.correct).unwrap();
    controller.toggle_answer(wrong);
    controller.next_action().await;
    controller.next_action().await;
}

#[tokio::test]
async fn all_correct_run_finishes_within_question_count() {
    let backend = Arc::new(FakeBackend::new(quiz(5), StudySettings::default()));
    let cache = InMemoryCache::new();
    let mut controller = SessionController::start(
        config(backend.quiz.id()),
        Arc::clone(&backend) as Arc<dyn QuizBackend>,
        store_for(&backend, &cache),
        None,
        Clock::Default,
    )
    .await
    .unwrap();

    // With initial_reoccurrences = 1, at most N correct gradings finish.
    for _ in 0..5 {
        if controller.view().is_finished() {
            break;
        }
        answer_correctly(&mut controller).await;
    }

    let view = controller.view();
    assert_eq!(view.phase, SessionPhase::Finished);
    assert_eq!(view.correct_count, 5);
    assert_eq!(view.wrong_count, 0);
}

#[tokio::test]
async fn wrong_answers_extend_the_session_but_it_still_ends() {
    let backend = Arc::new(FakeBackend::new(quiz(2), StudySettings::default()));
    let cache = InMemoryCache::new();
    let mut controller = SessionController::start(
        config(backend.quiz.id()),
        Arc::clone(&backend) as Arc<dyn QuizBackend>,
        store_for(&backend, &cache),
        None,
        Clock::Default,
    )
    .await
    .unwrap();

    answer_wrong(&mut controller).await;
    assert!(!controller.view().is_finished());

    for _ in 0..10 {
        if controller.view().is_finished() {
            break;
        }
        answer_correctly(&mut controller).await;
    }

    let view = controller.view();
    assert!(view.is_finished());
    assert_eq!(view.wrong_count, 1);
    // Every remaining counter drained to zero along the way.
    assert_eq!(view.mastered, view.total);
}

#[tokio::test]
async fn progress_survives_a_restart() {
    let backend = Arc::new(FakeBackend::new(quiz(3), StudySettings::default()));
    let cache = InMemoryCache::new();
    let quiz_id = backend.quiz.id();

    let mut first = SessionController::start(
        config(quiz_id),
        Arc::clone(&backend) as Arc<dyn QuizBackend>,
        store_for(&backend, &cache),
        None,
        Clock::Default,
    )
    .await
    .unwrap();
    answer_correctly(&mut first).await;
    let left_on = first.view().question.unwrap().id();
    drop(first);

    let second = SessionController::start(
        config(quiz_id),
        Arc::clone(&backend) as Arc<dyn QuizBackend>,
        store_for(&backend, &cache),
        None,
        Clock::Default,
    )
    .await
    .unwrap();

    let view = second.view();
    assert_eq!(view.question.unwrap().id(), left_on);
    assert_eq!(view.correct_count, 1);
    assert_eq!(view.mastered, 1);
}

#[tokio::test]
async fn remote_saves_only_happen_with_sync_enabled() {
    // Sync off: everything stays local.
    let backend = Arc::new(FakeBackend::new(quiz(3), StudySettings::default()));
    let cache = InMemoryCache::new();
    let mut controller = SessionController::start(
        config(backend.quiz.id()),
        Arc::clone(&backend) as Arc<dyn QuizBackend>,
        store_for(&backend, &cache),
        None,
        Clock::Default,
    )
    .await
    .unwrap();
    answer_correctly(&mut controller).await;
    assert_eq!(backend.remote_saves.load(Ordering::SeqCst), 0);

    // Sync on, no continuity transport: the device is alone, so it is the
    // write authority and the server copy is kept up to date.
    let settings = StudySettings {
        sync_progress: true,
        ..StudySettings::default()
    };
    let backend = Arc::new(FakeBackend::new(quiz(3), settings));
    let cache = InMemoryCache::new();
    let mut controller = SessionController::start(
        config(backend.quiz.id()),
        Arc::clone(&backend) as Arc<dyn QuizBackend>,
        store_for(&backend, &cache),
        None,
        Clock::Default,
    )
    .await
    .unwrap();
    answer_correctly(&mut controller).await;
    assert!(backend.remote_saves.load(Ordering::SeqCst) > 0);
    assert!(backend.remote_progress.lock().unwrap().is_some());
}

#[tokio::test]
async fn reset_clears_both_stores_and_restarts() {
    let settings = StudySettings {
        sync_progress: true,
        ..StudySettings::default()
    };
    let backend = Arc::new(FakeBackend::new(quiz(1), settings));
    let cache = InMemoryCache::new();
    let mut controller = SessionController::start(
        config(backend.quiz.id()),
        Arc::clone(&backend) as Arc<dyn QuizBackend>,
        store_for(&backend, &cache),
        None,
        Clock::Default,
    )
    .await
    .unwrap();

    answer_correctly(&mut controller).await;
    assert!(controller.view().is_finished());

    controller.reset_progress().await;
    let view = controller.view();
    assert!(!view.is_finished());
    assert_eq!(view.correct_count, 0);
    assert!(backend.remote_progress.lock().unwrap().is_none());
}
