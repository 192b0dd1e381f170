//! Mesh-level tests: election, initial sync, star relay, self-healing and
//! liveness, run on the in-process transport with paused time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use quiz_core::model::{Answer, Question, QuestionId, QuizId, SessionProgress, StudySettings, UserId};
use services::api::QuizBackend;
use services::continuity::{
    ContinuityConfig, ContinuityRole, DeviceInfo, DeviceKind, MemoryTransport, PeerMessage,
    RendezvousId, Transport,
};
use services::error::ApiError;
use services::progress_store::ProgressStore;
use services::session::{SessionConfig, SessionController, SessionEvent};
use services::Clock;
use storage::repository::InMemoryCache;

struct FakeBackend {
    quiz: quiz_core::Quiz,
    settings: StudySettings,
    remote_progress: Mutex<Option<SessionProgress>>,
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
            Answer::new("also wrong", false),
        ],
    )
    .unwrap()
}

fn backend() -> Arc<FakeBackend> {
    Arc::new(FakeBackend {
        quiz: quiz_core::Quiz::new(
            QuizId::random(),
            "Mesh quiz",
            1,
            vec![question(1), question(2), question(3)],
        ),
        settings: StudySettings {
            sync_progress: true,
            initial_reoccurrences: 1,
            wrong_answer_reoccurrences: 1,
        },
        remote_progress: Mutex::new(None),
    })
}

fn device(label: &str) -> DeviceInfo {
    DeviceInfo::new(label, DeviceKind::Desktop)
}

async fn start_device(
    backend: &Arc<FakeBackend>,
    transport: &MemoryTransport,
    user_id: UserId,
    label: &str,
) -> SessionController {
    let cache = InMemoryCache::new();
    let store = ProgressStore::new(
        Arc::new(cache.clone()),
        Arc::new(cache),
        Arc::clone(backend) as Arc<dyn QuizBackend>,
    );
    SessionController::start(
        SessionConfig {
            quiz_id: backend.quiz.id(),
            user_id,
            device: device(label),
            continuity: ContinuityConfig::default(),
        },
        Arc::clone(backend) as Arc<dyn QuizBackend>,
        store,
        Some(Arc::new(transport.clone()) as Arc<dyn Transport>),
        Clock::Default,
    )
    .await
    .unwrap()
}

/// Pump every controller until `predicate` holds, collecting events per
/// controller. Panics when the mesh does not settle.
async fn settle_until(
    controllers: &mut [&mut SessionController],
    events: &mut Vec<Vec<SessionEvent>>,
    predicate: impl Fn(&[&mut SessionController]) -> bool,
) {
    events.resize(controllers.len(), Vec::new());
    // Paused-time friendly: each iteration advances ~100ms of virtual time,
    // enough to cover a full ping interval + probe timeout within the loop.
    for _ in 0..600 {
        for (i, controller) in controllers.iter_mut().enumerate() {
            events[i].extend(controller.pump_events().await);
        }
        if predicate(controllers) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("mesh did not settle");
}

fn role_of(controller: &SessionController) -> Option<ContinuityRole> {
    controller.view().continuity.map(|s| s.role)
}

#[tokio::test(start_paused = true)]
async fn first_device_claims_leadership() {
    let backend = backend();
    let transport = MemoryTransport::new();
    let mut a = start_device(&backend, &transport, UserId::random(), "Laptop").await;

    let mut events = Vec::new();
    settle_until(&mut [&mut a], &mut events, |cs| {
        role_of(&*cs[0]) == Some(ContinuityRole::Leader)
    })
    .await;

    a.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn new_follower_receives_initial_sync() {
    let backend = backend();
    let transport = MemoryTransport::new();
    let user = UserId::random();

    let mut a = start_device(&backend, &transport, user, "Laptop").await;
    let mut events = Vec::new();
    settle_until(&mut [&mut a], &mut events, |cs| {
        role_of(&*cs[0]) == Some(ContinuityRole::Leader)
    })
    .await;

    // Put the leader in a non-trivial state before the phone joins.
    let question = a.view().question.unwrap();
    let right = question.answers().iter().position(|x| x.correct).unwrap();
    a.toggle_answer(right);
    a.next_action().await;
    a.next_action().await;
    assert_eq!(a.view().correct_count, 1);

    let mut b = start_device(&backend, &transport, user, "Phone").await;
    let mut events = Vec::new();
    settle_until(&mut [&mut a, &mut b], &mut events, |cs| {
        role_of(&*cs[1]) == Some(ContinuityRole::Follower)
            && cs[1].view().question == cs[0].view().question
            && cs[1].view().correct_count == 1
    })
    .await;

    // Leader sees the phone in its peer list; both toast a connection.
    let status = a.view().continuity.unwrap();
    assert_eq!(status.link_count, 1);
    assert_eq!(status.peers[0].label, "Phone");
    assert!(events[0]
        .iter()
        .any(|e| matches!(e, SessionEvent::PeerConnected { device: Some(d) } if d.label == "Phone")));
    assert!(events[1]
        .iter()
        .any(|e| matches!(e, SessionEvent::PeerConnected { device: None })));

    a.teardown().await;
    b.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn follower_update_reaches_other_follower_without_echo() {
    let backend = backend();
    let transport = MemoryTransport::new();
    let user = UserId::random();

    let mut a = start_device(&backend, &transport, user, "Laptop").await;
    let mut events = Vec::new();
    settle_until(&mut [&mut a], &mut events, |cs| {
        role_of(&*cs[0]) == Some(ContinuityRole::Leader)
    })
    .await;

    let mut b = start_device(&backend, &transport, user, "Phone").await;
    let mut c = start_device(&backend, &transport, user, "Tablet").await;
    let mut events = Vec::new();
    settle_until(&mut [&mut a, &mut b, &mut c], &mut events, |cs| {
        cs[0].view().continuity.unwrap().link_count == 2
            && cs[1].view().question == cs[0].view().question
            && cs[2].view().question == cs[0].view().question
    })
    .await;

    // A selection change on follower B must reach leader A and follower C.
    b.toggle_answer(1);
    let mut events = Vec::new();
    settle_until(&mut [&mut a, &mut b, &mut c], &mut events, |cs| {
        cs[0].view().selection == vec![1] && cs[2].view().selection == vec![1]
    })
    .await;

    // ...but must never be echoed back to B itself.
    assert!(
        !events[1]
            .iter()
            .any(|e| matches!(e, SessionEvent::StateChanged)),
        "follower B saw its own update echoed back"
    );
    assert_eq!(b.view().selection, vec![1]);

    a.teardown().await;
    b.teardown().await;
    c.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn follower_takes_over_when_leader_dies() {
    let backend = backend();
    let transport = MemoryTransport::new();
    let user = UserId::random();

    let mut a = start_device(&backend, &transport, user, "Laptop").await;
    let mut events = Vec::new();
    settle_until(&mut [&mut a], &mut events, |cs| {
        role_of(&*cs[0]) == Some(ContinuityRole::Leader)
    })
    .await;

    let mut b = start_device(&backend, &transport, user, "Phone").await;
    let mut events = Vec::new();
    settle_until(&mut [&mut a, &mut b], &mut events, |cs| {
        role_of(&*cs[1]) == Some(ContinuityRole::Follower)
    })
    .await;

    // The laptop goes away; the phone must detect it and win the re-claim.
    a.teardown().await;

    let mut events = Vec::new();
    settle_until(&mut [&mut b], &mut events, |cs| {
        role_of(&*cs[0]) == Some(ContinuityRole::Leader)
    })
    .await;
    assert!(events[0]
        .iter()
        .any(|e| matches!(e, SessionEvent::PeerDisconnected)));

    // The mesh is functional again: a new device joins the new leader.
    let mut c = start_device(&backend, &transport, user, "Tablet").await;
    let mut events = Vec::new();
    settle_until(&mut [&mut b, &mut c], &mut events, |cs| {
        role_of(&*cs[1]) == Some(ContinuityRole::Follower)
            && cs[0].view().continuity.unwrap().link_count == 1
    })
    .await;

    b.teardown().await;
    c.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn silent_peer_is_force_closed_after_probe_timeout() {
    let backend = backend();
    let transport = MemoryTransport::new();
    let user = UserId::random();

    let mut a = start_device(&backend, &transport, user, "Laptop").await;
    let mut events = Vec::new();
    settle_until(&mut [&mut a], &mut events, |cs| {
        role_of(&*cs[0]) == Some(ContinuityRole::Leader)
    })
    .await;

    // A peer that completes the transport handshake but never answers pings.
    let identity = RendezvousId::derive(backend.quiz.id(), user);
    let ghost = transport.connect(&identity, device("Ghost")).await.unwrap();
    let (_ghost_tx, mut ghost_rx) = ghost.split();

    let mut events = Vec::new();
    settle_until(&mut [&mut a], &mut events, |cs| {
        cs[0].view().continuity.unwrap().link_count == 1
    })
    .await;

    // The ghost got the full bootstrap the moment its link came up.
    assert!(matches!(
        ghost_rx.recv().await,
        Some(PeerMessage::InitialSync { .. })
    ));
    assert!(matches!(
        ghost_rx.recv().await,
        Some(PeerMessage::QuestionUpdate { .. })
    ));

    // No pong ever comes back, so the probe deadline closes the link.
    let mut events = Vec::new();
    settle_until(&mut [&mut a], &mut events, |cs| {
        cs[0].view().continuity.unwrap().link_count == 0
    })
    .await;
    assert!(events[0]
        .iter()
        .any(|e| matches!(e, SessionEvent::PeerDisconnected)));

    a.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn leader_applies_and_relays_answer_checked_once() {
    let backend = backend();
    let transport = MemoryTransport::new();
    let user = UserId::random();

    let mut a = start_device(&backend, &transport, user, "Laptop").await;
    let mut events = Vec::new();
    settle_until(&mut [&mut a], &mut events, |cs| {
        role_of(&*cs[0]) == Some(ContinuityRole::Leader)
    })
    .await;

    let mut b = start_device(&backend, &transport, user, "Phone").await;
    let mut c = start_device(&backend, &transport, user, "Tablet").await;
    let mut events = Vec::new();
    settle_until(&mut [&mut a, &mut b, &mut c], &mut events, |cs| {
        cs[0].view().continuity.unwrap().link_count == 2
            && cs[1].view().question == cs[0].view().question
            && cs[2].view().question == cs[0].view().question
    })
    .await;

    // B selects the right answer and grades; everyone must count it once.
    let question = b.view().question.unwrap();
    let right = question.answers().iter().position(|x| x.correct).unwrap();
    b.toggle_answer(right);
    b.next_action().await;

    let mut events = Vec::new();
    settle_until(&mut [&mut a, &mut b, &mut c], &mut events, |cs| {
        cs.iter().all(|ctrl| {
            let view = ctrl.view();
            view.is_checked() && view.correct_count == 1 && view.wrong_count == 0
        })
    })
    .await;

    a.teardown().await;
    b.teardown().await;
    c.teardown().await;
}
