//! Next-question selection over the reoccurrence counter set.

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::model::{Question, Quiz};
use crate::reoccurrence::ReoccurrenceTracker;

/// Outcome of a selection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The next question to display, with answers freshly shuffled.
    Question(Question),
    /// Every tracked question is mastered; the session is done.
    Finished,
}

impl Selection {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, Selection::Finished)
    }
}

/// Pick the next question uniformly at random among unmastered ones.
///
/// Deliberately uniform over all eligible ids rather than weighted by
/// remaining count. Entries referencing questions absent from the current
/// quiz content are not selectable; if nothing is selectable the session is
/// `Finished`. The returned question carries a fresh answer shuffle.
#[must_use]
pub fn pick<R: Rng + ?Sized>(
    tracker: &ReoccurrenceTracker,
    quiz: &Quiz,
    rng: &mut R,
) -> Selection {
    let eligible: Vec<&Question> = tracker
        .entries()
        .iter()
        .filter(|e| !e.is_mastered())
        .filter_map(|e| quiz.question(e.question_id))
        .collect();

    match eligible.choose(rng) {
        Some(question) => Selection::Question(question.shuffled(rng)),
        None => Selection::Finished,
    }
}

/// [`pick`] using the thread-local RNG.
#[must_use]
pub fn pick_default(tracker: &ReoccurrenceTracker, quiz: &Quiz) -> Selection {
    pick(tracker, quiz, &mut rand::rng())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Answer, Question, QuestionId, QuizId};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn quiz(raw: &[u64]) -> Quiz {
        let questions = raw
            .iter()
            .map(|&id| {
                Question::new(
                    QuestionId::new(id),
                    format!("Q{id}"),
                    false,
                    vec![
                        Answer::new("a", true),
                        Answer::new("b", false),
                        Answer::new("c", false),
                    ],
                )
                .unwrap()
            })
            .collect();
        Quiz::new(QuizId::random(), "T", 1, questions)
    }

    #[test]
    fn picks_only_unmastered_questions() {
        let quiz = quiz(&[1, 2, 3]);
        let mut tracker = ReoccurrenceTracker::initialize(quiz.question_ids(), 1);
        tracker.record(QuestionId::new(1), true, 1);
        tracker.record(QuestionId::new(3), true, 1);

        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            match pick(&tracker, &quiz, &mut rng) {
                Selection::Question(q) => assert_eq!(q.id(), QuestionId::new(2)),
                Selection::Finished => panic!("question 2 still has repetitions left"),
            }
        }
    }

    #[test]
    fn every_eligible_question_is_reachable() {
        let quiz = quiz(&[1, 2, 3]);
        let tracker = ReoccurrenceTracker::initialize(quiz.question_ids(), 1);

        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            if let Selection::Question(q) = pick(&tracker, &quiz, &mut rng) {
                seen.insert(q.id());
            }
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn finished_when_exhausted() {
        let quiz = quiz(&[1, 2]);
        let mut tracker = ReoccurrenceTracker::initialize(quiz.question_ids(), 1);
        tracker.record(QuestionId::new(1), true, 1);
        tracker.record(QuestionId::new(2), true, 1);

        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick(&tracker, &quiz, &mut rng), Selection::Finished);
    }

    #[test]
    fn stale_entries_are_not_selectable() {
        // Tracker still references question 9, which the quiz no longer has.
        let quiz = quiz(&[1]);
        let mut tracker = ReoccurrenceTracker::initialize(vec![QuestionId::new(9)], 1);

        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick(&tracker, &quiz, &mut rng), Selection::Finished);

        // Once a real question is tracked it wins.
        tracker.reconcile(&quiz, 1);
        assert!(matches!(
            pick(&tracker, &quiz, &mut rng),
            Selection::Question(q) if q.id() == QuestionId::new(1)
        ));
    }

    #[test]
    fn pick_shuffles_answers_freshly() {
        let quiz = quiz(&[1]);
        let tracker = ReoccurrenceTracker::initialize(quiz.question_ids(), 1);

        let mut rng = StdRng::seed_from_u64(42);
        let mut orders = HashSet::new();
        for _ in 0..50 {
            if let Selection::Question(q) = pick(&tracker, &quiz, &mut rng) {
                let order: Vec<String> =
                    q.answers().iter().map(|a| a.text.clone()).collect();
                orders.insert(order);
                // Exactly one correct answer survives the shuffle.
                assert_eq!(q.answers().iter().filter(|a| a.correct).count(), 1);
            }
        }
        assert!(orders.len() > 1, "expected more than one answer order");
    }
}
