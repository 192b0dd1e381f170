use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{QuestionId, QuizId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt must not be empty")]
    EmptyPrompt,

    #[error("question must have at least one answer")]
    NoAnswers,

    #[error("question must have at least one correct answer")]
    NoCorrectAnswer,
}

/// One selectable answer of a question.
///
/// The serialized shape matches the server payload and the continuity wire
/// format: the answer text travels under the `answer` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(rename = "answer")]
    pub text: String,
    pub correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Answer {
    #[must_use]
    pub fn new(text: impl Into<String>, correct: bool) -> Self {
        Self {
            text: text.into(),
            correct,
            image: None,
        }
    }
}

/// A single quiz question with its ordered answer list.
///
/// Answers are stored in display order. Selection indices used for grading
/// always refer to the order of `answers()` on the instance being graded,
/// so a shuffled copy produced by [`Question::shuffled`] grades correctly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    #[serde(rename = "question")]
    prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    multiple: bool,
    answers: Vec<Answer>,
}

impl Question {
    /// Create a validated question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt is empty, the answer list is
    /// empty, or no answer is marked correct.
    pub fn new(
        id: QuestionId,
        prompt: impl Into<String>,
        multiple: bool,
        answers: Vec<Answer>,
    ) -> Result<Self, QuestionError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        if answers.is_empty() {
            return Err(QuestionError::NoAnswers);
        }
        if !answers.iter().any(|a| a.correct) {
            return Err(QuestionError::NoCorrectAnswer);
        }

        Ok(Self {
            id,
            prompt,
            explanation: None,
            image: None,
            multiple,
            answers,
        })
    }

    /// Attach an explanation shown after grading.
    #[must_use]
    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    /// Whether more than one answer may be selected.
    #[must_use]
    pub fn multiple(&self) -> bool {
        self.multiple
    }

    #[must_use]
    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    /// Indices of the correct answers in display order.
    #[must_use]
    pub fn correct_indices(&self) -> Vec<usize> {
        self.answers
            .iter()
            .enumerate()
            .filter_map(|(idx, a)| a.correct.then_some(idx))
            .collect()
    }

    /// Grade a selection of display indices.
    ///
    /// A selection is correct iff every correct answer is selected and no
    /// incorrect answer is.
    #[must_use]
    pub fn is_correct_selection(&self, selected: &[usize]) -> bool {
        let correct = self.correct_indices();
        correct.len() == selected.len() && correct.iter().all(|idx| selected.contains(idx))
    }

    /// A display copy with the answers permuted in random order.
    ///
    /// Each answer keeps its `correct` flag and identity; only the position
    /// changes, so grading against the returned instance stays valid.
    #[must_use]
    pub fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let mut copy = self.clone();
        copy.answers.shuffle(rng);
        copy
    }
}

/// An immutable (per session) collection of questions.
///
/// `version` increases monotonically on the server whenever quiz content
/// changes; the client compares it against a locally cached last-seen value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    id: QuizId,
    title: String,
    version: i64,
    questions: Vec<Question>,
}

impl Quiz {
    #[must_use]
    pub fn new(id: QuizId, title: impl Into<String>, version: i64, questions: Vec<Question>) -> Self {
        Self {
            id,
            title: title.into(),
            version,
            questions,
        }
    }

    #[must_use]
    pub fn id(&self) -> QuizId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Look up a question by id.
    #[must_use]
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id() == id)
    }

    /// Ids of all questions, in content order.
    #[must_use]
    pub fn question_ids(&self) -> Vec<QuestionId> {
        self.questions.iter().map(Question::id).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}
