#![forbid(unsafe_code)]

pub mod error;
pub mod model;
pub mod reoccurrence;
pub mod selector;
pub mod time;

pub use error::Error;
pub use model::{
    Answer, Question, QuestionError, QuestionId, Quiz, QuizId, SessionProgress, StudySettings,
    UserId,
};
pub use reoccurrence::{ReoccurrenceEntry, ReoccurrenceTracker};
pub use selector::Selection;
pub use time::{Clock, StudyTimer};
