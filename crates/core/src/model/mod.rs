mod ids;
mod progress;
mod quiz;
mod settings;

pub use ids::{ParseIdError, QuestionId, QuizId, UserId};
pub use progress::SessionProgress;
pub use quiz::{Answer, Question, QuestionError, Quiz};
pub use settings::StudySettings;
