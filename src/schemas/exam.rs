use serde::Serialize;

use crate::core::time::format_primitive;
use crate::db::models::{Exam, Question};
use crate::db::types::ChoiceKey;

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) category_id: String,
    pub(crate) duration_minutes: i32,
    pub(crate) question_count: i32,
    pub(crate) total_questions: i64,
    pub(crate) created_at: String,
}

impl ExamResponse {
    pub(crate) fn from_db(exam: Exam, total_questions: i64) -> Self {
        Self {
            id: exam.id,
            title: exam.title,
            description: exam.description,
            category_id: exam.category_id,
            duration_minutes: exam.duration_minutes,
            question_count: exam.question_count,
            total_questions,
            created_at: format_primitive(exam.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChoiceEntry {
    pub(crate) key: &'static str,
    pub(crate) text: String,
}

/// Student-facing question projection; the correct key is never exposed.
#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) question_text: String,
    pub(crate) choices: Vec<ChoiceEntry>,
}

impl QuestionResponse {
    pub(crate) fn from_db(question: Question) -> Self {
        let choices = [ChoiceKey::A, ChoiceKey::B, ChoiceKey::C, ChoiceKey::D, ChoiceKey::E]
            .into_iter()
            .map(|key| ChoiceEntry { key: key.as_str(), text: question.choice_text(key).to_string() })
            .collect();

        Self { id: question.id, question_text: question.question_text, choices }
    }
}
