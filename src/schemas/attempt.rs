use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Answer, Attempt};
use crate::db::types::ChoiceKey;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct StartAttemptRequest {
    #[serde(alias = "examId")]
    #[validate(length(min = 1, message = "exam_id must not be empty"))]
    pub(crate) exam_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubmitAnswerRequest {
    #[serde(alias = "questionId")]
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    /// Validated against the closed alphabet by the recorder, not here.
    #[serde(alias = "selectedKey")]
    pub(crate) selected_key: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) started_at: String,
    pub(crate) ended_at: Option<String>,
    pub(crate) score: i32,
    /// Size of the fixed question set; None until the order is computed.
    pub(crate) total_questions: Option<usize>,
}

impl AttemptResponse {
    pub(crate) fn from_db(attempt: Attempt) -> Self {
        Self {
            id: attempt.id,
            exam_id: attempt.exam_id,
            attempt_number: attempt.attempt_number,
            started_at: format_primitive(attempt.started_at),
            ended_at: attempt.ended_at.map(format_primitive),
            score: attempt.score,
            total_questions: attempt.question_order.map(|order| order.0.len()),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResponse {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) selected_key: ChoiceKey,
    pub(crate) is_correct: bool,
}

impl AnswerResponse {
    pub(crate) fn from_db(answer: Answer, correct_keys: &HashMap<String, ChoiceKey>) -> Self {
        let is_correct =
            correct_keys.get(&answer.question_id).is_some_and(|key| *key == answer.selected_key);

        Self {
            id: answer.id,
            question_id: answer.question_id,
            selected_key: answer.selected_key,
            is_correct,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptDetailResponse {
    #[serde(flatten)]
    pub(crate) attempt: AttemptResponse,
    pub(crate) answers: Vec<AnswerResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResultResponse {
    pub(crate) answer: AnswerResponse,
    pub(crate) is_correct: bool,
    pub(crate) score: i32,
}
