use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{routing::get, routing::post, Json, Router};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::pagination::PaginatedResponse;
use crate::core::state::AppState;
use crate::db::models::{Attempt, User};
use crate::db::types::ChoiceKey;
use crate::repositories;
use crate::schemas::attempt::{
    AnswerResponse, AnswerResultResponse, AttemptDetailResponse, AttemptResponse,
    StartAttemptRequest, SubmitAnswerRequest,
};
use crate::schemas::exam::QuestionResponse;
use crate::services::attempts::{self, AttemptError};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_attempts))
        .route("/start", post(start_attempt))
        .route("/current", get(current_attempt))
        .route("/:attempt_id", get(get_attempt))
        .route("/:attempt_id/questions", get(get_questions))
        .route("/:attempt_id/answers", post(submit_answer))
        .route("/:attempt_id/finish", post(finish_attempt))
}

#[derive(Debug, Deserialize)]
struct ListAttemptsQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    limit: i64,
}

async fn start_attempt(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<StartAttemptRequest>,
) -> Result<(StatusCode, Json<AttemptResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let attempt = attempts::start_attempt(state.db(), &user.id, &payload.exam_id)
        .await
        .map_err(attempt_error)?;

    tracing::info!(
        attempt_id = %attempt.id,
        exam_id = %attempt.exam_id,
        attempt_number = attempt.attempt_number,
        "Attempt started"
    );

    Ok((StatusCode::CREATED, Json(AttemptResponse::from_db(attempt))))
}

async fn list_attempts(
    Query(query): Query<ListAttemptsQuery>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<AttemptResponse>>, ApiError> {
    let items = repositories::attempts::list_by_user(state.db(), &user.id, query.skip, query.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list attempts"))?
        .into_iter()
        .map(AttemptResponse::from_db)
        .collect();

    let total_count = repositories::attempts::count_by_user(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count attempts"))?;

    Ok(Json(PaginatedResponse { items, total_count, skip: query.skip, limit: query.limit }))
}

async fn current_attempt(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt = repositories::attempts::find_active_for_user(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load active attempt"))?
        .ok_or_else(|| ApiError::NotFound("No active attempt found".to_string()))?;

    Ok(Json(AttemptResponse::from_db(attempt)))
}

async fn get_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptDetailResponse>, ApiError> {
    let attempt = fetch_owned_attempt(&state, &user, &attempt_id).await?;

    let answers = repositories::answers::list_by_attempt(state.db(), &attempt.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list answers"))?;

    let question_ids: Vec<String> =
        answers.iter().map(|answer| answer.question_id.clone()).collect();
    let correct_keys: HashMap<String, ChoiceKey> =
        repositories::questions::list_by_ids(state.db(), &question_ids)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load questions"))?
            .into_iter()
            .map(|question| (question.id, question.correct_key))
            .collect();

    let answers = answers
        .into_iter()
        .map(|answer| AnswerResponse::from_db(answer, &correct_keys))
        .collect();

    Ok(Json(AttemptDetailResponse { attempt: AttemptResponse::from_db(attempt), answers }))
}

/// First read of the attempt's questions triggers the one-time selection;
/// later reads return the same order.
async fn get_questions(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<QuestionResponse>>, ApiError> {
    let attempt = fetch_owned_attempt(&state, &user, &attempt_id).await?;

    let mut rng = StdRng::from_entropy();
    let questions = attempts::ordered_questions(state.db(), &attempt, &mut rng)
        .await
        .map_err(attempt_error)?;

    Ok(Json(questions.into_iter().map(QuestionResponse::from_db).collect()))
}

async fn submit_answer(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<AnswerResultResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let attempt = fetch_owned_attempt(&state, &user, &attempt_id).await?;

    let mut rng = StdRng::from_entropy();
    let outcome = attempts::record_answer(
        state.db(),
        &attempt,
        &payload.question_id,
        &payload.selected_key,
        &mut rng,
    )
    .await
    .map_err(attempt_error)?;

    let answer = AnswerResponse {
        id: outcome.answer.id,
        question_id: outcome.answer.question_id,
        selected_key: outcome.answer.selected_key,
        is_correct: outcome.is_correct,
    };

    Ok(Json(AnswerResultResponse { answer, is_correct: outcome.is_correct, score: outcome.score }))
}

async fn finish_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt = fetch_owned_attempt(&state, &user, &attempt_id).await?;

    let finished = attempts::finish_attempt(state.db(), &attempt).await.map_err(attempt_error)?;

    tracing::info!(attempt_id = %finished.id, score = finished.score, "Attempt finished");
    Ok(Json(AttemptResponse::from_db(finished)))
}

/// Attempts are private to their owner; foreign ids read as missing.
async fn fetch_owned_attempt(
    state: &AppState,
    user: &User,
    attempt_id: &str,
) -> Result<Attempt, ApiError> {
    let attempt = repositories::attempts::find_by_id(state.db(), attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load attempt"))?;

    match attempt {
        Some(attempt) if attempt.user_id == user.id => Ok(attempt),
        _ => Err(ApiError::NotFound("Attempt not found".to_string())),
    }
}

fn attempt_error(err: AttemptError) -> ApiError {
    match err {
        AttemptError::Conflict => {
            ApiError::Conflict("An active attempt already exists for this exam".to_string())
        }
        AttemptError::Closed => ApiError::Conflict("Attempt is already finished".to_string()),
        AttemptError::InvalidQuestion => {
            ApiError::UnprocessableEntity("Question is not part of this attempt".to_string())
        }
        AttemptError::InvalidChoice => {
            ApiError::UnprocessableEntity("Selected key is not a valid choice".to_string())
        }
        AttemptError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
        AttemptError::Inconsistent => {
            ApiError::Internal("Attempt state is inconsistent".to_string())
        }
        AttemptError::Db(err) => ApiError::internal(err, "Attempt storage error"),
    }
}

#[cfg(test)]
mod tests;
