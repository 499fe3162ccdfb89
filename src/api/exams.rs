use axum::extract::{Path, Query, State};
use axum::{routing::get, Json, Router};
use serde::Deserialize;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::exam::ExamResponse;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/", get(list_exams)).route("/:exam_id", get(get_exam))
}

#[derive(Debug, Deserialize)]
struct ListExamsQuery {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    grade_level: Option<String>,
}

/// Lists exams for a category and grade level. Both filters are required;
/// without them there is nothing sensible to offer, so the list is empty.
async fn list_exams(
    Query(query): Query<ListExamsQuery>,
    CurrentUser(_user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ExamResponse>>, ApiError> {
    let (Some(category), Some(grade_level)) = (query.category, query.grade_level) else {
        return Ok(Json(Vec::new()));
    };

    let exams =
        repositories::exams::list_by_category_and_grade(state.db(), &category, &grade_level)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list exams"))?;

    let mut items = Vec::with_capacity(exams.len());
    for exam in exams {
        let total = repositories::exams::count_questions(state.db(), &exam.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to count questions"))?;
        items.push(ExamResponse::from_db(exam, total));
    }

    Ok(Json(items))
}

async fn get_exam(
    Path(exam_id): Path<String>,
    CurrentUser(_user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = repositories::exams::find_by_id(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;

    let total = repositories::exams::count_questions(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count questions"))?;

    Ok(Json(ExamResponse::from_db(exam, total)))
}
