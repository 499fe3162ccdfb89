use sqlx::PgPool;

use crate::db::models::Question;
use crate::db::types::ChoiceKey;

pub(crate) const COLUMNS: &str = "\
    id, exam_id, question_text, choice_a, choice_b, choice_c, choice_d, choice_e, \
    correct_key, created_at, updated_at";

/// Snapshot of the exam's bank: every question id, in storage order.
pub(crate) async fn list_ids_by_exam(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT id FROM questions WHERE exam_id = $1 ORDER BY id")
        .bind(exam_id)
        .fetch_all(executor)
        .await
}

pub(crate) async fn list_by_ids(
    pool: &PgPool,
    ids: &[String],
) -> Result<Vec<Question>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, Question>(&format!("SELECT {COLUMNS} FROM questions WHERE id = ANY($1)"))
        .bind(ids)
        .fetch_all(pool)
        .await
}

pub(crate) async fn find_correct_key(
    executor: impl sqlx::PgExecutor<'_>,
    question_id: &str,
) -> Result<Option<ChoiceKey>, sqlx::Error> {
    sqlx::query_scalar::<_, ChoiceKey>("SELECT correct_key FROM questions WHERE id = $1")
        .bind(question_id)
        .fetch_optional(executor)
        .await
}

pub(crate) struct CreateQuestion<'a> {
    pub id: &'a str,
    pub exam_id: &'a str,
    pub question_text: &'a str,
    pub choices: [&'a str; 5],
    pub correct_key: ChoiceKey,
    pub now: time::PrimitiveDateTime,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateQuestion<'_>,
) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (
            id, exam_id, question_text, choice_a, choice_b, choice_c, choice_d, choice_e,
            correct_key, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$10)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.exam_id)
    .bind(params.question_text)
    .bind(params.choices[0])
    .bind(params.choices[1])
    .bind(params.choices[2])
    .bind(params.choices[3])
    .bind(params.choices[4])
    .bind(params.correct_key)
    .bind(params.now)
    .fetch_one(pool)
    .await
}
