use sqlx::PgPool;

use crate::db::models::Answer;
use crate::db::types::ChoiceKey;

pub(crate) const COLUMNS: &str = "\
    id, attempt_id, user_id, question_id, selected_key, created_at, updated_at";

pub(crate) struct UpsertAnswer<'a> {
    pub(crate) id: &'a str,
    pub(crate) attempt_id: &'a str,
    pub(crate) user_id: &'a str,
    pub(crate) question_id: &'a str,
    pub(crate) selected_key: ChoiceKey,
    pub(crate) now: time::PrimitiveDateTime,
}

/// Inserts or overwrites the answer for (attempt, question). The unique
/// constraint guarantees concurrent duplicate submissions collapse to one row.
pub(crate) async fn upsert(
    executor: impl sqlx::PgExecutor<'_>,
    params: UpsertAnswer<'_>,
) -> Result<Answer, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!(
        "INSERT INTO answers (
            id, attempt_id, user_id, question_id, selected_key, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$6)
        ON CONFLICT (attempt_id, question_id)
        DO UPDATE SET selected_key = EXCLUDED.selected_key, updated_at = EXCLUDED.updated_at
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.attempt_id)
    .bind(params.user_id)
    .bind(params.question_id)
    .bind(params.selected_key)
    .bind(params.now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_by_attempt(
    pool: &PgPool,
    attempt_id: &str,
) -> Result<Vec<Answer>, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!(
        "SELECT {COLUMNS} FROM answers WHERE attempt_id = $1 ORDER BY created_at"
    ))
    .bind(attempt_id)
    .fetch_all(pool)
    .await
}

/// Derived score: how many recorded answers currently match their question's
/// correct key. Recomputed on every upsert so resubmissions never double-count.
pub(crate) async fn count_correct(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*)
         FROM answers a
         JOIN questions q ON q.id = a.question_id
         WHERE a.attempt_id = $1 AND a.selected_key = q.correct_key",
    )
    .bind(attempt_id)
    .fetch_one(executor)
    .await
}
