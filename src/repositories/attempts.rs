use sqlx::PgPool;

use crate::db::models::Attempt;

pub(crate) const COLUMNS: &str = "\
    id, user_id, exam_id, attempt_number, question_order, started_at, ended_at, \
    score, created_at, updated_at";

pub(crate) struct CreateAttempt<'a> {
    pub(crate) id: &'a str,
    pub(crate) user_id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) attempt_number: i32,
    pub(crate) started_at: time::PrimitiveDateTime,
    pub(crate) created_at: time::PrimitiveDateTime,
    pub(crate) updated_at: time::PrimitiveDateTime,
}

/// Inserts a new attempt. Returns false when the partial unique index on
/// (user_id, exam_id) WHERE ended_at IS NULL rejects it, i.e. an active
/// attempt already exists.
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    attempt: CreateAttempt<'_>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO attempts (
            id, user_id, exam_id, attempt_number, started_at, score, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,0,$6,$7)
        ON CONFLICT (user_id, exam_id) WHERE ended_at IS NULL DO NOTHING",
    )
    .bind(attempt.id)
    .bind(attempt.user_id)
    .bind(attempt.exam_id)
    .bind(attempt.attempt_number)
    .bind(attempt.started_at)
    .bind(attempt.created_at)
    .bind(attempt.updated_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Serializes concurrent start requests for the same (user, exam) pair
/// within the enclosing transaction.
pub(crate) async fn acquire_user_exam_lock(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    exam_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1 || ':' || $2))")
        .bind(user_id)
        .bind(exam_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!("SELECT {COLUMNS} FROM attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) async fn fetch_one_by_id(pool: &PgPool, id: &str) -> Result<Attempt, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!("SELECT {COLUMNS} FROM attempts WHERE id = $1"))
        .bind(id)
        .fetch_one(pool)
        .await
}

pub(crate) async fn find_active_for_user(
    pool: &PgPool,
    user_id: &str,
) -> Result<Option<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts \
         WHERE user_id = $1 AND ended_at IS NULL \
         ORDER BY started_at DESC LIMIT 1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn count_by_user_and_exam(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    exam_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM attempts WHERE user_id = $1 AND exam_id = $2")
        .bind(user_id)
        .bind(exam_id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn list_by_user(
    pool: &PgPool,
    user_id: &str,
    skip: i64,
    limit: i64,
) -> Result<Vec<Attempt>, sqlx::Error> {
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {COLUMNS} FROM attempts WHERE user_id = $1 \
         ORDER BY started_at DESC OFFSET $2 LIMIT $3"
    ))
    .bind(user_id)
    .bind(skip.max(0))
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_by_user(pool: &PgPool, user_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM attempts WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

/// Locks the attempt row for the rest of the transaction and reports whether
/// it is still active. Serializes answer recording against a concurrent
/// finish: once `ended_at` is committed, this reads false.
pub(crate) async fn lock_is_active(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<bool>, sqlx::Error> {
    sqlx::query_scalar("SELECT ended_at IS NULL FROM attempts WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Persists the presentation order, but only if none was stored yet.
/// Returns false when a concurrent writer won; callers must re-read.
pub(crate) async fn set_question_order(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    order: &[String],
    now: time::PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE attempts SET question_order = $2, updated_at = $3 \
         WHERE id = $1 AND question_order IS NULL",
    )
    .bind(id)
    .bind(sqlx::types::Json(order))
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn update_score(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    score: i32,
    now: time::PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE attempts SET score = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(score)
        .bind(now)
        .execute(executor)
        .await?;
    Ok(())
}

/// Marks the attempt terminal; a no-op for attempts that already ended.
pub(crate) async fn finish(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: time::PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE attempts SET ended_at = $2, updated_at = $2 \
         WHERE id = $1 AND ended_at IS NULL",
    )
    .bind(id)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}
