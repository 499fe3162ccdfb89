use rand::Rng;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::db::models::{Answer, Attempt, Question};
use crate::db::types::ChoiceKey;
use crate::repositories;
use crate::services::selection;

use crate::core::time::primitive_now_utc;

/// Failures of the attempt subsystem, surfaced as typed results at the core
/// boundary. None are retried here; mapping to transport codes happens in the
/// API layer.
#[derive(Debug, Error)]
pub(crate) enum AttemptError {
    #[error("an active attempt already exists for this exam")]
    Conflict,
    #[error("attempt is already finished")]
    Closed,
    #[error("question is not part of this attempt")]
    InvalidQuestion,
    #[error("selected key is not a valid choice")]
    InvalidChoice,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("attempt state is inconsistent")]
    Inconsistent,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[derive(Debug)]
pub(crate) struct AnswerOutcome {
    pub(crate) answer: Answer,
    pub(crate) is_correct: bool,
    pub(crate) score: i32,
}

/// Creates a new attempt for (user, exam). Fails with `Conflict` while a
/// non-terminal attempt for the same pair exists; the check-then-insert is
/// serialized by an advisory lock and backed by the partial unique index.
pub(crate) async fn start_attempt(
    pool: &PgPool,
    user_id: &str,
    exam_id: &str,
) -> Result<Attempt, AttemptError> {
    if repositories::exams::find_by_id(pool, exam_id).await?.is_none() {
        return Err(AttemptError::NotFound("exam"));
    }

    let now = primitive_now_utc();
    let attempt_id = Uuid::new_v4().to_string();

    let mut tx = pool.begin().await?;
    repositories::attempts::acquire_user_exam_lock(&mut *tx, user_id, exam_id).await?;

    let prior = repositories::attempts::count_by_user_and_exam(&mut *tx, user_id, exam_id).await?;
    let inserted = repositories::attempts::create(
        &mut *tx,
        repositories::attempts::CreateAttempt {
            id: &attempt_id,
            user_id,
            exam_id,
            attempt_number: (prior + 1) as i32,
            started_at: now,
            created_at: now,
            updated_at: now,
        },
    )
    .await?;

    if !inserted {
        return Err(AttemptError::Conflict);
    }

    tx.commit().await?;
    Ok(repositories::attempts::fetch_one_by_id(pool, &attempt_id).await?)
}

/// Returns the attempt's fixed question order, computing and persisting it on
/// first access. Idempotent: once stored the selector is never re-invoked,
/// and concurrent first readers resolve to a single stored order through the
/// conditional update.
pub(crate) async fn ensure_question_order<R: Rng>(
    pool: &PgPool,
    attempt: &Attempt,
    rng: &mut R,
) -> Result<Vec<String>, AttemptError> {
    if let Some(order) = &attempt.question_order {
        return Ok(order.0.clone());
    }

    let exam = repositories::exams::find_by_id(pool, &attempt.exam_id)
        .await?
        .ok_or(AttemptError::NotFound("exam"))?;
    let bank = repositories::questions::list_ids_by_exam(pool, &attempt.exam_id).await?;
    let order = selection::select_and_order(&bank, exam.question_count, rng);

    let now = primitive_now_utc();
    if repositories::attempts::set_question_order(pool, &attempt.id, &order, now).await? {
        return Ok(order);
    }

    // Lost the first-write race; the stored order is authoritative.
    let stored = repositories::attempts::fetch_one_by_id(pool, &attempt.id).await?;
    stored.question_order.map(|order| order.0).ok_or(AttemptError::Inconsistent)
}

/// Loads the attempt's questions in presentation order.
pub(crate) async fn ordered_questions<R: Rng>(
    pool: &PgPool,
    attempt: &Attempt,
    rng: &mut R,
) -> Result<Vec<Question>, AttemptError> {
    let order = ensure_question_order(pool, attempt, rng).await?;
    let mut questions = repositories::questions::list_by_ids(pool, &order).await?;

    let position = |id: &str| order.iter().position(|other| other == id);
    questions.sort_by_key(|question| position(&question.id));
    Ok(questions)
}

/// Records one answer against the attempt's fixed set.
///
/// Preconditions, in order: the attempt is active, the question belongs to
/// the attempt's selection, the key is in the closed alphabet. The active
/// check is repeated under a row lock inside the transaction, so an answer
/// racing a concurrent finish still loses. The upsert and the score
/// recomputation share that transaction; the score is always the count of
/// currently-correct answers, so overwriting a previous answer never
/// double-counts.
pub(crate) async fn record_answer<R: Rng>(
    pool: &PgPool,
    attempt: &Attempt,
    question_id: &str,
    selected_key: &str,
    rng: &mut R,
) -> Result<AnswerOutcome, AttemptError> {
    if attempt.is_terminal() {
        return Err(AttemptError::Closed);
    }

    let order = ensure_question_order(pool, attempt, rng).await?;
    if !order.iter().any(|id| id == question_id) {
        return Err(AttemptError::InvalidQuestion);
    }

    let selected = ChoiceKey::parse(selected_key).ok_or(AttemptError::InvalidChoice)?;

    let now = primitive_now_utc();
    let mut tx = pool.begin().await?;

    let still_active = repositories::attempts::lock_is_active(&mut *tx, &attempt.id)
        .await?
        .ok_or(AttemptError::NotFound("attempt"))?;
    if !still_active {
        return Err(AttemptError::Closed);
    }

    let correct_key = repositories::questions::find_correct_key(&mut *tx, question_id)
        .await?
        .ok_or(AttemptError::NotFound("question"))?;

    let answer = repositories::answers::upsert(
        &mut *tx,
        repositories::answers::UpsertAnswer {
            id: &Uuid::new_v4().to_string(),
            attempt_id: &attempt.id,
            user_id: &attempt.user_id,
            question_id,
            selected_key: selected,
            now,
        },
    )
    .await?;

    let score = repositories::answers::count_correct(&mut *tx, &attempt.id).await? as i32;
    repositories::attempts::update_score(&mut *tx, &attempt.id, score, now).await?;
    tx.commit().await?;

    Ok(AnswerOutcome { answer, is_correct: selected == correct_key, score })
}

/// Completion gate: sets `ended_at` once and freezes the score. Finishing an
/// already-terminal attempt returns it unchanged.
pub(crate) async fn finish_attempt(pool: &PgPool, attempt: &Attempt) -> Result<Attempt, AttemptError> {
    if !attempt.is_terminal() {
        repositories::attempts::finish(pool, &attempt.id, primitive_now_utc()).await?;
    }

    Ok(repositories::attempts::fetch_one_by_id(pool, &attempt.id).await?)
}
