use sqlx::PgPool;

use crate::db::models::{Exam, ExamCategory, GradeLevel};

pub(crate) const COLUMNS: &str = "\
    id, title, description, category_id, duration_minutes, question_count, \
    created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_by_category_and_grade(
    pool: &PgPool,
    category_id: &str,
    grade_level_id: &str,
) -> Result<Vec<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(
        "SELECT e.id, e.title, e.description, e.category_id, e.duration_minutes,
                e.question_count, e.created_at, e.updated_at
         FROM exams e
         JOIN exam_grade_levels egl ON egl.exam_id = e.id
         WHERE e.category_id = $1 AND egl.grade_level_id = $2
         ORDER BY e.title",
    )
    .bind(category_id)
    .bind(grade_level_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_questions(pool: &PgPool, exam_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(pool)
        .await
}

pub(crate) struct CreateExam<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub category_id: &'a str,
    pub duration_minutes: i32,
    pub question_count: i32,
    pub now: time::PrimitiveDateTime,
}

pub(crate) async fn create(pool: &PgPool, params: CreateExam<'_>) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "INSERT INTO exams (
            id, title, description, category_id, duration_minutes, question_count,
            created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$7)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.title)
    .bind(params.description)
    .bind(params.category_id)
    .bind(params.duration_minutes)
    .bind(params.question_count)
    .bind(params.now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn add_grade_level(
    pool: &PgPool,
    exam_id: &str,
    grade_level_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO exam_grade_levels (exam_id, grade_level_id) VALUES ($1, $2)
         ON CONFLICT DO NOTHING",
    )
    .bind(exam_id)
    .bind(grade_level_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn create_category(
    pool: &PgPool,
    id: &str,
    name: &str,
    now: time::PrimitiveDateTime,
) -> Result<ExamCategory, sqlx::Error> {
    sqlx::query_as::<_, ExamCategory>(
        "INSERT INTO exam_categories (id, name, created_at, updated_at)
         VALUES ($1,$2,$3,$3)
         RETURNING id, name, created_at, updated_at",
    )
    .bind(id)
    .bind(name)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn create_grade_level(
    pool: &PgPool,
    id: &str,
    name: &str,
    now: time::PrimitiveDateTime,
) -> Result<GradeLevel, sqlx::Error> {
    sqlx::query_as::<_, GradeLevel>(
        "INSERT INTO grade_levels (id, name, created_at, updated_at)
         VALUES ($1,$2,$3,$3)
         RETURNING id, name, created_at, updated_at",
    )
    .bind(id)
    .bind(name)
    .bind(now)
    .fetch_one(pool)
    .await
}
