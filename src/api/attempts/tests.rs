use axum::http::{Method, StatusCode};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use tower::ServiceExt;

use crate::db::models::{Exam, Question, User};
use crate::db::types::ChoiceKey;
use crate::repositories;
use crate::services::attempts::{record_answer, AttemptError};
use crate::test_support::{self, TestContext};

async fn seed_exam(ctx: &TestContext, bank_size: usize, question_count: i32) -> (Exam, Vec<Question>) {
    let category = test_support::insert_category(ctx.state.db(), "Mathematics").await;
    let grade = test_support::insert_grade_level(ctx.state.db(), "Grade 9").await;
    let exam =
        test_support::insert_exam(ctx.state.db(), "Algebra", &category, &grade, question_count)
            .await;

    let mut questions = Vec::with_capacity(bank_size);
    for index in 0..bank_size {
        let question = test_support::insert_question(
            ctx.state.db(),
            &exam,
            &format!("Question {index}"),
            ChoiceKey::A,
        )
        .await;
        questions.push(question);
    }

    (exam, questions)
}

async fn seed_student(ctx: &TestContext) -> (User, String) {
    let user =
        test_support::insert_user(ctx.state.db(), "student@example.com", "Student", "student-pass")
            .await;
    let token = test_support::bearer_token(&user.id, ctx.state.settings());
    (user, token)
}

async fn start_attempt(ctx: &TestContext, token: &str, exam_id: &str) -> (StatusCode, serde_json::Value) {
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/attempts/start",
            Some(token),
            Some(json!({"exam_id": exam_id})),
        ))
        .await
        .expect("start attempt");

    let status = response.status();
    (status, test_support::read_json(response).await)
}

async fn fetch_questions(ctx: &TestContext, token: &str, attempt_id: &str) -> Vec<String> {
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/attempts/{attempt_id}/questions"),
            Some(token),
            None,
        ))
        .await
        .expect("fetch questions");

    let status = response.status();
    let body = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    body.as_array()
        .expect("question list")
        .iter()
        .map(|item| item["id"].as_str().expect("question id").to_string())
        .collect()
}

async fn submit_answer(
    ctx: &TestContext,
    token: &str,
    attempt_id: &str,
    question_id: &str,
    selected_key: &str,
) -> (StatusCode, serde_json::Value) {
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/attempts/{attempt_id}/answers"),
            Some(token),
            Some(json!({"question_id": question_id, "selected_key": selected_key})),
        ))
        .await
        .expect("submit answer");

    let status = response.status();
    (status, test_support::read_json(response).await)
}

async fn finish_attempt(
    ctx: &TestContext,
    token: &str,
    attempt_id: &str,
) -> (StatusCode, serde_json::Value) {
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/attempts/{attempt_id}/finish"),
            Some(token),
            None,
        ))
        .await
        .expect("finish attempt");

    let status = response.status();
    (status, test_support::read_json(response).await)
}

#[tokio::test]
async fn start_creates_attempt_and_current_finds_it() {
    let ctx = test_support::setup_test_context().await;
    let (exam, _) = seed_exam(&ctx, 3, 3).await;
    let (_, token) = seed_student(&ctx).await;

    let (status, created) = start_attempt(&ctx, &token, &exam.id).await;
    assert_eq!(status, StatusCode::CREATED, "response: {created}");
    assert_eq!(created["exam_id"], exam.id);
    assert_eq!(created["attempt_number"], 1);
    assert_eq!(created["score"], 0);
    assert!(created["ended_at"].is_null());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            "/api/v1/attempts/current",
            Some(&token),
            None,
        ))
        .await
        .expect("current attempt");

    let status = response.status();
    let current = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {current}");
    assert_eq!(current["id"], created["id"]);
}

#[tokio::test]
async fn current_returns_404_without_active_attempt() {
    let ctx = test_support::setup_test_context().await;
    let (_, token) = seed_student(&ctx).await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            "/api/v1/attempts/current",
            Some(&token),
            None,
        ))
        .await
        .expect("current attempt");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn question_order_is_sampled_once_and_stable() {
    let ctx = test_support::setup_test_context().await;
    let (exam, questions) = seed_exam(&ctx, 10, 5).await;
    let (_, token) = seed_student(&ctx).await;

    let (status, created) = start_attempt(&ctx, &token, &exam.id).await;
    assert_eq!(status, StatusCode::CREATED, "response: {created}");
    let attempt_id = created["id"].as_str().expect("attempt id").to_string();

    let first = fetch_questions(&ctx, &token, &attempt_id).await;
    assert_eq!(first.len(), 5);

    let mut distinct = first.clone();
    distinct.sort();
    distinct.dedup();
    assert_eq!(distinct.len(), 5, "order contains duplicates: {first:?}");

    let bank_ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
    for id in &first {
        assert!(bank_ids.contains(id), "unknown question id {id}");
    }

    let second = fetch_questions(&ctx, &token, &attempt_id).await;
    assert_eq!(first, second);

    // Answering must not disturb the stored order either.
    let (status, body) = submit_answer(&ctx, &token, &attempt_id, &first[0], "A").await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    let third = fetch_questions(&ctx, &token, &attempt_id).await;
    assert_eq!(first, third);
}

#[tokio::test]
async fn undersized_bank_uses_every_question() {
    let ctx = test_support::setup_test_context().await;
    let (exam, questions) = seed_exam(&ctx, 3, 10).await;
    let (_, token) = seed_student(&ctx).await;

    let (status, created) = start_attempt(&ctx, &token, &exam.id).await;
    assert_eq!(status, StatusCode::CREATED, "response: {created}");
    let attempt_id = created["id"].as_str().expect("attempt id").to_string();

    let mut order = fetch_questions(&ctx, &token, &attempt_id).await;
    let mut bank_ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
    order.sort();
    bank_ids.sort();
    assert_eq!(order, bank_ids);
}

#[tokio::test]
async fn second_start_conflicts_until_finish() {
    let ctx = test_support::setup_test_context().await;
    let (exam, _) = seed_exam(&ctx, 3, 3).await;
    let (_, token) = seed_student(&ctx).await;

    let (status, created) = start_attempt(&ctx, &token, &exam.id).await;
    assert_eq!(status, StatusCode::CREATED, "response: {created}");
    let attempt_id = created["id"].as_str().expect("attempt id").to_string();

    let (status, conflict) = start_attempt(&ctx, &token, &exam.id).await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {conflict}");

    let (status, finished) = finish_attempt(&ctx, &token, &attempt_id).await;
    assert_eq!(status, StatusCode::OK, "response: {finished}");
    assert!(finished["ended_at"].is_string());

    let (status, restarted) = start_attempt(&ctx, &token, &exam.id).await;
    assert_eq!(status, StatusCode::CREATED, "response: {restarted}");
    assert_eq!(restarted["attempt_number"], 2);
}

#[tokio::test]
async fn start_rejects_unknown_exam() {
    let ctx = test_support::setup_test_context().await;
    let (_, token) = seed_student(&ctx).await;

    let (status, body) = start_attempt(&ctx, &token, "missing-exam").await;
    assert_eq!(status, StatusCode::NOT_FOUND, "response: {body}");
}

#[tokio::test]
async fn finish_is_idempotent() {
    let ctx = test_support::setup_test_context().await;
    let (exam, _) = seed_exam(&ctx, 2, 2).await;
    let (_, token) = seed_student(&ctx).await;

    let (_, created) = start_attempt(&ctx, &token, &exam.id).await;
    let attempt_id = created["id"].as_str().expect("attempt id").to_string();
    let order = fetch_questions(&ctx, &token, &attempt_id).await;

    let (status, body) = submit_answer(&ctx, &token, &attempt_id, &order[0], "A").await;
    assert_eq!(status, StatusCode::OK, "response: {body}");

    let (status, first) = finish_attempt(&ctx, &token, &attempt_id).await;
    assert_eq!(status, StatusCode::OK, "response: {first}");
    assert_eq!(first["score"], 1);

    let (status, second) = finish_attempt(&ctx, &token, &attempt_id).await;
    assert_eq!(status, StatusCode::OK, "response: {second}");
    assert_eq!(second["score"], first["score"]);
    assert_eq!(second["ended_at"], first["ended_at"]);
}

#[tokio::test]
async fn score_tracks_latest_answer_per_question() {
    let ctx = test_support::setup_test_context().await;
    let (exam, _) = seed_exam(&ctx, 3, 3).await;
    let (_, token) = seed_student(&ctx).await;

    let (_, created) = start_attempt(&ctx, &token, &exam.id).await;
    let attempt_id = created["id"].as_str().expect("attempt id").to_string();
    let order = fetch_questions(&ctx, &token, &attempt_id).await;

    for (index, question_id) in order.iter().enumerate() {
        let (status, body) = submit_answer(&ctx, &token, &attempt_id, question_id, "A").await;
        assert_eq!(status, StatusCode::OK, "response: {body}");
        assert_eq!(body["is_correct"], true);
        assert_eq!(body["score"], (index + 1) as i64);
    }

    // Changing an answer to a wrong key removes its point, nothing double counts.
    let (status, body) = submit_answer(&ctx, &token, &attempt_id, &order[0], "B").await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["is_correct"], false);
    assert_eq!(body["score"], 2);

    let (status, body) = submit_answer(&ctx, &token, &attempt_id, &order[0], "A").await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["is_correct"], true);
    assert_eq!(body["score"], 3);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/attempts/{attempt_id}"),
            Some(&token),
            None,
        ))
        .await
        .expect("attempt detail");

    let status = response.status();
    let detail = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {detail}");
    assert_eq!(detail["score"], 3);
    assert_eq!(detail["answers"].as_array().expect("answers").len(), 3);
}

#[tokio::test]
async fn selected_key_is_case_insensitive() {
    let ctx = test_support::setup_test_context().await;
    let (exam, _) = seed_exam(&ctx, 1, 1).await;
    let (_, token) = seed_student(&ctx).await;

    let (_, created) = start_attempt(&ctx, &token, &exam.id).await;
    let attempt_id = created["id"].as_str().expect("attempt id").to_string();
    let order = fetch_questions(&ctx, &token, &attempt_id).await;

    let (status, body) = submit_answer(&ctx, &token, &attempt_id, &order[0], "a").await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["is_correct"], true);
    assert_eq!(body["answer"]["selected_key"], "A");
}

#[tokio::test]
async fn answer_outside_the_attempt_set_is_rejected() {
    let ctx = test_support::setup_test_context().await;
    let (exam, _) = seed_exam(&ctx, 2, 2).await;
    let (_, token) = seed_student(&ctx).await;

    let category = test_support::insert_category(ctx.state.db(), "Physics").await;
    let grade = test_support::insert_grade_level(ctx.state.db(), "Grade 10").await;
    let other_exam =
        test_support::insert_exam(ctx.state.db(), "Mechanics", &category, &grade, 1).await;
    let foreign_question =
        test_support::insert_question(ctx.state.db(), &other_exam, "Foreign", ChoiceKey::A).await;

    let (_, created) = start_attempt(&ctx, &token, &exam.id).await;
    let attempt_id = created["id"].as_str().expect("attempt id").to_string();
    fetch_questions(&ctx, &token, &attempt_id).await;

    let (status, body) =
        submit_answer(&ctx, &token, &attempt_id, &foreign_question.id, "A").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "response: {body}");

    let (status, body) = submit_answer(&ctx, &token, &attempt_id, "missing-question", "A").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "response: {body}");

    let (_, finished) = finish_attempt(&ctx, &token, &attempt_id).await;
    assert_eq!(finished["score"], 0);
}

#[tokio::test]
async fn invalid_choice_key_is_rejected() {
    let ctx = test_support::setup_test_context().await;
    let (exam, _) = seed_exam(&ctx, 1, 1).await;
    let (_, token) = seed_student(&ctx).await;

    let (_, created) = start_attempt(&ctx, &token, &exam.id).await;
    let attempt_id = created["id"].as_str().expect("attempt id").to_string();
    let order = fetch_questions(&ctx, &token, &attempt_id).await;

    let (status, body) = submit_answer(&ctx, &token, &attempt_id, &order[0], "F").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "response: {body}");
}

#[tokio::test]
async fn finished_attempt_rejects_answers() {
    let ctx = test_support::setup_test_context().await;
    let (exam, _) = seed_exam(&ctx, 1, 1).await;
    let (_, token) = seed_student(&ctx).await;

    let (_, created) = start_attempt(&ctx, &token, &exam.id).await;
    let attempt_id = created["id"].as_str().expect("attempt id").to_string();
    let order = fetch_questions(&ctx, &token, &attempt_id).await;

    let (status, body) = finish_attempt(&ctx, &token, &attempt_id).await;
    assert_eq!(status, StatusCode::OK, "response: {body}");

    let (status, body) = submit_answer(&ctx, &token, &attempt_id, &order[0], "A").await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {body}");
}

#[tokio::test]
async fn answers_racing_a_finish_are_rejected() {
    let ctx = test_support::setup_test_context().await;
    let (exam, _) = seed_exam(&ctx, 1, 1).await;
    let (_, token) = seed_student(&ctx).await;

    let (_, created) = start_attempt(&ctx, &token, &exam.id).await;
    let attempt_id = created["id"].as_str().expect("attempt id").to_string();
    let order = fetch_questions(&ctx, &token, &attempt_id).await;

    // A snapshot taken before the finish still believes the attempt is active.
    let snapshot = repositories::attempts::fetch_one_by_id(ctx.state.db(), &attempt_id)
        .await
        .expect("attempt snapshot");
    assert!(!snapshot.is_terminal());

    let (status, finished) = finish_attempt(&ctx, &token, &attempt_id).await;
    assert_eq!(status, StatusCode::OK, "response: {finished}");

    let mut rng = StdRng::seed_from_u64(11);
    let err = record_answer(ctx.state.db(), &snapshot, &order[0], "A", &mut rng)
        .await
        .expect_err("terminal attempt must reject answers");
    assert!(matches!(err, AttemptError::Closed));

    let answers = repositories::answers::list_by_attempt(ctx.state.db(), &attempt_id)
        .await
        .expect("answers");
    assert!(answers.is_empty());
}

#[tokio::test]
async fn attempts_are_hidden_from_other_users() {
    let ctx = test_support::setup_test_context().await;
    let (exam, _) = seed_exam(&ctx, 1, 1).await;
    let (_, token) = seed_student(&ctx).await;

    let other =
        test_support::insert_user(ctx.state.db(), "other@example.com", "Other", "other-pass").await;
    let other_token = test_support::bearer_token(&other.id, ctx.state.settings());

    let (_, created) = start_attempt(&ctx, &token, &exam.id).await;
    let attempt_id = created["id"].as_str().expect("attempt id").to_string();

    for uri in [
        format!("/api/v1/attempts/{attempt_id}"),
        format!("/api/v1/attempts/{attempt_id}/questions"),
    ] {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(Method::GET, &uri, Some(&other_token), None))
            .await
            .expect("foreign read");
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "uri: {uri}");
    }
}

#[tokio::test]
async fn listing_attempts_is_paginated() {
    let ctx = test_support::setup_test_context().await;
    let (exam, _) = seed_exam(&ctx, 1, 1).await;
    let (_, token) = seed_student(&ctx).await;

    let (_, created) = start_attempt(&ctx, &token, &exam.id).await;
    let attempt_id = created["id"].as_str().expect("attempt id").to_string();
    finish_attempt(&ctx, &token, &attempt_id).await;
    start_attempt(&ctx, &token, &exam.id).await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            "/api/v1/attempts?skip=0&limit=1",
            Some(&token),
            None,
        ))
        .await
        .expect("list attempts");

    let status = response.status();
    let list = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {list}");
    assert_eq!(list["items"].as_array().expect("items").len(), 1);
    assert_eq!(list["total_count"], 2);
}

#[tokio::test]
async fn attempt_routes_require_authentication() {
    let ctx = test_support::setup_test_context().await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/attempts/start",
            None,
            Some(json!({"exam_id": "any"})),
        ))
        .await
        .expect("unauthenticated start");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
