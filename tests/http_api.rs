use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use prompt_boostr::transport::{OpenAiTransport, Transport};
use prompt_boostr::{AppState, Config, router};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion(content: &str) -> Value {
    json!({
        "model": "gpt-4o-mini-2024-07-18",
        "choices": [{"message": {"role": "assistant", "content": content}}]
    })
}

async fn setup_with_upstream(config: Config) -> (Router, MockServer) {
    let server = MockServer::start().await;
    let transport: Arc<dyn Transport> = Arc::new(
        OpenAiTransport::new(&server.uri(), "sk-test".to_string(), Duration::from_secs(5)).unwrap(),
    );
    let state = AppState::with_transport(&config, transport);
    (router(state, &config), server)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }
    let req = builder
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
        Value::String(String::from_utf8_lossy(&bytes).into_owned())
    });
    (status, value)
}

const CORE_BODY: &str = r#"{"role":"UX expert","goal":"Audit a signup flow","context":"B2B SaaS","format":"Checklist","constraints":"Max 10 items","tone":"direct"}"#;

#[tokio::test]
async fn generate_returns_markdown_and_structured() {
    let (app, server) = setup_with_upstream(Config::default()).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 2048,
            "response_format": {"type": "json_object"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r###"{"markdown":"## Summary\nAudit","structured":{"final_prompt":"Act as a UX expert...","role":"UX expert"}}"###,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let (status, body) = send(&app, "POST", "/api/generate", Some(CORE_BODY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["model"], "gpt-4o-mini-2024-07-18");
    assert_eq!(body["markdown"], "## Summary\nAudit");
    assert_eq!(body["structured"]["final_prompt"], "Act as a UX expert...");
}

#[tokio::test]
async fn generate_rejects_missing_core_fields_without_calling_upstream() {
    let (app, server) = setup_with_upstream(Config::default()).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("{}")))
        .expect(0)
        .mount(&server)
        .await;

    let (status, body) = send(&app, "POST", "/api/generate", Some(r#"{"role":"x"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "Missing core fields: goal, context, format, constraints");

    let (status, body) = send(&app, "POST", "/api/generate", Some("not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Missing core fields: role"));

    let (status, body) = send(&app, "POST", "/api/generate", Some(r#""role""#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Body must be JSON.");
}

#[tokio::test]
async fn generate_reports_bad_model_json_as_502() {
    let (app, server) = setup_with_upstream(Config::default()).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(r#"{"markdown":"only"}"#)))
        .mount(&server)
        .await;

    let (status, body) = send(&app, "POST", "/api/generate", Some(CORE_BODY)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["ok"], false);
    assert_eq!(body["raw_response"]["markdown"], "only");
}

#[tokio::test]
async fn generate_passes_upstream_status_through() {
    let (app, server) = setup_with_upstream(Config::default()).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "code": "invalid_api_key"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (status, body) = send(&app, "POST", "/api/generate", Some(CORE_BODY)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Incorrect API key provided");
}

#[tokio::test]
async fn wizard_turn_merges_state() {
    let (app, server) = setup_with_upstream(Config::default()).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"temperature": 0.5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            r#"{"next_question":"Who is the audience?","extracted_data":{"role":"Recruiter","format":"Email"}}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let request = json!({
        "messages": [
            {"role": "assistant", "content": "What are we creating today?"},
            {"role": "user", "content": "A follow-up email to candidates"}
        ],
        "extractedData": {"tone": "friendly"}
    });
    let (status, body) = send(&app, "POST", "/api/tree-wizard", Some(&request.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["next_question"], "Who is the audience?");
    assert_eq!(body["extracted_data"], json!({"role": "Recruiter", "format": "Email"}));
    assert_eq!(body["merged_data"]["goal"], "A follow-up email to candidates");
    assert_eq!(body["merged_data"]["tone"], "friendly");
    assert_eq!(body["missing_core_fields"], json!(["context", "constraints"]));
    assert_eq!(body["complete"], false);
}

#[tokio::test]
async fn wizard_rejects_invalid_body() {
    let (app, _server) = setup_with_upstream(Config::default()).await;
    let (status, body) = send(&app, "POST", "/api/tree-wizard", Some(r#"{"messages":[]}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request body");

    let (status, body) = send(&app, "GET", "/api/tree-wizard", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn oversized_body_is_rejected_as_json_413() {
    let mut config = Config::default();
    config.server.body_limit_bytes = 256;
    let (app, server) = setup_with_upstream(config).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("{}")))
        .expect(0)
        .mount(&server)
        .await;

    let long_context = "x".repeat(1024);
    let request = json!({
        "role": "Editor", "goal": "Shorten", "context": long_context,
        "format": "Text", "constraints": "None"
    })
    .to_string();
    for uri in ["/api/generate", "/api/tree-wizard", "/api/questions/category/answer"] {
        let (status, body) = send(&app, "POST", uri, Some(&request)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE, "{uri}");
        assert_eq!(body["ok"], false, "{uri}");
        assert!(body["error"].is_string(), "{uri}");
    }
}

#[tokio::test]
async fn mock_mode_serves_every_route_offline() {
    let mut config = Config::default();
    config.openai.mock = true;
    let app = router(AppState::from_config(&config).unwrap(), &config);

    let (status, body) = send(&app, "GET", "/api/ping", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true, "model": "mock", "text": "pong"}));

    let (status, body) = send(&app, "POST", "/api/generate", Some(CORE_BODY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], "mock");
    assert!(body["structured"]["final_prompt"].as_str().unwrap().contains("Role: UX expert"));

    let request = json!({
        "messages": [{"role": "user", "content": "A product launch tweet"}],
        "extractedData": {}
    });
    let (status, body) = send(&app, "POST", "/api/wizard", Some(&request.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["merged_data"]["goal"], "A product launch tweet");
    assert!(body["next_question"].as_str().unwrap().contains("role"));
}

#[tokio::test]
async fn question_tree_routes_walk_builtin_tree() {
    let mut config = Config::default();
    config.openai.mock = true;
    let app = router(AppState::from_config(&config).unwrap(), &config);

    let (status, body) = send(&app, "GET", "/api/questions/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "category");
    assert_eq!(body["type"], "single-choice");

    let (status, body) = send(
        &app,
        "POST",
        "/api/questions/category/answer",
        Some(r#"{"value":"Image"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "next");
    assert_eq!(body["question"]["id"], "goal");
    assert_eq!(body["answers"]["category"], "Image");

    let (status, _) = send(&app, "GET", "/api/questions/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        "POST",
        "/api/questions/constraints/answer",
        Some(r#"{"value":"No text in the image","answers":{"goal":"Logo"}}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "finished");
    assert_eq!(body["answers"]["goal"], "Logo");
}

#[tokio::test]
async fn bearer_token_guards_api_but_not_health() {
    let mut config = Config::default();
    config.openai.mock = true;
    config.server.bearer_token = Some("s3cret".to_string());
    let app = router(AppState::from_config(&config).unwrap(), &config);

    let (status, _) = send(&app, "GET", "/api/ping", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/api/ping?access_token=s3cret", None).await;
    assert_eq!(status, StatusCode::OK);

    let req = Request::builder()
        .uri("/api/generate")
        .header(header::AUTHORIZATION, "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::OK);

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".to_string()));
}
