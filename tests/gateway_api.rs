//! End-to-end API tests against mocked providers

use actix_web::{test, web};
use omnigate::config::Config;
use omnigate::server::{AppState, HttpServer};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Config with every provider pointed at the mock server
fn test_config(server: &MockServer, media_root: &TempDir) -> Config {
    let mut config = Config::default();
    config.providers.glm.api_key = "glm-key".to_string();
    config.providers.glm.api_base = server.uri();
    config.providers.qwen.api_key = "sk-test".to_string();
    config.providers.qwen.api_base = server.uri();
    config.providers.qwen.compat_base = format!("{}/compatible-mode/v1", server.uri());
    config.providers.qwen.chat_app_id = "app-chat".to_string();
    config.providers.qwen.deepthink_app_id = "app-think".to_string();
    config.providers.coze.api_token = "pat-test".to_string();
    config.providers.coze.bot_id = "bot-1".to_string();
    config.providers.coze.api_base = server.uri();
    config.media.root = media_root.path().to_string_lossy().into_owned();
    config
}

fn multipart_body(boundary: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\r\n",
                    name, filename
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

#[actix_web::test]
async fn health_endpoint_reports_ok() {
    let server = MockServer::start().await;
    let media = TempDir::new().unwrap();
    let state = AppState::new(test_config(&server, &media)).unwrap();
    let app = test::init_service(HttpServer::create_app(web::Data::new(state))).await;

    let response = test::call_service(&app, test::TestRequest::get().uri("/health").to_request())
        .await;
    assert!(response.status().is_success());
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[actix_web::test]
async fn multi_turn_issues_a_session_and_rejects_empty_followup() {
    let server = MockServer::start().await;

    // Turn calls carry the token issued at init; mounted first so it wins
    // over the init mock for matching requests
    Mock::given(method("POST"))
        .and(path("/apps/app-chat/completion"))
        .and(body_partial_json(json!({"input": {"session_id": "tok-1"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {"text": "很高兴见到你", "session_id": "tok-1"},
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/apps/app-chat/completion"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {"text": "已就绪", "session_id": "tok-1"},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let media = TempDir::new().unwrap();
    let state = AppState::new(test_config(&server, &media)).unwrap();
    let app = test::init_service(HttpServer::create_app(web::Data::new(state))).await;

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/chat/multi-turn")
            .set_json(json!({"content": "你好"}))
            .to_request(),
    )
    .await;
    assert!(response.status().is_success());
    let session_id = response
        .headers()
        .get("x-session-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap();
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["text"], "很高兴见到你");

    // Empty input on the established session is rejected before any
    // provider call; the mocks' expectations verify no extra call happened
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/chat/multi-turn")
            .insert_header(("x-session-id", session_id))
            .set_json(json!({"content": ""}))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 400);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["error"], "输入内容不能为空");
}

#[actix_web::test]
async fn deep_think_includes_reasoning_trace() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/apps/app-think/completion"))
        .and(body_partial_json(json!({"input": {"session_id": "tok-t"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {
                "text": "答案是42",
                "session_id": "tok-t",
                "thoughts": [{"thought": "先分解问题"}],
            },
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/apps/app-think/completion"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {"text": "ready", "session_id": "tok-t"},
        })))
        .mount(&server)
        .await;

    let media = TempDir::new().unwrap();
    let state = AppState::new(test_config(&server, &media)).unwrap();
    let app = test::init_service(HttpServer::create_app(web::Data::new(state))).await;

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/chat/deep-think")
            .set_json(json!({"content": "生命的意义是什么"}))
            .to_request(),
    )
    .await;
    assert!(response.status().is_success());
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["text"], "答案是42");
    assert_eq!(body["thoughts"][0]["thought"], "先分解问题");
}

#[actix_web::test]
async fn glm_chat_requires_a_question() {
    let server = MockServer::start().await;
    let media = TempDir::new().unwrap();
    let state = AppState::new(test_config(&server, &media)).unwrap();
    let app = test::init_service(HttpServer::create_app(web::Data::new(state))).await;

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/glm/chat")
            .set_json(json!({"model": "glm-4"}))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 400);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["error"], "question is required");
}

#[actix_web::test]
async fn glm_chat_passes_the_completion_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cmpl-7",
            "choices": [{"message": {"role": "assistant", "content": "北京"}}],
            "usage": {"total_tokens": 9},
        })))
        .mount(&server)
        .await;

    let media = TempDir::new().unwrap();
    let state = AppState::new(test_config(&server, &media)).unwrap();
    let app = test::init_service(HttpServer::create_app(web::Data::new(state))).await;

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/glm/chat")
            .set_json(json!({"question": "中国的首都是哪里"}))
            .to_request(),
    )
    .await;
    assert!(response.status().is_success());
    let body: Value = test::read_body_json(response).await;
    // Vendor payload is returned unmodified
    assert_eq!(body["id"], "cmpl-7");
    assert_eq!(body["usage"]["total_tokens"], 9);
}

#[actix_web::test]
async fn glm_upstream_rejection_maps_to_503_with_diagnostics() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/images/generations"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": "1301", "message": "sensitive content"}
        })))
        .mount(&server)
        .await;

    let media = TempDir::new().unwrap();
    let state = AppState::new(test_config(&server, &media)).unwrap();
    let app = test::init_service(HttpServer::create_app(web::Data::new(state))).await;

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/glm/images")
            .set_json(json!({"prompt": "something"}))
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 503);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["error"], "模型请求失败");
    assert_eq!(body["code"], "1301");
    assert_eq!(body["message"], "sensitive content");
}

#[actix_web::test]
async fn coze_chat_aggregates_the_bot_stream() {
    let server = MockServer::start().await;
    let sse_body = concat!(
        "event:conversation.message.delta\n",
        "data:{\"type\":\"answer\",\"content\":\"晴\"}\n\n",
        "event:conversation.message.delta\n",
        "data:{\"type\":\"answer\",\"content\":\"天\"}\n\n",
        "event:conversation.chat.completed\n",
        "data:{\"usage\":{\"token_count\":17}}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v3/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body),
        )
        .mount(&server)
        .await;

    let media = TempDir::new().unwrap();
    let state = AppState::new(test_config(&server, &media)).unwrap();
    let app = test::init_service(HttpServer::create_app(web::Data::new(state))).await;

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/coze/chat")
            .set_json(json!({"question": "天气如何", "user_id": "u-1"}))
            .to_request(),
    )
    .await;
    assert!(response.status().is_success());
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["content"], "晴天");
    assert_eq!(body["token_count"], 17);
}

#[actix_web::test]
async fn audio_upload_under_the_file_field_reaches_the_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/aigc/multimodal-generation/generation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {"choices": [{"message": {"content": [
                {"text": "你说的是早上好"},
            ]}}]},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let media = TempDir::new().unwrap();
    let state = AppState::new(test_config(&server, &media)).unwrap();
    let app = test::init_service(HttpServer::create_app(web::Data::new(state))).await;

    let boundary = "----audioboundary";
    let body = multipart_body(boundary, &[("file", Some("clip.wav"), b"RIFFdata")]);
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/qwen/audio")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(body)
            .to_request(),
    )
    .await;
    assert!(response.status().is_success());
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["text"], "你说的是早上好");
}

#[actix_web::test]
async fn document_question_is_answered_via_file_extraction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/compatible-mode/v1/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "file-fe-xyz",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/compatible-mode/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "qwen-long",
            "messages": [
                {"role": "system", "content": "fileid://file-fe-xyz"},
                {"role": "user", "content": "这份合同的有效期是多久"},
            ],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "有效期为两年"}}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let media = TempDir::new().unwrap();
    let state = AppState::new(test_config(&server, &media)).unwrap();
    let app = test::init_service(HttpServer::create_app(web::Data::new(state))).await;

    let boundary = "----docboundary";
    let body = multipart_body(
        boundary,
        &[
            ("file", Some("contract.pdf"), b"%PDF-1.4"),
            ("question", None, "这份合同的有效期是多久".as_bytes()),
        ],
    );
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/qwen/document")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(body)
            .to_request(),
    )
    .await;
    assert!(response.status().is_success());
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["text"], "有效期为两年");
}

#[actix_web::test]
async fn omni_streams_tagged_records_with_done_sentinel() {
    let server = MockServer::start().await;
    let sse_body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"你\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"audio\":{\"data\":\"UklGR\"}}}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/compatible-mode/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body),
        )
        .mount(&server)
        .await;

    let media = TempDir::new().unwrap();
    let state = AppState::new(test_config(&server, &media)).unwrap();
    let app = test::init_service(HttpServer::create_app(web::Data::new(state))).await;

    let boundary = "----omniboundary";
    let body = multipart_body(
        boundary,
        &[("type", None, b"text"), ("text", None, "你好".as_bytes())],
    );
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/qwen/omni")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(body)
            .to_request(),
    )
    .await;
    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-session-id"));
    let body = test::read_body(response).await;
    assert_eq!(
        String::from_utf8(body.to_vec()).unwrap(),
        "text:你\naudio:UklGR\ndone:\n"
    );
}

#[actix_web::test]
async fn omni_accepts_a_media_turn_without_a_prompt() {
    let server = MockServer::start().await;
    let sse_body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"一只猫\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/compatible-mode/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body),
        )
        .expect(1)
        .mount(&server)
        .await;

    let media = TempDir::new().unwrap();
    let state = AppState::new(test_config(&server, &media)).unwrap();
    let app = test::init_service(HttpServer::create_app(web::Data::new(state))).await;

    let boundary = "----omniboundary";
    let body = multipart_body(
        boundary,
        &[
            ("type", None, b"image"),
            ("file", Some("cat.png"), b"pngbytes"),
        ],
    );
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/qwen/omni")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(body)
            .to_request(),
    )
    .await;
    assert!(response.status().is_success());
    let body = test::read_body(response).await;
    assert_eq!(
        String::from_utf8(body.to_vec()).unwrap(),
        "text:一只猫\ndone:\n"
    );
}

#[actix_web::test]
async fn upload_requires_an_identified_uploader() {
    let server = MockServer::start().await;
    let media = TempDir::new().unwrap();
    let state = AppState::new(test_config(&server, &media)).unwrap();
    let app = test::init_service(HttpServer::create_app(web::Data::new(state))).await;

    let boundary = "----uploadboundary";
    let body = multipart_body(boundary, &[("file", Some("a.png"), b"pngbytes")]);
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/files/upload")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(body)
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 401);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["error"], "未登录");
}

#[actix_web::test]
async fn upload_stores_the_file_and_returns_its_record() {
    let server = MockServer::start().await;
    let media = TempDir::new().unwrap();
    let state = AppState::new(test_config(&server, &media)).unwrap();
    let app = test::init_service(HttpServer::create_app(web::Data::new(state))).await;

    let boundary = "----uploadboundary";
    let body = multipart_body(
        boundary,
        &[
            ("file", Some("photo.PNG"), b"pngbytes"),
            ("user_id", None, b"user-7"),
        ],
    );
    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/files/upload")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(body)
            .to_request(),
    )
    .await;
    assert_eq!(response.status(), 201);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["file_name"], "photo.PNG");
    // Classification is case-insensitive on the extension
    assert_eq!(body["file_type"], "image");
    assert_eq!(body["file_size"], 8);
    assert_eq!(body["uploader_id"], "user-7");
}
