use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, feedback, images};

pub fn build_app(state: AppState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;
    Router::new()
        .merge(auth::router())
        .merge(feedback::router(max_upload_bytes))
        .merge(images::router())
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, JwtConfig, UploadBackend};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const LIMIT: usize = 1024 * 1024;
    const BOUNDARY: &str = "----feedbackdesk-test";

    async fn test_app(dir: &TempDir) -> Router {
        let config = AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            database_url: None,
            data_dir: dir.path().to_path_buf(),
            upload_dir: dir.path().join("uploads"),
            max_upload_bytes: LIMIT,
            uploads: UploadBackend::Local,
            jwt: JwtConfig {
                secret: "router-test-secret".into(),
                issuer: "iss".into(),
                audience: "aud".into(),
                ttl_minutes: 60,
            },
            admin_emails: vec!["admin@example.com".into()],
        };
        build_app(AppState::init(config).await.expect("state"))
    }

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a str, Vec<u8>),
    }

    fn multipart(parts: Vec<Part<'_>>) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File(name, file_name, content_type, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                            name, file_name, content_type
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(&bytes);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::post("/submit-feedback")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            req = req.header("x-auth-token", t);
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(res: Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Asserts a 400 whose JSON body carries a message under `key`.
    async fn assert_json_bad_request(res: Response, key: &str) -> String {
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(res.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/json"));
        let body = body_json(res).await;
        body[key].as_str().unwrap_or_else(|| panic!("no {key} in {body}")).to_string()
    }

    async fn register_and_login(app: &Router, email: &str, role: &str) -> String {
        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/register",
                json!({"username": "ana", "email": email, "password": "hunter22", "role": role}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/login",
                json!({"email": email, "password": "hunter22"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        body_json(res).await["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir).await;
        let res = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn uploads_dir_is_created_on_startup() {
        let dir = TempDir::new().unwrap();
        let _app = test_app(&dir).await;
        assert!(dir.path().join("uploads").is_dir());
    }

    #[tokio::test]
    async fn register_login_and_protected_flow() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir).await;

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/register",
                json!({"username": "ana", "email": "ana@example.com", "password": "hunter22", "role": "user"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["msg"], "User registered successfully!");

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/register",
                json!({"username": "ana2", "email": "ana@example.com", "password": "x", "role": "user"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["msg"], "User already exists");

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/login",
                json!({"email": "ana@example.com", "password": "wrong"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["msg"], "Invalid credentials");

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/login",
                json!({"email": "ana@example.com", "password": "hunter22"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let login = body_json(res).await;
        assert_eq!(login["user"]["username"], "ana");
        assert_eq!(login["user"]["role"], "user");
        assert!(login["user"].get("password_hash").is_none());
        let token = login["token"].as_str().unwrap();

        let res = app
            .clone()
            .oneshot(
                Request::get("/auth/protected")
                    .header("x-auth-token", token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["msg"], "Access granted");
        assert_eq!(body["user"]["id"], login["user"]["id"]);
        assert_eq!(body["user"]["role"], "user");
    }

    #[tokio::test]
    async fn protected_rejects_missing_and_bad_tokens() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir).await;

        let res = app.clone().oneshot(get("/auth/protected")).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(res).await["msg"], "No token, authorization denied");

        let res = app
            .clone()
            .oneshot(
                Request::get("/auth/protected")
                    .header("x-auth-token", "not.a.jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(res).await["msg"], "Invalid token");
    }

    #[tokio::test]
    async fn submit_then_list() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir).await;

        let res = app
            .clone()
            .oneshot(multipart(vec![
                Part::Text("category", "Bug"),
                Part::Text("description", "x"),
            ]))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let created = body_json(res).await;
        assert_eq!(created["message"], "Feedback submitted");
        assert_eq!(created["feedback"]["location"], "Not provided");
        assert_eq!(created["feedback"]["status"], "Pending");
        assert!(created["feedback"]["image"].is_null());

        let res = app.clone().oneshot(get("/feedback")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let listed = body_json(res).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0], created["feedback"]);

        let raw = std::fs::read_to_string(dir.path().join("feedback.json")).unwrap();
        assert!(raw.starts_with("[\n"));
    }

    #[tokio::test]
    async fn submit_without_description_is_rejected() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir).await;

        let res = app
            .clone()
            .oneshot(multipart(vec![Part::Text("category", "Bug"), Part::Text("description", "")]))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(res).await["error"].is_string());
        assert!(!dir.path().join("feedback.json").exists());
    }

    #[tokio::test]
    async fn oversized_image_is_413_and_not_stored() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir).await;

        let res = app
            .clone()
            .oneshot(multipart(vec![
                Part::Text("category", "Bug"),
                Part::Text("description", "huge photo"),
                Part::File("image", "big.jpg", "image/jpeg", vec![0u8; LIMIT + 1]),
            ]))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body_json(res).await["error"].is_string());

        let res = app.clone().oneshot(get("/feedback")).await.unwrap();
        assert_eq!(body_json(res).await, json!([]));
        assert_eq!(std::fs::read_dir(dir.path().join("uploads")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn uploaded_image_is_served() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir).await;

        let res = app
            .clone()
            .oneshot(multipart(vec![
                Part::Text("category", "Feature Request"),
                Part::Text("description", "bike lane"),
                Part::Text("location", "Elm St"),
                Part::File("image", "lane.PNG", "image/png", b"\x89PNG-data".to_vec()),
            ]))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let created = body_json(res).await;
        assert_eq!(created["feedback"]["location"], "Elm St");
        let path = created["feedback"]["image"].as_str().unwrap().to_string();
        assert!(path.starts_with("/uploads/") && path.ends_with(".png"), "{path}");

        let res = app.clone().oneshot(get(&path)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(res.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"\x89PNG-data");

        let res = app.clone().oneshot(get("/uploads/missing.png")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_file_part_means_no_image() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir).await;

        let res = app
            .clone()
            .oneshot(multipart(vec![
                Part::Text("category", "Bug"),
                Part::Text("description", "no photo"),
                Part::File("image", "", "application/octet-stream", Vec::new()),
            ]))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert!(body_json(res).await["feedback"]["image"].is_null());
    }

    #[tokio::test]
    async fn status_update_requires_admin() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir).await;

        let res = app
            .clone()
            .oneshot(multipart(vec![Part::Text("category", "Bug"), Part::Text("description", "x")]))
            .await
            .unwrap();
        let id = body_json(res).await["feedback"]["id"].as_str().unwrap().to_string();
        let uri = format!("/feedback/{}/status", id);

        let res = app
            .clone()
            .oneshot(json_request("PATCH", &uri, json!({"status": "Resolved"}), None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let user_token = register_and_login(&app, "citizen@example.com", "user").await;
        let res = app
            .clone()
            .oneshot(json_request("PATCH", &uri, json!({"status": "Resolved"}), Some(&user_token)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let admin_token = register_and_login(&app, "admin@example.com", "admin").await;
        let res = app
            .clone()
            .oneshot(json_request("PATCH", &uri, json!({"status": "Resolved"}), Some(&admin_token)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["status"], "Resolved");

        let missing = format!("/feedback/{}/status", uuid::Uuid::new_v4());
        let res = app
            .clone()
            .oneshot(json_request("PATCH", &missing, json!({"status": "Resolved"}), Some(&admin_token)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = app.clone().oneshot(get("/feedback/search?status=Resolved")).await.unwrap();
        let page = body_json(res).await;
        assert_eq!(page["total"], 1);
        assert_eq!(page["items"][0]["id"], id.as_str());
    }

    #[tokio::test]
    async fn search_paginates_newest_first() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir).await;

        for i in 0..7 {
            let desc = format!("report {}", i);
            let res = app
                .clone()
                .oneshot(multipart(vec![
                    Part::Text("category", "General Feedback"),
                    Part::Text("description", &desc),
                ]))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::CREATED);
        }

        let res = app.clone().oneshot(get("/feedback/search?page=2")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let page = body_json(res).await;
        assert_eq!(page["total"], 7);
        assert_eq!(page["pages"], 2);
        assert_eq!(page["per_page"], 5);
        assert_eq!(page["items"].as_array().unwrap().len(), 2);

        let res = app.clone().oneshot(get("/feedback/search?q=REPORT%206")).await.unwrap();
        let page = body_json(res).await;
        assert_eq!(page["total"], 1);
        assert_eq!(page["items"][0]["description"], "report 6");

        let res = app.clone().oneshot(get("/feedback/search?status=Closed")).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_auth_bodies_get_json_errors() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir).await;

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/register",
                json!({"email": "ana@example.com", "password": "hunter22"}),
                None,
            ))
            .await
            .unwrap();
        let msg = assert_json_bad_request(res, "msg").await;
        assert!(msg.contains("username"), "{msg}");

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/register",
                json!({"username": "ana", "email": "ana@example.com", "password": "hunter22", "role": "moderator"}),
                None,
            ))
            .await
            .unwrap();
        assert_json_bad_request(res, "msg").await;

        let res = app
            .clone()
            .oneshot(json_request("POST", "/auth/login", json!({"email": "ana@example.com"}), None))
            .await
            .unwrap();
        assert_json_bad_request(res, "msg").await;

        let res = app
            .clone()
            .oneshot(
                Request::post("/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_json_bad_request(res, "msg").await;
    }

    #[tokio::test]
    async fn malformed_feedback_requests_get_json_errors() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir).await;

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/submit-feedback",
                json!({"category": "Bug", "description": "x"}),
                None,
            ))
            .await
            .unwrap();
        assert_json_bad_request(res, "error").await;

        let res = app.clone().oneshot(get("/feedback/search?page=abc")).await.unwrap();
        assert_json_bad_request(res, "error").await;

        let token = register_and_login(&app, "admin@example.com", "admin").await;
        let res = app
            .clone()
            .oneshot(json_request(
                "PATCH",
                "/feedback/not-a-uuid/status",
                json!({"status": "Resolved"}),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_json_bad_request(res, "error").await;

        let uri = format!("/feedback/{}/status", uuid::Uuid::new_v4());
        let res = app
            .clone()
            .oneshot(json_request("PATCH", &uri, json!({"status": "Closed"}), Some(&token)))
            .await
            .unwrap();
        assert_json_bad_request(res, "error").await;
        assert!(!dir.path().join("feedback.json").exists());
    }

    #[tokio::test]
    async fn svg_upload_is_rejected() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir).await;

        let res = app
            .clone()
            .oneshot(multipart(vec![
                Part::Text("category", "Bug"),
                Part::Text("description", "graffiti"),
                Part::File(
                    "image",
                    "wall.svg",
                    "image/svg+xml",
                    b"<svg xmlns=\"http://www.w3.org/2000/svg\"><script>alert(1)</script></svg>".to_vec(),
                ),
            ]))
            .await
            .unwrap();
        assert_json_bad_request(res, "error").await;

        let res = app.clone().oneshot(get("/feedback")).await.unwrap();
        assert_eq!(body_json(res).await, json!([]));
        assert_eq!(std::fs::read_dir(dir.path().join("uploads")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn oversized_text_field_is_not_blamed_on_the_image() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir).await;

        let description = "a".repeat(LIMIT + LIMIT / 10);
        let res = app
            .clone()
            .oneshot(multipart(vec![
                Part::Text("category", "Bug"),
                Part::Text("description", &description),
            ]))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let error = body_json(res).await["error"].as_str().unwrap().to_string();
        assert!(!error.contains("Image"), "{error}");
        assert!(error.contains("Request body"), "{error}");
        assert!(!dir.path().join("feedback.json").exists());
    }

    #[tokio::test]
    async fn admin_role_needs_allowlisted_email() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir).await;

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/register",
                json!({"username": "mallory", "email": "mallory@example.com", "password": "hunter22", "role": "admin"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert!(body_json(res).await["msg"].is_string());

        let res = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/login",
                json!({"email": "mallory@example.com", "password": "hunter22"}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
