#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use qr_tracker::config::Config;
use qr_tracker::{create_router, db, AppState};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use tempfile::TempDir;
use tower::ServiceExt;

pub const CHROME_DESKTOP: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
pub const PEER_ADDRESS: ([u8; 4], u16) = ([203, 0, 113, 7], 40_000);

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    images: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.clone()).unwrap()
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(customize: impl FnOnce(&mut Config)) -> TestApp {
    let images = TempDir::new().unwrap();
    let mut config = Config::with_defaults("sqlite::memory:", "test-secret", images.path().join("qr_images"));
    customize(&mut config);
    let pool = db::create_memory_pool().await.unwrap();
    db::migrate(&pool).await.unwrap();
    let state = AppState::new(pool, config).unwrap();
    let router = create_router(state.clone()).layer(MockConnectInfo(SocketAddr::from(PEER_ADDRESS)));
    TestApp { router, state, images }
}

impl TestApp {
    pub fn image_path(&self, code: &str) -> PathBuf {
        self.state.images.image_path(code)
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec();
        TestResponse { status, headers, body }
    }

    pub async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap())),
            None => builder.body(Body::empty()),
        };
        self.send(request.unwrap()).await
    }

    pub async fn scan(&self, code: &str, headers: &[(&str, &str)]) -> TestResponse {
        let mut builder = Request::builder().method(Method::GET).uri(format!("/r/{code}"));
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Signs up and logs in, returning the bearer token.
    pub async fn register(&self, username: &str) -> String {
        let credentials = json!({ "username": username, "password": "hunter22" });
        let signup = self.call(Method::POST, "/api/auth/signup", None, Some(credentials.clone())).await;
        assert_eq!(signup.status, StatusCode::CREATED);
        let login = self.call(Method::POST, "/api/auth/login", None, Some(credentials)).await;
        assert_eq!(login.status, StatusCode::OK);
        login.json()["token"].as_str().unwrap().to_string()
    }

    pub async fn create_qr(&self, token: &str, body: Value) -> Value {
        let response = self.call(Method::POST, "/api/qr", Some(token), Some(body)).await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text());
        response.json()
    }
}
