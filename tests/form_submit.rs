//! Form submission wire-format checks against a local HTTP server.

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, header};
use axum::routing::{get, post};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use webreplay::{Session, action};

const FORM_PAGE: &str = r#"<html><body>
<form action="/submit" method="post">
    <input name="user">
    <input name="pass" type="password">
    <input type="submit" value="Go">
</form>
</body></html>"#;

#[derive(Clone, Default)]
struct Captured {
    body: Arc<Mutex<Option<String>>>,
    referer: Arc<Mutex<Option<String>>>,
    content_type: Arc<Mutex<Option<String>>>,
}

async fn serve_form(captured: Captured) -> SocketAddr {
    async fn submit(State(captured): State<Captured>, headers: HeaderMap, body: String) -> ([(header::HeaderName, &'static str); 1], &'static str) {
        *captured.body.lock().unwrap() = Some(body);
        *captured.referer.lock().unwrap() = headers
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *captured.content_type.lock().unwrap() = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        ([(header::CONTENT_TYPE, "text/html")], "<html><body><h1>Form Submitted</h1></body></html>")
    }

    let app = Router::new()
        .route(
            "/",
            get(|| async { ([(header::CONTENT_TYPE, "text/html")], FORM_PAGE) }),
        )
        .route("/submit", post(submit))
        .with_state(captured);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn decode_pairs(body: &str) -> BTreeMap<String, String> {
    body.split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            let decode = |s: &str| {
                let mut out = Vec::new();
                let bytes = s.as_bytes();
                let mut i = 0;
                while i < bytes.len() {
                    match bytes[i] {
                        b'+' => {
                            out.push(b' ');
                            i += 1;
                        }
                        b'%' if i + 3 <= bytes.len() => {
                            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap();
                            out.push(u8::from_str_radix(hex, 16).unwrap());
                            i += 3;
                        }
                        b => {
                            out.push(b);
                            i += 1;
                        }
                    }
                }
                String::from_utf8(out).unwrap()
            };
            (decode(k), decode(v))
        })
        .collect()
}

#[tokio::test]
async fn send_keys_then_submit_posts_the_typed_values() {
    let captured = Captured::default();
    let addr = serve_form(captured.clone()).await;
    let url = format!("http://{addr}/");

    let tmp = TempDir::new().unwrap();
    let session = Session::new("form-submit")
        .unwrap()
        .with_file_prefix(format!("{}/", tmp.path().display()));

    session
        .run(&[
            action::navigate(&url),
            action::send_keys("input[name=user]", "alice"),
            action::send_keys("input[name=pass]", "pw"),
            action::submit_form("form", None),
        ])
        .await
        .unwrap();

    let body = captured.body.lock().unwrap().clone().unwrap();
    let pairs = decode_pairs(&body);
    assert_eq!(pairs["user"], "alice");
    assert_eq!(pairs["pass"], "pw");
    assert_eq!(pairs.len(), 2);

    assert_eq!(
        captured.content_type.lock().unwrap().as_deref(),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(captured.referer.lock().unwrap().as_deref(), Some(url.as_str()));

    // submission landed on the result page
    let page = session.current_page().await.unwrap();
    assert!(page.body().contains("Form Submitted"));

    // the pending field map is drained by the submission
    assert_eq!(session.pending_len().await, 0);
}

#[tokio::test]
async fn pending_fields_are_cleared_even_when_submission_fails() {
    let captured = Captured::default();
    let addr = serve_form(captured).await;

    let tmp = TempDir::new().unwrap();
    let session = Session::new("form-submit-fail")
        .unwrap()
        .with_file_prefix(format!("{}/", tmp.path().display()));

    session
        .run(&[
            action::navigate(&format!("http://{addr}/")),
            action::send_keys("input[name=user]", "alice"),
        ])
        .await
        .unwrap();

    // no such form on the page
    let err = session.do_submit_form("form#missing", None).await.unwrap_err();
    assert!(err.to_string().contains("found 0 items"), "{err}");
    assert_eq!(session.pending_len().await, 0);
}

#[tokio::test]
async fn clicking_the_submit_control_submits_the_enclosing_form() {
    let captured = Captured::default();
    let addr = serve_form(captured.clone()).await;

    let tmp = TempDir::new().unwrap();
    let session = Session::new("form-click-submit")
        .unwrap()
        .with_file_prefix(format!("{}/", tmp.path().display()));

    session
        .run(&[
            action::navigate(&format!("http://{addr}/")),
            action::send_keys("input[name=user]", "bob"),
            action::click("input[type=submit]"),
        ])
        .await
        .unwrap();

    let body = captured.body.lock().unwrap().clone().unwrap();
    let pairs = decode_pairs(&body);
    assert_eq!(pairs["user"], "bob");
    assert_eq!(session.pending_len().await, 0);
}

#[tokio::test]
async fn form_action_sets_values_by_name() {
    let captured = Captured::default();
    let addr = serve_form(captured.clone()).await;

    let tmp = TempDir::new().unwrap();
    let session = Session::new("form-action")
        .unwrap()
        .with_file_prefix(format!("{}/", tmp.path().display()));

    session.get_page(&format!("http://{addr}/")).await.unwrap();
    let mut params = BTreeMap::new();
    params.insert("user".to_string(), "carol".to_string());
    session.form_action("form", &params).await.unwrap();

    let body = captured.body.lock().unwrap().clone().unwrap();
    let pairs = decode_pairs(&body);
    assert_eq!(pairs["user"], "carol");
}
