use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::Rng;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::backend::{Backend, BackendError, ClickOptions, MouseButton};
use crate::config::BackendConfig;
use crate::keys::{KeySpec, webdriver_key};

/// W3C WebDriver client for a chromedriver-compatible endpoint.
pub struct WebDriverBackend {
    http: Client,
    config: BackendConfig,
    session: Mutex<Option<String>>,
    cursor: Mutex<(f64, f64)>,
}

impl WebDriverBackend {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            config,
            session: Mutex::new(None),
            cursor: Mutex::new((0.0, 0.0)),
        })
    }

    fn session_id(&self) -> Result<String, BackendError> {
        self.session
            .lock()
            .map_err(|_| BackendError::Protocol("session lock poisoned".into()))?
            .clone()
            .ok_or(BackendError::NotStarted)
    }

    fn set_session(&self, id: Option<String>) {
        if let Ok(mut guard) = self.session.lock() {
            *guard = id;
        }
    }

    fn cursor(&self) -> (f64, f64) {
        self.cursor.lock().map(|c| *c).unwrap_or((0.0, 0.0))
    }

    fn set_cursor(&self, x: f64, y: f64) {
        if let Ok(mut guard) = self.cursor.lock() {
            *guard = (x, y);
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.webdriver_url.trim_end_matches('/'), path)
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, BackendError> {
        debug!("webdriver {} {}", method, path);
        let mut req = self.http.request(method, self.url(path));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            // Proxies in front of the driver answer with HTML or plain text.
            let text = resp.text().await.unwrap_or_default();
            let detail = match serde_json::from_str::<Value>(&text) {
                Ok(payload) => {
                    let value = payload.get("value").cloned().unwrap_or(Value::Null);
                    let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
                    let message = value.get("message").and_then(Value::as_str).unwrap_or("");
                    format!("{error}: {message}")
                }
                Err(_) => text.trim().chars().take(200).collect(),
            };
            return Err(BackendError::Protocol(format!("{status} {detail}")));
        }
        let payload: Value = resp.json().await?;
        Ok(payload.get("value").cloned().unwrap_or(Value::Null))
    }

    async fn session_call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, BackendError> {
        let id = self.session_id()?;
        self.call(method, &format!("/session/{id}{path}"), body).await
    }

    async fn perform(&self, actions: Value) -> Result<(), BackendError> {
        self.session_call(Method::POST, "/actions", Some(json!({ "actions": [actions] })))
            .await?;
        Ok(())
    }

    async fn keys(&self, codes: &[String], down: bool) -> Result<(), BackendError> {
        if codes.is_empty() {
            return Ok(());
        }
        let kind = if down { "keyDown" } else { "keyUp" };
        let steps: Vec<Value> = codes
            .iter()
            .map(|c| json!({ "type": kind, "value": webdriver_key(c) }))
            .collect();
        self.perform(json!({ "type": "key", "id": "keyboard", "actions": steps }))
            .await
    }
}

fn pointer(actions: Vec<Value>) -> Value {
    json!({
        "type": "pointer",
        "id": "mouse",
        "parameters": { "pointerType": "mouse" },
        "actions": actions,
    })
}

fn pointer_move(x: f64, y: f64, duration: u64) -> Value {
    json!({
        "type": "pointerMove",
        "origin": "viewport",
        "duration": duration,
        "x": x.round() as i64,
        "y": y.round() as i64,
    })
}

fn hold_ms() -> u64 {
    rand::rng().random_range(50..=100)
}

#[async_trait]
impl Backend for WebDriverBackend {
    async fn start(&self) -> Result<(), BackendError> {
        if self.session_id().is_ok() {
            return Ok(());
        }
        let mut args = self.config.browser_args.clone();
        args.push(format!(
            "--window-size={},{}",
            self.config.viewport_width, self.config.viewport_height
        ));
        if self.config.headless {
            args.push("--headless=new".to_string());
        }
        let caps = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args },
                }
            }
        });
        let value = self.call(Method::POST, "/session", Some(caps)).await?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Protocol("new session response without sessionId".into()))?
            .to_string();
        info!("webdriver session {id} started");
        self.set_session(Some(id));

        self.session_call(
            Method::POST,
            "/window/rect",
            Some(json!({
                "width": self.config.viewport_width,
                "height": self.config.viewport_height,
            })),
        )
        .await?;
        Ok(())
    }

    async fn is_running(&self) -> bool {
        self.session_id().is_ok()
    }

    async fn navigate(&self, url: &str) -> Result<(), BackendError> {
        self.session_call(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BackendError> {
        let value = self.session_call(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| BackendError::Protocol("screenshot value is not a string".into()))?;
        Ok(BASE64.decode(encoded)?)
    }

    async fn move_to(&self, x: f64, y: f64) -> Result<(), BackendError> {
        self.perform(pointer(vec![pointer_move(x, y, 0)])).await?;
        self.set_cursor(x, y);
        Ok(())
    }

    async fn click(&self, x: f64, y: f64, opts: ClickOptions) -> Result<(), BackendError> {
        self.keys(&opts.modifiers, true).await?;
        let button = opts.button.code();
        let result = self
            .perform(pointer(vec![
                pointer_move(x, y, 0),
                json!({ "type": "pointerDown", "button": button }),
                json!({ "type": "pause", "duration": hold_ms() }),
                json!({ "type": "pointerUp", "button": button }),
            ]))
            .await;
        // Release modifiers even when the click failed.
        self.keys(&opts.modifiers, false).await?;
        result?;
        self.set_cursor(x, y);
        Ok(())
    }

    async fn mouse_down(&self, button: MouseButton) -> Result<(), BackendError> {
        self.perform(pointer(vec![
            json!({ "type": "pointerDown", "button": button.code() }),
        ]))
        .await
    }

    async fn mouse_up(&self, button: MouseButton) -> Result<(), BackendError> {
        self.perform(pointer(vec![
            json!({ "type": "pointerUp", "button": button.code() }),
        ]))
        .await
    }

    async fn drag(&self, x: f64, y: f64) -> Result<(), BackendError> {
        let (cx, cy) = self.cursor();
        self.perform(pointer(vec![
            pointer_move(cx, cy, 0),
            json!({ "type": "pointerDown", "button": 0 }),
            pointer_move(x, y, 200),
            json!({ "type": "pointerUp", "button": 0 }),
        ]))
        .await?;
        self.set_cursor(x, y);
        Ok(())
    }

    async fn scroll(&self, dy: f64) -> Result<(), BackendError> {
        let (cx, cy) = self.cursor();
        self.perform(json!({
            "type": "wheel",
            "id": "wheel",
            "actions": [{
                "type": "scroll",
                "origin": "viewport",
                "x": cx.round() as i64,
                "y": cy.round() as i64,
                "deltaX": 0,
                "deltaY": dy.round() as i64,
            }],
        }))
        .await
    }

    async fn type_text(&self, text: &str) -> Result<(), BackendError> {
        let mut steps = Vec::with_capacity(text.chars().count() * 2);
        for c in text.chars() {
            steps.push(json!({ "type": "keyDown", "value": c.to_string() }));
            steps.push(json!({ "type": "keyUp", "value": c.to_string() }));
        }
        self.perform(json!({ "type": "key", "id": "keyboard", "actions": steps }))
            .await
    }

    async fn press_key(&self, key: &KeySpec) -> Result<(), BackendError> {
        let mut steps = Vec::new();
        for m in &key.modifiers {
            steps.push(json!({ "type": "keyDown", "value": webdriver_key(m) }));
        }
        let value = webdriver_key(&key.key);
        steps.push(json!({ "type": "keyDown", "value": value }));
        steps.push(json!({ "type": "pause", "duration": hold_ms() }));
        steps.push(json!({ "type": "keyUp", "value": value }));
        for m in key.modifiers.iter().rev() {
            steps.push(json!({ "type": "keyUp", "value": webdriver_key(m) }));
        }
        self.perform(json!({ "type": "key", "id": "keyboard", "actions": steps }))
            .await
    }

    async fn close(&self) -> Result<(), BackendError> {
        let Ok(id) = self.session_id() else {
            return Ok(());
        };
        self.set_session(None);
        self.call(Method::DELETE, &format!("/session/{id}"), None)
            .await?;
        info!("webdriver session {id} closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::Arc;
    use tiny_http::{Response, Server};

    type Log = Arc<Mutex<Vec<(String, String, String)>>>;

    /// Minimal chromedriver: one session "s1", a fixed screenshot.
    fn fake_driver() -> (String, Log) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let url = format!("http://{}", server.server_addr());
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let seen = log.clone();
        std::thread::spawn(move || {
            for mut request in server.incoming_requests() {
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let method = request.method().to_string();
                let path = request.url().to_string();
                seen.lock().unwrap().push((method.clone(), path.clone(), body));
                let payload = match (method.as_str(), path.as_str()) {
                    ("POST", "/session") => r#"{"value":{"sessionId":"s1","capabilities":{}}}"#.to_string(),
                    ("GET", "/session/s1/screenshot") => {
                        format!(r#"{{"value":"{}"}}"#, BASE64.encode(b"not-really-a-png"))
                    }
                    _ if path.starts_with("/session/s1") => r#"{"value":null}"#.to_string(),
                    _ if path.starts_with("/session/behind-proxy") => {
                        let resp = Response::from_string("<html><body>502 Bad Gateway</body></html>")
                            .with_status_code(502);
                        let _ = request.respond(resp);
                        continue;
                    }
                    _ => {
                        let resp = Response::from_string(
                            r#"{"value":{"error":"invalid session id","message":"gone"}}"#,
                        )
                        .with_status_code(404);
                        let _ = request.respond(resp);
                        continue;
                    }
                };
                let _ = request.respond(Response::from_string(payload));
            }
        });
        (url, log)
    }

    fn backend(url: &str) -> WebDriverBackend {
        WebDriverBackend::new(BackendConfig {
            webdriver_url: url.to_string(),
            request_timeout_secs: 5,
            ..BackendConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn calls_before_start_fail_not_started() {
        let b = backend("http://127.0.0.1:9");
        assert!(matches!(b.screenshot().await, Err(BackendError::NotStarted)));
        assert!(matches!(b.navigate("http://x").await, Err(BackendError::NotStarted)));
        assert!(!b.is_running().await);
        b.close().await.unwrap();
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let (url, log) = fake_driver();
        let b = backend(&url);
        b.start().await.unwrap();
        assert!(b.is_running().await);

        b.navigate("http://localhost:8080").await.unwrap();
        assert_eq!(b.screenshot().await.unwrap(), b"not-really-a-png");
        b.close().await.unwrap();
        assert!(!b.is_running().await);

        let log = log.lock().unwrap();
        let paths: Vec<_> = log.iter().map(|(m, p, _)| format!("{m} {p}")).collect();
        assert_eq!(
            paths,
            vec![
                "POST /session",
                "POST /session/s1/window/rect",
                "POST /session/s1/url",
                "GET /session/s1/screenshot",
                "DELETE /session/s1",
            ]
        );
        assert!(log[0].2.contains("--headless=new"));
        assert!(log[0].2.contains("--window-size=700,475"));
    }

    #[tokio::test]
    async fn click_holds_modifiers_around_pointer_actions() {
        let (url, log) = fake_driver();
        let b = backend(&url);
        b.start().await.unwrap();
        b.click(
            120.4,
            40.6,
            ClickOptions {
                button: MouseButton::Right,
                modifiers: vec!["Shift".into()],
            },
        )
        .await
        .unwrap();

        let log = log.lock().unwrap();
        let actions: Vec<Value> = log
            .iter()
            .filter(|(_, p, _)| p == "/session/s1/actions")
            .map(|(_, _, body)| serde_json::from_str(body).unwrap())
            .collect();
        assert_eq!(actions.len(), 3);
        assert_eq!(actions[0]["actions"][0]["actions"][0]["type"], "keyDown");
        let clicks = &actions[1]["actions"][0]["actions"];
        assert_eq!(clicks[0]["x"], 120);
        assert_eq!(clicks[0]["y"], 41);
        assert_eq!(clicks[1]["button"], 2);
        let hold = clicks[2]["duration"].as_u64().unwrap();
        assert!((50..=100).contains(&hold));
        assert_eq!(actions[2]["actions"][0]["actions"][0]["type"], "keyUp");
    }

    #[tokio::test]
    async fn protocol_errors_carry_the_driver_message() {
        let (url, _log) = fake_driver();
        let b = backend(&url);
        b.set_session(Some("stale".into()));
        let err = b.screenshot().await.unwrap_err();
        assert!(err.to_string().contains("invalid session id"));
    }

    #[tokio::test]
    async fn non_json_error_bodies_keep_the_status() {
        let (url, _log) = fake_driver();
        let b = backend(&url);
        b.set_session(Some("behind-proxy".into()));
        let err = b.screenshot().await.unwrap_err();
        match err {
            BackendError::Protocol(msg) => {
                assert!(msg.starts_with("502"), "{msg}");
                assert!(msg.contains("Bad Gateway"), "{msg}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
