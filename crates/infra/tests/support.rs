//! Shared fixtures for the infra integration suites.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use icalsync_infra::http::HttpClient;
use icalsync_infra::integrations::google::AuthorizationNotifier;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use url::Url;
use wiremock::{Request, Respond, ResponseTemplate};

/// Client without retries or backoff, so mock expectations count exactly.
pub fn fast_http() -> HttpClient {
    HttpClient::builder()
        .max_attempts(1)
        .base_backoff(Duration::ZERO)
        .timeout(Duration::from_secs(5))
        .build()
        .expect("http client should build")
}

/// Token endpoint body as Google returns it.
pub fn token_body(access_token: &str, refresh_token: Option<&str>, expires_in: u64) -> Value {
    let mut body = json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in,
        "scope": "https://www.googleapis.com/auth/calendar",
    });
    if let Some(refresh_token) = refresh_token {
        body["refresh_token"] = json!(refresh_token);
    }
    body
}

/// Authorization URL surfaced to the operator.
#[derive(Debug, Clone)]
pub struct AuthorizationPrompt {
    pub user_id: String,
    pub url: Url,
}

impl AuthorizationPrompt {
    pub fn query(&self, name: &str) -> Option<String> {
        self.url.query_pairs().find(|(key, _)| key == name).map(|(_, value)| value.into_owned())
    }

    pub fn state(&self) -> String {
        self.query("state").expect("authorization URL carries a state")
    }
}

/// Forwards authorization prompts to the test instead of the log.
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<AuthorizationPrompt>,
}

impl ChannelNotifier {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<AuthorizationPrompt>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { sender }), receiver)
    }
}

#[async_trait]
impl AuthorizationNotifier for ChannelNotifier {
    async fn authorization_required(&self, user_id: &str, _user_email: &str, url: &Url) {
        let _ = self
            .sender
            .send(AuthorizationPrompt { user_id: user_id.to_string(), url: url.clone() });
    }
}

pub async fn next_prompt(
    receiver: &mut mpsc::UnboundedReceiver<AuthorizationPrompt>,
) -> AuthorizationPrompt {
    tokio::time::timeout(Duration::from_secs(5), receiver.recv())
        .await
        .expect("authorization prompt should arrive")
        .expect("notifier should stay alive")
}

/// Play the browser redirect against the callback listener.
pub async fn hit_callback(addr: SocketAddr, query: &str) -> String {
    let url = format!("http://{addr}/google-calendar-auth-callback?{query}");
    let response = reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("client")
        .get(url)
        .send()
        .await
        .expect("callback request should succeed");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    response.text().await.expect("callback body")
}

/// Mock batch endpoint answering every part with a fixed status, keeping the
/// bodies it received.
#[derive(Clone)]
pub struct BatchResponder {
    statuses: Arc<Mutex<Vec<u16>>>,
    received: Arc<Mutex<Vec<String>>>,
}

impl BatchResponder {
    /// Every part succeeds.
    pub fn ok() -> Self {
        Self::with_statuses(Vec::new())
    }

    /// Part `i` answers `statuses[i]`, 200 beyond the list.
    pub fn with_statuses(statuses: Vec<u16>) -> Self {
        Self { statuses: Arc::new(Mutex::new(statuses)), received: Arc::default() }
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

impl Respond for BatchResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body = String::from_utf8_lossy(&request.body).into_owned();
        let parts = body.matches("Content-ID: <item").count();
        self.received.lock().unwrap().push(body);

        let statuses = self.statuses.lock().unwrap().clone();
        let mut response = String::new();
        for index in 0..parts {
            let status = statuses.get(index).copied().unwrap_or(200);
            let payload = if status < 300 {
                "{}".to_string()
            } else {
                json!({ "error": { "code": status, "message": format!("item {index} rejected") } })
                    .to_string()
            };
            response.push_str(&format!(
                "--batch_resp\r\nContent-Type: application/http\r\nContent-ID: <response-item{}>\r\n\r\nHTTP/1.1 {status} X\r\nContent-Type: application/json\r\n\r\n{payload}\r\n",
                index + 1
            ));
        }
        response.push_str("--batch_resp--\r\n");

        ResponseTemplate::new(200)
            .set_body_raw(response.into_bytes(), "multipart/mixed; boundary=batch_resp")
    }
}

/// Minimal iCalendar document with one all-day event.
pub fn holiday_feed(uid: &str, summary: &str) -> String {
    format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\nBEGIN:VEVENT\r\nUID:{uid}\r\nDTSTAMP:20240101T000000Z\r\nDTSTART;VALUE=DATE:20240101\r\nDTEND;VALUE=DATE:20240102\r\nSUMMARY:{summary}\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n"
    )
}
