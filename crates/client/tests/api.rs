//! API client behavior against a minimal local HTTP responder: history
//! fetch, bearer auth, and the 401 refresh-and-retry path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use staynest_client::{ApiClient, CredentialProvider};
use staynest_shared::{AuthError, Notification};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve a fixed sequence of responses on a listener, recording the raw
/// request heads. Each connection gets one response, then is closed.
fn serve(
    listener: TcpListener,
    responses: Vec<(u16, &'static str)>,
    requests: Arc<Mutex<Vec<String>>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if n == 0 || buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            requests
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(&buf).into_owned());

            let reason = if status == 200 { "OK" } else { "Unauthorized" };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        }
    })
}

struct StubCredentials {
    token: Mutex<String>,
    refreshes: AtomicUsize,
}

#[async_trait]
impl CredentialProvider for StubCredentials {
    fn bearer_token(&self) -> Option<String> {
        Some(self.token.lock().unwrap().clone())
    }

    async fn refresh(&self) -> Result<String, AuthError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let fresh = "fresh-token".to_string();
        *self.token.lock().unwrap() = fresh.clone();
        Ok(fresh)
    }
}

#[tokio::test]
async fn fetches_persisted_history_with_bearer_auth() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));

    let body: &'static str = Box::leak(
        serde_json::to_string(&vec![Notification::new(
            "n-1",
            "booking_confirmed",
            "Booking confirmed",
            "See you soon.",
        )])
        .unwrap()
        .into_boxed_str(),
    );
    let server = serve(listener, vec![(200, body)], requests.clone());

    let credentials = Arc::new(StubCredentials {
        token: Mutex::new("stale-token".into()),
        refreshes: AtomicUsize::new(0),
    });
    let api = ApiClient::new()
        .with_base_url(format!("http://{addr}"))
        .with_credentials(credentials);

    let history = api.fetch_notifications().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, "n-1");

    server.await.unwrap();
    let head = requests.lock().unwrap()[0].clone();
    assert!(head.starts_with("GET /api/notifications"));
    assert!(head.contains("authorization: Bearer stale-token")
        || head.contains("Authorization: Bearer stale-token"));
}

#[tokio::test]
async fn retries_once_with_refreshed_credential_on_401() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));

    let server = serve(
        listener,
        vec![(401, r#"{"message":"Token expired"}"#), (200, "")],
        requests.clone(),
    );

    let credentials = Arc::new(StubCredentials {
        token: Mutex::new("stale-token".into()),
        refreshes: AtomicUsize::new(0),
    });
    let api = ApiClient::new()
        .with_base_url(format!("http://{addr}"))
        .with_credentials(credentials.clone());

    api.mark_all_read().await.unwrap();

    assert_eq!(credentials.refreshes.load(Ordering::SeqCst), 1);
    server.await.unwrap();

    let heads = requests.lock().unwrap().clone();
    assert_eq!(heads.len(), 2);
    assert!(heads[0].starts_with("PUT /api/notifications/read"));
    assert!(heads[1].contains("Bearer fresh-token"));
}
