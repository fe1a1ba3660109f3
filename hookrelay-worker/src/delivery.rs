/// HTTP delivery executor
///
/// Executes one task delivery: builds the request from the task's
/// declaration (method, URL, headers, optional basic auth, payload on POST),
/// sends it with a bounded timeout, and classifies the result. A response
/// with a 2xx status counts as success; every other status, network error,
/// or timeout counts as error. The response body is truncated for storage.
///
/// Delivery failures are outcomes, not errors: they feed the retry state
/// machine instead of bubbling up the call stack.

use std::time::Duration;

use hookrelay_shared::models::task::{AttemptOutcome, Task};

/// Storage cap for response bodies
pub const MAX_RESPONSE_BYTES: usize = 8 * 1024;

/// Result of one delivery
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Success (2xx) or error (everything else)
    pub outcome: AttemptOutcome,

    /// HTTP status code; 0 when no response was received
    pub status_code: i32,

    /// Response body truncated to [`MAX_RESPONSE_BYTES`], or the transport
    /// error text when no response was received
    pub response: String,
}

/// Executes task deliveries over a shared HTTP client
#[derive(Debug, Clone)]
pub struct HttpDeliverer {
    /// Shared HTTP client (connection pooling)
    client: reqwest::Client,

    /// Per-request timeout
    timeout: Duration,
}

impl HttpDeliverer {
    /// Creates a deliverer with the given per-request timeout
    pub fn new(timeout: Duration) -> Self {
        HttpDeliverer {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Delivers one attempt of a task
    ///
    /// Never fails: transport-level problems come back as an error outcome
    /// with `status_code = 0` and the error text as the response.
    pub async fn deliver(&self, task: &Task) -> Delivery {
        let method = match task.method.parse::<reqwest::Method>() {
            Ok(method) => method,
            Err(_) => {
                return Delivery {
                    outcome: AttemptOutcome::Error,
                    status_code: 0,
                    response: format!("invalid HTTP method: {}", task.method),
                }
            }
        };

        let mut request = self
            .client
            .request(method.clone(), &task.url)
            .timeout(self.timeout);

        if let Some(headers) = task.headers.as_object() {
            for (key, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(key.as_str(), value);
                }
            }
        }

        if let Some(username) = &task.auth_username {
            request = request.basic_auth(username, task.auth_password.as_deref());
        }

        if method == reqwest::Method::POST && !task.payload.is_empty() {
            request = request.body(task.payload.clone());
        }

        match request.send().await {
            Ok(response) => {
                let status_code = i32::from(response.status().as_u16());
                let success = response.status().is_success();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<unreadable body>".to_string());

                let outcome = if success {
                    AttemptOutcome::Success
                } else {
                    tracing::warn!(
                        task_id = %task.id,
                        url = %task.url,
                        status_code,
                        "Delivery returned non-2xx status"
                    );
                    AttemptOutcome::Error
                };

                Delivery {
                    outcome,
                    status_code,
                    response: truncate_response(body),
                }
            }
            Err(e) => {
                tracing::warn!(
                    task_id = %task.id,
                    url = %task.url,
                    error = %e,
                    "Delivery failed before a response was received"
                );
                Delivery {
                    outcome: AttemptOutcome::Error,
                    status_code: 0,
                    response: truncate_response(e.to_string()),
                }
            }
        }
    }
}

/// Truncates a response body to [`MAX_RESPONSE_BYTES`], respecting char
/// boundaries.
fn truncate_response(mut body: String) -> String {
    if body.len() <= MAX_RESPONSE_BYTES {
        return body;
    }
    let mut cut = MAX_RESPONSE_BYTES;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    body.truncate(cut);
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use uuid::Uuid;

    fn test_task(url: String) -> Task {
        Task {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            application: "default".to_string(),
            name: "notify".to_string(),
            queue: "default".to_string(),
            url,
            method: "POST".to_string(),
            headers: serde_json::json!({}),
            payload: "ping".to_string(),
            auth_username: None,
            auth_password: None,
            schedule: String::new(),
            at: 0,
            status: "pending".to_string(),
            active: true,
            deleted: false,
            executed: 0,
            executions: 0,
            errors: 0,
            last_error: 0,
            last_success: 0,
            retry_max_attempts: 10,
            retry_factor: 2,
            retry_min: 10,
            retry_max: 300,
            retry_attempts: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// One-shot HTTP endpoint answering every request with a fixed status
    /// and body.
    async fn spawn_endpoint(status_line: &'static str, body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}/hook")
    }

    #[test]
    fn test_truncate_short_body_unchanged() {
        let body = "ok".to_string();
        assert_eq!(truncate_response(body), "ok");
    }

    #[test]
    fn test_truncate_caps_long_body() {
        let body = "x".repeat(MAX_RESPONSE_BYTES + 100);
        assert_eq!(truncate_response(body).len(), MAX_RESPONSE_BYTES);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        // 3-byte chars straddle the cap; the cut must land on a boundary
        let body = "€".repeat(MAX_RESPONSE_BYTES / 3 + 10);
        let truncated = truncate_response(body);
        assert!(truncated.len() <= MAX_RESPONSE_BYTES);
        assert!(truncated.chars().all(|c| c == '€'));
    }

    #[tokio::test]
    async fn test_deliver_success_on_2xx() {
        let url = spawn_endpoint("200 OK", "accepted").await;
        let deliverer = HttpDeliverer::new(Duration::from_secs(5));

        let delivery = deliverer.deliver(&test_task(url)).await;
        assert_eq!(delivery.outcome, AttemptOutcome::Success);
        assert_eq!(delivery.status_code, 200);
        assert_eq!(delivery.response, "accepted");
    }

    #[tokio::test]
    async fn test_deliver_error_on_5xx() {
        let url = spawn_endpoint("500 Internal Server Error", "boom").await;
        let deliverer = HttpDeliverer::new(Duration::from_secs(5));

        let delivery = deliverer.deliver(&test_task(url)).await;
        assert_eq!(delivery.outcome, AttemptOutcome::Error);
        assert_eq!(delivery.status_code, 500);
        assert_eq!(delivery.response, "boom");
    }

    #[tokio::test]
    async fn test_deliver_error_on_connection_refused() {
        // Bind then drop the listener so the port is closed
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let deliverer = HttpDeliverer::new(Duration::from_secs(5));
        let delivery = deliverer
            .deliver(&test_task(format!("http://{addr}/hook")))
            .await;
        assert_eq!(delivery.outcome, AttemptOutcome::Error);
        assert_eq!(delivery.status_code, 0);
        assert!(!delivery.response.is_empty());
    }

    #[tokio::test]
    async fn test_deliver_error_on_invalid_method() {
        let deliverer = HttpDeliverer::new(Duration::from_secs(5));
        let mut task = test_task("http://127.0.0.1:1/hook".to_string());
        task.method = "NOT A METHOD".to_string();

        let delivery = deliverer.deliver(&task).await;
        assert_eq!(delivery.outcome, AttemptOutcome::Error);
        assert_eq!(delivery.status_code, 0);
        assert!(delivery.response.contains("invalid HTTP method"));
    }
}
