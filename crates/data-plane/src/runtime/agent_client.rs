use std::time::Duration;

use contracts::session::{AuthMode, SessionRoute};
use contracts::session_agent::{
    SessionRegisterRequest, SessionRegisterResponse, SessionTerminateResponse, StepRequest,
    StepResult,
};
use thiserror::Error;
use tracing::debug;

const SESSION_TOKEN_HEADER: &str = "X-Session-Token";
const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum AgentClientError {
    #[error("agent request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("agent responded with status {0}")]
    Status(reqwest::StatusCode),
    #[error("agent unreachable after {0} attempts")]
    Exhausted(u32),
}

impl AgentClientError {
    fn is_retryable(&self) -> bool {
        match self {
            AgentClientError::Status(status) => {
                status.as_u16() == 429 || status.is_server_error()
            }
            AgentClientError::Transport(_) => true,
            AgentClientError::Exhausted(_) => false,
        }
    }
}

/// Talks to a session agent's HTTP surface on behalf of the data plane.
/// `run_step` retries with exponential backoff; registration and
/// termination are single-shot since they happen once per session
/// lifecycle and the caller already waited for `/v1/health`.
#[derive(Clone)]
pub struct AgentClient {
    http: reqwest::Client,
}

impl AgentClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("building reqwest client");
        Self { http }
    }

    fn token_header(route: &SessionRoute) -> Option<(&'static str, String)> {
        match route.auth_mode {
            AuthMode::Bypass => None,
            AuthMode::Enforced => Some((SESSION_TOKEN_HEADER, route.token.clone())),
        }
    }

    pub async fn wait_for_health(
        &self,
        endpoint: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let healthy = self
                .http
                .get(format!("{endpoint}/v1/health"))
                .send()
                .await
                .map(|resp| resp.status().is_success())
                .unwrap_or(false);
            if healthy {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    pub async fn register_session(
        &self,
        route: &SessionRoute,
        request: SessionRegisterRequest,
    ) -> Result<SessionRegisterResponse, AgentClientError> {
        let mut builder = self
            .http
            .post(format!("{}/v1/sessions", route.endpoint))
            .json(&request);
        if let Some((name, value)) = Self::token_header(route) {
            builder = builder.header(name, value);
        }
        let resp = builder.send().await?;
        if !resp.status().is_success() {
            return Err(AgentClientError::Status(resp.status()));
        }
        Ok(resp.json().await?)
    }

    pub async fn terminate_session(
        &self,
        route: &SessionRoute,
        session_id: &str,
    ) -> Result<SessionTerminateResponse, AgentClientError> {
        let mut builder = self
            .http
            .post(format!("{}/v1/sessions/{session_id}/terminate", route.endpoint));
        if let Some((name, value)) = Self::token_header(route) {
            builder = builder.header(name, value);
        }
        let resp = builder.send().await?;
        if !resp.status().is_success() {
            return Err(AgentClientError::Status(resp.status()));
        }
        Ok(resp.json().await?)
    }

    async fn run_step_once(
        &self,
        route: &SessionRoute,
        request: &StepRequest,
    ) -> Result<StepResult, AgentClientError> {
        let mut builder = self
            .http
            .post(format!("{}/v1/steps", route.endpoint))
            .json(request);
        if let Some((name, value)) = Self::token_header(route) {
            builder = builder.header(name, value);
        }
        let resp = builder.send().await?;
        if !resp.status().is_success() {
            return Err(AgentClientError::Status(resp.status()));
        }
        Ok(resp.json().await?)
    }

    pub async fn run_step(
        &self,
        route: &SessionRoute,
        request: StepRequest,
    ) -> Result<StepResult, AgentClientError> {
        let mut delay = BASE_DELAY;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.run_step_once(route, &request).await {
                Ok(result) => return Ok(result),
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying step");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(err) if err.is_retryable() => {
                    return Err(AgentClientError::Exhausted(MAX_ATTEMPTS));
                }
                Err(err) => return Err(err),
            }
        }
        Err(AgentClientError::Exhausted(MAX_ATTEMPTS))
    }
}

impl Default for AgentClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
    use contracts::session_agent::{Runtime, StepStatus};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn spawn_server(fail_count: u32) -> String {
        let counter = Arc::new(AtomicU32::new(0));
        let app = Router::new()
            .route(
                "/v1/steps",
                post(move |_state: State<()>, _req: Json<StepRequest>| {
                    let counter = counter.clone();
                    async move {
                        let attempt = counter.fetch_add(1, Ordering::SeqCst);
                        if attempt < fail_count {
                            return Err::<Json<StepResult>, StatusCode>(StatusCode::SERVICE_UNAVAILABLE);
                        }
                        Ok(Json(StepResult {
                            step_id: "step-1".to_string(),
                            status: StepStatus::Completed,
                            exit_code: Some(0),
                            stdout: "ok".to_string(),
                            stderr: String::new(),
                        }))
                    }
                }),
            )
            .with_state(());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn route(endpoint: String) -> SessionRoute {
        SessionRoute {
            runtime_id: "local-1".to_string(),
            runtime: Runtime::Python,
            endpoint,
            token: String::new(),
            auth_mode: AuthMode::Bypass,
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let endpoint = spawn_server(2).await;
        let client = AgentClient::new();
        let result = client
            .run_step(
                &route(endpoint),
                StepRequest {
                    session_id: "s-1".to_string(),
                    step_id: "step-1".to_string(),
                    code: "print(1)".to_string(),
                    runtime: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(result.stdout, "ok");
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let endpoint = spawn_server(10).await;
        let client = AgentClient::new();
        let result = client
            .run_step(
                &route(endpoint),
                StepRequest {
                    session_id: "s-1".to_string(),
                    step_id: "step-1".to_string(),
                    code: "print(1)".to_string(),
                    runtime: None,
                },
            )
            .await;
        assert!(matches!(result, Err(AgentClientError::Exhausted(3))));
    }
}
