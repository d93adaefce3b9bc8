use std::time::Duration;

use contracts::{
    ApiError,
    session::{DataPlaneStepRequest, DataPlaneStepResponse, StartSessionRequest, StartSessionResponse},
};

/// The control plane's view of the data plane: start a session's runtime,
/// forward a step, tear it down. Distinct from `data-plane`'s own
/// `AgentClient`, which speaks to the session agent instead.
#[derive(Clone)]
pub struct DataPlaneClient {
    http: reqwest::Client,
    base_url: String,
}

impl DataPlaneClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("building reqwest client");
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub async fn start_session(&self, request: StartSessionRequest) -> Result<StartSessionResponse, ApiError> {
        let resp = self
            .http
            .post(format!("{}/sessions", self.base_url))
            .json(&request)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ApiError::upstream_unavailable(format!(
                "data plane returned {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    pub async fn run_step(
        &self,
        session_id: &str,
        request: DataPlaneStepRequest,
    ) -> Result<DataPlaneStepResponse, ApiError> {
        let resp = self
            .http
            .post(format!("{}/sessions/{session_id}/steps", self.base_url))
            .json(&request)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ApiError::runtime_unavailable(format!(
                "data plane returned {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    pub async fn terminate_session(&self, session_id: &str) -> Result<(), ApiError> {
        let resp = self
            .http
            .post(format!("{}/sessions/{session_id}/terminate", self.base_url))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ApiError::upstream_unavailable(format!(
                "data plane returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}
