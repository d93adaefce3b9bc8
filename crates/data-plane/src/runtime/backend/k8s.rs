use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use contracts::Runtime;
use k8s_openapi::api::core::v1::{Container, EmptyDirVolumeSource, EnvVar, Pod, Volume, VolumeMount};
use kube::{
    Api, Client,
    api::{DeleteParams, ObjectMeta, PostParams},
};
use tracing::warn;

use super::{BackendError, IsolationBackend, ProvisionedUnit};

#[derive(Debug, Clone)]
pub struct KubernetesConfig {
    pub namespace: String,
    pub runtime_class: Option<String>,
    pub python_image: String,
    pub node_image: String,
    pub fallback_image: String,
    pub ready_timeout: Duration,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            runtime_class: None,
            python_image: "python:3.12-slim".to_string(),
            node_image: "node:20-alpine".to_string(),
            fallback_image: "busybox:1.36".to_string(),
            ready_timeout: Duration::from_secs(60),
        }
    }
}

pub struct KubernetesBackend {
    client: Client,
    config: KubernetesConfig,
}

impl KubernetesBackend {
    pub async fn connect(config: KubernetesConfig) -> Result<Self, BackendError> {
        let client = Client::try_default()
            .await
            .map_err(|err| BackendError::Provision(err.to_string()))?;
        Ok(Self { client, config })
    }

    fn image_for_runtime(&self, runtime: Runtime) -> &str {
        match runtime {
            Runtime::Python => &self.config.python_image,
            Runtime::Node => &self.config.node_image,
        }
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    /// Polls the pod's status until phase=Running and condition
    /// PodReady=True, returning its pod IP. Mirrors the agent HTTP health
    /// poll's cadence (500ms) but at the Kubernetes API level, one layer
    /// below it.
    async fn wait_for_pod_ready(&self, pod_name: &str) -> Result<String, BackendError> {
        let deadline = tokio::time::Instant::now() + self.config.ready_timeout;
        loop {
            let pod = self
                .pods()
                .get(pod_name)
                .await
                .map_err(|err| BackendError::Provision(err.to_string()))?;

            let status = pod.status.as_ref();
            let phase_running = status.and_then(|s| s.phase.as_deref()) == Some("Running");
            let pod_ready = status
                .and_then(|s| s.conditions.as_ref())
                .map(|conditions| {
                    conditions
                        .iter()
                        .any(|c| c.type_ == "Ready" && c.status == "True")
                })
                .unwrap_or(false);

            if phase_running && pod_ready {
                if let Some(ip) = status.and_then(|s| s.pod_ip.clone()) {
                    return Ok(ip);
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(BackendError::NotReady);
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}

#[async_trait]
impl IsolationBackend for KubernetesBackend {
    async fn provision(
        &self,
        session_id: &str,
        runtime: Runtime,
        _workspace_dir: &str,
        auth_bypass: bool,
        auth_token: Option<&str>,
    ) -> Result<ProvisionedUnit, BackendError> {
        let pod_name = format!("session-{session_id}");
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "sandbox-session".to_string());
        labels.insert("session_id".to_string(), session_id.to_string());

        let mut env = vec![
            EnvVar {
                name: "ENV".to_string(),
                value: Some("production".to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "SESSION_AGENT_ADDR".to_string(),
                value: Some(":9000".to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "WORKSPACE_ROOT".to_string(),
                value: Some("/workspace".to_string()),
                ..Default::default()
            },
        ];
        if auth_bypass {
            env.push(EnvVar {
                name: "SESSION_AGENT_AUTH_MODE".to_string(),
                value: Some("bypass".to_string()),
                ..Default::default()
            });
        } else if let Some(token) = auth_token {
            env.push(EnvVar {
                name: "SESSION_AGENT_AUTH_TOKEN".to_string(),
                value: Some(token.to_string()),
                ..Default::default()
            });
        }

        let pod = Pod {
            metadata: ObjectMeta {
                name: Some(pod_name.clone()),
                namespace: Some(self.config.namespace.clone()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: Some(k8s_openapi::api::core::v1::PodSpec {
                runtime_class_name: self.config.runtime_class.clone(),
                restart_policy: Some("Never".to_string()),
                containers: vec![Container {
                    name: "session-agent".to_string(),
                    image: Some(self.image_for_runtime(runtime).to_string()),
                    env: Some(env),
                    volume_mounts: Some(vec![VolumeMount {
                        name: "workspace".to_string(),
                        mount_path: "/workspace".to_string(),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }],
                volumes: Some(vec![Volume {
                    name: "workspace".to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        self.pods()
            .create(&PostParams::default(), &pod)
            .await
            .map_err(|err| BackendError::Provision(err.to_string()))?;

        let pod_ip = self.wait_for_pod_ready(&pod_name).await?;

        Ok(ProvisionedUnit {
            runtime_id: pod_name,
            endpoint: format!("http://{pod_ip}:9000"),
        })
    }

    async fn destroy(&self, unit: &ProvisionedUnit) -> Result<(), BackendError> {
        let params = DeleteParams {
            grace_period_seconds: Some(5),
            ..Default::default()
        };
        match self.pods().delete(&unit.runtime_id, &params).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
            Err(err) => {
                warn!(error = %err, pod = %unit.runtime_id, "failed to delete session pod");
                Err(BackendError::Destroy(err.to_string()))
            }
        }
    }

    async fn ready_timeout(&self) -> Duration {
        self.config.ready_timeout
    }
}
