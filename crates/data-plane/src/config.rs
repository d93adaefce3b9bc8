use std::time::Duration;

use anyhow::{Context, Result, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeBackend {
    Local,
    Kubernetes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryBackend {
    Memory,
    File,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub env: String,
    pub listen_addr: String,
    pub runtime_backend: RuntimeBackend,
    pub registry_backend: RegistryBackend,
    pub registry_path: Option<String>,
    pub auth_bypass: bool,
    pub workspace_root: String,
    pub session_ready_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env = std::env::var("ENV").context("ENV is required")?;
        let listen_addr =
            std::env::var("DATA_PLANE_ADDR").unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let runtime_backend = match std::env::var("SESSION_RUNTIME_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .as_str()
        {
            "local" => RuntimeBackend::Local,
            "k8s" => RuntimeBackend::Kubernetes,
            other => bail!("unknown SESSION_RUNTIME_BACKEND {other:?}"),
        };

        let registry_backend = match std::env::var("SESSION_REGISTRY_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .as_str()
        {
            "memory" => RegistryBackend::Memory,
            "file" => RegistryBackend::File,
            other => bail!("unknown SESSION_REGISTRY_BACKEND {other:?}"),
        };

        let registry_path = std::env::var("SESSION_REGISTRY_PATH").ok();
        let auth_bypass = std::env::var("SESSION_AGENT_AUTH_MODE")
            .map(|v| v == "bypass")
            .unwrap_or(false);
        let workspace_root =
            std::env::var("WORKSPACE_ROOT").unwrap_or_else(|_| "/workspace".to_string());

        let session_ready_timeout = Duration::from_secs(
            std::env::var("SESSION_READY_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        );
        let config = Config {
            env,
            listen_addr,
            runtime_backend,
            registry_backend,
            registry_path,
            auth_bypass,
            workspace_root,
            session_ready_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.env.is_empty() {
            bail!("ENV must not be empty");
        }
        if self.env == "production" && self.auth_bypass {
            bail!("SESSION_AGENT_AUTH_MODE=bypass is forbidden when ENV=production");
        }
        if self.registry_backend == RegistryBackend::File
            && self.registry_path.as_deref().unwrap_or("").is_empty()
        {
            bail!("SESSION_REGISTRY_PATH is required when SESSION_REGISTRY_BACKEND=file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "ENV",
            "DATA_PLANE_ADDR",
            "SESSION_RUNTIME_BACKEND",
            "SESSION_REGISTRY_BACKEND",
            "SESSION_REGISTRY_PATH",
            "SESSION_AGENT_AUTH_MODE",
            "WORKSPACE_ROOT",
            "SESSION_READY_TIMEOUT",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn file_backend_requires_path() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var("ENV", "local");
            std::env::set_var("SESSION_REGISTRY_BACKEND", "file");
        }
        assert!(Config::load().is_err());
    }

    #[test]
    fn defaults_are_sane() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var("ENV", "local");
        }
        let config = Config::load().unwrap();
        assert_eq!(config.runtime_backend, RuntimeBackend::Local);
        assert_eq!(config.registry_backend, RegistryBackend::Memory);
    }
}
