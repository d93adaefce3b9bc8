use anyhow::{Context, Result, bail};

/// Session agent configuration. Entirely environment-driven per the
/// platform's external interface contract — there is no config file here,
/// only `ENV`/`SESSION_AGENT_*` variables read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub env: String,
    pub listen_addr: String,
    pub auth_token: Option<String>,
    pub auth_bypass: bool,
    pub workspace_root: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env = std::env::var("ENV").context("ENV is required")?;
        let listen_addr =
            std::env::var("SESSION_AGENT_ADDR").unwrap_or_else(|_| ":9000".to_string());
        let auth_token = std::env::var("SESSION_AGENT_AUTH_TOKEN").ok();
        let auth_bypass = std::env::var("SESSION_AGENT_AUTH_MODE")
            .map(|mode| mode == "bypass")
            .unwrap_or(false);
        let workspace_root =
            std::env::var("WORKSPACE_ROOT").unwrap_or_else(|_| "/workspace".to_string());

        let config = Config {
            env,
            listen_addr,
            auth_token,
            auth_bypass,
            workspace_root,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.env.is_empty() {
            bail!("ENV must not be empty");
        }
        if self.listen_addr.is_empty() {
            bail!("SESSION_AGENT_ADDR must not be empty");
        }
        if self.env == "production" && self.auth_bypass {
            bail!("SESSION_AGENT_AUTH_MODE=bypass is forbidden when ENV=production");
        }
        if !self.auth_bypass && self.auth_token.as_deref().unwrap_or("").is_empty() {
            bail!("SESSION_AGENT_AUTH_TOKEN is required unless auth mode is bypass");
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
            "SESSION_AGENT_ADDR",
            "SESSION_AGENT_AUTH_TOKEN",
            "SESSION_AGENT_AUTH_MODE",
            "WORKSPACE_ROOT",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn requires_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        assert!(Config::load().is_err());
    }

    #[test]
    fn rejects_bypass_in_production() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var("ENV", "production");
            std::env::set_var("SESSION_AGENT_AUTH_MODE", "bypass");
        }
        assert!(Config::load().is_err());
    }

    #[test]
    fn rejects_missing_token_when_enforced() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var("ENV", "local");
        }
        assert!(Config::load().is_err());
    }

    #[test]
    fn accepts_bypass_outside_production() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var("ENV", "local");
            std::env::set_var("SESSION_AGENT_AUTH_MODE", "bypass");
        }
        let config = Config::load().unwrap();
        assert!(config.auth_bypass);
    }
}
