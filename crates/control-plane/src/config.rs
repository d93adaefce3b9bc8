use std::time::Duration;

use anyhow::{Context, Result, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseDriver {
    Postgres,
    Sqlite,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub env: String,
    pub listen_addr: String,
    pub database_driver: DatabaseDriver,
    pub database_url: String,
    pub data_plane_addr: String,
    pub authz_bypass: bool,
    pub ttl_sweep_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env = std::env::var("ENV").context("ENV is required")?;
        let listen_addr =
            std::env::var("CONTROL_PLANE_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let database_driver = match std::env::var("DATABASE_DRIVER")
            .unwrap_or_else(|_| "sqlite".to_string())
            .as_str()
        {
            "postgres" => DatabaseDriver::Postgres,
            "sqlite" => DatabaseDriver::Sqlite,
            other => bail!("unknown DATABASE_DRIVER {other:?}"),
        };
        let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| match database_driver
        {
            DatabaseDriver::Postgres => String::new(),
            DatabaseDriver::Sqlite => "sqlite::memory:".to_string(),
        });

        let data_plane_addr = std::env::var("DATA_PLANE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8081".to_string());

        let authz_bypass = std::env::var("AUTHZ_BYPASS")
            .map(|v| v == "true")
            .unwrap_or(false);

        let ttl_sweep_interval = Duration::from_secs(
            std::env::var("SESSION_TTL_SWEEP_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        );

        let config = Config {
            env,
            listen_addr,
            database_driver,
            database_url,
            data_plane_addr,
            authz_bypass,
            ttl_sweep_interval,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.env.is_empty() {
            bail!("ENV must not be empty");
        }
        if self.env == "production" && self.authz_bypass {
            bail!("AUTHZ_BYPASS is forbidden when ENV=production");
        }
        if self.database_driver == DatabaseDriver::Postgres && self.database_url.is_empty() {
            bail!("DATABASE_URL is required when DATABASE_DRIVER=postgres");
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
            "CONTROL_PLANE_ADDR",
            "DATABASE_DRIVER",
            "DATABASE_URL",
            "DATA_PLANE_URL",
            "AUTHZ_BYPASS",
            "SESSION_TTL_SWEEP_INTERVAL_SECONDS",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn rejects_bypass_in_production() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var("ENV", "production");
            std::env::set_var("AUTHZ_BYPASS", "true");
        }
        assert!(Config::load().is_err());
    }

    #[test]
    fn postgres_requires_url() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var("ENV", "local");
            std::env::set_var("DATABASE_DRIVER", "postgres");
        }
        assert!(Config::load().is_err());
    }

    #[test]
    fn sqlite_defaults_to_in_memory() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var("ENV", "local");
        }
        let config = Config::load().unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
    }

    #[test]
    fn ttl_sweep_interval_overrides_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        unsafe {
            std::env::set_var("ENV", "local");
            std::env::set_var("SESSION_TTL_SWEEP_INTERVAL_SECONDS", "5");
        }
        let config = Config::load().unwrap();
        assert_eq!(config.ttl_sweep_interval, std::time::Duration::from_secs(5));
    }
}
