//! Typed projections over the configuration store
//!
//! Views read through the manager's getters and hold no state of their own;
//! build a fresh one whenever current values are needed.

use serde::Serialize;

use crate::manager::ConfigManager;

/// Application-wide settings under `app.*`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppSettings {
    pub name: String,
    pub version: String,
    /// Deployment environment, e.g. `development` or `production`
    pub env: String,
    pub debug: bool,
    pub max_retry: i32,
    pub cache: CacheSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheSettings {
    pub enabled: bool,
    pub size: i32,
    pub ttl_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSettings {
    pub level: String,
    pub path: String,
    pub retain_days: i32,
}

impl AppSettings {
    pub fn from_manager(config: &ConfigManager) -> Self {
        Self {
            name: config.get_or("app.name", "strata"),
            version: config.get_or("app.version", "1.0.0"),
            env: config.get_or("app.env", "development"),
            debug: config.get_bool("app.debug", true),
            max_retry: config.get_int("app.max.retry", 3),
            cache: CacheSettings {
                enabled: config.get_bool("app.cache.enabled", true),
                size: config.get_int("app.cache.size", 1000),
                ttl_secs: config.get_long("app.cache.ttl", 3600),
            },
            log: LogSettings {
                level: config.get_or("app.log.level", "INFO"),
                path: config.get_or("app.log.path", "./logs"),
                retain_days: config.get_int("app.log.retain.days", 30),
            },
        }
    }

    pub fn is_production(&self) -> bool {
        self.env.eq_ignore_ascii_case("production")
    }
}

/// Embedded web server settings under `web.*`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebSettings {
    pub port: u16,
    pub host: String,
    pub context_path: String,
    pub max_threads: i32,
    pub session_timeout_secs: i64,
    pub ssl_enabled: bool,
    pub cors_enabled: bool,
    pub cors_allowed_origins: Vec<String>,
}

impl WebSettings {
    pub const DEFAULT_PORT: u16 = 8080;

    pub fn from_manager(config: &ConfigManager) -> Self {
        let port = config.get_int("web.port", i32::from(Self::DEFAULT_PORT));
        Self {
            port: u16::try_from(port).unwrap_or(Self::DEFAULT_PORT),
            host: config.get_or("web.host", "0.0.0.0"),
            context_path: config.get_or("web.context.path", "/"),
            max_threads: config.get_int("web.max.threads", 100),
            session_timeout_secs: config.get_long("web.session.timeout", 1800),
            ssl_enabled: config.get_bool("web.ssl.enabled", false),
            cors_enabled: config.get_bool("web.cors.enabled", true),
            cors_allowed_origins: config.get_list("web.cors.allowed.origins", &["*"]),
        }
    }

    /// `host:port` to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL of the server, e.g. `http://0.0.0.0:8080/`
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl_enabled { "https" } else { "http" };
        let path = if self.context_path.starts_with('/') {
            self.context_path.clone()
        } else {
            format!("/{}", self.context_path)
        };
        format!("{scheme}://{}:{}{path}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merger::RawBag;
    use std::path::PathBuf;

    fn manager() -> ConfigManager {
        ConfigManager::builder()
            .with_files(Vec::<PathBuf>::new())
            .with_env_vars(Vec::<(String, String)>::new())
            .with_database(RawBag::new())
            .build()
            .unwrap()
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = manager();
        let app = AppSettings::from_manager(&config);
        assert_eq!(app.name, "strata");
        assert_eq!(app.max_retry, 3);
        assert_eq!(app.log.level, "INFO");
        assert!(app.cache.enabled);
        assert!(!app.is_production());

        let web = WebSettings::from_manager(&config);
        assert_eq!(web.port, 8080);
        assert_eq!(web.bind_address(), "0.0.0.0:8080");
        assert_eq!(web.cors_allowed_origins, vec!["*"]);
        assert_eq!(web.base_url(), "http://0.0.0.0:8080/");
    }

    #[test]
    fn test_views_read_current_values() {
        let config = manager();
        config.set("app.env", "Production").unwrap();
        config.set("web.port", "9443").unwrap();
        config.set("web.ssl.enabled", "true").unwrap();
        config.set("web.context.path", "api").unwrap();
        config
            .set("web.cors.allowed.origins", "https://a.example, https://b.example")
            .unwrap();

        assert!(AppSettings::from_manager(&config).is_production());
        let web = WebSettings::from_manager(&config);
        assert_eq!(web.base_url(), "https://0.0.0.0:9443/api");
        assert_eq!(web.cors_allowed_origins.len(), 2);
    }

    #[test]
    fn test_out_of_range_port_falls_back() {
        let config = manager();
        config.set("web.port", "70000").unwrap();
        assert_eq!(WebSettings::from_manager(&config).port, 8080);
    }
}
