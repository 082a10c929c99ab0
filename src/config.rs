//! Environment-driven configuration, with an optional `.env` file overlay.
//!
//! Grounded on `config/{global,const,setup,type,helper}.go` in the original
//! implementation: a flat set of `AICHATPROXY_`-prefixed env vars, a
//! comma-separated array convention for `API_KEYS`, and a per-subsystem
//! `*_DEBUG` toggle convention via [`Config::debug`].

use std::env;
use std::path::PathBuf;

pub const ENV_PREFIX: &str = "AICHATPROXY_";

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_nocolor: bool,
    pub server_addr: String,
    pub proxy_addr: String,
    pub api_keys: Vec<String>,
    pub webdriver_url: String,
    pub browser_profile_dir: PathBuf,
    pub certs_dir: PathBuf,
    pub downloads_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let base = directories::ProjectDirs::from("", "", "aichat-proxy")
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".aichat-proxy"));
        Self {
            log_level: "info".to_string(),
            log_nocolor: false,
            server_addr: "0.0.0.0:9540".to_string(),
            proxy_addr: "0.0.0.0:9541".to_string(),
            api_keys: Vec::new(),
            webdriver_url: "http://localhost:4444".to_string(),
            browser_profile_dir: base.join("profile"),
            certs_dir: base.join("certs"),
            downloads_dir: base.join("downloads"),
        }
    }
}

impl Config {
    /// Loads config from the process environment, after first merging in a
    /// `.env` file (if present and readable) via `dotenvy`.
    pub fn load() -> anyhow::Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env file"),
            Err(dotenvy::Error::Io(_)) => {}
            Err(e) => tracing::warn!(err = %e, "failed to parse .env file"),
        }

        let mut cfg = Config::default();
        if let Some(v) = env_var("LOG_LEVEL") {
            cfg.log_level = v;
        }
        if let Some(v) = env_var("LOG_NOCOLOR") {
            cfg.log_nocolor = parse_bool(&v);
        }
        if let Some(v) = env_var("SERVER_ADDR") {
            cfg.server_addr = v;
        }
        if let Some(v) = env_var("PROXY_ADDR") {
            cfg.proxy_addr = v;
        }
        if let Some(v) = env_var("API_KEYS") {
            cfg.api_keys = split_csv(&v);
        }
        if let Some(v) = env_var("WEBDRIVER_URL") {
            cfg.webdriver_url = v;
        }
        if let Some(v) = env_var("BROWSER_PROFILE_DIR") {
            cfg.browser_profile_dir = PathBuf::from(shellexpand::tilde(&v).into_owned());
        }
        if let Some(v) = env_var("CERTS_DIR") {
            cfg.certs_dir = PathBuf::from(shellexpand::tilde(&v).into_owned());
        }
        if let Some(v) = env_var("DOWNLOADS_DIR") {
            cfg.downloads_dir = PathBuf::from(shellexpand::tilde(&v).into_owned());
        }
        Ok(cfg)
    }

    /// Per-subsystem debug toggle: checks `<NAME>_DEBUG` first, then the
    /// blanket `DEBUG` var. Mirrors `config.DEBUG(name)` in the original.
    pub fn debug(name: &str) -> bool {
        if let Some(v) = env_var(&format!("{name}_DEBUG")) {
            return parse_bool(&v);
        }
        env_var("DEBUG").map(|v| parse_bool(&v)).unwrap_or(false)
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{key}")).ok().filter(|v| !v.is_empty())
}

fn parse_bool(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn split_csv(v: &str) -> Vec<String> {
    v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn split_csv_trims_and_drops_empty() {
        assert_eq!(split_csv(" a, b ,, c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn parse_bool_accepts_common_truthy_forms() {
        for v in ["1", "true", "TRUE", "yes", "on"] {
            assert!(parse_bool(v), "{v} should be truthy");
        }
        assert!(!parse_bool("0"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn debug_falls_back_to_blanket_toggle() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("AICHATPROXY_PROXY_DEBUG");
        env::set_var("AICHATPROXY_DEBUG", "true");
        assert!(Config::debug("PROXY"));
        env::remove_var("AICHATPROXY_DEBUG");
    }

    #[test]
    fn debug_prefers_subsystem_toggle_over_blanket() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("AICHATPROXY_DEBUG", "true");
        env::set_var("AICHATPROXY_PROXY_DEBUG", "false");
        assert!(!Config::debug("PROXY"));
        env::remove_var("AICHATPROXY_DEBUG");
        env::remove_var("AICHATPROXY_PROXY_DEBUG");
    }
}
