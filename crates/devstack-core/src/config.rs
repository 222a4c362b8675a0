use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Readiness-probe settings for a managed process.
///
/// The probe issues an HTTP GET against `url` every `interval_ms` until a
/// 2xx response arrives or `timeout_ms` has elapsed. `initial_delay_ms` is
/// waited once before the first request, giving the service time to bind
/// its listener.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadinessConfig {
    pub url: String,

    /// Delay between probe attempts (in milliseconds)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Total budget for the probe (in milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// One-off delay before the first probe attempt (in milliseconds)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

impl ReadinessConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }

    /// Validate the configuration and return errors if invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "readiness url must be http or https: {}",
                self.url
            ));
        }

        if self.interval_ms == 0 {
            return Err(anyhow::anyhow!("interval_ms must be greater than zero"));
        }

        if self.timeout_ms < self.interval_ms {
            return Err(anyhow::anyhow!(
                "timeout_ms cannot be smaller than interval_ms"
            ));
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

/// Launch specification for one managed process.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(setter(into, strip_option))]
pub struct ProcessSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    #[builder(default)]
    #[builder(setter(custom))]
    pub args: Vec<String>,
    #[serde(default)]
    #[builder(default)]
    #[builder(setter(custom))]
    pub env: HashMap<String, String>,
    #[serde(default)]
    #[builder(default)]
    pub working_directory: Option<PathBuf>,
    /// When set, the supervisor waits for this probe before starting the
    /// next process.
    #[serde(default)]
    #[builder(default)]
    pub readiness: Option<ReadinessConfig>,
    /// Fixed delay after spawn before the process is assumed ready, used by
    /// processes without a readiness probe (in milliseconds).
    #[serde(default)]
    #[builder(default)]
    pub settle_delay_ms: u64,
}

impl ProcessSpec {
    pub fn builder() -> ProcessSpecBuilder {
        ProcessSpecBuilder::default()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.is_empty() {
            return Err(anyhow::anyhow!("process name cannot be empty"));
        }

        if self.command.is_empty() {
            return Err(anyhow::anyhow!(
                "process '{}' has an empty command",
                self.name
            ));
        }

        if let Some(readiness) = &self.readiness {
            readiness.validate()?;
        }

        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl ProcessSpecBuilder {
    pub fn args<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        let args: Vec<String> = iter.into_iter().map(|s| s.to_string()).collect();
        self.args = Some(args);
        self
    }

    pub fn env<T: ToString>(&mut self, key: T, value: T) -> &mut Self {
        let map = self.env.get_or_insert_with(HashMap::new);
        map.insert(key.to_string(), value.to_string());
        self
    }

    pub fn env_multi<T: ToString, I: IntoIterator<Item = (T, T)>>(&mut self, iter: I) -> &mut Self {
        let env = self.env.get_or_insert_with(HashMap::new);
        for (key, value) in iter {
            env.insert(key.to_string(), value.to_string());
        }
        self
    }
}

/// Full supervisor configuration: the two managed processes plus the
/// shutdown grace budget and the post-startup browser target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    pub backend: ProcessSpec,
    pub frontend: ProcessSpec,

    /// Per-process grace window before escalating to a forceful kill
    /// (in milliseconds)
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    /// URL opened in the default browser once both processes are up
    #[serde(default)]
    pub browser_url: Option<String>,
}

impl StackConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.backend.validate()?;
        self.frontend.validate()?;

        if self.grace_ms > 60_000 {
            return Err(anyhow::anyhow!("grace_ms should not exceed 60 seconds"));
        }

        if let Some(url) = &self.browser_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(anyhow::anyhow!("browser_url must be http or https: {url}"));
            }
        }

        Ok(())
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

impl Default for StackConfig {
    /// The stock development stack: a Flask API in `backend/` probed on its
    /// health endpoint, a Vite dev server in `frontend/` with a fixed
    /// settle delay.
    fn default() -> Self {
        let backend = ProcessSpec {
            name: "backend".to_string(),
            command: if cfg!(windows) { "python" } else { "python3" }.to_string(),
            args: vec!["server_enhanced.py".to_string()],
            env: HashMap::new(),
            working_directory: Some(PathBuf::from("backend")),
            readiness: Some(ReadinessConfig::new("http://127.0.0.1:5000/api/health")),
            settle_delay_ms: 0,
        };

        let frontend = ProcessSpec {
            name: "frontend".to_string(),
            command: if cfg!(windows) { "npm.cmd" } else { "npm" }.to_string(),
            args: vec!["run".to_string(), "dev".to_string()],
            env: HashMap::new(),
            working_directory: Some(PathBuf::from("frontend")),
            readiness: None,
            settle_delay_ms: default_settle_ms(),
        };

        Self {
            backend,
            frontend,
            grace_ms: default_grace_ms(),
            browser_url: Some("http://localhost:5173".to_string()),
        }
    }
}

// Default value functions for serde
fn default_interval_ms() -> u64 {
    500
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_initial_delay_ms() -> u64 {
    2_000
}
fn default_grace_ms() -> u64 {
    1_000
}
fn default_settle_ms() -> u64 {
    3_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stack_is_valid() {
        let config = StackConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grace_ms, 1_000);

        let readiness = config.backend.readiness.as_ref().unwrap();
        assert_eq!(readiness.interval_ms, 500);
        assert_eq!(readiness.timeout_ms, 30_000);
        assert!(config.frontend.readiness.is_none());
        assert_eq!(config.frontend.settle_delay_ms, 3_000);
    }

    #[test]
    fn builder_collects_args_and_env() {
        let spec = ProcessSpec::builder()
            .name("backend")
            .command("python3")
            .args(["server.py", "--debug"])
            .env("FLASK_ENV", "development")
            .build()
            .unwrap();

        assert_eq!(spec.args, vec!["server.py", "--debug"]);
        assert_eq!(
            spec.env.get("FLASK_ENV").map(String::as_str),
            Some("development")
        );
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn empty_command_is_rejected() {
        let spec = ProcessSpec {
            name: "backend".to_string(),
            ..Default::default()
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn readiness_bounds_are_checked() {
        let mut readiness = ReadinessConfig::new("http://127.0.0.1:5000/api/health");
        assert!(readiness.validate().is_ok());

        readiness.interval_ms = 0;
        assert!(readiness.validate().is_err());

        readiness.interval_ms = 5_000;
        readiness.timeout_ms = 1_000;
        assert!(readiness.validate().is_err());

        let readiness = ReadinessConfig::new("ftp://nope");
        assert!(readiness.validate().is_err());
    }

    #[test]
    fn toml_round_trip_with_defaults() {
        let text = r#"
            browser_url = "http://localhost:5173"

            [backend]
            name = "backend"
            command = "python3"
            args = ["server_enhanced.py"]
            working_directory = "backend"

            [backend.readiness]
            url = "http://127.0.0.1:5000/api/health"

            [frontend]
            name = "frontend"
            command = "npm"
            args = ["run", "dev"]
            working_directory = "frontend"
            settle_delay_ms = 3000
        "#;

        let config = StackConfig::from_toml_str(text).unwrap();
        assert_eq!(config.backend.command, "python3");
        assert_eq!(
            config.backend.readiness.as_ref().unwrap().interval_ms,
            default_interval_ms()
        );
        assert_eq!(config.grace_ms, default_grace_ms());
        assert_eq!(config.frontend.settle_delay_ms, 3_000);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = StackConfig::load(&dir.path().join("devstack.toml")).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(StackConfig::from_toml_str("backend = 1").is_err());
    }
}
