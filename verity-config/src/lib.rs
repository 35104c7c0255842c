//! Loader for service configuration with YAML + environment overlays.
//!
//! Sources are merged in this order, later ones winning:
//!
//! 1. the YAML file (optional or required, see [`VerityConfigLoader`])
//! 2. inline YAML snippets added with [`VerityConfigLoader::with_yaml_str`]
//! 3. `VERITY__SECTION__KEY` environment variables
//!
//! After merging, `${VAR}` placeholders anywhere in string values are
//! expanded from the process environment, recursively up to a fixed depth.
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use verity_common::observability::{LogConfig, LogFormat};
use verity_common::{GenerationParams, PrimingExchange, ProviderConfig};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct VerityConfig {
    #[serde(default)]
    pub server: ServerSettings,
    pub extraction: ExtractionSettings,
    pub classifier: ClassifierSettings,
    #[serde(default)]
    pub plausibility: PlausibilitySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Which model extracts the article and how it is primed.
///
/// The provider fields (`provider`, `model`, `api_key`, `base_url`) sit
/// directly in this section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionSettings {
    #[serde(flatten)]
    pub provider: ProviderConfig,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub generation: GenerationParams,
    #[serde(default)]
    pub priming: PrimingExchange,
}

impl ExtractionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierSettings {
    /// Full URL of the prediction route, e.g. `https://host/predict`.
    pub endpoint: String,
    /// Query parameter carrying the text.
    #[serde(default = "default_query_param")]
    pub query_param: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ClassifierSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlausibilitySettings {
    pub min_tokens: usize,
    pub min_overlap: f64,
}

impl Default for PlausibilitySettings {
    fn default() -> Self {
        Self {
            min_tokens: 10,
            min_overlap: 0.85,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub format: LogFormat,
    pub emit_stderr: bool,
    pub filter: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            emit_stderr: true,
            filter: "info".to_string(),
            log_dir: None,
        }
    }
}

impl LoggingSettings {
    pub fn to_log_config(&self, app_name: &'static str) -> LogConfig {
        LogConfig {
            app_name,
            log_dir: self.log_dir.clone(),
            emit_stderr: self.emit_stderr,
            format: self.format,
            default_filter: self.filter.clone(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3000".into()
}
fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_query_param() -> String {
    "text".into()
}

impl VerityConfig {
    /// Reject values that would only fail later, at request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn require(field: &str, value: &str) -> Result<(), ConfigError> {
            if value.trim().is_empty() {
                return Err(ConfigError::Message(format!("{field} must not be empty")));
            }
            if value.contains("${") {
                return Err(ConfigError::Message(format!(
                    "{field} has an unresolved placeholder: {value}"
                )));
            }
            Ok(())
        }

        require("server.bind", &self.server.bind)?;
        require("extraction.model", self.extraction.provider.model())?;
        require("extraction.api_key", self.extraction.provider.api_key())?;
        require("classifier.endpoint", &self.classifier.endpoint)?;
        require("classifier.query_param", &self.classifier.query_param)?;
        if let Some(token) = &self.classifier.auth_token {
            require("classifier.auth_token", token)?;
        }

        if !(0.0..=1.0).contains(&self.plausibility.min_overlap) {
            return Err(ConfigError::Message(format!(
                "plausibility.min_overlap must be within [0, 1], got {}",
                self.plausibility.min_overlap
            )));
        }
        if self.extraction.timeout_secs == 0 || self.classifier.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct VerityConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for VerityConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl VerityConfigLoader {
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a YAML/TOML/JSON file that must exist; the `config` crate
    /// infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent, so headless deployments can rely
    /// purely on environment variables.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    ///
    /// ```
    /// use verity_config::VerityConfigLoader;
    ///
    /// let cfg = VerityConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// extraction:
    ///   provider: gemini
    ///   model: gemini-2.0-flash
    ///   api_key: example
    /// classifier:
    ///   endpoint: https://classifier.example/predict
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.server.bind, "0.0.0.0:3000");
    /// assert_eq!(cfg.classifier.query_param, "text");
    /// assert_eq!(cfg.plausibility.min_tokens, 10);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self.builder.add_source(File::from_str(yaml, FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into strongly typed config.
    ///
    /// `VERITY__`-prefixed environment variables are applied last, then
    /// `${VAR}` placeholders are expanded and the result validated.
    ///
    /// ```
    /// use verity_common::ProviderConfig;
    /// use verity_config::VerityConfigLoader;
    ///
    /// unsafe { std::env::set_var("DOCTEST_GOOGLE_KEY", "injected-from-env"); }
    ///
    /// let config = VerityConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// extraction:
    ///   provider: gemini
    ///   model: gemini-2.0-flash
    ///   api_key: "${DOCTEST_GOOGLE_KEY}"
    /// classifier:
    ///   endpoint: https://classifier.example/predict
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// match &config.extraction.provider {
    ///     ProviderConfig::Gemini { api_key, base_url, .. } => {
    ///         assert_eq!(api_key, "injected-from-env");
    ///         assert!(base_url.is_none());
    ///     }
    ///     _ => panic!("expected Gemini configuration"),
    /// }
    ///
    /// unsafe { std::env::remove_var("DOCTEST_GOOGLE_KEY"); }
    /// ```
    pub fn load(self) -> Result<VerityConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix("VERITY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: VerityConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        typed.validate()?;

        Ok(typed)
    }
}
