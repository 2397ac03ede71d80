mod admin;
mod modules;
mod observability;
mod quota;
mod server;
mod store;

pub use admin::*;
pub use modules::*;
pub use observability::*;
pub use quota::*;
pub use server::*;
pub use store::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub modules: ModulesConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. Runs once
    /// at startup, never on the hot path.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*" {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)".into(),
            });
        }

        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.requests_per_second".into(),
                    message: "requests_per_second must be greater than 0".into(),
                });
            }
            if rl.burst_size == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.burst_size".into(),
                    message: "burst_size must be greater than 0".into(),
                });
            }
        }

        if self.store.database_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "store.database_url".into(),
                message: "database_url must not be empty".into(),
            });
        }
        if self.store.max_connections == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "store.max_connections".into(),
                message: "max_connections must be greater than 0".into(),
            });
        }

        let mut seen: HashSet<(ModuleType, &str)> = HashSet::new();
        for (i, reg) in self.modules.registrations.iter().enumerate() {
            if reg.module_type.requires_base_url() && reg.base_url.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("modules.registrations[{i}].base_url"),
                    message: format!(
                        "module {}/{} requires a base_url",
                        reg.module_type.as_str(),
                        reg.code
                    ),
                });
            }
            if !reg.base_url.is_empty()
                && !reg.base_url.starts_with("http://")
                && !reg.base_url.starts_with("https://")
            {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("modules.registrations[{i}].base_url"),
                    message: format!(
                        "base_url must start with http:// or https:// (got \"{}\")",
                        reg.base_url
                    ),
                });
            }
            if !seen.insert((reg.module_type, reg.code.as_str())) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("modules.registrations[{i}]"),
                    message: format!(
                        "duplicate registration for {}/{} — later entry shadows earlier one",
                        reg.module_type.as_str(),
                        reg.code
                    ),
                });
            }

            let needs_credentials = matches!(reg.auth.mode, AuthMode::ApiKey | AuthMode::QueryParam);
            let has_env = reg.auth.env.as_ref().is_some_and(|v| !v.is_empty());
            if needs_credentials && !has_env {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("modules.registrations[{i}].auth"),
                    message: format!(
                        "module {}/{} uses {:?} auth mode but has no auth.env configured",
                        reg.module_type.as_str(),
                        reg.code,
                        reg.auth.mode
                    ),
                });
            }
        }

        if self.quota.max_daily_cost_usd_per_agent <= 0.0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "quota.max_daily_cost_usd_per_agent".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.quota.max_daily_calls_per_agent == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "quota.max_daily_calls_per_agent".into(),
                message: "must be greater than 0".into(),
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn default_config_has_no_errors() {
        let cfg = Config::default();
        let errors: Vec<_> = cfg
            .validate()
            .into_iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn zero_port_is_error() {
        let mut cfg = Config::default();
        cfg.server.port = 0;
        let issue = find_issue(&cfg.validate(), "server.port").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn wildcard_cors_is_warning_not_error() {
        let mut cfg = Config::default();
        cfg.server.cors.allowed_origins = vec!["*".into()];
        let issue = find_issue(&cfg.validate(), "server.cors").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn module_requiring_base_url_without_one_is_error() {
        let mut cfg = Config::default();
        cfg.modules.registrations.push(ModuleRegistrationConfig {
            module_type: ModuleType::Llm,
            code: "openai-compat".into(),
            base_url: String::new(),
            auth: AuthConfig::default(),
            timeout_ms: 20_000,
            default_model: None,
            extra: serde_json::json!({}),
        });
        let issue = find_issue(&cfg.validate(), "modules.registrations[0].base_url").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn vad_module_does_not_require_base_url() {
        let mut cfg = Config::default();
        cfg.modules.registrations.push(ModuleRegistrationConfig {
            module_type: ModuleType::Vad,
            code: "energy-threshold".into(),
            base_url: String::new(),
            auth: AuthConfig {
                mode: AuthMode::None,
                ..Default::default()
            },
            timeout_ms: 1_000,
            default_model: None,
            extra: serde_json::json!({}),
        });
        assert!(find_issue(&cfg.validate(), "modules.registrations[0]").is_none());
    }

    #[test]
    fn duplicate_module_registration_is_warning() {
        let mut cfg = Config::default();
        for _ in 0..2 {
            cfg.modules.registrations.push(ModuleRegistrationConfig {
                module_type: ModuleType::Tts,
                code: "azure".into(),
                base_url: "https://example.test".into(),
                auth: AuthConfig {
                    mode: AuthMode::None,
                    ..Default::default()
                },
                timeout_ms: 20_000,
                default_model: None,
                extra: serde_json::json!({}),
            });
        }
        let issue = find_issue(&cfg.validate(), "modules.registrations[1]").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn api_key_auth_without_env_is_error() {
        let mut cfg = Config::default();
        cfg.modules.registrations.push(ModuleRegistrationConfig {
            module_type: ModuleType::Asr,
            code: "azure-speech".into(),
            base_url: "https://example.test".into(),
            auth: AuthConfig {
                mode: AuthMode::ApiKey,
                env: None,
                ..Default::default()
            },
            timeout_ms: 20_000,
            default_model: None,
            extra: serde_json::json!({}),
        });
        let issue = find_issue(&cfg.validate(), "modules.registrations[0].auth").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }
}
