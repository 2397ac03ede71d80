//! Module registry: constructs every configured `(type, code)` module pair
//! and exposes them behind the uniform `Module` call surface.

use std::collections::HashMap;
use std::sync::Arc;

use aitoys_domain::config::{ModuleRegistrationConfig, ModuleType, ModulesConfig};
use aitoys_domain::trace::TraceEvent;

use crate::module::{Module, ModuleFactory};

/// Mask substrings that look like API keys or bearer tokens before they
/// reach a log line or a readiness response.
pub(crate) fn mask_secrets(msg: &str) -> String {
    let mut result = msg.to_string();
    for word in msg.split(|c: char| c.is_whitespace() || c == '\'' || c == '"' || c == ',') {
        let trimmed = word.trim();
        if trimmed.len() >= 20
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            let masked = if trimmed.len() > 8 {
                format!("{}...{}", &trimmed[..4], &trimmed[trimmed.len() - 4..])
            } else {
                "***masked***".to_string()
            };
            result = result.replace(trimmed, &masked);
        }
    }
    result
}

#[derive(Debug, Clone)]
pub struct ModuleInitError {
    pub module_type: ModuleType,
    pub code: String,
    pub message: String,
    pub retriable: bool,
}

pub struct ModuleRegistry {
    modules: HashMap<(ModuleType, String), Arc<dyn Module>>,
    init_errors: Vec<ModuleInitError>,
}

impl ModuleRegistry {
    /// Construct and initialize every registration in `config`, skipping
    /// (not aborting on) any that fail to init.
    pub async fn build(
        config: &ModulesConfig,
        factories: &HashMap<ModuleType, Arc<dyn ModuleFactory>>,
    ) -> Self {
        let mut modules: HashMap<(ModuleType, String), Arc<dyn Module>> = HashMap::new();
        let mut init_errors = Vec::new();

        for reg in &config.registrations {
            let result = Self::construct_one(reg, factories).await;
            match result {
                Ok(module) => {
                    tracing::info!(
                        module_type = reg.module_type.as_str(),
                        code = %reg.code,
                        "registered module"
                    );
                    modules.insert((reg.module_type, reg.code.clone()), Arc::from(module));
                }
                Err(e) => {
                    let retriable = matches!(e.kind(), aitoys_domain::ErrorKind::ProviderTransient);
                    let safe_error = mask_secrets(&e.to_string());
                    TraceEvent::ModuleInitFailed {
                        module_type: reg.module_type.as_str().to_string(),
                        module_code: reg.code.clone(),
                        message: safe_error.clone(),
                        retriable,
                    }
                    .emit();
                    init_errors.push(ModuleInitError {
                        module_type: reg.module_type,
                        code: reg.code.clone(),
                        message: safe_error,
                        retriable,
                    });
                }
            }
        }

        Self {
            modules,
            init_errors,
        }
    }

    async fn construct_one(
        reg: &ModuleRegistrationConfig,
        factories: &HashMap<ModuleType, Arc<dyn ModuleFactory>>,
    ) -> aitoys_domain::Result<Box<dyn Module>> {
        let factory = factories.get(&reg.module_type).ok_or_else(|| {
            aitoys_domain::Error::Config(format!(
                "no factory registered for module type {:?}",
                reg.module_type
            ))
        })?;
        factory.create(reg).await
    }

    pub fn get(&self, module_type: ModuleType, code: &str) -> Option<Arc<dyn Module>> {
        self.modules.get(&(module_type, code.to_string())).cloned()
    }

    pub fn init_errors(&self) -> &[ModuleInitError] {
        &self.init_errors
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_secrets_redacts_long_alphanumeric_tokens() {
        let masked = mask_secrets("request failed with key sk-abcdefghijklmnopqrstuvwxyz1234");
        assert!(!masked.contains("sk-abcdefghijklmnopqrstuvwxyz1234"));
        assert!(masked.contains("..."));
    }

    #[test]
    fn mask_secrets_leaves_short_words_alone() {
        let masked = mask_secrets("connection refused to host");
        assert_eq!(masked, "connection refused to host");
    }
}
