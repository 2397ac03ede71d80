use aitoys_domain::config::{AuthConfig, AuthMode};
use aitoys_domain::{Error, Result};
use reqwest::RequestBuilder;

pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve the configured credential from its env var, then apply it to
/// the request the way the auth mode dictates.
pub fn apply_auth(req: RequestBuilder, auth: &AuthConfig) -> Result<RequestBuilder> {
    match auth.mode {
        AuthMode::None => Ok(req),
        AuthMode::ApiKey => {
            let key = resolve_env(auth)?;
            let header = auth.header.as_deref().unwrap_or("Authorization");
            let prefix = auth.prefix.as_deref().unwrap_or("Bearer ");
            Ok(req.header(header, format!("{prefix}{key}")))
        }
        AuthMode::QueryParam => {
            let key = resolve_env(auth)?;
            let param = auth.header.as_deref().unwrap_or("api_key");
            Ok(req.query(&[(param, key)]))
        }
    }
}

fn resolve_env(auth: &AuthConfig) -> Result<String> {
    let var = auth
        .env
        .as_deref()
        .ok_or_else(|| Error::Config("auth mode requires auth.env to be set".into()))?;
    std::env::var(var)
        .map_err(|_| Error::Config(format!("environment variable {var} is not set")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_mode_requires_no_credential() {
        let client = reqwest::Client::new();
        let req = client.get("https://example.test");
        let auth = AuthConfig {
            mode: AuthMode::None,
            ..Default::default()
        };
        assert!(apply_auth(req, &auth).is_ok());
    }

    #[test]
    fn api_key_mode_without_env_var_set_errors() {
        let client = reqwest::Client::new();
        let req = client.get("https://example.test");
        let auth = AuthConfig {
            mode: AuthMode::ApiKey,
            env: Some("AITOYS_TEST_UNSET_VAR_XYZ".into()),
            ..Default::default()
        };
        assert!(apply_auth(req, &auth).is_err());
    }
}
