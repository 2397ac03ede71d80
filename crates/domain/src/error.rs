/// Shared error type used across all gateway crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database: {0}")]
    Database(String),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("module {module}: {message}")]
    Module {
        module: String,
        message: String,
        retriable: bool,
    },

    #[error("auth: {0}")]
    Auth(String),

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("session busy")]
    BusyDropped,

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The closed set of error kinds a user-visible frame/response is classified
/// into (see the error handling design). Every `Error` maps to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    Protocol,
    BusyDropped,
    ProviderTransient,
    ProviderFatal,
    Internal,
    Timeout,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Protocol => "protocol",
            ErrorKind::BusyDropped => "busy_dropped",
            ErrorKind::ProviderTransient => "provider_transient",
            ErrorKind::ProviderFatal => "provider_fatal",
            ErrorKind::Internal => "internal",
            ErrorKind::Timeout => "timeout",
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Auth(_) => ErrorKind::Auth,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::BusyDropped => ErrorKind::BusyDropped,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Module { retriable, .. } => {
                if *retriable {
                    ErrorKind::ProviderTransient
                } else {
                    ErrorKind::ProviderFatal
                }
            }
            Error::Io(_) | Error::Json(_) | Error::Database(_) | Error::Http(_)
            | Error::Config(_) | Error::Other(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_error_classifies_by_retriable_flag() {
        let transient = Error::Module {
            module: "llm".into(),
            message: "connection reset".into(),
            retriable: true,
        };
        assert_eq!(transient.kind(), ErrorKind::ProviderTransient);

        let fatal = Error::Module {
            module: "llm".into(),
            message: "invalid api key".into(),
            retriable: false,
        };
        assert_eq!(fatal.kind(), ErrorKind::ProviderFatal);
    }

    #[test]
    fn infra_errors_classify_as_internal() {
        assert_eq!(Error::Config("bad port".into()).kind(), ErrorKind::Internal);
        assert_eq!(Error::Other("oops".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn kind_as_str_matches_wire_taxonomy() {
        assert_eq!(ErrorKind::BusyDropped.as_str(), "busy_dropped");
        assert_eq!(ErrorKind::ProviderFatal.as_str(), "provider_fatal");
    }
}
