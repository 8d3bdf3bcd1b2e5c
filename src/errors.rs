use std::fmt;

/// Hard errors that surface to the caller, each with a process exit code
#[derive(Debug)]
pub enum HealerError {
    /// Request rejected before any pipeline work (exit code 2)
    InvalidRequest(String),
    /// Referenced healing record does not exist (exit code 3)
    NotFound(String),
    /// Healing memory could not be read or written (exit code 4)
    Storage(String),
    /// Configuration could not be built (exit code 5)
    Config(String),
    /// Generic error (exit code 1)
    Other(anyhow::Error),
}

impl HealerError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            HealerError::InvalidRequest(_) => 2,
            HealerError::NotFound(_) => 3,
            HealerError::Storage(_) => 4,
            HealerError::Config(_) => 5,
            HealerError::Other(_) => 1,
        }
    }
}

impl fmt::Display for HealerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealerError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            HealerError::NotFound(msg) => write!(f, "Not found: {}", msg),
            HealerError::Storage(msg) => write!(f, "Healing memory error: {}", msg),
            HealerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            HealerError::Other(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for HealerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HealerError::Other(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for HealerError {
    fn from(err: anyhow::Error) -> Self {
        // Handlers wrap library errors in anyhow; recover the typed error when present
        match err.downcast::<HealerError>() {
            Ok(healer_err) => healer_err,
            Err(err) => HealerError::Other(err),
        }
    }
}

impl From<std::io::Error> for HealerError {
    fn from(err: std::io::Error) -> Self {
        HealerError::Storage(err.to_string())
    }
}
