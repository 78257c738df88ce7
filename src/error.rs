use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("request timed out")]
    Timeout,
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_status_is_exposed() {
        let err = Error::Api { status: 401, message: "expired".into() };
        assert_eq!(err.status(), Some(401));
        assert!(err.is_unauthorized());
    }

    #[test]
    fn non_http_errors_have_no_status() {
        assert_eq!(Error::Timeout.status(), None);
        assert!(!Error::NotAuthenticated.is_unauthorized());
        assert!(!Error::Api { status: 500, message: String::new() }.is_unauthorized());
    }
}
