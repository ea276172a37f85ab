use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Runtime(#[from] core_runtime::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),
}

impl CoreError {
    /// True when the host should send the user back to the entry page.
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, CoreError::Auth(e) if e.is_session_terminal())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use core_auth::AuthError;

    #[test]
    fn test_requires_sign_in() {
        let expired: CoreError = AuthError::SessionExpired {
            reason: "revoked".to_string(),
        }
        .into();
        assert!(expired.requires_sign_in());

        let business: CoreError = AuthError::Business {
            status: 404,
            body: String::new(),
        }
        .into();
        assert!(!business.requires_sign_in());

        let config: CoreError = core_runtime::Error::Config("bad".to_string()).into();
        assert!(!config.requires_sign_in());
        assert_eq!(config.to_string(), "Configuration error: bad");
    }
}
