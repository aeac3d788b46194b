use std::fmt::Debug;

use thiserror::Error as ThisError;

use crate::AsStatusError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    /// The API server refused a request or could not be reached
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },
    /// Operator configuration or a resource spec value that can not be used as given
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("{0}")]
    UserInput(String),
    #[error("Unnamed k8s object")]
    UnnamedObject,
    /// A managed child reported a failure condition
    #[error("{kind} {name} failed: {reason}")]
    ChildFailed {
        kind: &'static str,
        name: String,
        reason: String,
    },
    #[error("Failed to (de)serialize object: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("RwLock poisoned: {0}")]
    RwLockPoisoned(String),
    #[error("Failed to emit event: {0}")]
    EmitEventFailed(String),
}

impl Error {
    /// Whether the API server answered with `404 Not Found`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(response) } if response.code == 404)
    }
}

/// The status message of a failed pass is the error text as is.
impl AsStatusError<String> for Error {
    fn as_status_error(&self) -> String {
        self.to_string()
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(error: std::sync::PoisonError<T>) -> Self {
        Error::RwLockPoisoned(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, RwLock};

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "test error".to_string(),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_kube_error_conversion() {
        // Given: A kube::Error
        let kube_err = api_error(400, "BadRequest");

        // When: Converting to Error
        let error: Error = kube_err.into();

        // Then: Should be Kube variant
        assert!(matches!(error, Error::Kube { .. }));
        assert!(error.to_string().contains("Kubernetes reported error"));
    }

    #[test]
    fn test_not_found_is_detected() {
        // Given: A 404 and a 409 api error
        let not_found: Error = api_error(404, "NotFound").into();
        let conflict: Error = api_error(409, "Conflict").into();

        // Then: Only the 404 is reported as not found
        assert!(not_found.is_not_found());
        assert!(!conflict.is_not_found());
        assert!(!Error::UnnamedObject.is_not_found());
    }

    #[test]
    fn test_configuration_error_display() {
        // Given: An invalid quantity
        let error = Error::Configuration("quantity \"5Gx\" is not valid".to_string());

        // Then: The message names the problem
        assert_eq!(error.to_string(), "Invalid configuration: quantity \"5Gx\" is not valid");
    }

    #[test]
    fn test_child_failed_display() {
        // Given: A failing deployment
        let error = Error::ChildFailed {
            kind: "Deployment",
            name: "example-postgresql".to_string(),
            reason: "FailedCreate".to_string(),
        };

        // Then: Kind, name and reason are reported
        assert_eq!(error.to_string(), "Deployment example-postgresql failed: FailedCreate");
    }

    #[test]
    fn test_serde_error_conversion() {
        // Given: A broken json document
        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();

        // When: Converting to Error
        let error: Error = serde_err.into();

        // Then: Should be Serialization variant
        assert!(matches!(error, Error::Serialization(_)));
    }

    #[test]
    fn test_poison_error_conversion() {
        // Given: A poisoned RwLock
        let lock = Arc::new(RwLock::new(42));
        let lock_clone = Arc::clone(&lock);

        let _ = std::panic::catch_unwind(|| {
            let mut guard = lock_clone.write().unwrap();
            *guard = 100;
            panic!("poisoning the lock");
        });

        // When: Trying to acquire the poisoned lock
        let result = lock.read();
        assert!(result.is_err());
        let error: Error = result.unwrap_err().into();

        // Then: Should be RwLockPoisoned error
        match error {
            Error::RwLockPoisoned(msg) => assert!(msg.contains("poison")),
            _ => panic!("Expected RwLockPoisoned, got {:?}", error),
        }
    }
}
