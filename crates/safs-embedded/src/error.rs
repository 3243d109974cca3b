//! Error types for registry and handle operations.

use crate::result::{ResultCode, ServiceResult};

/// Errors returned by [`HandleRegistry`](crate::registry::HandleRegistry) operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Handle or service name was blank
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Name already in use, or the handle is already registered under another name
    #[error("Handle '{0}' is already registered")]
    DuplicateHandle(String),

    /// Service name already in use, or the handle already backs a service
    #[error("Service '{0}' is already registered")]
    DuplicateService(String),

    /// No handle registered under this name
    #[error("Handle '{0}' is not registered")]
    UnknownHandle(String),

    /// No service registered under this name
    #[error("Service '{0}' is not registered")]
    UnknownService(String),

    /// One or more handle queues could not be cleared
    #[error("Failed to clear queues of {} handle(s): {}", failed.len(), failed.join(", "))]
    ClearQueues {
        /// Ids of the handles whose clear failed
        failed: Vec<String>,
    },
}

impl RegistryError {
    /// Result code reported to service callers.
    pub fn result_code(&self) -> ResultCode {
        match self {
            RegistryError::InvalidArgument(_) => ResultCode::InvalidHandle,
            RegistryError::DuplicateHandle(_) | RegistryError::DuplicateService(_) => {
                ResultCode::HandleAlreadyExists
            }
            RegistryError::UnknownHandle(_) | RegistryError::UnknownService(_) => {
                ResultCode::ServiceNotAvailable
            }
            RegistryError::ClearQueues { .. } => ResultCode::UnknownError,
        }
    }
}

/// Errors returned by [`Handle`](crate::handle::Handle) routing operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    /// Registering the handle failed, or no route (in-process or native) exists
    #[error("Registration error: {0}")]
    Registration(String),

    /// Handle was unregistered and cannot be used again
    #[error("Handle '{0}' has been unregistered")]
    Retired(String),

    /// Target handle or service is not registered
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Target service answered with a failure code
    #[error("Request failed with {rc}: {message}")]
    Request {
        /// Code returned by the service
        rc: ResultCode,
        /// Payload returned by the service
        message: String,
    },
}

impl HandleError {
    /// Result code reported to service callers.
    pub fn result_code(&self) -> ResultCode {
        match self {
            HandleError::Registration(_) | HandleError::Retired(_) => {
                ResultCode::STAFRegistrationError
            }
            HandleError::ServiceUnavailable(_) => ResultCode::ServiceNotAvailable,
            HandleError::Request { rc, .. } => *rc,
        }
    }

    /// Non-throwing form of this error.
    pub fn to_service_result(&self) -> ServiceResult {
        match self {
            HandleError::Request { rc, message } => ServiceResult::new(*rc, message.clone()),
            other => ServiceResult::new(other.result_code(), other.to_string()),
        }
    }
}

impl From<RegistryError> for HandleError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownHandle(_) | RegistryError::UnknownService(_) => {
                HandleError::ServiceUnavailable(err.to_string())
            }
            other => HandleError::Registration(other.to_string()),
        }
    }
}

impl From<ServiceResult> for HandleError {
    fn from(result: ServiceResult) -> Self {
        HandleError::Request {
            rc: result.rc,
            message: result.result,
        }
    }
}
