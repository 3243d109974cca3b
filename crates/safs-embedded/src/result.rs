//! Result codes and request/response records shared by every service.

use crate::defaults::LOCAL_MACHINE;
use std::fmt;

/// Closed set of status codes returned by handle and service operations.
///
/// The numeric values match the ones STAF uses, so results can be handed to
/// code that still branches on raw integers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// Operation succeeded
    Ok,
    /// Handle id was empty or otherwise unusable
    InvalidHandle,
    /// A handle with the same name is already registered
    HandleAlreadyExists,
    /// Unexpected internal failure, wrapped with a diagnostic
    UnknownError,
    /// Request string did not parse against the service grammar
    InvalidRequestString,
    /// Variable lookup failed
    VariableDoesNotExist,
    /// Registration with the registry or the native transport failed
    STAFRegistrationError,
    /// Target queue is at capacity
    QueueFull,
    /// Queue was empty and the caller asked not to wait
    NoQueueElement,
    /// Target handle or service is not registered
    ServiceNotAvailable,
    /// Named event or mutex does not exist
    SemaphoreDoesNotExist,
    /// Mutex release attempted by a handle that does not own it
    NotSemaphoreOwner,
    /// Event cannot be deleted while handles wait on it
    SemaphoreHasPendingRequests,
    /// Bounded wait elapsed
    Timeout,
    /// A request parameter had an invalid value
    InvalidParm,
    /// Blocking request was released before it could complete
    RequestNotComplete,
}

impl ResultCode {
    /// Numeric STAF return code.
    pub fn code(self) -> i32 {
        match self {
            ResultCode::Ok => 0,
            ResultCode::InvalidHandle => 3,
            ResultCode::HandleAlreadyExists => 4,
            ResultCode::UnknownError => 6,
            ResultCode::InvalidRequestString => 7,
            ResultCode::VariableDoesNotExist => 13,
            ResultCode::STAFRegistrationError => 26,
            ResultCode::QueueFull => 28,
            ResultCode::NoQueueElement => 29,
            ResultCode::ServiceNotAvailable => 33,
            ResultCode::SemaphoreDoesNotExist => 34,
            ResultCode::NotSemaphoreOwner => 35,
            ResultCode::SemaphoreHasPendingRequests => 36,
            ResultCode::Timeout => 37,
            ResultCode::InvalidParm => 42,
            ResultCode::RequestNotComplete => 45,
        }
    }

    /// Map a numeric code back, if it belongs to the closed set.
    pub fn from_code(code: i32) -> Option<Self> {
        let rc = match code {
            0 => ResultCode::Ok,
            3 => ResultCode::InvalidHandle,
            4 => ResultCode::HandleAlreadyExists,
            6 => ResultCode::UnknownError,
            7 => ResultCode::InvalidRequestString,
            13 => ResultCode::VariableDoesNotExist,
            26 => ResultCode::STAFRegistrationError,
            28 => ResultCode::QueueFull,
            29 => ResultCode::NoQueueElement,
            33 => ResultCode::ServiceNotAvailable,
            34 => ResultCode::SemaphoreDoesNotExist,
            35 => ResultCode::NotSemaphoreOwner,
            36 => ResultCode::SemaphoreHasPendingRequests,
            37 => ResultCode::Timeout,
            42 => ResultCode::InvalidParm,
            45 => ResultCode::RequestNotComplete,
            _ => return None,
        };
        Some(rc)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// Status code plus payload, the non-throwing form of every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResult {
    /// Status code
    pub rc: ResultCode,
    /// Result payload, or a diagnostic on failure
    pub result: String,
}

impl ServiceResult {
    /// Create a result with the given code and payload.
    pub fn new(rc: ResultCode, result: impl Into<String>) -> Self {
        Self {
            rc,
            result: result.into(),
        }
    }

    /// Successful result with an empty payload.
    pub fn ok() -> Self {
        Self::new(ResultCode::Ok, String::new())
    }

    /// Successful result carrying a payload.
    pub fn ok_with(result: impl Into<String>) -> Self {
        Self::new(ResultCode::Ok, result)
    }

    /// Failure with an empty payload.
    pub fn code(rc: ResultCode) -> Self {
        Self::new(rc, String::new())
    }

    /// Check whether the code is `Ok`.
    pub fn is_ok(&self) -> bool {
        self.rc == ResultCode::Ok
    }

    /// Convert into a `Result`, keeping the whole record on failure.
    pub fn into_result(self) -> Result<String, ServiceResult> {
        if self.is_ok() {
            Ok(self.result)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ServiceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.result.is_empty() {
            write!(f, "{}", self.rc)
        } else {
            write!(f, "{}: {}", self.rc, self.result)
        }
    }
}

/// Request record handed to a service's request handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    /// Machine the request originated from
    pub machine: String,
    /// Numeric native handle of the requester, or `-1`
    pub handle_number: i32,
    /// Name of the requesting handle
    pub handle_name: String,
    /// Raw request string
    pub request: String,
}

impl RequestInfo {
    /// Request originating on the local machine.
    pub fn local(handle_name: impl Into<String>, handle_number: i32, request: impl Into<String>) -> Self {
        Self {
            machine: LOCAL_MACHINE.to_string(),
            handle_number,
            handle_name: handle_name.into(),
            request: request.into(),
        }
    }
}

/// Startup record handed to a service's `init`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitInfo {
    /// Service name to register under
    pub name: String,
    /// Free-form service parameters
    pub parms: String,
}

impl InitInfo {
    /// Create init info for the named service.
    pub fn new(name: impl Into<String>, parms: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parms: parms.into(),
        }
    }
}
