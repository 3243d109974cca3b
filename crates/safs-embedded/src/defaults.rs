//! Default constants for the embedded services.
//!
//! Centralizes the names and limits shared by the registry, the
//! services and the configuration layer.

/// Default maximum number of messages a handle queue will hold.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Machine name used in request info for in-process routing.
pub const LOCAL_MACHINE: &str = "local";

/// Handle number reported by handles without a native transport.
pub const NO_NATIVE_HANDLE: i32 = -1;

/// Handle id under which the queue service registers.
pub const QUEUE_HANDLE_ID: &str = "STAF/Service/QUEUE";

/// Service name of the queue service.
pub const QUEUE_SERVICE_NAME: &str = "QUEUE";

/// Handle id under which the semaphore service registers.
pub const SEM_HANDLE_ID: &str = "STAF/Service/SEM";

/// Service name of the semaphore service.
pub const SEM_SERVICE_NAME: &str = "SEM";

/// Service name of the variable service.
pub const VAR_SERVICE_NAME: &str = "VAR";

/// Prefix of the handle id a service registers under when only its
/// service name is configured.
pub const SERVICE_HANDLE_PREFIX: &str = "STAF/Service/";
