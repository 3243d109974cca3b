//! Embedded QUEUE service
//!
//! Text front end over the registry's handle queues:
//!
//! ```text
//! QUEUE [NAME <name>] MESSAGE <text>
//! GET   [NAME <name>] [WAIT [<millis>]]
//! ```
//!
//! `NAME` defaults to the service's own handle. `WAIT` absent means no wait,
//! `WAIT` without a value waits forever, `WAIT <millis>` waits that long.

use crate::command::{CommandParser, ParsedCommand, ValuePolicy};
use crate::defaults::{QUEUE_HANDLE_ID, QUEUE_SERVICE_NAME};
use crate::fifo::WaitPolicy;
use crate::handle::Handle;
use crate::registry::HandleRegistry;
use crate::result::{InitInfo, RequestInfo, ResultCode, ServiceResult};
use crate::service::{RequestHandler, ServiceEndpoint, ServiceState};
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Verb: put a message on a queue
pub const COMMAND_QUEUE: &str = "QUEUE";
/// Verb: take a message from a queue
pub const COMMAND_GET: &str = "GET";
/// Target handle name
pub const OPTION_NAME: &str = "NAME";
/// Wait policy for GET
pub const OPTION_WAIT: &str = "WAIT";
/// Message text for QUEUE
pub const OPTION_MESSAGE: &str = "MESSAGE";

fn queue_parser() -> CommandParser {
    let mut parser = CommandParser::new();
    parser
        .add_option(COMMAND_QUEUE, 1, ValuePolicy::Allowed)
        .add_option(COMMAND_GET, 1, ValuePolicy::Allowed)
        .add_option(OPTION_NAME, 1, ValuePolicy::Allowed)
        .add_option(OPTION_WAIT, 1, ValuePolicy::Allowed)
        .add_option(OPTION_MESSAGE, 1, ValuePolicy::Required)
        .add_option_group("QUEUE GET", 1, 1)
        .add_option_need(COMMAND_QUEUE, OPTION_MESSAGE)
        .add_option_need(OPTION_MESSAGE, COMMAND_QUEUE);
    parser
}

/// In-process stand-in for the STAF QUEUE service.
pub struct EmbeddedQueueService {
    registry: Arc<HandleRegistry>,
    handle_id: String,
    service_name: RwLock<String>,
    parser: CommandParser,
    state: Mutex<ServiceState>,
    endpoint: Mutex<Option<Arc<ServiceEndpoint>>>,
}

impl EmbeddedQueueService {
    /// Create the service under the default handle id.
    pub fn new(registry: &Arc<HandleRegistry>) -> Arc<Self> {
        Self::with_handle_id(registry, QUEUE_HANDLE_ID)
    }

    /// Create the service under a custom handle id.
    pub fn with_handle_id(registry: &Arc<HandleRegistry>, handle_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            registry: registry.clone(),
            handle_id: handle_id.into(),
            service_name: RwLock::new(QUEUE_SERVICE_NAME.to_string()),
            parser: queue_parser(),
            state: Mutex::new(ServiceState::Uninitialized),
            endpoint: Mutex::new(None),
        })
    }

    /// Handle id the service registers under, and the default queue
    pub fn handle_id(&self) -> &str {
        &self.handle_id
    }

    /// Service name given at `init`
    pub fn service_name(&self) -> String {
        self.service_name.read().clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    /// The service's own handle, once initialized
    pub fn handle(&self) -> Option<Arc<Handle>> {
        self.endpoint.lock().as_ref().map(|endpoint| endpoint.handle().clone())
    }

    /// Register the service endpoint and start accepting requests.
    ///
    /// Always reports `Ok`: a failed registration, such as a second queue
    /// service in the same registry, is logged and the service still serves
    /// requests addressed to it directly.
    pub fn init(self: &Arc<Self>, info: &InitInfo) -> ServiceResult {
        let name = info.name.trim();
        let name = if name.is_empty() { QUEUE_SERVICE_NAME } else { name };
        *self.service_name.write() = name.to_string();

        debug!("Queue service registering handle '{}' for service '{}'", self.handle_id, name);
        let endpoint = ServiceEndpoint::new(
            &self.registry,
            self.handle_id.clone(),
            name,
            self.clone() as Arc<dyn RequestHandler>,
        );
        if let Err(err) = endpoint.register() {
            warn!("Queue service '{}' continuing unregistered: {}", name, err);
        }
        *self.endpoint.lock() = Some(endpoint);
        *self.state.lock() = ServiceState::Initialized;
        ServiceResult::ok()
    }

    fn queue(&self, parsed: &ParsedCommand) -> ServiceResult {
        let Some(message) = parsed.option_value(OPTION_MESSAGE) else {
            return ServiceResult::code(ResultCode::InvalidParm);
        };
        match self.target_handle(parsed) {
            Ok(handle) => handle.accept_queue_message(message),
            Err(result) => result,
        }
    }

    fn get(&self, parsed: &ParsedCommand) -> ServiceResult {
        let policy = match parsed.option_value(OPTION_WAIT) {
            None => WaitPolicy::NoWait,
            Some(wait) if wait.trim().is_empty() => WaitPolicy::Forever,
            Some(wait) => match wait.trim().parse::<u64>() {
                Ok(ms) => WaitPolicy::millis(ms),
                Err(_) => {
                    return ServiceResult::new(
                        ResultCode::InvalidParm,
                        format!("WAIT must be a non-negative number of milliseconds, got '{}'", wait),
                    )
                }
            },
        };
        match self.target_handle(parsed) {
            Ok(handle) => handle.get_queue_message(policy),
            Err(result) => result,
        }
    }

    fn target_handle(&self, parsed: &ParsedCommand) -> Result<Arc<Handle>, ServiceResult> {
        let name = parsed
            .option_value(OPTION_NAME)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.handle_id.as_str());
        self.registry
            .get_handle(name)
            .map_err(|err| ServiceResult::new(ResultCode::InvalidParm, err.to_string()))
    }

    /// Clear every queue in the registry and unregister the service.
    pub fn terminate(&self) -> ServiceResult {
        debug!("Queue service terminating, unregistering '{}'", self.handle_id);
        *self.state.lock() = ServiceState::Terminated;
        if let Err(err) = self.registry.clear_all_queues() {
            warn!("Queue service terminate: {}", err);
        }
        if let Some(endpoint) = self.endpoint.lock().take() {
            endpoint.unregister();
        }
        ServiceResult::ok()
    }
}

impl RequestHandler for EmbeddedQueueService {
    fn accept_request(&self, info: &RequestInfo) -> ServiceResult {
        let state = self.state();
        if state != ServiceState::Initialized {
            return ServiceResult::new(
                ResultCode::ServiceNotAvailable,
                format!("queue service is {:?}", state),
            );
        }
        debug!("Queue service request from '{}': {}", info.handle_name, info.request);

        let parsed = match self.parser.parse(&info.request) {
            Ok(parsed) => parsed,
            Err(err) => return ServiceResult::new(ResultCode::InvalidRequestString, err.to_string()),
        };
        if parsed.option_times(COMMAND_QUEUE) > 0 {
            self.queue(&parsed)
        } else if parsed.option_times(COMMAND_GET) > 0 {
            self.get(&parsed)
        } else {
            ServiceResult::new(ResultCode::InvalidRequestString, info.request.clone())
        }
    }

    fn terminate_service(&self) -> ServiceResult {
        self.terminate()
    }
}
