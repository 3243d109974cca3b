//! Named endpoints with an inbound message queue
//!
//! A [`Handle`] registers itself on first use, routes synchronous requests
//! to services found in its registry, and exchanges fire-and-forget queue
//! messages with other handles. When a request cannot be routed in-process,
//! the `*_to` forms fall back to an optional native transport.

use crate::defaults::NO_NATIVE_HANDLE;
use crate::error::HandleError;
use crate::fifo::{Fifo, FifoError, WaitPolicy};
use crate::registry::HandleRegistry;
use crate::result::{RequestInfo, ResultCode, ServiceResult};
use crate::service::ServiceEndpoint;
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, Weak};

/// External messaging transport used when no in-process route exists.
pub trait NativeTransport: Send + Sync {
    /// Numeric handle assigned by the transport
    fn handle_number(&self) -> i32;

    /// Send a request and return the status pair.
    fn submit2(&self, machine: &str, handler: &str, request: &str) -> ServiceResult;

    /// Send a request and return the payload, or the failed status pair.
    fn submit(&self, machine: &str, handler: &str, request: &str) -> Result<String, ServiceResult> {
        self.submit2(machine, handler, request).into_result()
    }

    /// Release the transport's handle.
    fn unregister(&self) -> Result<(), String>;
}

/// Opens a native transport for a handle when it registers.
pub trait NativeConnector: Send + Sync {
    /// Open a transport for the handle named `handle_id`.
    fn connect(&self, handle_id: &str) -> Result<Arc<dyn NativeTransport>, String>;
}

/// Registration lifecycle of a handle
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HandleState {
    /// Not yet in the registry
    Unregistered,
    /// In the registry
    Registered,
    /// Unregistered explicitly; the handle cannot be registered again
    Retired,
}

/// A uniquely named in-process endpoint owning one message queue.
pub struct Handle {
    id: String,
    registry: Arc<HandleRegistry>,
    queue: Fifo<String>,
    state: Mutex<HandleState>,
    native: RwLock<Option<Arc<dyn NativeTransport>>>,
    /// Set when the handle belongs to a service endpoint, which changes how it registers.
    service: Option<Weak<ServiceEndpoint>>,
}

impl Handle {
    /// Create an unregistered handle named `id` in `registry`.
    pub fn new(registry: &Arc<HandleRegistry>, id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(registry, id.into(), None))
    }

    /// Create the handle owned by a service endpoint.
    pub(crate) fn bound(
        registry: &Arc<HandleRegistry>,
        id: String,
        service: Weak<ServiceEndpoint>,
    ) -> Arc<Self> {
        Arc::new(Self::build(registry, id, Some(service)))
    }

    fn build(registry: &Arc<HandleRegistry>, id: String, service: Option<Weak<ServiceEndpoint>>) -> Self {
        Self {
            id,
            registry: registry.clone(),
            queue: Fifo::with_capacity(registry.queue_capacity()),
            state: Mutex::new(HandleState::Unregistered),
            native: RwLock::new(None),
            service,
        }
    }

    /// Handle name
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Registry this handle routes through
    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    /// Current lifecycle state
    pub fn state(&self) -> HandleState {
        *self.state.lock()
    }

    /// Check if the handle is registered
    pub fn is_registered(&self) -> bool {
        self.state() == HandleState::Registered
    }

    /// Numeric handle of the native transport, or `-1` without one.
    pub fn handle_number(&self) -> i32 {
        self.native
            .read()
            .as_ref()
            .map_or(NO_NATIVE_HANDLE, |native| native.handle_number())
    }

    /// Attach a native transport explicitly.
    pub fn set_native_transport(&self, transport: Arc<dyn NativeTransport>) {
        *self.native.write() = Some(transport);
    }

    fn native_transport(&self) -> Option<Arc<dyn NativeTransport>> {
        self.native.read().clone()
    }

    /// Register with the registry. A no-op when already registered.
    pub fn register(self: &Arc<Self>) -> Result<(), HandleError> {
        let mut state = self.state.lock();
        match *state {
            HandleState::Registered => return Ok(()),
            HandleState::Retired => return Err(HandleError::Retired(self.id.clone())),
            HandleState::Unregistered => {}
        }

        match &self.service {
            Some(service) => {
                let endpoint = service.upgrade().ok_or_else(|| {
                    HandleError::Registration(format!("service endpoint of handle '{}' is gone", self.id))
                })?;
                self.registry
                    .register_service(&self.id, endpoint.service_id(), endpoint.clone())?;
            }
            // Someone may already have put this very handle in the registry.
            None if self.registry.is_registered_as(&self.id, self) => {}
            None => self.registry.register_handle(&self.id, self.clone())?,
        }

        *state = HandleState::Registered;
        drop(state);
        self.connect_native();
        Ok(())
    }

    fn connect_native(&self) {
        if self.native.read().is_some() {
            return;
        }
        let Some(connector) = self.registry.native_connector() else {
            return;
        };
        match connector.connect(&self.id) {
            Ok(transport) => *self.native.write() = Some(transport),
            Err(err) => warn!("Handle '{}' continues without native transport: {}", self.id, err),
        }
    }

    fn request_info(&self, request: &str) -> RequestInfo {
        RequestInfo::local(self.id.clone(), self.handle_number(), request)
    }

    /// Send a request to an in-process service and return its payload.
    ///
    /// `handler` names a service, or a handle bound to a service.
    pub fn submit(self: &Arc<Self>, handler: &str, request: &str) -> Result<String, HandleError> {
        let result = self.submit2(handler, request)?;
        result.into_result().map_err(HandleError::from)
    }

    /// Send a request to an in-process service and return the status pair
    /// without turning a failure code into an error.
    pub fn submit2(self: &Arc<Self>, handler: &str, request: &str) -> Result<ServiceResult, HandleError> {
        self.register()?;
        let endpoint = self.registry.resolve_service(handler)?;
        debug!("Handle '{}' submitting to '{}': {}", self.id, handler, request);
        Ok(endpoint.accept_request(&self.request_info(request)))
    }

    /// Like [`submit`](Self::submit), falling back to the native transport
    /// when `handler` is not registered in-process.
    pub fn submit_to(self: &Arc<Self>, machine: &str, handler: &str, request: &str) -> Result<String, HandleError> {
        self.register()?;
        match self.submit(handler, request) {
            Err(HandleError::ServiceUnavailable(reason)) => {
                debug!("Handle '{}' trying native route: {}", self.id, reason);
            }
            routed => return routed,
        }
        match self.native_transport() {
            Some(native) => native.submit(machine, handler, request).map_err(HandleError::from),
            None => Err(HandleError::Registration(format!(
                "no route to '{}' and handle '{}' has no native transport",
                handler, self.id
            ))),
        }
    }

    /// Non-throwing form of [`submit_to`](Self::submit_to).
    pub fn submit2_to(self: &Arc<Self>, machine: &str, handler: &str, request: &str) -> ServiceResult {
        if let Err(err) = self.register() {
            return ServiceResult::new(ResultCode::STAFRegistrationError, err.to_string());
        }
        match self.submit2(handler, request) {
            Ok(result) => return result,
            Err(HandleError::ServiceUnavailable(reason)) => {
                debug!("Handle '{}' trying native route: {}", self.id, reason);
            }
            Err(err) => return err.to_service_result(),
        }
        match self.native_transport() {
            Some(native) => native.submit2(machine, handler, request),
            None => ServiceResult::new(
                ResultCode::STAFRegistrationError,
                format!("handle '{}' has no native transport", self.id),
            ),
        }
    }

    /// Put a message on this handle's own queue.
    pub fn accept_queue_message(self: &Arc<Self>, message: impl Into<String>) -> ServiceResult {
        if let Err(err) = self.register() {
            return ServiceResult::new(ResultCode::UnknownError, err.to_string());
        }
        match self.queue.put(message.into()) {
            Ok(()) => ServiceResult::ok(),
            Err(err) => ServiceResult::new(err.result_code(), err.to_string()),
        }
    }

    /// Put a message on the queue of the handle named `handler`.
    pub fn send_queue_message(
        self: &Arc<Self>,
        handler: &str,
        message: impl Into<String>,
    ) -> Result<ServiceResult, HandleError> {
        self.register()?;
        let target = self.registry.get_handle(handler)?;
        Ok(target.accept_queue_message(message))
    }

    /// Take the next message from this handle's own queue.
    pub fn get_queue_message(self: &Arc<Self>, policy: WaitPolicy) -> ServiceResult {
        if let Err(err) = self.register() {
            return ServiceResult::new(ResultCode::UnknownError, err.to_string());
        }
        match self.queue.take(policy) {
            Ok(message) => ServiceResult::ok_with(message),
            Err(err @ (FifoError::Empty | FifoError::Timeout(_))) => ServiceResult::code(err.result_code()),
            Err(err) => ServiceResult::new(err.result_code(), format!("handle '{}': {}", self.id, err)),
        }
    }

    /// Remove this handle from the registry and release its native
    /// transport. The handle cannot be registered again afterwards.
    /// Consumers blocked on its queue are released.
    pub fn unregister(&self) {
        let mut state = self.state.lock();
        *state = HandleState::Retired;
        self.registry.unregister_handle(&self.id, self);
        drop(state);

        self.queue.interrupt();
        if let Some(native) = self.native.write().take() {
            if let Err(err) = native.unregister() {
                debug!("Ignoring native unregister failure for '{}': {}", self.id, err);
            }
        }
    }

    /// Empty this handle's queue.
    pub fn clear_queue(&self) {
        self.queue.clear();
    }

    /// Number of messages waiting on this handle's queue
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Change the capacity of this handle's queue.
    pub fn set_queue_capacity(&self, max_size: usize) {
        self.queue.set_max_size(max_size);
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("queued", &self.queue.len())
            .field("service", &self.service.is_some())
            .finish()
    }
}
