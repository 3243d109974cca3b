//! Service endpoints: a handle plus a service name plus a request handler.

use crate::error::HandleError;
use crate::handle::Handle;
use crate::registry::HandleRegistry;
use crate::result::{RequestInfo, ServiceResult};
use std::fmt;
use std::sync::Arc;

/// Request/response contract implemented by every embedded service.
pub trait RequestHandler: Send + Sync {
    /// Handle one request and return its status pair.
    fn accept_request(&self, info: &RequestInfo) -> ServiceResult;

    /// Shut the service down.
    fn terminate_service(&self) -> ServiceResult;
}

/// Lifecycle of an embedded service. Requests are served only while
/// `Initialized`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ServiceState {
    /// Constructed, `init` not yet called
    Uninitialized,
    /// Accepting requests
    Initialized,
    /// `terminate` was called
    Terminated,
}

/// A handle registered under a second, service-level name and backed by a
/// [`RequestHandler`].
///
/// The endpoint's handle registers through
/// [`HandleRegistry::register_service`], so both names become resolvable at
/// once.
pub struct ServiceEndpoint {
    handle: Arc<Handle>,
    service_id: String,
    delegate: Arc<dyn RequestHandler>,
}

impl ServiceEndpoint {
    /// Create an unregistered endpoint.
    pub fn new(
        registry: &Arc<HandleRegistry>,
        handle_id: impl Into<String>,
        service_id: impl Into<String>,
        delegate: Arc<dyn RequestHandler>,
    ) -> Arc<Self> {
        let handle_id = handle_id.into();
        let service_id = service_id.into();
        Arc::new_cyclic(|endpoint| Self {
            handle: Handle::bound(registry, handle_id, endpoint.clone()),
            service_id,
            delegate,
        })
    }

    /// The endpoint's own handle
    pub fn handle(&self) -> &Arc<Handle> {
        &self.handle
    }

    /// Handle name
    pub fn handle_id(&self) -> &str {
        self.handle.id()
    }

    /// Service name
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Register handle and service names. A no-op when already registered.
    pub fn register(&self) -> Result<(), HandleError> {
        self.handle.register()
    }

    /// Register if needed, then pass the request to the delegate.
    pub fn accept_request(&self, info: &RequestInfo) -> ServiceResult {
        if let Err(err) = self.register() {
            return err.to_service_result();
        }
        self.delegate.accept_request(info)
    }

    /// Ask the delegate to shut down. Registration is left untouched.
    pub fn terminate_service(&self) -> ServiceResult {
        self.delegate.terminate_service()
    }

    /// Remove both names from the registry.
    pub fn unregister(&self) {
        self.handle.unregister();
    }
}

impl fmt::Debug for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEndpoint")
            .field("handle", &self.handle)
            .field("service_id", &self.service_id)
            .finish()
    }
}
