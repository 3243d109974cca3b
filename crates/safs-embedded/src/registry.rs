//! Registry of named handles and services
//!
//! Names are compared case-insensitively. A service is always a handle too:
//! its handle id sits in the handle table and its service id maps back to
//! that handle id.

use crate::defaults::DEFAULT_QUEUE_CAPACITY;
use crate::error::RegistryError;
use crate::handle::{Handle, NativeConnector};
use crate::service::ServiceEndpoint;
use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Normalized lookup key for a handle or service name.
fn normalize(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Name-to-handle and service-to-handle table shared by every handle and
/// service that routes through it.
///
/// Lookups go straight to the concurrent maps. Mutations that touch more
/// than one map are serialized so a failed registration never leaves a
/// partial entry behind.
pub struct HandleRegistry {
    /// Handle key -> handle
    handles: DashMap<String, Arc<Handle>>,
    /// Handle key -> service key
    services: DashMap<String, String>,
    /// Service key -> endpoint
    endpoints: DashMap<String, Arc<ServiceEndpoint>>,
    /// Serializes register/unregister
    write_lock: Mutex<()>,
    /// Capacity given to the queue of every new handle
    queue_capacity: usize,
    /// Opens native transports for newly registered handles
    connector: Option<Arc<dyn NativeConnector>>,
}

impl HandleRegistry {
    /// Create an empty registry with the default queue capacity.
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create an empty registry whose handles get queues of `capacity` items.
    pub fn with_queue_capacity(capacity: usize) -> Self {
        Self {
            handles: DashMap::new(),
            services: DashMap::new(),
            endpoints: DashMap::new(),
            write_lock: Mutex::new(()),
            queue_capacity: capacity,
            connector: None,
        }
    }

    /// Open a native transport for each handle as it registers.
    pub fn with_native_connector(mut self, connector: Arc<dyn NativeConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Capacity given to the queue of every new handle
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub(crate) fn native_connector(&self) -> Option<&Arc<dyn NativeConnector>> {
        self.connector.as_ref()
    }

    /// Register `handle` under `handle_id`.
    ///
    /// Fails if the id is blank, if the id is taken, or if this handle is
    /// already registered under another id.
    pub fn register_handle(&self, handle_id: &str, handle: Arc<Handle>) -> Result<(), RegistryError> {
        let key = normalize(handle_id)
            .ok_or_else(|| RegistryError::InvalidArgument("handle id must not be blank".to_string()))?;
        let _guard = self.write_lock.lock();
        self.insert_handle(key, handle_id, handle)
    }

    fn insert_handle(&self, key: String, handle_id: &str, handle: Arc<Handle>) -> Result<(), RegistryError> {
        if self.handles.contains_key(&key) {
            return Err(RegistryError::DuplicateHandle(handle_id.to_string()));
        }
        let registered_as = self
            .handles
            .iter()
            .find(|entry| Arc::ptr_eq(entry.value(), &handle))
            .map(|entry| entry.value().id().to_string());
        if let Some(other) = registered_as {
            return Err(RegistryError::DuplicateHandle(format!(
                "{} (already registered as '{}')",
                handle_id, other
            )));
        }
        self.handles.insert(key, handle);
        info!("Registered handle '{}'", handle_id);
        Ok(())
    }

    /// Register `endpoint` under both `handle_id` and `service_id`.
    ///
    /// The handle entry may already exist if it is the endpoint's own handle;
    /// any other conflict fails without changing the registry.
    pub fn register_service(
        &self,
        handle_id: &str,
        service_id: &str,
        endpoint: Arc<ServiceEndpoint>,
    ) -> Result<(), RegistryError> {
        let key = normalize(handle_id)
            .ok_or_else(|| RegistryError::InvalidArgument("handle id must not be blank".to_string()))?;
        let service_key = normalize(service_id)
            .ok_or_else(|| RegistryError::InvalidArgument("service id must not be blank".to_string()))?;

        let _guard = self.write_lock.lock();
        if self.services.contains_key(&key) {
            return Err(RegistryError::DuplicateService(handle_id.to_string()));
        }
        if self.endpoints.contains_key(&service_key) {
            return Err(RegistryError::DuplicateService(service_id.to_string()));
        }

        let handle = endpoint.handle().clone();
        match self.insert_handle(key.clone(), handle_id, handle.clone()) {
            Ok(()) => {}
            Err(RegistryError::DuplicateHandle(_)) if self.holds(&key, &handle) => {
                debug!("Handle '{}' already registered, adding service '{}'", handle_id, service_id);
            }
            Err(err) => return Err(err),
        }

        self.services.insert(key, service_key.clone());
        self.endpoints.insert(service_key, endpoint);
        info!("Registered service '{}' on handle '{}'", service_id, handle_id);
        Ok(())
    }

    fn holds(&self, key: &str, handle: &Arc<Handle>) -> bool {
        self.handles
            .get(key)
            .map_or(false, |entry| Arc::ptr_eq(entry.value(), handle))
    }

    /// Check whether `handle` itself is the entry registered under `handle_id`.
    pub fn is_registered_as(&self, handle_id: &str, handle: &Arc<Handle>) -> bool {
        normalize(handle_id).map_or(false, |key| self.holds(&key, handle))
    }

    /// Remove the handle and any service registered under `handle_id`.
    /// Unknown or blank ids are ignored.
    pub fn unregister(&self, handle_id: &str) {
        let Some(key) = normalize(handle_id) else {
            return;
        };
        let _guard = self.write_lock.lock();
        self.remove_entries(&key, handle_id);
    }

    /// Remove `handle_id` only while it still maps to `handle`.
    pub(crate) fn unregister_handle(&self, handle_id: &str, handle: &Handle) {
        let Some(key) = normalize(handle_id) else {
            return;
        };
        let _guard = self.write_lock.lock();
        let owned = self
            .handles
            .get(&key)
            .map_or(false, |entry| std::ptr::eq(Arc::as_ptr(entry.value()), handle));
        if owned {
            self.remove_entries(&key, handle_id);
        }
    }

    fn remove_entries(&self, key: &str, handle_id: &str) {
        let removed = self.handles.remove(key).is_some();
        if let Some((_, service_key)) = self.services.remove(key) {
            self.endpoints.remove(&service_key);
            info!("Unregistered service '{}' with handle '{}'", service_key, handle_id);
        } else if removed {
            info!("Unregistered handle '{}'", handle_id);
        }
    }

    /// Look up a handle by name.
    pub fn get_handle(&self, handle_id: &str) -> Result<Arc<Handle>, RegistryError> {
        normalize(handle_id)
            .and_then(|key| self.handles.get(&key).map(|entry| entry.value().clone()))
            .ok_or_else(|| RegistryError::UnknownHandle(handle_id.to_string()))
    }

    /// Look up a service endpoint by service name.
    pub fn get_service(&self, service_id: &str) -> Result<Arc<ServiceEndpoint>, RegistryError> {
        let service_key = normalize(service_id)
            .ok_or_else(|| RegistryError::InvalidArgument("service id must not be blank".to_string()))?;
        self.endpoints
            .get(&service_key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::UnknownService(service_id.to_string()))
    }

    /// Find the endpoint a request addressed to `name` should go to: a
    /// service registered under that name, or the service bound to the
    /// handle of that name.
    pub fn resolve_service(&self, name: &str) -> Result<Arc<ServiceEndpoint>, RegistryError> {
        match self.get_service(name) {
            Ok(endpoint) => Ok(endpoint),
            Err(RegistryError::UnknownService(_)) => {
                let service_key = normalize(name)
                    .and_then(|key| self.services.get(&key).map(|entry| entry.value().clone()));
                service_key
                    .and_then(|service_key| self.endpoints.get(&service_key).map(|entry| entry.value().clone()))
                    .ok_or_else(|| RegistryError::UnknownService(name.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    /// Check if a handle is registered under `handle_id`.
    pub fn is_handle_registered(&self, handle_id: &str) -> bool {
        normalize(handle_id).map_or(false, |key| self.handles.contains_key(&key))
    }

    /// Check if a service is registered under `service_id`.
    pub fn is_service_registered(&self, service_id: &str) -> bool {
        normalize(service_id).map_or(false, |key| self.endpoints.contains_key(&key))
    }

    /// Empty the queue of every registered handle.
    ///
    /// Every handle is attempted even if some fail. Items queued while the
    /// clear is in progress may survive it. Returns the number of queues
    /// cleared.
    pub fn clear_all_queues(&self) -> Result<usize, RegistryError> {
        let handles: Vec<Arc<Handle>> = self.handles.iter().map(|entry| entry.value().clone()).collect();
        let mut failed = Vec::new();
        for handle in &handles {
            if panic::catch_unwind(AssertUnwindSafe(|| handle.clear_queue())).is_err() {
                warn!("Failed to clear queue of handle '{}'", handle.id());
                failed.push(handle.id().to_string());
            }
        }
        if failed.is_empty() {
            debug!("Cleared {} handle queue(s)", handles.len());
            Ok(handles.len())
        } else {
            Err(RegistryError::ClearQueues { failed })
        }
    }

    /// Ids of all registered handles, as they were registered.
    pub fn handle_ids(&self) -> Vec<String> {
        self.handles.iter().map(|entry| entry.value().id().to_string()).collect()
    }

    /// Number of registered handles
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Check if no handle is registered
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("handles", &self.handles.len())
            .field("services", &self.endpoints.len())
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{RequestInfo, ServiceResult};
    use crate::service::RequestHandler;

    struct Echo;

    impl RequestHandler for Echo {
        fn accept_request(&self, info: &RequestInfo) -> ServiceResult {
            ServiceResult::ok_with(info.request.clone())
        }

        fn terminate_service(&self) -> ServiceResult {
            ServiceResult::ok()
        }
    }

    fn registry() -> Arc<HandleRegistry> {
        Arc::new(HandleRegistry::new())
    }

    #[test]
    fn test_registry_creation() {
        let registry = HandleRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.queue_capacity(), DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_register_and_get_handle_case_insensitive() {
        let registry = registry();
        let handle = Handle::new(&registry, "Handle1");
        registry.register_handle("Handle1", handle.clone()).unwrap();

        assert!(Arc::ptr_eq(&registry.get_handle("HANDLE1").unwrap(), &handle));
        assert!(registry.is_handle_registered("handle1"));
        assert_eq!(registry.handle_ids(), vec!["Handle1".to_string()]);
    }

    #[test]
    fn test_register_duplicate_name() {
        let registry = registry();
        let first = Handle::new(&registry, "Handle1");
        let second = Handle::new(&registry, "HANDLE1");
        registry.register_handle("Handle1", first.clone()).unwrap();

        let err = registry.register_handle("HANDLE1", second).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateHandle(_)));
        assert!(Arc::ptr_eq(&registry.get_handle("HANDLE1").unwrap(), &first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_same_handle_twice() {
        let registry = registry();
        let handle = Handle::new(&registry, "A");
        registry.register_handle("A", handle.clone()).unwrap();

        let err = registry.register_handle("B", handle).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateHandle(_)));
        assert!(!registry.is_handle_registered("B"));
    }

    #[test]
    fn test_register_blank_id() {
        let registry = registry();
        let handle = Handle::new(&registry, "A");
        assert!(matches!(
            registry.register_handle("  ", handle),
            Err(RegistryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unknown_lookups() {
        let registry = registry();
        assert!(matches!(
            registry.get_handle("missing"),
            Err(RegistryError::UnknownHandle(_))
        ));
        assert!(matches!(
            registry.get_service("missing"),
            Err(RegistryError::UnknownService(_))
        ));
        assert!(matches!(
            registry.get_service(""),
            Err(RegistryError::InvalidArgument(_))
        ));
        assert!(!registry.is_handle_registered(""));
        assert!(!registry.is_service_registered("missing"));
    }

    #[test]
    fn test_register_service_links_handle() {
        let registry = registry();
        let endpoint = ServiceEndpoint::new(&registry, "STAF/Service/ECHO", "ECHO", Arc::new(Echo));
        registry
            .register_service("STAF/Service/ECHO", "ECHO", endpoint.clone())
            .unwrap();

        let handle = registry.get_handle("staf/service/echo").unwrap();
        let service = registry.get_service("echo").unwrap();
        assert!(Arc::ptr_eq(&handle, endpoint.handle()));
        assert!(Arc::ptr_eq(&service, &endpoint));
        assert!(Arc::ptr_eq(
            &registry.resolve_service("STAF/Service/ECHO").unwrap(),
            &endpoint
        ));
    }

    #[test]
    fn test_register_service_tolerates_own_handle() {
        let registry = registry();
        let endpoint = ServiceEndpoint::new(&registry, "H", "S", Arc::new(Echo));
        registry.register_handle("H", endpoint.handle().clone()).unwrap();
        registry.register_service("H", "S", endpoint).unwrap();
        assert!(registry.is_service_registered("S"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_service_duplicates() {
        let registry = registry();
        let first = ServiceEndpoint::new(&registry, "H1", "S", Arc::new(Echo));
        registry.register_service("H1", "S", first).unwrap();

        // Service name taken by another handle: nothing is inserted.
        let second = ServiceEndpoint::new(&registry, "H2", "s", Arc::new(Echo));
        assert!(matches!(
            registry.register_service("H2", "s", second),
            Err(RegistryError::DuplicateService(_))
        ));
        assert!(!registry.is_handle_registered("H2"));

        // Handle already backs a service.
        let third = ServiceEndpoint::new(&registry, "H1", "OTHER", Arc::new(Echo));
        assert!(matches!(
            registry.register_service("H1", "OTHER", third),
            Err(RegistryError::DuplicateService(_))
        ));

        // Handle id taken by a plain handle.
        let plain = Handle::new(&registry, "H3");
        registry.register_handle("H3", plain).unwrap();
        let fourth = ServiceEndpoint::new(&registry, "H3", "S3", Arc::new(Echo));
        assert!(matches!(
            registry.register_service("H3", "S3", fourth),
            Err(RegistryError::DuplicateHandle(_))
        ));
        assert!(!registry.is_service_registered("S3"));
    }

    #[test]
    fn test_unregister_removes_both_mappings() {
        let registry = registry();
        let endpoint = ServiceEndpoint::new(&registry, "H", "S", Arc::new(Echo));
        registry.register_service("H", "S", endpoint).unwrap();

        registry.unregister("h");
        assert!(!registry.is_handle_registered("H"));
        assert!(!registry.is_service_registered("S"));
        assert!(registry.resolve_service("H").is_err());

        // Unknown and blank ids are ignored.
        registry.unregister("H");
        registry.unregister("");
    }

    #[test]
    fn test_unregister_handle_checks_owner() {
        let registry = registry();
        let owner = Handle::new(&registry, "X");
        let stranger = Handle::new(&registry, "X");
        registry.register_handle("X", owner.clone()).unwrap();

        registry.unregister_handle("X", &stranger);
        assert!(registry.is_handle_registered("X"));

        registry.unregister_handle("X", &owner);
        assert!(!registry.is_handle_registered("X"));
    }

    #[test]
    fn test_clear_all_queues() {
        let registry = registry();
        let a = Handle::new(&registry, "A");
        let b = Handle::new(&registry, "B");
        registry.register_handle("A", a.clone()).unwrap();
        registry.register_handle("B", b.clone()).unwrap();
        a.accept_queue_message("one");
        b.accept_queue_message("two");

        assert_eq!(registry.clear_all_queues().unwrap(), 2);
        assert_eq!(a.queue_len(), 0);
        assert_eq!(b.queue_len(), 0);
        assert!(registry.is_handle_registered("A"));
    }
}
