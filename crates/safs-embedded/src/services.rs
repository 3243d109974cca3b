//! Start and stop the embedded services as one unit

use crate::config::{ConfigError, EmbeddedConfig};
use crate::error::HandleError;
use crate::handle::Handle;
use crate::queue::EmbeddedQueueService;
use crate::registry::HandleRegistry;
use crate::result::InitInfo;
use crate::sem::EmbeddedSemService;
use crate::var::EmbeddedVariableService;
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The enabled embedded services sharing one registry.
///
/// Dropping the set shuts it down, which unregisters every service endpoint
/// from the registry.
pub struct EmbeddedServices {
    registry: Arc<HandleRegistry>,
    queue: Option<Arc<EmbeddedQueueService>>,
    sem: Option<Arc<EmbeddedSemService>>,
    var: Option<Arc<EmbeddedVariableService>>,
    stopped: AtomicBool,
}

impl EmbeddedServices {
    /// Build a registry from `config` and start the enabled services in it.
    pub fn start(config: &EmbeddedConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = Arc::new(HandleRegistry::with_queue_capacity(config.registry.queue_capacity));
        Ok(Self::start_in(registry, config))
    }

    /// Start the enabled services in an existing registry, for example one
    /// carrying a native connector.
    pub fn start_in(registry: Arc<HandleRegistry>, config: &EmbeddedConfig) -> Self {
        let queue = config.queue.enabled.then(|| {
            let service = EmbeddedQueueService::with_handle_id(&registry, config.queue.handle_id.clone());
            service.init(&InitInfo::new(config.queue.service_name.clone(), ""));
            service
        });

        let sem = config.sem.enabled.then(|| {
            let service = EmbeddedSemService::with_handle_id(&registry, config.sem.handle_id.clone());
            service.init(&InitInfo::new(config.sem.service_name.clone(), ""));
            service
        });

        let var = if config.var.enabled {
            let service = EmbeddedVariableService::new(&registry);
            let result = service.init(&InitInfo::new(config.var.service_name.clone(), config.var.parms.clone()));
            if result.is_ok() {
                Some(service)
            } else {
                warn!("Variable service '{}' not started: {}", config.var.service_name, result);
                None
            }
        } else {
            None
        };

        info!(
            "Embedded services started (queue: {}, sem: {}, var: {})",
            queue.is_some(),
            sem.is_some(),
            var.is_some()
        );
        Self {
            registry,
            queue,
            sem,
            var,
            stopped: AtomicBool::new(false),
        }
    }

    /// Registry shared by all services
    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    /// The QUEUE service, unless disabled in the config
    pub fn queue(&self) -> Option<&Arc<EmbeddedQueueService>> {
        self.queue.as_ref()
    }

    /// The SEM service, unless disabled in the config
    pub fn sem(&self) -> Option<&Arc<EmbeddedSemService>> {
        self.sem.as_ref()
    }

    /// The VAR service, unless disabled in the config or its init failed
    pub fn var(&self) -> Option<&Arc<EmbeddedVariableService>> {
        self.var.as_ref()
    }

    /// Create and register a client handle named `handle_id`.
    pub fn client(&self, handle_id: &str) -> Result<Arc<Handle>, HandleError> {
        let handle = Handle::new(&self.registry, handle_id);
        handle.register()?;
        Ok(handle)
    }

    /// Terminate every started service. The queue service goes last since
    /// its termination clears every queue in the registry. Only the first
    /// call has any effect.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(var) = &self.var {
            var.terminate();
        }
        if let Some(sem) = &self.sem {
            sem.terminate();
        }
        if let Some(queue) = &self.queue {
            queue.terminate();
        }
        info!("Embedded services shut down");
    }
}

impl Drop for EmbeddedServices {
    fn drop(&mut self) {
        self.shutdown();
    }
}
