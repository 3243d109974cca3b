//! Embedded SEM service: named events and mutex semaphores
//!
//! ```text
//! POST EVENT <name>            PULSE EVENT <name>
//! RESET EVENT <name>           DELETE EVENT <name>
//! WAIT EVENT <name> [TIMEOUT <millis>]
//! LIST EVENT
//! REQUEST MUTEX <name>         RELEASE MUTEX <name>
//! ```
//!
//! Events and mutexes are created on first reference. Mutex ownership is
//! keyed by the requesting handle's name.

use crate::command::{CommandParser, ParsedCommand, ValuePolicy};
use crate::defaults::{SEM_HANDLE_ID, SEM_SERVICE_NAME};
use crate::registry::HandleRegistry;
use crate::result::{InitInfo, RequestInfo, ResultCode, ServiceResult};
use crate::service::{RequestHandler, ServiceEndpoint, ServiceState};
use log::{debug, warn};
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

const COMMANDS: [&str; 8] = ["REQUEST", "RELEASE", "POST", "PULSE", "RESET", "DELETE", "WAIT", "LIST"];

fn sem_parser() -> CommandParser {
    let mut parser = CommandParser::new();
    for command in COMMANDS {
        parser.add_option(command, 1, ValuePolicy::NotAllowed);
    }
    parser
        .add_option("MUTEX", 1, ValuePolicy::Required)
        .add_option("EVENT", 1, ValuePolicy::Allowed)
        .add_option("TIMEOUT", 1, ValuePolicy::Required)
        .add_option_group(&COMMANDS.join(" "), 1, 1)
        .add_option_need("REQUEST RELEASE", "MUTEX")
        .add_option_need("POST PULSE RESET DELETE WAIT LIST", "EVENT")
        .add_option_need("TIMEOUT", "WAIT");
    parser
}

/// Whether waiters pass straight through an event
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EventState {
    /// Waiters return immediately
    Posted,
    /// Waiters block until the next post or pulse
    Reset,
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventState::Posted => write!(f, "Posted"),
            EventState::Reset => write!(f, "Reset"),
        }
    }
}

#[derive(Debug)]
struct Event {
    name: String,
    state: EventState,
    /// Bumped by every post and pulse so sleeping waiters can tell they were released.
    releases: u64,
    waiters: Vec<String>,
}

impl Event {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: EventState::Reset,
            releases: 0,
            waiters: Vec::new(),
        }
    }

    fn remove_waiter(&mut self, handle_name: &str) {
        if let Some(pos) = self.waiters.iter().position(|w| w == handle_name) {
            self.waiters.remove(pos);
        }
    }
}

#[derive(Debug, Default)]
struct SemTable {
    events: HashMap<String, Event>,
    /// Mutex name to owning handle, `None` while free
    mutexes: HashMap<String, Option<String>>,
    /// Bumped on terminate to release every blocked request.
    terminations: u64,
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn owned_by(owner: &Option<String>, handle_name: &str) -> bool {
    owner
        .as_deref()
        .map_or(false, |current| current.eq_ignore_ascii_case(handle_name))
}

/// In-process stand-in for the STAF SEM service.
pub struct EmbeddedSemService {
    registry: Arc<HandleRegistry>,
    handle_id: String,
    service_name: RwLock<String>,
    parser: CommandParser,
    table: Mutex<SemTable>,
    changed: Condvar,
    state: Mutex<ServiceState>,
    endpoint: Mutex<Option<Arc<ServiceEndpoint>>>,
}

impl EmbeddedSemService {
    /// Create the service under the default handle id.
    pub fn new(registry: &Arc<HandleRegistry>) -> Arc<Self> {
        Self::with_handle_id(registry, SEM_HANDLE_ID)
    }

    /// Create the service under a custom handle id.
    pub fn with_handle_id(registry: &Arc<HandleRegistry>, handle_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            registry: registry.clone(),
            handle_id: handle_id.into(),
            service_name: RwLock::new(SEM_SERVICE_NAME.to_string()),
            parser: sem_parser(),
            table: Mutex::new(SemTable::default()),
            changed: Condvar::new(),
            state: Mutex::new(ServiceState::Uninitialized),
            endpoint: Mutex::new(None),
        })
    }

    /// Handle id the service registers under
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

    /// Register the service endpoint. A failed registration is logged and
    /// the service keeps serving direct requests.
    pub fn init(self: &Arc<Self>, info: &InitInfo) -> ServiceResult {
        let name = info.name.trim();
        let name = if name.is_empty() { SEM_SERVICE_NAME } else { name };
        *self.service_name.write() = name.to_string();

        let endpoint = ServiceEndpoint::new(
            &self.registry,
            self.handle_id.clone(),
            name,
            self.clone() as Arc<dyn RequestHandler>,
        );
        if let Err(err) = endpoint.register() {
            warn!("Semaphore service '{}' continuing unregistered: {}", name, err);
        }
        *self.endpoint.lock() = Some(endpoint);
        *self.state.lock() = ServiceState::Initialized;
        ServiceResult::ok()
    }

    /// Release every blocked request with `RequestNotComplete`, drop all
    /// semaphores and unregister.
    pub fn terminate(&self) -> ServiceResult {
        debug!("Semaphore service terminating, unregistering '{}'", self.handle_id);
        *self.state.lock() = ServiceState::Terminated;
        {
            let mut table = self.table.lock();
            table.terminations += 1;
            table.events.clear();
            table.mutexes.clear();
        }
        self.changed.notify_all();
        if let Some(endpoint) = self.endpoint.lock().take() {
            endpoint.unregister();
        }
        ServiceResult::ok()
    }

    /// Block on the condition variable until `deadline`; `true` once it has passed.
    fn wait(&self, table: &mut MutexGuard<'_, SemTable>, deadline: Option<Instant>) -> bool {
        match deadline {
            Some(deadline) => self.changed.wait_until(table, deadline).timed_out(),
            None => {
                self.changed.wait(table);
                false
            }
        }
    }

    fn post(&self, name: &str) -> ServiceResult {
        let mut table = self.table.lock();
        let event = table.events.entry(key(name)).or_insert_with(|| Event::new(name));
        event.state = EventState::Posted;
        event.releases += 1;
        self.changed.notify_all();
        ServiceResult::ok()
    }

    fn pulse(&self, name: &str) -> ServiceResult {
        let mut table = self.table.lock();
        let event = table.events.entry(key(name)).or_insert_with(|| Event::new(name));
        event.state = EventState::Reset;
        event.releases += 1;
        self.changed.notify_all();
        ServiceResult::ok()
    }

    fn reset(&self, name: &str) -> ServiceResult {
        let mut table = self.table.lock();
        table
            .events
            .entry(key(name))
            .or_insert_with(|| Event::new(name))
            .state = EventState::Reset;
        ServiceResult::ok()
    }

    fn delete(&self, name: &str) -> ServiceResult {
        let mut table = self.table.lock();
        let key = key(name);
        let waiters = match table.events.get(&key) {
            Some(event) => event.waiters.len(),
            None => return ServiceResult::new(ResultCode::SemaphoreDoesNotExist, name),
        };
        if waiters > 0 {
            return ServiceResult::new(
                ResultCode::SemaphoreHasPendingRequests,
                format!("{} waiter(s) on event '{}'", waiters, name),
            );
        }
        table.events.remove(&key);
        ServiceResult::ok()
    }

    fn list(&self) -> ServiceResult {
        let table = self.table.lock();
        let mut events: Vec<&Event> = table.events.values().collect();
        events.sort_by(|a, b| a.name.cmp(&b.name));

        let mut out = String::from("[\n");
        for event in events {
            out.push_str("  {\n");
            out.push_str(&format!("    Name   : {}\n", event.name));
            out.push_str(&format!("    State  : {}\n", event.state));
            out.push_str(&format!("    Waiters: {}\n", event.waiters.len()));
            out.push_str("  }\n");
        }
        out.push_str("]\n");
        ServiceResult::ok_with(out)
    }

    fn wait_event(&self, name: &str, handle_name: &str, timeout: Option<Duration>) -> ServiceResult {
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let key = key(name);
        let mut table = self.table.lock();
        let terminations = table.terminations;

        let event = table.events.entry(key.clone()).or_insert_with(|| Event::new(name));
        if event.state == EventState::Posted {
            return ServiceResult::ok();
        }
        let releases = event.releases;
        event.waiters.push(handle_name.to_string());

        loop {
            let timed_out = self.wait(&mut table, deadline);
            if table.terminations != terminations {
                return ServiceResult::new(ResultCode::RequestNotComplete, "semaphore service terminated");
            }
            let Some(event) = table.events.get_mut(&key) else {
                return ServiceResult::new(ResultCode::RequestNotComplete, format!("event '{}' was deleted", name));
            };
            if event.state == EventState::Posted || event.releases != releases {
                event.remove_waiter(handle_name);
                return ServiceResult::ok();
            }
            if timed_out {
                event.remove_waiter(handle_name);
                return ServiceResult::code(ResultCode::Timeout);
            }
        }
    }

    fn request_mutex(&self, name: &str, handle_name: &str) -> ServiceResult {
        let key = key(name);
        let mut table = self.table.lock();
        let terminations = table.terminations;

        let owner = table.mutexes.entry(key.clone()).or_insert(None);
        if owner.is_none() {
            *owner = Some(handle_name.to_string());
            return ServiceResult::ok();
        }
        // Re-requesting a held mutex succeeds without nesting.
        if owned_by(owner, handle_name) {
            return ServiceResult::ok();
        }

        loop {
            self.wait(&mut table, None);
            if table.terminations != terminations {
                return ServiceResult::new(ResultCode::RequestNotComplete, "semaphore service terminated");
            }
            let Some(owner) = table.mutexes.get_mut(&key) else {
                return ServiceResult::new(ResultCode::RequestNotComplete, format!("mutex '{}' was removed", name));
            };
            if owner.is_none() {
                *owner = Some(handle_name.to_string());
                return ServiceResult::ok();
            }
        }
    }

    fn release_mutex(&self, name: &str, handle_name: &str) -> ServiceResult {
        let mut table = self.table.lock();
        let Some(owner) = table.mutexes.get_mut(&key(name)) else {
            return ServiceResult::new(ResultCode::SemaphoreDoesNotExist, name);
        };
        if !owned_by(owner, handle_name) {
            let reason = match owner {
                Some(current) => format!("mutex '{}' is owned by '{}'", name, current),
                None => format!("mutex '{}' is not owned", name),
            };
            return ServiceResult::new(ResultCode::NotSemaphoreOwner, reason);
        }
        *owner = None;
        self.changed.notify_all();
        ServiceResult::ok()
    }

    fn dispatch(&self, parsed: &ParsedCommand, handle_name: &str) -> ServiceResult {
        if parsed.option_times("LIST") > 0 {
            return self.list();
        }

        let (object, kind) = if parsed.option_times("MUTEX") > 0 {
            ("MUTEX", "mutex")
        } else {
            ("EVENT", "event")
        };
        let name = parsed.option_value(object).unwrap_or_default().trim();
        if name.is_empty() {
            return ServiceResult::new(ResultCode::InvalidParm, format!("{} name must not be blank", kind));
        }

        if parsed.option_times("REQUEST") > 0 {
            self.request_mutex(name, handle_name)
        } else if parsed.option_times("RELEASE") > 0 {
            self.release_mutex(name, handle_name)
        } else if parsed.option_times("POST") > 0 {
            self.post(name)
        } else if parsed.option_times("PULSE") > 0 {
            self.pulse(name)
        } else if parsed.option_times("RESET") > 0 {
            self.reset(name)
        } else if parsed.option_times("DELETE") > 0 {
            self.delete(name)
        } else {
            let timeout = match parsed.option_value("TIMEOUT") {
                None => None,
                Some(ms) => match ms.trim().parse::<u64>() {
                    Ok(ms) => Some(Duration::from_millis(ms)),
                    Err(_) => {
                        return ServiceResult::new(
                            ResultCode::InvalidRequestString,
                            format!("TIMEOUT must be a non-negative number of milliseconds, got '{}'", ms),
                        )
                    }
                },
            };
            self.wait_event(name, handle_name, timeout)
        }
    }
}

impl RequestHandler for EmbeddedSemService {
    fn accept_request(&self, info: &RequestInfo) -> ServiceResult {
        let state = self.state();
        if state != ServiceState::Initialized {
            return ServiceResult::new(
                ResultCode::ServiceNotAvailable,
                format!("semaphore service is {:?}", state),
            );
        }
        debug!("Semaphore service request from '{}': {}", info.handle_name, info.request);

        match self.parser.parse(&info.request) {
            Ok(parsed) => self.dispatch(&parsed, &info.handle_name),
            Err(err) => ServiceResult::new(ResultCode::InvalidRequestString, err.to_string()),
        }
    }

    fn terminate_service(&self) -> ServiceResult {
        self.terminate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn started() -> Arc<EmbeddedSemService> {
        let registry = Arc::new(HandleRegistry::new());
        let service = EmbeddedSemService::new(&registry);
        assert!(service.init(&InitInfo::new("SEM", "")).is_ok());
        service
    }

    fn request(service: &EmbeddedSemService, handle: &str, text: &str) -> ServiceResult {
        service.accept_request(&RequestInfo::local(handle, -1, text))
    }

    #[test]
    fn test_posted_event_passes_waiters() {
        let service = started();
        assert!(request(&service, "a", "POST EVENT Ready").is_ok());
        assert!(request(&service, "a", "WAIT EVENT ready").is_ok());
        assert!(request(&service, "a", "WAIT EVENT READY TIMEOUT 0").is_ok());
    }

    #[test]
    fn test_wait_timeout_on_reset_event() {
        let service = started();
        let start = Instant::now();
        let result = request(&service, "a", "WAIT EVENT idle TIMEOUT 100");
        assert_eq!(result.rc, ResultCode::Timeout);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_pulse_releases_current_waiter() {
        let service = started();
        let waiter = {
            let service = service.clone();
            thread::spawn(move || request(&service, "w", "WAIT EVENT go TIMEOUT 5000"))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(request(&service, "p", "PULSE EVENT go").is_ok());
        assert!(waiter.join().unwrap().is_ok());

        // A pulse leaves the event reset.
        assert_eq!(
            request(&service, "a", "WAIT EVENT go TIMEOUT 20").rc,
            ResultCode::Timeout
        );
    }

    #[test]
    fn test_delete_event() {
        let service = started();
        assert_eq!(
            request(&service, "a", "DELETE EVENT missing").rc,
            ResultCode::SemaphoreDoesNotExist
        );
        request(&service, "a", "RESET EVENT busy");

        let waiter = {
            let service = service.clone();
            thread::spawn(move || request(&service, "w", "WAIT EVENT busy TIMEOUT 5000"))
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(
            request(&service, "a", "DELETE EVENT busy").rc,
            ResultCode::SemaphoreHasPendingRequests
        );
        request(&service, "a", "POST EVENT busy");
        assert!(waiter.join().unwrap().is_ok());
        assert!(request(&service, "a", "DELETE EVENT busy").is_ok());
    }

    #[test]
    fn test_list_events() {
        let service = started();
        request(&service, "a", "POST EVENT beta");
        request(&service, "a", "RESET EVENT alpha");

        let listing = request(&service, "a", "LIST EVENT");
        assert!(listing.is_ok());
        assert_eq!(
            listing.result,
            "[\n  {\n    Name   : alpha\n    State  : Reset\n    Waiters: 0\n  }\n  {\n    Name   : beta\n    State  : Posted\n    Waiters: 0\n  }\n]\n"
        );
    }

    #[test]
    fn test_mutex_ownership() {
        let service = started();
        assert_eq!(
            request(&service, "a", "RELEASE MUTEX lock").rc,
            ResultCode::SemaphoreDoesNotExist
        );
        assert!(request(&service, "a", "REQUEST MUTEX lock").is_ok());
        assert!(request(&service, "A", "REQUEST MUTEX lock").is_ok());
        assert_eq!(
            request(&service, "b", "RELEASE MUTEX lock").rc,
            ResultCode::NotSemaphoreOwner
        );

        let contender = {
            let service = service.clone();
            thread::spawn(move || request(&service, "b", "REQUEST MUTEX LOCK"))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(request(&service, "a", "RELEASE MUTEX lock").is_ok());
        assert!(contender.join().unwrap().is_ok());
        assert_eq!(
            request(&service, "a", "RELEASE MUTEX lock").rc,
            ResultCode::NotSemaphoreOwner
        );
        assert!(request(&service, "b", "RELEASE MUTEX lock").is_ok());
    }

    #[test]
    fn test_bad_requests() {
        let service = started();
        for text in ["", "POST", "POST PULSE EVENT x", "WAIT EVENT x TIMEOUT", "REQUEST EVENT x", "POST EVENT x TIMEOUT 5"] {
            assert_eq!(
                request(&service, "a", text).rc,
                ResultCode::InvalidRequestString,
                "request {:?}",
                text
            );
        }
        assert_eq!(
            request(&service, "a", "WAIT EVENT x TIMEOUT soon").rc,
            ResultCode::InvalidRequestString
        );
        assert_eq!(request(&service, "a", "POST EVENT").rc, ResultCode::InvalidParm);
    }

    #[test]
    fn test_terminate_releases_waiters() {
        let service = started();
        let waiter = {
            let service = service.clone();
            thread::spawn(move || request(&service, "w", "WAIT EVENT never"))
        };
        request(&service, "a", "REQUEST MUTEX m");
        let contender = {
            let service = service.clone();
            thread::spawn(move || request(&service, "b", "REQUEST MUTEX m"))
        };
        thread::sleep(Duration::from_millis(50));

        assert!(service.terminate().is_ok());
        assert_eq!(waiter.join().unwrap().rc, ResultCode::RequestNotComplete);
        assert_eq!(contender.join().unwrap().rc, ResultCode::RequestNotComplete);
        assert_eq!(service.state(), ServiceState::Terminated);
        assert_eq!(
            request(&service, "a", "LIST EVENT").rc,
            ResultCode::ServiceNotAvailable
        );
    }
}
