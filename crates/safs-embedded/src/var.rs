//! Embedded VAR service: a case-insensitive in-process variable store

use crate::command::{CommandParser, ParsedCommand, ValuePolicy};
use crate::defaults::{SERVICE_HANDLE_PREFIX, VAR_SERVICE_NAME};
use crate::registry::HandleRegistry;
use crate::result::{InitInfo, RequestInfo, ResultCode, ServiceResult};
use crate::service::{RequestHandler, ServiceEndpoint, ServiceState};
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

const HELP: &str = "\
Embedded variable service

SET <varname> VALUE <value>
GET <varname>
DELETE <varname>
LIST
COUNT
RESET
HELP
";

fn var_parser() -> CommandParser {
    let mut parser = CommandParser::new();
    parser
        .add_option("GET", 1, ValuePolicy::Required)
        .add_option("SET", 1, ValuePolicy::Required)
        .add_option("VALUE", 1, ValuePolicy::Allowed)
        .add_option("DELETE", 1, ValuePolicy::Required)
        .add_option("LIST", 1, ValuePolicy::NotAllowed)
        .add_option("COUNT", 1, ValuePolicy::NotAllowed)
        .add_option("RESET", 1, ValuePolicy::NotAllowed)
        .add_option("HELP", 1, ValuePolicy::NotAllowed)
        .add_option_group("GET SET DELETE LIST COUNT RESET HELP", 1, 1)
        .add_option_need("SET", "VALUE")
        .add_option_need("VALUE", "SET");
    parser
}

/// In-process stand-in for the STAF VAR service.
pub struct EmbeddedVariableService {
    registry: Arc<HandleRegistry>,
    service_name: RwLock<String>,
    parser: CommandParser,
    /// Lower-cased name to (name as first set, value)
    vars: Mutex<HashMap<String, (String, String)>>,
    state: Mutex<ServiceState>,
    endpoint: Mutex<Option<Arc<ServiceEndpoint>>>,
}

impl EmbeddedVariableService {
    pub fn new(registry: &Arc<HandleRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry: registry.clone(),
            service_name: RwLock::new(VAR_SERVICE_NAME.to_string()),
            parser: var_parser(),
            vars: Mutex::new(HashMap::new()),
            state: Mutex::new(ServiceState::Uninitialized),
            endpoint: Mutex::new(None),
        })
    }

    pub fn service_name(&self) -> String {
        self.service_name.read().clone()
    }

    /// `STAF/Service/<service name>`
    pub fn handle_id(&self) -> String {
        format!("{}{}", SERVICE_HANDLE_PREFIX, self.service_name())
    }

    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    /// Register as `STAF/Service/<name>`. Unlike the queue service, a failed
    /// registration fails the init with `STAFRegistrationError`.
    pub fn init(self: &Arc<Self>, info: &InitInfo) -> ServiceResult {
        let name = info.name.trim();
        let name = if name.is_empty() { VAR_SERVICE_NAME } else { name };
        *self.service_name.write() = name.to_string();

        let endpoint = ServiceEndpoint::new(
            &self.registry,
            self.handle_id(),
            name,
            self.clone() as Arc<dyn RequestHandler>,
        );
        if let Err(err) = endpoint.register() {
            return ServiceResult::new(ResultCode::STAFRegistrationError, err.to_string());
        }
        info!("Variable service '{}' initialized", name);
        *self.endpoint.lock() = Some(endpoint);
        *self.state.lock() = ServiceState::Initialized;
        ServiceResult::ok()
    }

    /// Drop all variables and unregister.
    pub fn terminate(&self) -> ServiceResult {
        debug!("Variable service '{}' terminating", self.service_name());
        *self.state.lock() = ServiceState::Terminated;
        self.vars.lock().clear();
        if let Some(endpoint) = self.endpoint.lock().take() {
            endpoint.unregister();
        }
        ServiceResult::ok()
    }

    /// Set `name` directly, bypassing request parsing.
    pub fn set(&self, name: &str, value: impl Into<String>) {
        self.vars
            .lock()
            .insert(name.to_lowercase(), (name.to_string(), value.into()));
    }

    /// Value of `name`, if set
    pub fn get(&self, name: &str) -> Option<String> {
        self.vars.lock().get(&name.to_lowercase()).map(|(_, value)| value.clone())
    }

    /// Number of variables stored
    pub fn count(&self) -> usize {
        self.vars.lock().len()
    }

    fn list(&self) -> String {
        let vars = self.vars.lock();
        let mut entries: Vec<&(String, String)> = vars.values().collect();
        entries.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()));
        entries
            .into_iter()
            .map(|(name, value)| format!("{}={}\n", name, value))
            .collect()
    }

    fn dispatch(&self, parsed: &ParsedCommand) -> ServiceResult {
        if parsed.option_times("HELP") > 0 {
            return ServiceResult::ok_with(HELP);
        }
        if parsed.option_times("LIST") > 0 {
            return ServiceResult::ok_with(self.list());
        }
        if parsed.option_times("COUNT") > 0 {
            return ServiceResult::ok_with(self.count().to_string());
        }
        if parsed.option_times("RESET") > 0 {
            self.vars.lock().clear();
            return ServiceResult::ok();
        }

        if let Some(name) = parsed.option_value("SET") {
            let value = parsed.option_value("VALUE").unwrap_or_default();
            self.set(name, value);
            return ServiceResult::ok();
        }
        if let Some(name) = parsed.option_value("GET") {
            return match self.get(name) {
                Some(value) => ServiceResult::ok_with(value),
                None => ServiceResult::new(ResultCode::VariableDoesNotExist, name),
            };
        }
        match parsed.option_value("DELETE") {
            Some(name) => match self.vars.lock().remove(&name.to_lowercase()) {
                Some(_) => ServiceResult::ok(),
                None => ServiceResult::new(ResultCode::VariableDoesNotExist, name),
            },
            None => ServiceResult::code(ResultCode::InvalidRequestString),
        }
    }
}

impl RequestHandler for EmbeddedVariableService {
    fn accept_request(&self, info: &RequestInfo) -> ServiceResult {
        let state = self.state();
        if state != ServiceState::Initialized {
            return ServiceResult::new(
                ResultCode::ServiceNotAvailable,
                format!("variable service is {:?}", state),
            );
        }
        match self.parser.parse(&info.request) {
            Ok(parsed) => self.dispatch(&parsed),
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

    fn started() -> (Arc<HandleRegistry>, Arc<EmbeddedVariableService>) {
        let registry = Arc::new(HandleRegistry::new());
        let service = EmbeddedVariableService::new(&registry);
        assert!(service.init(&InitInfo::new("VAR", "")).is_ok());
        (registry, service)
    }

    fn request(service: &EmbeddedVariableService, text: &str) -> ServiceResult {
        service.accept_request(&RequestInfo::local("tester", -1, text))
    }

    #[test]
    fn test_init_registers_prefixed_handle() {
        let (registry, service) = started();
        assert_eq!(service.handle_id(), "STAF/Service/VAR");
        assert!(registry.is_handle_registered("staf/service/var"));
        assert!(registry.is_service_registered("VAR"));
    }

    #[test]
    fn test_duplicate_init_fails() {
        let (registry, _service) = started();
        let second = EmbeddedVariableService::new(&registry);
        assert_eq!(
            second.init(&InitInfo::new("var", "")).rc,
            ResultCode::STAFRegistrationError
        );
        assert_eq!(second.state(), ServiceState::Uninitialized);
    }

    #[test]
    fn test_set_get_delete() {
        let (_registry, service) = started();
        assert!(request(&service, "SET Greeting VALUE \"hello world\"").is_ok());
        assert_eq!(request(&service, "GET greeting"), ServiceResult::ok_with("hello world"));
        assert!(request(&service, "set greeting value bye").is_ok());
        assert_eq!(service.get("GREETING").as_deref(), Some("bye"));

        assert!(request(&service, "DELETE GREETING").is_ok());
        assert_eq!(request(&service, "GET greeting").rc, ResultCode::VariableDoesNotExist);
        assert_eq!(request(&service, "DELETE greeting").rc, ResultCode::VariableDoesNotExist);
    }

    #[test]
    fn test_list_count_reset() {
        let (_registry, service) = started();
        request(&service, "SET b VALUE 2");
        request(&service, "SET A VALUE 1");
        assert_eq!(request(&service, "COUNT"), ServiceResult::ok_with("2"));
        assert_eq!(request(&service, "LIST"), ServiceResult::ok_with("A=1\nb=2\n"));

        assert!(request(&service, "RESET").is_ok());
        assert_eq!(service.count(), 0);
        assert_eq!(request(&service, "LIST"), ServiceResult::ok_with(""));
    }

    #[test]
    fn test_help_and_bad_requests() {
        let (_registry, service) = started();
        assert!(request(&service, "HELP").result.contains("SET <varname> VALUE <value>"));
        for text in ["", "SET x", "VALUE 1", "GET", "LIST COUNT"] {
            assert_eq!(
                request(&service, text).rc,
                ResultCode::InvalidRequestString,
                "request {:?}",
                text
            );
        }
    }

    #[test]
    fn test_terminate() {
        let (registry, service) = started();
        service.set("x", "1");
        assert!(service.terminate().is_ok());
        assert!(!registry.is_service_registered("VAR"));
        assert_eq!(request(&service, "GET x").rc, ResultCode::ServiceNotAvailable);
    }
}
