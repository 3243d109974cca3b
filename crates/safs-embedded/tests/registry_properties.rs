//! Integration tests for handle and service registration

use safs_embedded::{
    Handle, HandleRegistry, RegistryError, RequestHandler, RequestInfo, ServiceEndpoint, ServiceResult,
};
use std::sync::Arc;
use std::thread;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Echo;

impl RequestHandler for Echo {
    fn accept_request(&self, info: &RequestInfo) -> ServiceResult {
        ServiceResult::ok_with(info.request.clone())
    }

    fn terminate_service(&self) -> ServiceResult {
        ServiceResult::ok()
    }
}

#[test]
fn test_names_are_unique_ignoring_case() {
    init_logging();
    let registry = Arc::new(HandleRegistry::new());
    let first = Handle::new(&registry, "Handle1");
    let second = Handle::new(&registry, "HANDLE1");

    registry.register_handle("Handle1", first.clone()).unwrap();
    assert!(matches!(
        registry.register_handle("HANDLE1", second),
        Err(RegistryError::DuplicateHandle(_))
    ));

    for spelling in ["Handle1", "HANDLE1", "handle1", "  hAnDlE1 "] {
        assert!(Arc::ptr_eq(&registry.get_handle(spelling).unwrap(), &first));
    }
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_service_and_handle_resolve_to_same_object() {
    let registry = Arc::new(HandleRegistry::new());
    let endpoint = ServiceEndpoint::new(&registry, "STAF/Service/ECHO", "ECHO", Arc::new(Echo));
    registry
        .register_service("STAF/Service/ECHO", "ECHO", endpoint.clone())
        .unwrap();

    let by_handle = registry.get_handle("staf/service/echo").unwrap();
    let by_service = registry.get_service("echo").unwrap();
    assert!(Arc::ptr_eq(&by_handle, endpoint.handle()));
    assert!(Arc::ptr_eq(by_service.handle(), &by_handle));

    registry.unregister("STAF/Service/ECHO");
    assert!(matches!(
        registry.get_handle("STAF/Service/ECHO"),
        Err(RegistryError::UnknownHandle(_))
    ));
    assert!(matches!(
        registry.get_service("ECHO"),
        Err(RegistryError::UnknownService(_))
    ));
}

#[test]
fn test_failed_registration_leaves_no_trace() {
    let registry = Arc::new(HandleRegistry::new());
    ServiceEndpoint::new(&registry, "H1", "S1", Arc::new(Echo))
        .register()
        .unwrap();

    // Service name taken by another handle: the new handle must not be inserted.
    let clash = ServiceEndpoint::new(&registry, "H2", "s1", Arc::new(Echo));
    assert!(clash.register().is_err());
    assert!(!registry.is_handle_registered("H2"));
    assert_eq!(registry.handle_ids(), vec!["H1".to_string()]);
}

#[test]
fn test_unregister_unknown_is_noop() {
    let registry = HandleRegistry::new();
    registry.unregister("nobody");
    registry.unregister("");
    assert!(registry.is_empty());
    assert!(!registry.is_handle_registered(""));
    assert!(!registry.is_service_registered(""));
}

#[test]
fn test_concurrent_registration_has_one_winner() {
    init_logging();
    let registry = Arc::new(HandleRegistry::new());
    let contenders: Vec<_> = (0..8)
        .map(|i| {
            let registry = registry.clone();
            thread::spawn(move || {
                let name = if i % 2 == 0 { "shared" } else { "SHARED" };
                Handle::new(&registry, name).register().is_ok()
            })
        })
        .collect();

    let winners = contenders
        .into_iter()
        .map(|contender| contender.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_isolated_registries() {
    let left = Arc::new(HandleRegistry::new());
    let right = Arc::new(HandleRegistry::new());
    Handle::new(&left, "H1").register().unwrap();
    Handle::new(&right, "H1").register().unwrap();
    assert!(left.is_handle_registered("H1"));
    assert!(right.is_handle_registered("H1"));
}
