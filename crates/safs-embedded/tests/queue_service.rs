//! Integration tests for the embedded QUEUE service

use safs_embedded::{
    wrap, EmbeddedQueueService, Handle, HandleRegistry, InitInfo, RequestHandler, RequestInfo, ResultCode,
    ServiceResult, WaitPolicy,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn started() -> (Arc<HandleRegistry>, Arc<EmbeddedQueueService>) {
    init_logging();
    let registry = Arc::new(HandleRegistry::new());
    let service = EmbeddedQueueService::new(&registry);
    assert!(service.init(&InitInfo::new("QUEUE", "")).is_ok());
    (registry, service)
}

fn request(service: &EmbeddedQueueService, text: &str) -> ServiceResult {
    service.accept_request(&RequestInfo::local("tester", -1, text))
}

#[test]
fn test_queue_then_get_named_handle() {
    let (registry, service) = started();
    let foo = Handle::new(&registry, "Foo");
    foo.register().unwrap();

    assert!(request(&service, "QUEUE NAME Foo MESSAGE hello").is_ok());
    assert_eq!(foo.get_queue_message(WaitPolicy::NoWait), ServiceResult::ok_with("hello"));
}

#[test]
fn test_get_wait_on_empty_queue_times_out() {
    let (registry, service) = started();
    Handle::new(&registry, "Foo").register().unwrap();

    let start = Instant::now();
    assert_eq!(request(&service, "GET NAME Foo WAIT 500").rc, ResultCode::Timeout);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_secs(3));
}

#[test]
fn test_case_insensitive_grammar() {
    let (registry, service) = started();
    Handle::new(&registry, "Foo").register().unwrap();

    assert!(request(&service, "queue name FOO message hi").is_ok());
    assert_eq!(request(&service, "Get Name foo"), ServiceResult::ok_with("hi"));
}

#[test]
fn test_messages_with_spaces() {
    let (registry, service) = started();
    let foo = Handle::new(&registry, "Foo");

    let text = format!("QUEUE NAME Foo MESSAGE {}", wrap("a message with WAIT and GET in it"));
    assert!(request(&service, &text).is_ok());
    assert_eq!(
        foo.get_queue_message(WaitPolicy::NoWait).result,
        "a message with WAIT and GET in it"
    );

    assert!(request(&service, r#"QUEUE NAME Foo MESSAGE "say \"hi\"""#).is_ok());
    assert_eq!(foo.get_queue_message(WaitPolicy::NoWait).result, r#"say "hi""#);
}

#[test]
fn test_bad_length_prefix_is_invalid_request() {
    let (_registry, service) = started();
    let huge = format!("QUEUE MESSAGE :{}:x", usize::MAX);
    assert_eq!(request(&service, &huge).rc, ResultCode::InvalidRequestString);
    assert_eq!(request(&service, "QUEUE MESSAGE :99:abc").rc, ResultCode::InvalidRequestString);

    // The service keeps answering after a rejected request.
    assert!(request(&service, "QUEUE MESSAGE :0:").is_ok());
    assert_eq!(request(&service, "GET"), ServiceResult::ok_with(""));
}

#[test]
fn test_blank_name_uses_own_queue() {
    let (_registry, service) = started();
    assert!(request(&service, "QUEUE NAME \"\" MESSAGE mine").is_ok());
    assert_eq!(request(&service, "GET"), ServiceResult::ok_with("mine"));
}

#[test]
fn test_producers_and_blocked_consumer() {
    let (registry, service) = started();
    let worker = Handle::new(&registry, "worker");
    worker.register().unwrap();

    let consumer = {
        let service = service.clone();
        thread::spawn(move || {
            let mut got = Vec::new();
            loop {
                let result = request(&service, "GET NAME worker WAIT 1000");
                if !result.is_ok() {
                    return (got, result.rc);
                }
                got.push(result.result);
            }
        })
    };

    let producers: Vec<_> = (0..5)
        .map(|p| {
            let client = Handle::new(&registry, format!("producer-{}", p));
            thread::spawn(move || {
                for i in 0..10 {
                    client
                        .submit("QUEUE", &format!("QUEUE NAME worker MESSAGE {}-{}", p, i))
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let (got, rc) = consumer.join().unwrap();
    assert_eq!(rc, ResultCode::Timeout);
    assert_eq!(got.len(), 50);
    for p in 0..5 {
        let from_p: Vec<_> = got
            .iter()
            .filter(|m| m.starts_with(&format!("{}-", p)))
            .cloned()
            .collect();
        let expected: Vec<_> = (0..10).map(|i| format!("{}-{}", p, i)).collect();
        assert_eq!(from_p, expected);
    }
}

#[test]
fn test_terminate_clears_every_queue() {
    let (registry, service) = started();
    let a = Handle::new(&registry, "a");
    let b = Handle::new(&registry, "b");
    a.accept_queue_message("1");
    b.accept_queue_message("2");

    assert!(service.terminate().is_ok());
    assert_eq!(a.queue_len(), 0);
    assert_eq!(b.queue_len(), 0);
    assert!(!registry.is_service_registered("QUEUE"));
    assert!(registry.is_handle_registered("a"));
}
