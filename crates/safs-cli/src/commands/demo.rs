//! `safs demo`: producers fill three queues, then the main thread drains them.

use anyhow::Context;
use log::{info, warn};
use safs_embedded::{wrap, EmbeddedConfig, EmbeddedServices, ResultCode};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

const NAMED_QUEUES: [&str; 2] = ["MyQueue1", "MyQueue2"];
const CLIENT_HANDLE: &str = "safs-demo";

pub fn execute(config: &EmbeddedConfig, producers: usize, wait_ms: u64) -> anyhow::Result<()> {
    let services = EmbeddedServices::start(config)?;
    let result = run(&services, config, producers, wait_ms);
    services.shutdown();
    result
}

fn run(services: &EmbeddedServices, config: &EmbeddedConfig, producers: usize, wait_ms: u64) -> anyhow::Result<()> {
    let queue_service = services
        .queue()
        .context("the demo needs the queue service enabled")?;
    let service_name = queue_service.service_name();

    let mut queues = vec![config.queue.handle_id.clone()];
    for name in NAMED_QUEUES {
        services.client(name)?;
        queues.push(name.to_string());
    }
    let client = services.client(CLIENT_HANDLE)?;

    thread::scope(|scope| {
        for queue in &queues {
            for i in 0..producers {
                let client = client.clone();
                let service_name = &service_name;
                scope.spawn(move || {
                    let stamp = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_millis())
                        .unwrap_or_default();
                    let message = format!("message {} {} for handle {}", i, stamp, queue);
                    let request = format!("QUEUE NAME {} MESSAGE {}", wrap(queue), wrap(&message));
                    if let Err(err) = client.submit(service_name, &request) {
                        warn!("Producer {} for '{}' failed: {}", i, queue, err);
                    }
                });
            }
        }
    });

    for queue in &queues {
        let request = format!("GET NAME {} WAIT {}", wrap(queue), wait_ms);
        let mut drained = 0;
        loop {
            let result = client.submit2(&service_name, &request)?;
            match result.rc {
                ResultCode::Ok => {
                    drained += 1;
                    println!("{}: {}", queue, result.result);
                }
                ResultCode::Timeout | ResultCode::NoQueueElement => break,
                rc => anyhow::bail!("draining '{}' failed with {}: {}", queue, rc, result.result),
            }
        }
        info!("Drained {} message(s) from '{}'", drained, queue);
        println!("{}: {} message(s)", queue, drained);
    }
    Ok(())
}
