//! SAFS embedded messaging
//!
//! In-process stand-ins for the STAF services SAFS depends on, so test
//! components can talk to each other without a STAF daemon:
//! - Bounded blocking FIFO queues (`fifo`)
//! - A registry of named handles and services (`registry`)
//! - Handles with request routing and message queues (`handle`, `service`)
//! - STAF-style request grammar (`command`)
//! - The QUEUE, SEM and VAR services (`queue`, `sem`, `var`)
//! - TOML configuration and a start/shutdown helper (`config`, `services`)
//!
//! Every handle and service is bound to an explicit
//! [`HandleRegistry`] instance; there is no process-global state.

pub mod command;
pub mod config;
pub mod defaults;
pub mod error;
pub mod fifo;
pub mod handle;
pub mod queue;
pub mod registry;
pub mod result;
pub mod sem;
pub mod service;
pub mod services;
pub mod var;

pub use command::{wrap, CommandParser, ParseError, ParsedCommand, ValuePolicy};
pub use config::{ConfigError, EmbeddedConfig, QueueConfig, RegistryConfig, SemConfig, VarConfig};
pub use error::{HandleError, RegistryError};
pub use fifo::{Fifo, FifoError, WaitPolicy};
pub use handle::{Handle, HandleState, NativeConnector, NativeTransport};
pub use queue::EmbeddedQueueService;
pub use registry::HandleRegistry;
pub use result::{InitInfo, RequestInfo, ResultCode, ServiceResult};
pub use sem::{EmbeddedSemService, EventState};
pub use service::{RequestHandler, ServiceEndpoint, ServiceState};
pub use services::EmbeddedServices;
pub use var::EmbeddedVariableService;
