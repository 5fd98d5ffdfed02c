//! Tickwire: an embedded HTTP command and telemetry server for bevy hosts.
//!
//! Host code registers named operations and read-only variables. HTTP
//! requests to an operation's path are queued and executed on the thread
//! that owns the `World`, inside the `Update` schedule; `/heartbeat` streams
//! variable snapshots and buffered log lines to the bundled web console.

pub mod api;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod registry;
pub mod response;

pub use api::{CommandServer, CommandServerAppExt, CommandServerPlugin};
pub use config::ServerConfig;
pub use error::{
    ArgumentCoercionError, DiscoveryError, InvocationError, RegistrationError,
    ResponseLifecycleError, ServerError,
};
pub use logging::{LogLevel, ServerLog};
pub use registry::{
    Args, OperationMeta, OperationSource, ParamSpec, ParamType, RegistryBuilder, SourceFn,
};
pub use response::{HttpReply, ResponseHandle};
