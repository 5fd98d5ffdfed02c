mod assets;
mod edge;
mod router;
mod routes;
mod types;
#[cfg(test)]
mod tests;

use axum::{
    extract::{Query, State},
    http::{Method, StatusCode, Uri},
    Router,
};
use bevy::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::executor::{invocation_channel, InvocationQueue, MainThreadExecutor, PendingInvocation};
use crate::logging::{LogLevel, ServerLog};
use crate::registry::{
    coerce_args, discover, OperationDescriptor, OperationRegistry, OperationSource,
    SharedRegistry,
};
use crate::response::{HttpReply, ResponseHandle, CONTENT_HTML, CONTENT_ICON};

pub use assets::AssetCache;
pub use edge::{EdgeState, HttpEdge};
pub use router::{build_router, route, Route};
pub use types::{CommandInfo, CommandsListing, Heartbeat, ParameterInfo};

/// How long shutdown keeps answering queued commands while the listener
/// thread winds down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Hosts the command server inside a bevy app.
///
/// Queued operations run in `Update`; the listener stops when the app exits.
pub struct CommandServerPlugin {
    pub config: ServerConfig,
}

impl CommandServerPlugin {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }
}

impl Default for CommandServerPlugin {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl Plugin for CommandServerPlugin {
    fn build(&self, app: &mut App) {
        let log = app
            .world()
            .get_resource::<ServerLog>()
            .cloned()
            .unwrap_or_default();
        log.set_debug_level(self.config.debug_level());
        let server = CommandServer::new(self.config.clone(), log.clone());

        app.insert_resource(log)
            .init_resource::<OperationSources>()
            .insert_resource(server)
            .add_systems(Update, run_pending_invocations)
            .add_systems(Last, shutdown_on_exit);
    }

    fn finish(&self, app: &mut App) {
        let sources = app
            .world_mut()
            .remove_resource::<OperationSources>()
            .unwrap_or_default();
        if let Some(mut server) = app.world_mut().get_resource_mut::<CommandServer>() {
            server.start(sources.0);
        }
    }
}

/// Operation sources contributed before the server starts.
#[derive(Resource, Default)]
pub struct OperationSources(pub Vec<Box<dyn OperationSource>>);

pub trait CommandServerAppExt {
    /// Contributes operations and variables. Must be called before the app
    /// finishes building; later sources are ignored.
    fn add_operation_source(&mut self, source: impl OperationSource) -> &mut Self;
}

impl CommandServerAppExt for App {
    fn add_operation_source(&mut self, source: impl OperationSource) -> &mut Self {
        self.world_mut()
            .get_resource_or_insert_with(OperationSources::default)
            .0
            .push(Box::new(source));
        self
    }
}

/// Owns both ends of the command pipeline: the listener and the executor.
#[derive(Resource)]
pub struct CommandServer {
    config: ServerConfig,
    log: ServerLog,
    registry: SharedRegistry,
    queue: InvocationQueue,
    executor: MainThreadExecutor,
    edge: Option<HttpEdge>,
}

impl CommandServer {
    pub fn new(config: ServerConfig, log: ServerLog) -> Self {
        let (queue, executor) = invocation_channel(log.clone());
        Self {
            config,
            log,
            registry: SharedRegistry::default(),
            queue,
            executor,
            edge: None,
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &InvocationQueue {
        &self.queue
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.edge.as_ref().map(HttpEdge::local_addr)
    }

    pub fn is_listening(&self) -> bool {
        self.edge.is_some()
    }

    /// Runs discovery in the background and starts listening. A listener
    /// that cannot bind is reported; the host keeps running without it.
    pub fn start(&mut self, sources: Vec<Box<dyn OperationSource>>) {
        self.spawn_discovery(sources);

        let state = EdgeState::new(&self.config, self.registry.clone(), self.queue.clone(), self.log.clone());
        match HttpEdge::start(&self.config.bind_address, self.config.port(), state) {
            Ok(edge) => {
                let port = edge.local_addr().port();
                self.log.log_message("Starting listener thread...", LogLevel::Raised);
                self.log
                    .log_message(format!("Server initialized on port {port}"), LogLevel::Normal);
                self.log.log_message(
                    format!("Navigate to: http://localhost:{port}/"),
                    LogLevel::Normal,
                );
                self.edge = Some(edge);
            }
            Err(e) => self.log.error(format!("Command server not started: {e}")),
        }
    }

    fn spawn_discovery(&self, sources: Vec<Box<dyn OperationSource>>) {
        let registry = self.registry.clone();
        let log = self.log.clone();
        let sources = Arc::new(sources);
        let thread_sources = sources.clone();
        let thread_log = log.clone();
        let thread_registry = registry.clone();
        let spawned = std::thread::Builder::new()
            .name("tickwire-discovery".into())
            .spawn(move || {
                thread_registry.publish(discover(&thread_sources, &thread_log));
            });
        if let Err(e) = spawned {
            log.warn(format!("Discovery thread failed to start ({e}), discovering inline"));
            registry.publish(discover(&sources, &log));
        }
    }

    /// Runs every queued invocation. Call once per host tick.
    pub fn drain(&self, world: &mut World) -> usize {
        self.executor.drain_and_run_all(world)
    }

    /// Stops the listener. Queued and late-arriving invocations are answered
    /// with 503 instead of being run.
    pub fn shutdown(&mut self) {
        let Some(mut edge) = self.edge.take() else {
            return;
        };
        self.log
            .log_message("Shutting down command server...", LogLevel::Normal);
        edge.signal_stop();
        let started = std::time::Instant::now();
        while !edge.is_finished() && started.elapsed() < SHUTDOWN_GRACE {
            self.executor.discard_pending();
            std::thread::sleep(Duration::from_millis(5));
        }
        if edge.is_finished() {
            edge.join();
        } else {
            self.log
                .warn("Listener thread did not stop within the grace period; detaching it");
            edge.detach();
        }
        self.executor.discard_pending();
    }
}

impl Drop for CommandServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_pending_invocations(world: &mut World) {
    if !world.contains_resource::<CommandServer>() {
        return;
    }
    world.resource_scope(|world, server: Mut<CommandServer>| {
        server.drain(world);
    });
}

fn shutdown_on_exit(mut exits: EventReader<AppExit>, mut server: ResMut<CommandServer>) {
    if exits.read().next().is_some() {
        server.shutdown();
    }
}
