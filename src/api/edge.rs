use super::*;
use crate::error::ServerError;
use std::net::{IpAddr, SocketAddr};
use std::thread::JoinHandle;
use tokio::sync::oneshot;

/// Everything a request handler needs. Cheap to clone.
#[derive(Clone)]
pub struct EdgeState {
    pub registry: SharedRegistry,
    pub queue: InvocationQueue,
    pub log: ServerLog,
    pub assets: AssetCache,
    pub product_name: Arc<str>,
    pub invocation_timeout: Duration,
}

impl EdgeState {
    pub fn new(
        config: &ServerConfig,
        registry: SharedRegistry,
        queue: InvocationQueue,
        log: ServerLog,
    ) -> Self {
        Self {
            assets: AssetCache::new(config, &log),
            registry,
            queue,
            log,
            product_name: Arc::from(config.product_name.as_str()),
            invocation_timeout: config.invocation_timeout(),
        }
    }
}

/// The HTTP listener: one OS thread running a single-threaded runtime that
/// serves every connection.
pub struct HttpEdge {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl HttpEdge {
    /// Binds before spawning so address errors reach the caller. Port 0
    /// picks a free port; see [`HttpEdge::local_addr`].
    pub fn start(bind_address: &str, port: u16, state: EdgeState) -> Result<Self, ServerError> {
        let ip: IpAddr = bind_address
            .parse()
            .map_err(|_| ServerError::InvalidAddress(bind_address.to_string()))?;
        let addr = SocketAddr::new(ip, port);
        let listener =
            std::net::TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let log = state.log.clone();
        let thread = std::thread::Builder::new()
            .name("tickwire-http".into())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        log.error(format!("Failed to start listener runtime: {e}"));
                        return;
                    }
                };
                rt.block_on(async move {
                    let listener = match tokio::net::TcpListener::from_std(listener) {
                        Ok(l) => l,
                        Err(e) => {
                            log.error(format!("Failed to adopt listener socket: {e}"));
                            return;
                        }
                    };
                    let app = build_router(state);
                    let served = axum::serve(listener, app)
                        .with_graceful_shutdown(async move {
                            let _ = shutdown_rx.await;
                        })
                        .await;
                    match served {
                        Ok(()) => log.log_message("Listener stopped", LogLevel::Raised),
                        Err(e) => log.error(format!("Listener failed: {e}")),
                    }
                });
            })?;

        Ok(Self {
            local_addr,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Asks the accept loop to stop. Returns immediately.
    pub fn signal_stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub(super) fn detach(&mut self) {
        self.thread.take();
    }

    /// Signals the accept loop and waits for the thread to exit.
    pub fn stop(&mut self) {
        self.signal_stop();
        self.join();
    }
}

impl Drop for HttpEdge {
    fn drop(&mut self) {
        self.stop();
    }
}
