//! TCP Server
//!
//! Accepts connections and runs each one on its own thread.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::connection::{Connection, Session};
use super::tcp;
use super::transport::{FrameReader, FrameWriter};
use crate::config::ServerConfig;
use crate::error::{LinkError, Result};
use crate::router::Router;

/// How long the acceptor sleeps when no connection is pending
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

type SessionFactory<S> = Box<dyn Fn() -> S + Send + Sync>;

/// TCP server for a router
pub struct Server<S: Session> {
    shared: Arc<Shared<S>>,
    listener: Option<TcpListener>,
}

/// State shared with connection threads
struct Shared<S: Session> {
    config: ServerConfig,
    router: Arc<Router<S>>,
    new_session: SessionFactory<S>,
    connections: Arc<Mutex<HashMap<u64, Weak<Connection<S>>>>>,
    shutdown: AtomicBool,
}

impl<S: Session> Server<S> {
    /// Create a new server; each accepted connection gets a session from
    /// `new_session`
    pub fn new<F>(config: ServerConfig, mut router: Router<S>, new_session: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        if config.log_traffic {
            router.set_log_traffic(true);
        }
        Self::with_shared_router(config, Arc::new(router), new_session)
    }

    /// Create a server around a router that is also used elsewhere
    pub fn with_shared_router<F>(config: ServerConfig, router: Arc<Router<S>>, new_session: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                config,
                router,
                new_session: Box::new(new_session),
                connections: Arc::new(Mutex::new(HashMap::new())),
                shutdown: AtomicBool::new(false),
            }),
            listener: None,
        }
    }

    /// Bind the listen address from the config
    pub fn bind(&mut self) -> Result<SocketAddr> {
        let listener = TcpListener::bind(&self.shared.config.listen_addr)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        tracing::info!("Listening on {}", addr);
        self.listener = Some(listener);
        Ok(addr)
    }

    /// Address the server is bound to
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Accept connections until [`Server::shutdown`] (blocking)
    pub fn run(&self) -> Result<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| LinkError::Config("server is not bound".to_string()))?;

        while !self.shared.shutdown.load(Ordering::Acquire) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = self.spawn_tcp(stream, addr) {
                        tracing::warn!("Rejected connection from {}: {}", addr, e);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        tracing::info!("Server stopped accepting connections");
        Ok(())
    }

    /// Serve one connection over any transport on the calling thread
    pub fn serve<R, W>(&self, reader: R, writer: W, peer: impl Into<String>) -> Result<()>
    where
        R: FrameReader,
        W: FrameWriter + 'static,
    {
        self.shared.serve(reader, writer, peer.into())
    }

    /// Stop accepting and close every live connection
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);

        // Collect first: closing runs the callback that locks the registry
        let live: Vec<_> = self
            .shared
            .connections
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .collect();

        tracing::info!("Shutting down, closing {} connection(s)", live.len());
        for conn in live {
            conn.close();
        }
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.shared.connections.lock().len()
    }

    pub fn router(&self) -> &Arc<Router<S>> {
        &self.shared.router
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    fn spawn_tcp(&self, stream: std::net::TcpStream, addr: SocketAddr) -> Result<()> {
        stream.set_nonblocking(false)?;
        tcp::configure(&stream, &self.shared.config)?;
        let (reader, writer) = tcp::split(stream, self.shared.config.max_frame_size)?;

        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name(format!("cmdlink-conn-{}", addr))
            .spawn(move || {
                if let Err(e) = shared.serve(reader, writer, addr.to_string()) {
                    tracing::warn!("Connection from {} not served: {}", addr, e);
                }
            })?;
        Ok(())
    }
}

impl<S: Session> Shared<S> {
    fn serve<R, W>(&self, reader: R, mut writer: W, peer: String) -> Result<()>
    where
        R: FrameReader,
        W: FrameWriter + 'static,
    {
        let session = (self.new_session)();
        let conn = {
            let mut live = self.connections.lock();
            let refused = if self.shutdown.load(Ordering::Acquire) {
                Some(LinkError::ConnectionClosed)
            } else if live.len() >= self.config.max_connections {
                Some(LinkError::ConnectionLimit(self.config.max_connections))
            } else {
                None
            };
            if let Some(e) = refused {
                drop(live);
                let _ = writer.shutdown();
                return Err(e);
            }

            let conn = Connection::new(session, writer, peer);
            let registry = Arc::clone(&self.connections);
            conn.on_close(move |c| {
                registry.lock().remove(&c.id());
            });
            live.insert(conn.id(), Arc::downgrade(&conn));
            conn
        };

        let router = Arc::clone(&self.router);
        conn.run(reader, |c, frame| router.process_packet(c, frame));
        Ok(())
    }
}
