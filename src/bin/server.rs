//! cmdlink Demo Server
//!
//! Serves a small ping/push API over framed TCP.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use clap::Parser;
use cmdlink::{
    Command, Conn, Describe, Describer, Fault, Handler, HandlerResult, Router, Server,
    ServerConfig, Session, TypeOverrides,
};
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

/// cmdlink Demo Server
#[derive(Parser, Debug)]
#[command(name = "cmdlink-server")]
#[command(about = "Demo command server with versioned handlers and pushes")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:9091")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Interval between pushes in milliseconds
    #[arg(short, long, default_value = "1000")]
    push_interval_ms: u64,

    /// Log every packet in and out
    #[arg(long)]
    log_traffic: bool,

    /// Print the API description as JSON and exit
    #[arg(long)]
    describe: bool,
}

// =============================================================================
// Session
// =============================================================================

#[derive(Default)]
struct DemoSession {
    proto_version: AtomicI32,
    pings: AtomicU32,
    /// Dropping the sender stops the push loop
    pushes: Mutex<Option<Sender<()>>>,
}

impl Session for DemoSession {
    fn on_close(&self) {
        if self.pushes.lock().take().is_some() {
            tracing::info!("Push loop stopped by disconnect");
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

#[derive(Debug, Deserialize)]
struct PingRequest {
    ping: String,
}

impl Describe for PingRequest {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.object::<Self>(|o| {
            o.field::<String>("ping");
        })
    }
}

#[derive(Debug, Serialize)]
struct Pong {
    pong: String,
    times: u32,
}

impl Command for Pong {
    const NAME: &'static str = "pong";
}

impl Describe for Pong {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.object::<Self>(|o| {
            o.field::<String>("pong").field::<u32>("times");
        })
    }
}

/// Sent next to `pong` from protocol version 1 on
#[derive(Debug, Serialize)]
struct Version {
    version: i32,
    server: &'static str,
}

impl Command for Version {
    const NAME: &'static str = "version";
}

impl Describe for Version {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.object::<Self>(|o| {
            o.field::<i32>("version").field::<String>("server");
        })
    }
}

#[derive(Debug, Deserialize)]
struct HelloRequest {
    version: i32,
}

impl Describe for HelloRequest {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.object::<Self>(|o| {
            o.field::<i32>("version");
        })
    }
}

/// Returns the payload unchanged
#[derive(Debug, Serialize)]
struct EchoReply(Value);

impl Command for EchoReply {
    const NAME: &'static str = "echo";
}

impl Describe for EchoReply {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.visit::<Value>()
    }
}

#[derive(Debug, Serialize)]
struct ServerPush(String);

impl Command for ServerPush {
    const NAME: &'static str = "serverPushCommand";
}

impl Describe for ServerPush {
    fn describe(d: &mut Describer<'_>) -> Value {
        d.visit::<String>()
    }
}

// =============================================================================
// Handlers
// =============================================================================

fn hello(conn: &Conn<DemoSession>, req: HelloRequest) -> HandlerResult<Version> {
    if req.version < 0 {
        return Err(Fault::command("bad_version", "version must not be negative"));
    }
    conn.session().proto_version.store(req.version, Ordering::Relaxed);
    Ok(Version {
        version: req.version,
        server: cmdlink::VERSION,
    })
}

fn ping(conn: &Conn<DemoSession>, req: PingRequest) -> HandlerResult<Pong> {
    let times = conn.session().pings.fetch_add(1, Ordering::Relaxed) + 1;
    Ok(Pong {
        pong: req.ping,
        times,
    })
}

fn ping_v1(conn: &Conn<DemoSession>, req: PingRequest) -> HandlerResult<(Pong, Version)> {
    let version = conn.session().proto_version.load(Ordering::Relaxed);
    Ok((
        ping(conn, req)?,
        Version {
            version,
            server: cmdlink::VERSION,
        },
    ))
}

fn echo(_: &Conn<DemoSession>, payload: Value) -> HandlerResult<EchoReply> {
    Ok(EchoReply(payload))
}

fn start_pushes(conn: &Conn<DemoSession>, interval: Duration) -> HandlerResult<()> {
    let (stop_tx, stop_rx) = channel::bounded::<()>(0);
    {
        let mut pushes = conn.session().pushes.lock();
        if pushes.is_some() {
            return Err(Fault::msg("pushes already running"));
        }
        *pushes = Some(stop_tx);
    }

    let pusher = Conn::clone(conn);
    let spawned = thread::Builder::new()
        .name(format!("cmdlink-push-{}", conn.id()))
        .spawn(move || {
            let mut counter = 0u64;
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        counter += 1;
                        if let Err(e) = pusher.push(&ServerPush(format!("pushdata {}", counter))) {
                            tracing::debug!(conn = pusher.id(), "Push failed: {}", e);
                            break;
                        }
                    }
                    _ => break,
                }
            }
            tracing::debug!(conn = pusher.id(), pushed = counter, "Push loop finished");
        });

    if let Err(e) = spawned {
        conn.session().pushes.lock().take();
        return Err(e.into());
    }
    Ok(())
}

fn stop_pushes(conn: &Conn<DemoSession>) -> HandlerResult<()> {
    match conn.session().pushes.lock().take() {
        Some(_) => Ok(()),
        None => Err(Fault::msg("pushes are not running")),
    }
}

fn build_router(interval: Duration) -> cmdlink::Result<Router<DemoSession>> {
    let mut router = Router::new();
    router
        .register(0, "hello", Handler::with_input(hello))?
        .register(0, "ping", Handler::with_input(ping))?
        .register(1, "ping", Handler::with_input(ping_v1))?
        .register(0, "echo", Handler::with_input(echo))?
        .register(
            0,
            "start_pushes",
            Handler::new(move |conn: &Conn<DemoSession>| start_pushes(conn, interval)),
        )?
        .register(0, "stop_pushes", Handler::new(stop_pushes))?;

    let api = router.describe_api(&TypeOverrides::new());
    router.register(
        0,
        "describe",
        Handler::new(move |_: &Conn<DemoSession>| Ok(api.clone())),
    )?;

    router.set_version_resolver(|conn: &Conn<DemoSession>| {
        conn.session().proto_version.load(Ordering::Relaxed)
    });
    Ok(router)
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cmdlink=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let router = match build_router(Duration::from_millis(args.push_interval_ms)) {
        Ok(router) => router,
        Err(e) => {
            tracing::error!("Failed to register handlers: {}", e);
            std::process::exit(1);
        }
    };

    if args.describe {
        let api = router.describe_api(&TypeOverrides::new());
        match serde_json::to_string_pretty(&api) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                tracing::error!("Failed to encode API description: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    tracing::info!("cmdlink Server v{}", cmdlink::VERSION);
    tracing::info!("Listen address: {}", args.listen);
    tracing::info!("Commands: {}", router.commands().join(", "));

    // Build config from args
    let config = ServerConfig::builder()
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .log_traffic(args.log_traffic)
        .build();

    let mut server = Server::new(config, router, DemoSession::default);
    if let Err(e) = server.bind() {
        tracing::error!("Failed to bind {}: {}", args.listen, e);
        std::process::exit(1);
    }
    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
