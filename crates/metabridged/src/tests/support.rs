//! Shared helpers for daemon tests: channel clients, test handlers and a
//! recording health reporter.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use metabridge_config::{ChannelEndpoint, Config};

use crate::bootstrap::BootstrapError;
use crate::dispatch::{HandlerError, HandlerRegistry, Request};
use crate::handlers::{InMemoryCatalog, PING, ping, register_catalog};
use crate::health::HealthReporter;
use crate::server::{DrainReport, IpcServer, ServerError, ServerOptions};

const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const TEST_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Line-oriented client for the channel.
pub(crate) struct TestClient {
    reader: BufReader<Box<dyn Read + Send>>,
    writer: Box<dyn Write + Send>,
}

impl TestClient {
    pub(crate) fn connect_tcp(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect tcp client");
        stream
            .set_read_timeout(Some(CLIENT_TIMEOUT))
            .expect("set client timeout");
        let writer = stream.try_clone().expect("clone client stream");
        Self {
            reader: BufReader::new(Box::new(stream)),
            writer: Box::new(writer),
        }
    }

    #[cfg(unix)]
    pub(crate) fn connect_unix(path: &std::path::Path) -> Self {
        let stream = std::os::unix::net::UnixStream::connect(path).expect("connect unix client");
        stream
            .set_read_timeout(Some(CLIENT_TIMEOUT))
            .expect("set client timeout");
        let writer = stream.try_clone().expect("clone client stream");
        Self {
            reader: BufReader::new(Box::new(stream)),
            writer: Box::new(writer),
        }
    }

    pub(crate) fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).expect("write to channel");
        self.writer.flush().expect("flush channel");
    }

    pub(crate) fn send(&mut self, request: &Value) {
        let mut line = serde_json::to_vec(request).expect("serialise request");
        line.push(b'\n');
        self.send_raw(&line);
    }

    /// Reads one response line; `None` once the server closed the
    /// connection.
    pub(crate) fn read_response(&mut self) -> Option<Value> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).expect("read response");
        if read == 0 {
            return None;
        }
        Some(serde_json::from_str(&line).expect("response JSON"))
    }

    pub(crate) fn call(&mut self, request: &Value) -> Value {
        self.send(request);
        self.read_response().expect("response before close")
    }
}

pub(crate) fn request(id: &str, action: &str, parameters: Value) -> Value {
    json!({"id": id, "action": action, "parameters": parameters})
}

/// Counts invocations of the `slow` handler that have begun.
#[derive(Debug, Clone, Default)]
pub(crate) struct SlowCalls(Arc<AtomicUsize>);

impl SlowCalls {
    pub(crate) fn started(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn wait_for(&self, expected: usize) -> bool {
        let deadline = Instant::now() + CLIENT_TIMEOUT;
        while Instant::now() < deadline {
            if self.started() >= expected {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }
}

/// Registry with the built-in actions plus `echo`, `slow`, `fail` and
/// `explode`.
pub(crate) fn test_registry(slow_calls: &SlowCalls) -> HandlerRegistry {
    let counter = Arc::clone(&slow_calls.0);
    let builder = HandlerRegistry::builder()
        .register(PING, ping)
        .and_then(|builder| builder.register("echo", echo))
        .and_then(|builder| {
            builder.register(
                "slow",
                move |request: &Request| -> Result<Value, HandlerError> {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let millis = request
                        .parameters
                        .get("millis")
                        .and_then(Value::as_u64)
                        .unwrap_or(100);
                    thread::sleep(Duration::from_millis(millis));
                    Ok(json!({"slept": millis}))
                },
            )
        })
        .and_then(|builder| builder.register("fail", fail))
        .and_then(|builder| builder.register("explode", explode))
        .expect("register test handlers");
    register_catalog(builder, &Arc::new(InMemoryCatalog::default()))
        .expect("register catalog")
        .build()
}

fn echo(request: &Request) -> Result<Value, HandlerError> {
    Ok(Value::Object(request.parameters.clone()))
}

fn fail(_request: &Request) -> Result<Value, HandlerError> {
    Err(HandlerError::failed("deliberate failure"))
}

fn explode(_request: &Request) -> Result<Value, HandlerError> {
    panic!("handler exploded");
}

pub(crate) fn test_options(acceptors: usize) -> ServerOptions {
    ServerOptions {
        acceptors,
        max_message_bytes: 64 * 1024,
        poll_interval: TEST_POLL_INTERVAL,
    }
}

/// Starts a loopback TCP server on an ephemeral port.
pub(crate) fn start_tcp_server(acceptors: usize, slow_calls: &SlowCalls) -> (IpcServer, SocketAddr) {
    let server = IpcServer::new(
        ChannelEndpoint::tcp("127.0.0.1", 0),
        test_options(acceptors),
        test_registry(slow_calls),
    );
    server.start().expect("start server");
    let addr = server.local_addr().expect("tcp server address");
    (server, addr)
}

/// Configuration pointing at a loopback TCP channel on an ephemeral port.
pub(crate) fn loopback_config(acceptors: usize) -> Config {
    Config {
        channel: ChannelEndpoint::tcp("127.0.0.1", 0),
        acceptors,
        poll_interval_ms: 20,
        ..Config::default()
    }
}

/// Health reporter that records event names in order.
#[derive(Debug, Default)]
pub(crate) struct RecordingHealthReporter {
    events: Mutex<Vec<String>>,
}

impl RecordingHealthReporter {
    pub(crate) fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, event: &str) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.to_owned());
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record("bootstrap_starting");
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record("bootstrap_succeeded");
    }

    fn bootstrap_failed(&self, _error: &BootstrapError) {
        self.record("bootstrap_failed");
    }

    fn server_started(&self, _config: &Config) {
        self.record("server_started");
    }

    fn server_failed(&self, _error: &ServerError) {
        self.record("server_failed");
    }

    fn server_stopped(&self, _report: &DrainReport) {
        self.record("server_stopped");
    }
}
