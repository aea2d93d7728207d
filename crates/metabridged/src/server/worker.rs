//! Per-connection read, dispatch and write loop.

use std::io::{self, Read, Write};

use tracing::{debug, warn};

use crate::dispatch::{Dispatcher, Response, ResponseWriter, is_stalled};
use crate::framing::MessageFramer;

use super::{SERVER_TARGET, ShutdownToken};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// The peer closed or reset the connection.
    Closed,
    /// Shutdown was requested; buffered requests were answered first.
    Cancelled,
    /// A message overran the size bound and the connection was dropped after
    /// one failure response.
    Rejected,
    /// An unexpected I/O error ended the connection.
    Faulted,
}

/// Serves one accepted connection until it ends.
///
/// Requests on a connection are answered strictly in arrival order and each
/// response is fully written before the next request is dispatched.
#[derive(Debug)]
pub(crate) struct ConnectionWorker<'a> {
    dispatcher: &'a Dispatcher,
    token: &'a ShutdownToken,
    max_message_bytes: usize,
}

impl<'a> ConnectionWorker<'a> {
    pub(crate) fn new(
        dispatcher: &'a Dispatcher,
        token: &'a ShutdownToken,
        max_message_bytes: usize,
    ) -> Self {
        Self {
            dispatcher,
            token,
            max_message_bytes,
        }
    }

    /// Runs the connection to completion.
    ///
    /// Read and write timeouts on `stream` are treated as a chance to observe
    /// the shutdown token, not as faults. A write still stalled once the token
    /// is cancelled ends the connection as [`ConnectionOutcome::Cancelled`].
    pub(crate) fn serve<S>(&self, mut stream: S) -> ConnectionOutcome
    where
        S: Read + Write,
    {
        let mut framer = MessageFramer::new(self.max_message_bytes);
        let mut chunk = vec![0_u8; READ_CHUNK_BYTES];
        loop {
            if let Err(outcome) = self.answer_buffered(&mut framer, &mut stream) {
                return outcome;
            }
            if self.token.is_cancelled() {
                return ConnectionOutcome::Cancelled;
            }
            match stream.read(&mut chunk) {
                Ok(0) => {
                    if framer.buffered() > 0 {
                        debug!(
                            target: SERVER_TARGET,
                            bytes = framer.buffered(),
                            "discarding unterminated message at end of stream"
                        );
                    }
                    return ConnectionOutcome::Closed;
                }
                Ok(read) => framer.push(&chunk[..read]),
                Err(error) if is_retryable(&error) => {}
                Err(error) if is_disconnect(&error) => return ConnectionOutcome::Closed,
                Err(error) => {
                    warn!(
                        target: SERVER_TARGET,
                        error = %error,
                        "connection read failed"
                    );
                    return ConnectionOutcome::Faulted;
                }
            }
        }
    }

    fn answer_buffered<S: Write>(
        &self,
        framer: &mut MessageFramer,
        stream: &mut S,
    ) -> Result<(), ConnectionOutcome> {
        let mut writer = ResponseWriter::new(stream);
        loop {
            match framer.next_frame() {
                Ok(Some(frame)) => {
                    let response = self.dispatcher.dispatch_frame(&frame);
                    self.write(&mut writer, &response)?;
                }
                Ok(None) => return Ok(()),
                Err(error) => {
                    warn!(
                        target: SERVER_TARGET,
                        error = %error,
                        "closing connection after oversized message"
                    );
                    let response = Response::failure(None, error.to_string());
                    self.write(&mut writer, &response)?;
                    return Err(ConnectionOutcome::Rejected);
                }
            }
        }
    }

    fn write<W: Write>(
        &self,
        writer: &mut ResponseWriter<W>,
        response: &Response,
    ) -> Result<(), ConnectionOutcome> {
        writer
            .write_response_while(response, || !self.token.is_cancelled())
            .map_err(|error| self.write_outcome(&error))
    }

    fn write_outcome(&self, error: &io::Error) -> ConnectionOutcome {
        if is_disconnect(error) {
            return ConnectionOutcome::Closed;
        }
        if is_stalled(error) && self.token.is_cancelled() {
            debug!(
                target: SERVER_TARGET,
                "abandoning response to a peer that stopped reading"
            );
            return ConnectionOutcome::Cancelled;
        }
        warn!(
            target: SERVER_TARGET,
            error = %error,
            "connection write failed"
        );
        ConnectionOutcome::Faulted
    }
}

fn is_retryable(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use rstest::{fixture, rstest};
    use serde_json::{Value, json};

    use super::*;
    use crate::dispatch::{HandlerError, HandlerRegistry, Request};

    /// Stream that replays scripted reads and records everything written.
    struct ScriptedStream {
        reads: VecDeque<io::Result<Vec<u8>>>,
        written: Vec<u8>,
        cancel_on_read: Option<ShutdownToken>,
    }

    impl ScriptedStream {
        fn new(reads: impl IntoIterator<Item = io::Result<Vec<u8>>>) -> Self {
            Self {
                reads: reads.into_iter().collect(),
                written: Vec::new(),
                cancel_on_read: None,
            }
        }

        fn cancelling_on_first_read(mut self, token: &ShutdownToken) -> Self {
            self.cancel_on_read = Some(token.clone());
            self
        }

        fn responses(&self) -> Vec<Value> {
            self.written
                .split(|byte| *byte == b'\n')
                .filter(|line| !line.is_empty())
                .map(|line| serde_json::from_slice(line).expect("response JSON"))
                .collect()
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    if let Some(token) = self.cancel_on_read.take() {
                        token.cancel();
                    }
                    Ok(bytes.len())
                }
                Some(Err(error)) => Err(error),
                None => Ok(0),
            }
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn chunk(text: &str) -> io::Result<Vec<u8>> {
        Ok(text.as_bytes().to_vec())
    }

    #[fixture]
    fn dispatcher() -> Dispatcher {
        let registry = HandlerRegistry::builder()
            .register("echo", |request: &Request| -> Result<Value, HandlerError> {
                Ok(Value::Object(request.parameters.clone()))
            })
            .expect("register echo")
            .build();
        Dispatcher::new(registry)
    }

    #[rstest]
    fn answers_pipelined_requests_in_order(dispatcher: Dispatcher) {
        let token = ShutdownToken::new();
        let worker = ConnectionWorker::new(&dispatcher, &token, 1024);
        let mut stream = ScriptedStream::new([
            chunk("{\"id\":\"1\",\"action\":\"echo\",\"parameters\":{\"n\":1}}\n{\"id\":\"2\","),
            chunk("\"action\":\"echo\",\"parameters\":{\"n\":2}}\n"),
        ]);

        assert_eq!(worker.serve(&mut stream), ConnectionOutcome::Closed);

        let responses = stream.responses();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], "1");
        assert_eq!(responses[0]["data"], json!({"n": 1}));
        assert_eq!(responses[1]["id"], "2");
    }

    #[rstest]
    fn timeouts_are_not_faults(dispatcher: Dispatcher) {
        let token = ShutdownToken::new();
        let worker = ConnectionWorker::new(&dispatcher, &token, 1024);
        let mut stream = ScriptedStream::new([
            Err(io::Error::from(io::ErrorKind::WouldBlock)),
            Err(io::Error::from(io::ErrorKind::TimedOut)),
            Err(io::Error::from(io::ErrorKind::Interrupted)),
            chunk("{\"id\":\"t\",\"action\":\"echo\"}\n"),
        ]);

        assert_eq!(worker.serve(&mut stream), ConnectionOutcome::Closed);
        assert_eq!(stream.responses().len(), 1);
    }

    #[rstest]
    #[case(io::ErrorKind::ConnectionReset, ConnectionOutcome::Closed)]
    #[case(io::ErrorKind::BrokenPipe, ConnectionOutcome::Closed)]
    #[case(io::ErrorKind::UnexpectedEof, ConnectionOutcome::Closed)]
    #[case(io::ErrorKind::PermissionDenied, ConnectionOutcome::Faulted)]
    fn classifies_read_errors(
        dispatcher: Dispatcher,
        #[case] kind: io::ErrorKind,
        #[case] expected: ConnectionOutcome,
    ) {
        let token = ShutdownToken::new();
        let worker = ConnectionWorker::new(&dispatcher, &token, 1024);
        let stream = ScriptedStream::new([Err(io::Error::from(kind))]);

        assert_eq!(worker.serve(stream), expected);
    }

    #[rstest]
    fn empty_line_receives_parse_error(dispatcher: Dispatcher) {
        let token = ShutdownToken::new();
        let worker = ConnectionWorker::new(&dispatcher, &token, 1024);
        let mut stream = ScriptedStream::new([chunk("\n")]);

        worker.serve(&mut stream);

        let responses = stream.responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["success"], false);
        assert!(responses[0]["id"].is_null());
    }

    #[rstest]
    fn oversized_message_is_answered_then_rejected(dispatcher: Dispatcher) {
        let token = ShutdownToken::new();
        let worker = ConnectionWorker::new(&dispatcher, &token, 64);
        let mut stream = ScriptedStream::new([
            chunk("{\"id\":\"a\",\"action\":\"echo\"}\n"),
            chunk(&"x".repeat(80)),
            chunk("{\"id\":\"never\",\"action\":\"echo\"}\n"),
        ]);

        assert_eq!(worker.serve(&mut stream), ConnectionOutcome::Rejected);

        let responses = stream.responses();
        assert_eq!(responses.len(), 2, "{responses:?}");
        assert!(responses[1]["id"].is_null());
        assert!(
            responses[1]["error"]
                .as_str()
                .is_some_and(|error| error.contains("64 byte limit"))
        );
    }

    #[rstest]
    fn cancellation_answers_buffered_frames_then_stops(dispatcher: Dispatcher) {
        let token = ShutdownToken::new();
        let worker = ConnectionWorker::new(&dispatcher, &token, 1024);
        let mut stream = ScriptedStream::new([
            chunk("{\"id\":\"1\",\"action\":\"echo\"}\n{\"id\":\"2\",\"action\":\"echo\"}\n"),
            chunk("{\"id\":\"unread\",\"action\":\"echo\"}\n"),
        ])
        .cancelling_on_first_read(&token);

        assert_eq!(worker.serve(&mut stream), ConnectionOutcome::Cancelled);

        let ids: Vec<_> = stream.responses().iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("1"), json!("2")]);
    }

    #[rstest]
    fn cancelled_token_stops_before_reading(dispatcher: Dispatcher) {
        let token = ShutdownToken::new();
        token.cancel();
        let worker = ConnectionWorker::new(&dispatcher, &token, 1024);
        let mut stream = ScriptedStream::new([chunk("{\"id\":\"1\",\"action\":\"echo\"}\n")]);

        assert_eq!(worker.serve(&mut stream), ConnectionOutcome::Cancelled);
        assert!(stream.written.is_empty());
    }

    /// Peer that sends one request and then never drains its receive buffer.
    struct StalledPeer {
        request: Option<Vec<u8>>,
        write_attempts: usize,
        cancel_after: usize,
        token: ShutdownToken,
    }

    impl Read for StalledPeer {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.request.take() {
                Some(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            }
        }
    }

    impl Write for StalledPeer {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            self.write_attempts += 1;
            if self.write_attempts == self.cancel_after {
                self.token.cancel();
            }
            Err(io::Error::from(io::ErrorKind::TimedOut))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[rstest]
    fn stalled_write_yields_to_cancellation(dispatcher: Dispatcher) {
        let token = ShutdownToken::new();
        let worker = ConnectionWorker::new(&dispatcher, &token, 1024);
        let mut peer = StalledPeer {
            request: Some(b"{\"id\":\"1\",\"action\":\"echo\"}\n".to_vec()),
            write_attempts: 0,
            cancel_after: 3,
            token: token.clone(),
        };

        assert_eq!(worker.serve(&mut peer), ConnectionOutcome::Cancelled);
        assert_eq!(peer.write_attempts, 3);
    }
}
