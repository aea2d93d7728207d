//! Persistent accept loops.
//!
//! Each acceptor owns one listener handle and serves the connections it
//! accepts itself, so the number of acceptors bounds concurrent connections.

use std::io;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::transport::{ChannelListener, ChannelStream};

use super::worker::{ConnectionOutcome, ConnectionWorker};
use super::{SERVER_TARGET, ServerOptions, ShutdownToken};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Yields connections accepted on the channel.
///
/// `Ok(None)` means no client is waiting; errors are treated as transient.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait AcceptSource: Send {
    fn accept(&self) -> io::Result<Option<ChannelStream>>;
}

impl AcceptSource for ChannelListener {
    fn accept(&self) -> io::Result<Option<ChannelStream>> {
        ChannelListener::accept(self)
    }
}

pub(crate) struct Acceptor<L> {
    index: usize,
    listener: L,
    dispatcher: Dispatcher,
    token: ShutdownToken,
    options: ServerOptions,
}

impl<L: AcceptSource> Acceptor<L> {
    pub(crate) fn new(
        index: usize,
        listener: L,
        dispatcher: Dispatcher,
        token: ShutdownToken,
        options: ServerOptions,
    ) -> Self {
        Self {
            index,
            listener,
            dispatcher,
            token,
            options,
        }
    }

    /// Accepts and serves connections until the token is cancelled.
    pub(crate) fn run(self) {
        debug!(
            target: SERVER_TARGET,
            acceptor = self.index,
            "acceptor active"
        );
        let idle = ACCEPT_BACKOFF.min(self.options.poll_interval);
        let mut last_error = None::<io::ErrorKind>;
        while !self.token.is_cancelled() {
            match self.listener.accept() {
                Ok(Some(stream)) => {
                    last_error = None;
                    self.serve(stream);
                }
                Ok(None) => thread::sleep(idle),
                Err(error) => {
                    let kind = error.kind();
                    if last_error != Some(kind) {
                        warn!(
                            target: SERVER_TARGET,
                            acceptor = self.index,
                            error = %error,
                            "channel accept error"
                        );
                    }
                    last_error = Some(kind);
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }
        debug!(
            target: SERVER_TARGET,
            acceptor = self.index,
            "acceptor stopped"
        );
    }

    fn serve(&self, stream: ChannelStream) {
        if let Err(error) = stream.configure_for_worker(self.options.poll_interval) {
            warn!(
                target: SERVER_TARGET,
                acceptor = self.index,
                error = %error,
                "failed to configure accepted connection"
            );
            return;
        }
        let worker =
            ConnectionWorker::new(&self.dispatcher, &self.token, self.options.max_message_bytes);
        let outcome = worker.serve(stream);
        match outcome {
            ConnectionOutcome::Faulted | ConnectionOutcome::Rejected => info!(
                target: SERVER_TARGET,
                acceptor = self.index,
                ?outcome,
                "connection dropped"
            ),
            ConnectionOutcome::Closed | ConnectionOutcome::Cancelled => debug!(
                target: SERVER_TARGET,
                acceptor = self.index,
                ?outcome,
                "connection ended"
            ),
        }
    }
}
