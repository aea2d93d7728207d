use std::io;

use thiserror::Error;

use crate::transport::ListenerError;

/// Errors raised while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The pool was configured with zero acceptors.
    #[error("server requires at least one acceptor")]
    NoAcceptors,
    /// The channel could not be bound.
    #[error(transparent)]
    Listener(#[from] ListenerError),
    /// An acceptor thread could not be spawned.
    #[error("failed to spawn acceptor {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: io::Error,
    },
}
