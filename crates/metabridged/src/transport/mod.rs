//! Channel transport: binding the well-known endpoint and accepting
//! connections on it.
//!
//! Acceptor threads each hold their own [`ChannelListener`] handle onto the
//! same bound socket, so several clients can be mid-connect at once.

mod errors;
mod listener;
mod stream;

pub use self::errors::ListenerError;
pub(crate) use self::listener::ChannelListener;
pub(crate) use self::stream::ChannelStream;

pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
