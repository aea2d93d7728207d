//! Listener bound to the configured channel.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

#[cfg(unix)]
use tracing::warn;

use metabridge_config::ChannelEndpoint;

use super::{ChannelStream, ListenerError, TRANSPORT_TARGET};

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::Path;

/// Non-blocking listener on the channel endpoint.
///
/// Every acceptor owns one handle obtained through [`ChannelListener::try_clone`];
/// all handles share the underlying socket.
#[derive(Debug)]
pub(crate) struct ChannelListener {
    endpoint: ChannelEndpoint,
    listener: ListenerKind,
}

#[derive(Debug)]
enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl ChannelListener {
    /// Binds `endpoint` and switches the socket to non-blocking accept.
    ///
    /// A stale Unix socket file left by a dead process is removed first; a
    /// live one makes binding fail with [`ListenerError::UnixInUse`].
    pub(crate) fn bind(endpoint: &ChannelEndpoint) -> Result<Self, ListenerError> {
        let listener = match endpoint {
            ChannelEndpoint::Tcp { host, port } => ListenerKind::Tcp(bind_tcp(host, *port)?),
            ChannelEndpoint::Unix { path } => {
                #[cfg(unix)]
                {
                    ListenerKind::Unix(bind_unix(path.as_std_path())?)
                }

                #[cfg(not(unix))]
                {
                    let _ = path;
                    return Err(ListenerError::UnsupportedUnix {
                        endpoint: endpoint.to_string(),
                    });
                }
            }
        };
        let bound = Self {
            endpoint: endpoint.clone(),
            listener,
        };
        if let Err(source) = bound.set_nonblocking() {
            bound.cleanup();
            return Err(ListenerError::NonBlocking { source });
        }
        Ok(bound)
    }

    /// Returns another handle onto the same bound socket.
    pub(crate) fn try_clone(&self) -> Result<Self, ListenerError> {
        let listener = match &self.listener {
            ListenerKind::Tcp(listener) => listener.try_clone().map(ListenerKind::Tcp),
            #[cfg(unix)]
            ListenerKind::Unix(listener) => listener.try_clone().map(ListenerKind::Unix),
        }
        .map_err(|source| ListenerError::Clone { source })?;
        Ok(Self {
            endpoint: self.endpoint.clone(),
            listener,
        })
    }

    /// Bound TCP address, which resolves port `0` to the assigned port.
    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            ListenerKind::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            ListenerKind::Unix(_) => None,
        }
    }

    /// Accepts a pending connection, returning `Ok(None)` when none is
    /// waiting.
    pub(crate) fn accept(&self) -> io::Result<Option<ChannelStream>> {
        let accepted = match &self.listener {
            ListenerKind::Tcp(tcp) => tcp.accept().map(|(stream, _)| ChannelStream::Tcp(stream)),
            #[cfg(unix)]
            ListenerKind::Unix(unix) => {
                unix.accept().map(|(stream, _)| ChannelStream::Unix(stream))
            }
        };
        match accepted {
            Ok(stream) => Ok(Some(stream)),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Removes the Unix socket file, if any.
    pub(crate) fn cleanup(&self) {
        #[cfg(unix)]
        cleanup_unix_socket(&self.endpoint);
    }

    fn set_nonblocking(&self) -> io::Result<()> {
        match &self.listener {
            ListenerKind::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            ListenerKind::Unix(listener) => listener.set_nonblocking(true),
        }
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    let addr = addrs.next().ok_or_else(|| ListenerError::ResolveEmpty {
        host: host.to_owned(),
        port,
    })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

#[cfg(unix)]
fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    if path.exists() {
        remove_stale_socket(path)?;
    }

    UnixListener::bind(path).map_err(|source| ListenerError::BindUnix {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(unix)]
fn remove_stale_socket(path: &Path) -> Result<(), ListenerError> {
    let metadata = fs::symlink_metadata(path).map_err(|source| ListenerError::UnixMetadata {
        path: path.display().to_string(),
        source,
    })?;
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::UnixNotSocket {
            path: path.display().to_string(),
        });
    }
    match UnixStream::connect(path) {
        Ok(_stream) => Err(ListenerError::UnixInUse {
            path: path.display().to_string(),
        }),
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
                path: path.display().to_string(),
                source,
            })
        }
        Err(source) => Err(ListenerError::UnixConnect {
            path: path.display().to_string(),
            source,
        }),
    }
}

#[cfg(unix)]
fn cleanup_unix_socket(endpoint: &ChannelEndpoint) {
    let Some(path) = endpoint.unix_path() else {
        return;
    };
    if let Err(error) = fs::remove_file(path.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: TRANSPORT_TARGET,
            error = %error,
            path = %path,
            "failed to remove unix socket file"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    fn accept_within(listener: &ChannelListener, timeout: Duration) -> Option<ChannelStream> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(stream) = listener.accept().expect("accept") {
                return Some(stream);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn accept_returns_none_without_pending_clients() {
        let listener =
            ChannelListener::bind(&ChannelEndpoint::tcp("127.0.0.1", 0)).expect("bind tcp");

        assert!(listener.accept().expect("accept").is_none());
    }

    #[test]
    fn cloned_handles_share_the_bound_socket() {
        let listener =
            ChannelListener::bind(&ChannelEndpoint::tcp("127.0.0.1", 0)).expect("bind tcp");
        let clone = listener.try_clone().expect("clone listener");
        let addr = listener.local_addr().expect("tcp address");

        let mut client = TcpStream::connect(addr).expect("connect");
        client.write_all(b"hi\n").expect("write");

        let mut stream = accept_within(&clone, Duration::from_secs(2)).expect("accepted");
        stream
            .configure_for_worker(Duration::from_secs(1))
            .expect("configure stream");
        let mut buf = [0_u8; 3];
        stream.read_exact(&mut buf).expect("read");
        assert_eq!(&buf, b"hi\n");
    }

    #[cfg(unix)]
    #[test]
    fn unix_listener_replaces_stale_socket_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("metabridged.sock");
        {
            let _stale = UnixListener::bind(&path).expect("bind stale listener");
        }
        assert!(path.exists(), "stale socket should remain");

        let endpoint = ChannelEndpoint::unix(path.to_str().expect("utf8 path").to_owned());
        let listener = ChannelListener::bind(&endpoint).expect("bind over stale socket");
        UnixStream::connect(&path).expect("connect unix client");
        assert!(accept_within(&listener, Duration::from_secs(2)).is_some());

        listener.cleanup();
        assert!(!path.exists(), "cleanup removes the socket file");
    }

    #[cfg(unix)]
    #[test]
    fn unix_listener_rejects_in_use_socket() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("metabridged.sock");
        let _existing = UnixListener::bind(&path).expect("bind existing listener");

        let endpoint = ChannelEndpoint::unix(path.to_str().expect("utf8 path").to_owned());
        let error = ChannelListener::bind(&endpoint).expect_err("socket is live");
        assert!(matches!(error, ListenerError::UnixInUse { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn unix_listener_rejects_regular_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("metabridged.sock");
        fs::write(&path, b"not a socket").expect("write file");

        let endpoint = ChannelEndpoint::unix(path.to_str().expect("utf8 path").to_owned());
        let error = ChannelListener::bind(&endpoint).expect_err("regular file");
        assert!(matches!(error, ListenerError::UnixNotSocket { .. }));
    }
}
