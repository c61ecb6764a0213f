use std::io;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

/// Base URL for requests sent over a channel; the host part is ignored since
/// requests travel over the socket.
const CHANNEL_URL: &str = "http://container";

/// Transport into a sandbox's control socket, handed to the invocation dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxChannel {
    url: String,
    socket: PathBuf,
}

impl SandboxChannel {
    pub(crate) fn new(socket: PathBuf) -> Self {
        Self {
            url: CHANNEL_URL.to_string(),
            socket,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket
    }

    /// Dial the control socket.
    pub fn connect(&self) -> io::Result<UnixStream> {
        UnixStream::connect(&self.socket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixListener;

    #[test]
    fn test_connect_reaches_listener() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ol.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let channel = SandboxChannel::new(path);

        let mut client = channel.connect().unwrap();
        let (mut server, _) = listener.accept().unwrap();
        client.write_all(b"ping").unwrap();
        drop(client);

        let mut received = String::new();
        server.read_to_string(&mut received).unwrap();
        assert_eq!(received, "ping");
    }

    #[test]
    fn test_connect_without_listener_fails_on_use() {
        let dir = tempfile::tempdir().unwrap();
        let channel = SandboxChannel::new(dir.path().join("ol.sock"));
        assert!(channel.connect().is_err());
    }
}
