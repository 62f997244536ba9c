//! TCP Server
//!
//! Binds the listening socket and runs the accept loop. Every accepted
//! connection gets its own task; the tasks share one [`CacheEngine`] and one
//! [`ConnectionStats`].

use crate::commands::CommandHandler;
use crate::config::Config;
use crate::connection::{handle_connection, ConnectionOptions, ConnectionStats};
use crate::storage::CacheEngine;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{lookup_host, TcpListener, TcpSocket};
use tracing::{error, info, trace};

/// Fatal errors while setting up the listener.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to resolve {addr}: {source}")]
    Resolve { addr: String, source: io::Error },

    #[error("failed to create socket: {0}")]
    Socket(#[source] io::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("failed to listen on {addr}: {source}")]
    Listen { addr: SocketAddr, source: io::Error },
}

impl StartupError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::Socket(_) => 1,
            StartupError::Resolve { .. } | StartupError::Bind { .. } => 2,
            StartupError::Listen { .. } => 3,
        }
    }
}

/// A bound server, ready to accept connections.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    storage: Arc<CacheEngine>,
    stats: Arc<ConnectionStats>,
    options: ConnectionOptions,
}

impl Server {
    /// Creates the cache and binds the listening socket.
    ///
    /// The socket has `SO_REUSEADDR` set and listens with the configured
    /// backlog.
    pub async fn bind(config: &Config) -> Result<Self, StartupError> {
        let addr = resolve(config).await?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(StartupError::Socket)?;
        socket.set_reuseaddr(true).map_err(StartupError::Socket)?;

        socket
            .bind(addr)
            .map_err(|source| StartupError::Bind { addr, source })?;
        let listener = socket
            .listen(config.backlog)
            .map_err(|source| StartupError::Listen { addr, source })?;

        let storage = Arc::new(CacheEngine::with_capacity(config.capacity));
        info!(
            address = %listener.local_addr().unwrap_or(addr),
            capacity = storage.capacity(),
            backlog = config.backlog,
            "Listening"
        );

        Ok(Self {
            listener,
            storage,
            stats: Arc::new(ConnectionStats::new()),
            options: ConnectionOptions::from(config),
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The shared cache.
    pub fn storage(&self) -> Arc<CacheEngine> {
        Arc::clone(&self.storage)
    }

    /// The shared connection statistics.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Accepts connections until the task is dropped.
    ///
    /// Accept failures are logged and the loop keeps going.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    trace!(client = %addr, "Accepted connection");
                    let handler = CommandHandler::new(Arc::clone(&self.storage));
                    let stats = Arc::clone(&self.stats);

                    tokio::spawn(handle_connection(stream, addr, handler, self.options, stats));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

async fn resolve(config: &Config) -> Result<SocketAddr, StartupError> {
    let resolve_error = |source| StartupError::Resolve {
        addr: config.bind_address(),
        source,
    };

    lookup_host((config.host.as_str(), config.port))
        .await
        .map_err(resolve_error)?
        .next()
        .ok_or_else(|| {
            resolve_error(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "no addresses found",
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameReader;
    use bytes::Bytes;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::net::TcpStream;

    fn test_config(capacity: usize) -> Config {
        Config {
            port: 0,
            capacity,
            ..Config::default()
        }
    }

    async fn start_server(config: Config) -> (SocketAddr, Arc<CacheEngine>, Arc<ConnectionStats>) {
        let server = Server::bind(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let storage = server.storage();
        let stats = server.stats();
        tokio::spawn(server.run());
        (addr, storage, stats)
    }

    /// A minimal memcached client speaking over a real socket.
    struct TestClient {
        reader: FrameReader<OwnedReadHalf>,
        writer: OwnedWriteHalf,
    }

    impl TestClient {
        async fn connect(addr: SocketAddr) -> Self {
            let (reader, writer) = TcpStream::connect(addr).await.unwrap().into_split();
            Self {
                reader: FrameReader::new(reader),
                writer,
            }
        }

        async fn set(&mut self, key: &str, value: &[u8]) -> Bytes {
            let mut request = format!("set {} 0 0 {}\r\n", key, value.len()).into_bytes();
            request.extend_from_slice(value);
            request.extend_from_slice(b"\r\n");
            self.writer.write_all(&request).await.unwrap();
            self.reader.read_line().await.unwrap()
        }

        async fn get(&mut self, key: &str) -> Option<Bytes> {
            self.writer
                .write_all(format!("get {}\r\n", key).as_bytes())
                .await
                .unwrap();
            self.read_get_reply(key).await
        }

        async fn read_get_reply(&mut self, key: &str) -> Option<Bytes> {
            let line = self.reader.read_line().await.unwrap();
            if line == "END" {
                return None;
            }

            let header = String::from_utf8(line.to_vec()).unwrap();
            let fields: Vec<&str> = header.split(' ').collect();
            assert_eq!(fields[..3], ["VALUE", key, "0"]);
            let len: usize = fields[3].parse().unwrap();

            let mut block = self.reader.read_exact(len + 2).await.unwrap();
            assert!(block.ends_with(b"\r\n"));
            block.truncate(len);
            assert_eq!(self.reader.read_line().await.unwrap(), "END");
            Some(block)
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (addr, storage, _) = start_server(test_config(16)).await;
        let mut client = TestClient::connect(addr).await;

        assert_eq!(client.set("name", b"lrucached").await, "STORED");
        assert_eq!(client.get("name").await, Some(Bytes::from("lrucached")));
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_miss_reply_is_exactly_end() {
        let (addr, _, _) = start_server(test_config(16)).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(b"get missing\r\n").await.unwrap();
        stream.shutdown().await.unwrap();

        let mut output = Vec::new();
        stream.read_to_end(&mut output).await.unwrap();
        assert_eq!(output, b"END\r\n");
    }

    #[tokio::test]
    async fn test_capacity_two_eviction() {
        let (addr, storage, _) = start_server(test_config(2)).await;
        let mut client = TestClient::connect(addr).await;

        client.set("k1", b"v1").await;
        client.set("k2", b"v2").await;
        client.set("k3", b"v3").await;

        assert_eq!(client.get("k1").await, None);
        assert_eq!(client.get("k2").await, Some(Bytes::from("v2")));
        assert_eq!(client.get("k3").await, Some(Bytes::from("v3")));
        assert_eq!(storage.len(), 2);
    }

    #[tokio::test]
    async fn test_get_protects_from_eviction() {
        let (addr, _, _) = start_server(test_config(2)).await;
        let mut client = TestClient::connect(addr).await;

        client.set("a", b"1").await;
        client.set("b", b"2").await;
        assert!(client.get("a").await.is_some());
        client.set("c", b"3").await;

        assert_eq!(client.get("a").await, Some(Bytes::from("1")));
        assert_eq!(client.get("b").await, None);
    }

    #[tokio::test]
    async fn test_partial_frames() {
        let (addr, _, _) = start_server(test_config(16)).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.set_nodelay(true).unwrap();

        let request = b"set split 0 0 11\r\nhello world\r\nget split\r\n";
        for chunk in request.chunks(3) {
            stream.write_all(chunk).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let expected = b"STORED\r\nVALUE split 0 11\r\nhello world\r\nEND\r\n";
        let mut output = vec![0u8; expected.len()];
        stream.read_exact(&mut output).await.unwrap();
        assert_eq!(output, expected);
    }

    #[tokio::test]
    async fn test_pipelined_commands() {
        let (addr, _, _) = start_server(test_config(16)).await;
        let mut client = TestClient::connect(addr).await;

        client
            .writer
            .write_all(b"set a 0 0 1\r\n1\r\nset b 0 0 1\r\n2\r\nget a\r\nget b\r\nget c\r\n")
            .await
            .unwrap();

        assert_eq!(client.reader.read_line().await.unwrap(), "STORED");
        assert_eq!(client.reader.read_line().await.unwrap(), "STORED");
        assert_eq!(client.read_get_reply("a").await, Some(Bytes::from("1")));
        assert_eq!(client.read_get_reply("b").await, Some(Bytes::from("2")));
        assert_eq!(client.read_get_reply("c").await, None);
    }

    fn client_entry(client_id: usize, i: usize) -> (String, String) {
        (
            format!("c{}-k{}", client_id, i),
            format!("value-{}-{}", client_id, i),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_clients_disjoint_keys() {
        let (addr, storage, stats) = start_server(test_config(4096)).await;

        let mut tasks = Vec::new();
        for client_id in 0..16 {
            tasks.push(tokio::spawn(async move {
                let mut client = TestClient::connect(addr).await;
                for i in 0..50 {
                    let (key, value) = client_entry(client_id, i);
                    assert_eq!(client.set(&key, value.as_bytes()).await, "STORED");
                }
                for i in 0..50 {
                    let (key, value) = client_entry(client_id, i);
                    assert_eq!(client.get(&key).await, Some(Bytes::from(value)));
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(storage.len(), 16 * 50);
        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_clients_small_cache() {
        let (addr, storage, _) = start_server(test_config(8)).await;

        let mut tasks = Vec::new();
        for client_id in 0..8 {
            tasks.push(tokio::spawn(async move {
                let mut client = TestClient::connect(addr).await;
                for i in 0..50 {
                    let (key, value) = client_entry(client_id, i);
                    assert_eq!(client.set(&key, value.as_bytes()).await, "STORED");
                }
                for i in 0..50 {
                    // Other clients may have evicted it already; a hit must
                    // still carry this client's value.
                    let (key, value) = client_entry(client_id, i);
                    if let Some(found) = client.get(&key).await {
                        assert_eq!(found, Bytes::from(value));
                    }
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        assert!(storage.len() <= 8);

        // Once writers are done, a key hits exactly when it is resident.
        let mut client = TestClient::connect(addr).await;
        let mut hits = 0;
        for client_id in 0..8 {
            for i in 0..50 {
                let (key, value) = client_entry(client_id, i);
                let resident = storage.contains(key.as_bytes());
                match client.get(&key).await {
                    Some(found) => {
                        assert!(resident);
                        assert_eq!(found, Bytes::from(value));
                        hits += 1;
                    }
                    None => assert!(!resident),
                }
            }
        }
        assert_eq!(hits, storage.len());
    }

    #[tokio::test]
    async fn test_idle_connection_is_closed() {
        let config = Config {
            idle_timeout: Duration::from_millis(200),
            ..test_config(16)
        };
        let (addr, _, stats) = start_server(config).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("server did not close the idle connection")
            .unwrap();
        assert_eq!(n, 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let server = Server::bind(&test_config(16)).await.unwrap();
        let port = server.local_addr().unwrap().port();

        let config = Config {
            port,
            ..test_config(16)
        };
        match Server::bind(&config).await {
            Err(e @ StartupError::Bind { .. }) => assert_eq!(e.exit_code(), 2),
            other => panic!("expected a bind error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_exit_codes() {
        let io_err = || io::Error::new(io::ErrorKind::Other, "test");
        let addr: SocketAddr = "127.0.0.1:11211".parse().unwrap();

        assert_eq!(StartupError::Socket(io_err()).exit_code(), 1);
        assert_eq!(
            StartupError::Bind {
                addr,
                source: io_err()
            }
            .exit_code(),
            2
        );
        assert_eq!(
            StartupError::Listen {
                addr,
                source: io_err()
            }
            .exit_code(),
            3
        );
    }
}
