//! IPC client for reading frames from the sharedcanvas daemon
//!
//! Messages on the socket are a little-endian `u32` length followed by a
//! bincode payload. A connection carries any number of request/response
//! pairs, so a presentation process can keep one stream open and poll
//! `GetFrame` at its display rate.

use crate::{Frame, PairedDevice, Request, Response};
use serde::{de::DeserializeOwned, Serialize};

use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;

use tokio::time::timeout;

/// Errors that can occur during IPC communication
#[derive(Error, Debug)]
pub enum IpcError {
    #[error("failed to send request: {0}")]
    Send(io::Error),
    #[error("failed to receive response: {0}")]
    Receive(io::Error),
    #[error("serialization error: {0}")]
    Serialize(bincode::Error),
    #[error("deserialization error: {0}")]
    Deserialize(bincode::Error),

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Operation timeout after {0}ms")]
    OperationTimeout(u64),

    #[error("Daemon not running at {0}")]
    DaemonNotRunning(String),

    #[error("Unexpected response from daemon: {0}")]
    UnexpectedResponse(String),

    #[error("Message too large: {0} bytes exceeds maximum of {1} bytes")]
    MessageTooLarge(usize, usize),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,
}

/// Default socket path for the sharedcanvas daemon
pub const DEFAULT_SOCKET_PATH: &str = "/run/sharedcanvas/sharedcanvas.sock";

/// Default timeout for operations (in milliseconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Maximum message size (8MB); frames of a busy canvas are large
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Maximum number of reconnection attempts
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay between reconnection attempts (in milliseconds)
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Write one length-prefixed message
pub async fn write_message<W, T>(writer: &mut W, msg: &T) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = bincode::serialize(msg).map_err(IpcError::Serialize)?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(IpcError::MessageTooLarge(payload.len(), MAX_MESSAGE_SIZE));
    }

    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes()).await.map_err(IpcError::Send)?;
    writer.write_all(&payload).await.map_err(IpcError::Send)?;
    writer.flush().await.map_err(IpcError::Send)?;
    Ok(())
}

/// Read one length-prefixed message.
///
/// A stream that ends before the length prefix yields `ConnectionClosed`,
/// which servers treat as a clean disconnect.
pub async fn read_message<R, T>(reader: &mut R) -> Result<T, IpcError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(IpcError::ConnectionClosed),
        Err(e) => return Err(IpcError::Receive(e)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(IpcError::MessageTooLarge(len, MAX_MESSAGE_SIZE));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(IpcError::Receive)?;
    bincode::deserialize(&payload).map_err(IpcError::Deserialize)
}

/// IPC client with connection management and error handling
#[derive(Debug, Clone)]
pub struct IpcClient {
    socket_path: String,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl Default for IpcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IpcClient {
    /// Create a new IPC client with default settings
    pub fn new() -> Self {
        Self::with_socket_path(DEFAULT_SOCKET_PATH)
    }

    /// Create a new IPC client with a custom socket path
    pub fn with_socket_path<P: AsRef<Path>>(socket_path: P) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_string_lossy().to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }

    /// Set the timeout for operations
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Duration::from_millis(timeout_ms);
        self
    }

    /// Set reconnection parameters
    pub fn with_retry_params(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = Duration::from_millis(retry_delay_ms);
        self
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Check if the daemon is running by attempting to connect to its socket
    pub async fn is_daemon_running(&self) -> bool {
        UnixStream::connect(&self.socket_path).await.is_ok()
    }

    /// Connect to the daemon with retry logic
    pub async fn connect(&self) -> Result<UnixStream, IpcError> {
        let mut attempts = 0;

        loop {
            match timeout(self.timeout, UnixStream::connect(&self.socket_path)).await {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) => {
                    if attempts >= self.max_retries {
                        return Err(IpcError::DaemonNotRunning(self.socket_path.clone()));
                    }
                    tracing::warn!("Connection attempt {} failed: {}, retrying...", attempts + 1, e);
                    tokio::time::sleep(self.retry_delay).await;
                    attempts += 1;
                }
                Err(_) => return Err(IpcError::ConnectionTimeout),
            }
        }
    }

    /// Send a request on a fresh connection and wait for the response
    pub async fn send(&self, request: &Request) -> Result<Response, IpcError> {
        let mut stream = self.connect().await?;
        self.send_with_stream(&mut stream, request).await
    }

    /// Send a request over an existing stream, for clients that poll frames
    /// on one long-lived connection
    pub async fn send_with_stream(&self, stream: &mut UnixStream, request: &Request) -> Result<Response, IpcError> {
        let timeout_ms = self.timeout.as_millis() as u64;

        timeout(self.timeout, write_message(stream, request))
            .await
            .map_err(|_| IpcError::OperationTimeout(timeout_ms))??;

        timeout(self.timeout, read_message(stream))
            .await
            .map_err(|_| IpcError::OperationTimeout(timeout_ms))?
    }

    /// Fetch the latest composited frame
    pub async fn get_frame(&self) -> Result<Frame, IpcError> {
        match self.send(&Request::GetFrame).await? {
            Response::Frame(frame) => Ok(frame),
            other => Err(unexpected(other)),
        }
    }

    /// List the devices currently paired with the canvas
    pub async fn list_devices(&self) -> Result<Vec<PairedDevice>, IpcError> {
        match self.send(&Request::ListDevices).await? {
            Response::Devices(devices) => Ok(devices),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> IpcError {
    match response {
        Response::Error(message) => IpcError::UnexpectedResponse(message),
        other => IpcError::UnexpectedResponse(format!("{:?}", other)),
    }
}

/// Send a request to the daemon at a specific socket path
pub async fn send_to_path<P: AsRef<Path>>(request: &Request, socket_path: P) -> Result<Response, IpcError> {
    let client = IpcClient::with_socket_path(socket_path);
    client.send(request).await
}

/// Check if the daemon is running, defaulting to `DEFAULT_SOCKET_PATH`
pub async fn is_daemon_running<P: AsRef<Path>>(socket_path: Option<P>) -> bool {
    let path = socket_path.map(|p| p.as_ref().to_string_lossy().to_string())
        .unwrap_or_else(|| DEFAULT_SOCKET_PATH.to_string());

    UnixStream::connect(path).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Drawable, Point, Rgb};
    use tempfile::TempDir;
    use tokio::net::UnixListener;
    use tokio_test::io::Builder;

    fn sample_frame() -> Frame {
        Frame {
            sequence: 3,
            drawables: vec![Drawable {
                points: vec![Point::new(0, 0), Point::new(5, 5)],
                color: Rgb::BLUE,
                width: 5,
            }],
            ..Frame::default()
        }
    }

    /// Mock daemon answering every request on a connection until it closes
    async fn mock_daemon(listener: UnixListener) {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };

            tokio::spawn(async move {
                loop {
                    let request: Request = match read_message(&mut stream).await {
                        Ok(request) => request,
                        Err(_) => return,
                    };

                    let response = match request {
                        Request::GetFrame => Response::Frame(sample_frame()),
                        Request::GetStatus => Response::Status {
                            version: "0.1.0".to_string(),
                            uptime_seconds: 60,
                            devices_count: 2,
                            frame_sequence: 3,
                        },
                        Request::ListDevices => Response::Error("not in this test".to_string()),
                    };

                    if write_message(&mut stream, &response).await.is_err() {
                        return;
                    }
                }
            });
        }
    }

    #[tokio::test]
    async fn test_ipc_client_creation() {
        let client = IpcClient::new();
        assert_eq!(client.socket_path, DEFAULT_SOCKET_PATH);
        assert_eq!(client.timeout, Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert_eq!(client.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(client.retry_delay, Duration::from_millis(DEFAULT_RETRY_DELAY_MS));

        let custom_client = IpcClient::with_socket_path("/tmp/test.sock")
            .with_timeout(10000)
            .with_retry_params(5, 2000);

        assert_eq!(custom_client.socket_path(), "/tmp/test.sock");
        assert_eq!(custom_client.timeout, Duration::from_millis(10000));
        assert_eq!(custom_client.max_retries, 5);
        assert_eq!(custom_client.retry_delay, Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_write_message_frames_payload() {
        let payload = bincode::serialize(&Request::GetStatus).unwrap();
        let mut mock = Builder::new()
            .write(&(payload.len() as u32).to_le_bytes())
            .write(&payload)
            .build();

        write_message(&mut mock, &Request::GetStatus).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_message_decodes_frame() {
        let payload = bincode::serialize(&Response::Frame(sample_frame())).unwrap();
        let mut mock = Builder::new()
            .read(&(payload.len() as u32).to_le_bytes())
            .read(&payload)
            .build();

        let response: Response = read_message(&mut mock).await.unwrap();
        match response {
            Response::Frame(frame) => assert_eq!(frame, sample_frame()),
            other => panic!("Expected Frame response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_message_rejects_oversized_length() {
        let mut mock = Builder::new()
            .read(&u32::MAX.to_le_bytes())
            .build();

        let result: Result<Response, IpcError> = read_message(&mut mock).await;
        assert!(matches!(result, Err(IpcError::MessageTooLarge(_, MAX_MESSAGE_SIZE))));
    }

    #[tokio::test]
    async fn test_read_message_reports_closed_stream() {
        let mut mock = Builder::new().build();

        let result: Result<Response, IpcError> = read_message(&mut mock).await;
        assert!(matches!(result, Err(IpcError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_client_server_communication() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("test.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();
        tokio::spawn(mock_daemon(listener));

        let client = IpcClient::with_socket_path(&socket_path);
        assert!(client.is_daemon_running().await);

        let frame = client.get_frame().await.unwrap();
        assert_eq!(frame.sequence, 3);
        assert_eq!(frame.drawables.len(), 1);

        // Several requests on one connection
        let mut stream = client.connect().await.unwrap();
        for _ in 0..3 {
            let response = client.send_with_stream(&mut stream, &Request::GetStatus).await.unwrap();
            assert!(matches!(response, Response::Status { devices_count: 2, .. }));
        }

        // Error responses surface as UnexpectedResponse
        match client.list_devices().await {
            Err(IpcError::UnexpectedResponse(message)) => assert_eq!(message, "not in this test"),
            other => panic!("Expected UnexpectedResponse, got {:?}", other),
        }

        let response = send_to_path(&Request::GetFrame, &socket_path).await.unwrap();
        assert!(matches!(response, Response::Frame(_)));
    }

    #[tokio::test]
    async fn test_connection_timeout() {
        let client = IpcClient::with_socket_path("/tmp/sharedcanvas-nonexistent.sock")
            .with_timeout(100)
            .with_retry_params(1, 10);

        match client.send(&Request::GetStatus).await {
            Err(IpcError::DaemonNotRunning(_)) | Err(IpcError::ConnectionTimeout) => {}
            other => panic!("Expected DaemonNotRunning or ConnectionTimeout error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_is_daemon_running() {
        assert!(!is_daemon_running(Some("/tmp/sharedcanvas-nonexistent.sock")).await);
    }
}
