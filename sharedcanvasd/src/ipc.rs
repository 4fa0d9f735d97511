use sharedcanvas_common::ipc_client::{read_message, write_message, IpcError};
use sharedcanvas_common::{tracing, Request, Response};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;
use tokio::task;
use tracing::{debug, error, info, warn};

use crate::DaemonState;

/// Serves composited frames and device listings to presentation clients
pub struct IpcServer {
    socket_path: String,
    socket_group: Option<String>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl IpcServer {
    /// Create a new IPC server with the specified socket path
    pub fn new<P: AsRef<Path>>(socket_path: P) -> Result<Self, std::io::Error> {
        let path = socket_path.as_ref().to_string_lossy().to_string();

        // Remove any stale socket file
        if Path::new(&path).exists() {
            fs::remove_file(&path)?;
        }

        Ok(Self {
            socket_path: path,
            socket_group: None,
            shutdown_tx: None,
        })
    }

    /// Hand group ownership of the socket to `group` once it is bound
    pub fn with_socket_group(mut self, group: Option<String>) -> Self {
        self.socket_group = group;
        self
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Bind the socket and start accepting clients
    pub async fn start(&mut self, state: Arc<DaemonState>) -> Result<(), Box<dyn std::error::Error>> {
        info!("Starting IPC server at {}", self.socket_path);

        if let Some(parent) = Path::new(&self.socket_path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        if let Err(e) = set_socket_permissions(&self.socket_path, self.socket_group.as_deref()) {
            // The daemon still works with default permissions
            warn!("Failed to set socket permissions: {}", e);
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        task::spawn(async move {
            loop {
                tokio::select! {
                    connection = listener.accept() => {
                        match connection {
                            Ok((stream, _)) => {
                                debug!("New client connected");
                                let state = Arc::clone(&state);
                                task::spawn(async move {
                                    if let Err(e) = handle_client(stream, state).await {
                                        error!("Error handling client: {}", e);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Error accepting connection: {}", e);
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("IPC server loop stopped");
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    /// Shutdown the IPC server
    pub async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Shutting down IPC server");

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if Path::new(&self.socket_path).exists() {
            fs::remove_file(&self.socket_path)?;
        }

        Ok(())
    }
}

/// Mode 0660 plus optional group ownership
fn set_socket_permissions(socket_path: &str, group: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let mut perms = fs::metadata(socket_path)?.permissions();
    perms.set_mode(0o660);
    fs::set_permissions(socket_path, perms)?;

    if let Some(group_name) = group {
        let group = nix::unistd::Group::from_name(group_name)?
            .ok_or_else(|| format!("Group '{}' not found", group_name))?;
        nix::unistd::chown(socket_path, None, Some(group.gid))?;
        info!("Socket group set to {}", group_name);
    }

    Ok(())
}

/// Serve requests on one connection until the client hangs up
pub async fn handle_client(mut stream: UnixStream, state: Arc<DaemonState>) -> Result<(), IpcError> {
    loop {
        let request: Request = match read_message(&mut stream).await {
            Ok(request) => request,
            Err(IpcError::ConnectionClosed) => {
                debug!("Client disconnected");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        debug!("Received request: {:?}", request);

        let response = handle_request(request, &state);
        write_message(&mut stream, &response).await?;
    }
}

fn handle_request(request: Request, state: &DaemonState) -> Response {
    match request {
        Request::GetFrame => {
            let frame = Arc::clone(&state.frames.borrow());
            Response::Frame((*frame).clone())
        }
        Request::GetStatus => Response::Status {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
            devices_count: state.registry.len(),
            frame_sequence: state.frames.borrow().sequence,
        },
        Request::ListDevices => Response::Devices(state.registry.paired_devices()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CanvasBounds, DeviceRegistry, DrawingDefaults};
    use sharedcanvas_common::{Frame, Point};
    use sharedcanvas_common::ipc_client::IpcClient;
    use std::time::Instant;
    use tempfile::TempDir;
    use tokio::sync::watch;

    fn state() -> (Arc<DaemonState>, watch::Sender<Arc<Frame>>) {
        let registry = DeviceRegistry::new(CanvasBounds::new(1920, 1080, 10), DrawingDefaults::default(), None);
        registry.pair("/dev/input/event3", "Mouse", "user1");
        let (tx, rx) = watch::channel(Arc::new(Frame::default()));
        let state = DaemonState {
            start_time: Instant::now(),
            registry: Arc::new(registry),
            frames: rx,
        };
        (Arc::new(state), tx)
    }

    #[test]
    fn test_request_handling() {
        let (state, frames) = state();
        frames.send_replace(Arc::new(Frame { sequence: 7, ..Frame::default() }));

        match handle_request(Request::GetFrame, &state) {
            Response::Frame(frame) => assert_eq!(frame.sequence, 7),
            other => panic!("unexpected response: {:?}", other),
        }

        match handle_request(Request::GetStatus, &state) {
            Response::Status { devices_count, frame_sequence, .. } => {
                assert_eq!(devices_count, 1);
                assert_eq!(frame_sequence, 7);
            }
            other => panic!("unexpected response: {:?}", other),
        }

        match handle_request(Request::ListDevices, &state) {
            Response::Devices(devices) => {
                assert_eq!(devices.len(), 1);
                assert_eq!(devices[0].owner, "user1");
                assert_eq!(devices[0].position, Point::new(960, 540));
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("run").join("sharedcanvas.sock");
        let (state, _frames) = state();

        let mut server = IpcServer::new(&socket_path).unwrap();
        server.start(state).await.unwrap();

        let mode = fs::metadata(&socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o660);

        let client = IpcClient::with_socket_path(&socket_path).with_retry_params(0, 10);
        let devices = client.list_devices().await.unwrap();
        assert_eq!(devices[0].id, "/dev/input/event3");

        // Several requests may share one connection
        let mut stream = client.connect().await.unwrap();
        for _ in 0..3 {
            let response = client.send_with_stream(&mut stream, &Request::GetFrame).await.unwrap();
            assert!(matches!(response, Response::Frame(_)));
        }

        server.shutdown().await.unwrap();
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn test_new_removes_stale_socket() {
        let temp_dir = TempDir::new().unwrap();
        let socket_path = temp_dir.path().join("stale.sock");
        fs::write(&socket_path, b"").unwrap();

        let server = IpcServer::new(&socket_path).unwrap();
        assert!(!socket_path.exists());
        assert_eq!(server.socket_path(), socket_path.to_string_lossy());
    }
}
