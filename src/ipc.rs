//! Cross-process exclusivity bus over Unix datagram sockets
//!
//! Every participating process binds one socket inside a shared directory.
//! Publishing sends one datagram to every other socket found there. A
//! receiver thread decodes datagrams and hands them to the subscribed
//! handlers. Nothing is acknowledged; sockets whose owner died are removed
//! on the next publish.

use crate::bus::{ExclusiveBus, SignalHandler, StopSignal};
use crate::error::{AudioError, AudioResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Largest datagram accepted by the receiver
const MAX_DATAGRAM: usize = 4096;
/// Receiver wake-up interval for shutdown checks
const READ_TIMEOUT: Duration = Duration::from_millis(100);
const SOCKET_EXTENSION: &str = "sock";

/// Messages exchanged between bus peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BusMessage {
    Stop(StopSignal),
}

impl BusMessage {
    pub fn to_bytes(&self) -> AudioResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> AudioResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Default rendezvous directory for peers on this machine
pub fn default_socket_dir() -> PathBuf {
    std::env::temp_dir().join("roughness-bus")
}

type HandlerMap = Arc<Mutex<HashMap<String, Vec<SignalHandler>>>>;

/// [`ExclusiveBus`] between processes on one machine
pub struct SocketBus {
    socket: UnixDatagram,
    dir: PathBuf,
    path: PathBuf,
    handlers: HandlerMap,
    shutdown: Arc<AtomicBool>,
    receiver: Option<JoinHandle<()>>,
}

impl SocketBus {
    /// Bind a fresh socket in `dir` (created if missing) and start receiving
    pub fn bind(dir: &Path) -> AudioResult<Self> {
        std::fs::create_dir_all(dir)?;

        let name = format!(
            "{}-{:016x}.{}",
            std::process::id(),
            rand::random::<u64>(),
            SOCKET_EXTENSION
        );
        let path = dir.join(name);
        let socket = UnixDatagram::bind(&path)?;
        info!("Bus socket bound: {}", path.display());

        let reader = socket.try_clone()?;
        reader.set_read_timeout(Some(READ_TIMEOUT))?;

        let handlers: HandlerMap = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let receiver = {
            let handlers = handlers.clone();
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name("roughness-bus".into())
                .spawn(move || receive_loop(reader, handlers, shutdown))?
        };

        Ok(Self {
            socket,
            dir: dir.to_path_buf(),
            path,
            handlers,
            shutdown,
            receiver: Some(receiver),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sockets of every other peer currently in the directory
    fn peers(&self) -> AudioResult<Vec<PathBuf>> {
        let mut peers = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_socket = path
                .extension()
                .map_or(false, |ext| ext == SOCKET_EXTENSION);
            if is_socket && path != self.path {
                peers.push(path);
            }
        }
        Ok(peers)
    }
}

fn receive_loop(socket: UnixDatagram, handlers: HandlerMap, shutdown: Arc<AtomicBool>) {
    let mut buf = [0u8; MAX_DATAGRAM];
    while !shutdown.load(Ordering::SeqCst) {
        let len = match socket.recv(&mut buf) {
            Ok(len) => len,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => {
                warn!("Bus receive failed: {}", e);
                break;
            }
        };

        let signal = match BusMessage::from_bytes(&buf[..len]) {
            Ok(BusMessage::Stop(signal)) => signal,
            Err(e) => {
                warn!("Dropping malformed bus datagram: {}", e);
                continue;
            }
        };

        let targets: Vec<SignalHandler> = handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&signal.channel)
            .cloned()
            .unwrap_or_default();
        for handler in targets {
            handler(&signal);
        }
    }
    debug!("Bus receiver stopped");
}

impl ExclusiveBus for SocketBus {
    fn publish(&self, signal: &StopSignal) -> AudioResult<()> {
        let bytes = BusMessage::Stop(signal.clone()).to_bytes()?;
        if bytes.len() > MAX_DATAGRAM {
            return Err(AudioError::Serde(format!(
                "Bus message too large: {} bytes",
                bytes.len()
            )));
        }

        for peer in self.peers()? {
            match self.socket.send_to(&bytes, &peer) {
                Ok(_) => {}
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::ConnectionRefused | ErrorKind::NotFound
                    ) =>
                {
                    debug!("Removing stale bus socket {}", peer.display());
                    let _ = std::fs::remove_file(&peer);
                }
                // Best-effort: a full peer queue only loses this signal
                Err(e) => warn!("Bus send to {} failed: {}", peer.display(), e),
            }
        }
        Ok(())
    }

    fn subscribe(&self, channel: &str, handler: SignalHandler) -> AudioResult<()> {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }
}

impl Drop for SocketBus {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(receiver) = self.receiver.take() {
            let _ = receiver.join();
        }
        // Clean up socket file
        let _ = std::fs::remove_file(&self.path);
    }
}
