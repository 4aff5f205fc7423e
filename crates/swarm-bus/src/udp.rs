use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use swarm_common::{Message, NodeId, Result, SwarmError};
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{Bus, Inbox};

/// Large enough for a frame plus anything a misbehaving peer might send.
const RECV_BUFFER: usize = 256;

struct Endpoint {
    id: NodeId,
    addr: SocketAddr,
    /// Send half. Writes go straight to the kernel buffer and never wait on
    /// the reactor's readiness state.
    sender: std::net::UdpSocket,
    inbox: Inbox,
    receiver: JoinHandle<()>,
}

/// Real transport: one UDP socket per node on a local interface.
///
/// A broadcast is a unicast datagram from the sender's socket to every other
/// member. Each socket has a receive task that decodes frames into the
/// member's [`Inbox`], so nodes drain it exactly like the virtual bus.
pub struct UdpBus {
    host: IpAddr,
    endpoints: Mutex<Vec<Endpoint>>,
}

impl UdpBus {
    /// Bus bound to `127.0.0.1`.
    pub fn new() -> Self {
        Self::with_host(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    pub fn with_host(host: IpAddr) -> Self {
        Self {
            host,
            endpoints: Mutex::new(Vec::new()),
        }
    }

    /// Address a member's socket is bound to.
    pub fn local_addr(&self, id: NodeId) -> Option<SocketAddr> {
        self.lock().iter().find(|e| e.id == id).map(|e| e.addr)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Endpoint>> {
        self.endpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds one member socket, returning its non-blocking send half and
    /// the reactor-registered receive half.
    fn bind(&self) -> Result<(std::net::UdpSocket, UdpSocket)> {
        let socket = std::net::UdpSocket::bind((self.host, 0))?;
        socket.set_nonblocking(true)?;
        let sender = socket.try_clone()?;
        Ok((sender, UdpSocket::from_std(socket)?))
    }
}

impl Default for UdpBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for UdpBus {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn register(&self, id: NodeId) -> Result<Inbox> {
        let mut endpoints = self.lock();
        if let Some(existing) = endpoints.iter().find(|e| e.id == id) {
            return Ok(existing.inbox.clone());
        }

        let runtime = Handle::try_current()
            .map_err(|e| SwarmError::Runtime(format!("UDP bus needs a tokio runtime: {}", e)))?;
        let _guard = runtime.enter();

        let (sender, socket) = self.bind()?;
        let addr = socket.local_addr()?;
        let inbox = Inbox::new();
        let receiver = runtime.spawn(receive_loop(id, socket, inbox.clone()));

        info!("UDP bus: node {} listening on {}", id, addr);
        endpoints.push(Endpoint {
            id,
            addr,
            sender,
            inbox: inbox.clone(),
            receiver,
        });
        Ok(inbox)
    }

    fn broadcast(&self, message: &Message, sender: NodeId) -> Result<usize> {
        let endpoints = self.lock();
        let from = endpoints
            .iter()
            .find(|e| e.id == sender)
            .ok_or(SwarmError::NotRegistered(sender))?;

        let frame = message.to_frame();
        let mut attempted = 0;
        let mut failed = 0;
        for peer in endpoints.iter().filter(|e| e.id != sender) {
            attempted += 1;
            // Never wait on a recipient; a full socket buffer is a failed send
            if let Err(e) = from.sender.send_to(&frame, peer.addr) {
                failed += 1;
                debug!("UDP bus: node {} -> {} failed: {}", sender, peer.addr, e);
            }
        }

        if failed > 0 {
            Err(SwarmError::SendFailed { failed, attempted })
        } else {
            Ok(attempted)
        }
    }

    fn members(&self) -> Vec<NodeId> {
        self.lock().iter().map(|e| e.id).collect()
    }

    fn shutdown(&self) {
        for endpoint in self.lock().iter() {
            endpoint.receiver.abort();
        }
    }
}

impl Drop for UdpBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn receive_loop(id: NodeId, socket: UdpSocket, inbox: Inbox) {
    let mut buf = [0u8; RECV_BUFFER];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, from)) => match Message::from_frame(&buf[..n], Instant::now()) {
                Some(message) => inbox.push(message),
                None => debug!("UDP bus: node {} dropped runt frame from {}", id, from),
            },
            Err(e) => {
                warn!("UDP bus: node {} receive error: {}", id, e);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}
