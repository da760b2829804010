use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time;

use crate::error;
use crate::event::Observer;
use crate::internal;
use crate::shared::Shared;
use crate::state::Intent;
use crate::thread;
use crate::topology::Ring;

const DEFAULT_PORT: u16 = 5000;

/// Delay between dial attempts while waiting for peers to come up
const RETRY: Duration = Duration::from_millis(100);

/// Fixed delays of the token handler.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Timing {
    /// Origin's wait before injecting the token
    pub startup: Duration,

    /// Time the token is held before any critical section or forwarding
    pub hold: Duration,

    /// Length of the simulated exclusive work
    pub critical_section: Duration,

    /// Wait after leaving the critical section before forwarding
    pub cooldown: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            startup: Duration::from_secs(3),
            hold: Duration::from_secs(3),
            critical_section: Duration::from_secs(5),
            cooldown: Duration::from_secs(3),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Unique member ID
    id: usize,

    /// Total number of members
    count: usize,

    /// Member that injects the token, or the ring's lowest identity
    origin: Option<usize>,

    /// Base port; member `i` listens on `port + i`
    port: u16,

    /// How long to keep dialing a peer that is not up yet
    connect_timeout: Duration,

    timing: Timing,

    /// Intent generator, or `None` if requests come only through `intent`
    schedule: Option<thread::intent::Schedule>,

    intent: Intent,

    observer: Observer,
}

impl Config {
    pub fn new(id: usize, count: usize) -> Self {
        Config {
            id,
            count,
            origin: None,
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(30),
            timing: Timing::default(),
            schedule: Some(thread::intent::Schedule::default()),
            intent: Intent::default(),
            observer: Observer::none(),
        }
    }

    pub fn with_origin(mut self, origin: usize) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_schedule(mut self, schedule: Option<thread::intent::Schedule>) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = observer;
        self
    }

    /// Handle for raising this member's intent from outside the generator.
    pub fn intent(&self) -> Intent {
        self.intent.clone()
    }

    /// Listen address of member `id`. Identical on every member.
    pub fn address(&self, id: usize) -> Result<SocketAddr, error::Bootstrap> {
        u16::try_from(self.port as usize + id)
            .map(|port| SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
            .map_err(|_| error::Bootstrap::Port { id, base: self.port })
    }

    /// Binds, connects to every other member, then runs the token handler
    /// and its intent generator. Only returns on failure, or if every
    /// inbound channel to the handler closes.
    pub async fn run(self) -> Result<(), error::Error> {
        let ring = Ring::new(self.count)?;
        if !ring.contains(self.id) {
            return Err(error::Topology::Unknown(self.id).into())
        }
        let origin = self.origin.unwrap_or_else(|| ring.first());
        if !ring.contains(origin) {
            return Err(error::Topology::Unknown(origin).into())
        }
        for id in ring.members() {
            self.address(id)?;
        }
        info!("{} joining ring of {} with origin {}", self.id, ring.len(), origin);

        let addr = self.address(self.id)?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| error::Bootstrap::Bind { addr, source })?;
        info!("{} listening on {}", self.id, addr);

        let (handler_rx, handler_tx) = internal::new();
        tokio::spawn(thread::listener::serve(self.id, listener, handler_tx));

        let shared_tx = Shared::new(self.id);
        for peer_id in ring.members().filter(|peer_id| *peer_id != self.id) {
            let stream = self.connect(peer_id).await?;
            let peer = thread::peer::Peer::new(self.id, peer_id, stream, shared_tx.clone());
            tokio::spawn(peer.run());
        }

        thread::handler::Handler::new(self.id, &ring, self.intent, shared_tx, handler_rx)?
            .with_timing(self.timing)
            .with_schedule(self.schedule)
            .with_observer(self.observer)
            .run(self.id == origin)
            .await
    }

    /// Dials `peer_id` until it accepts or the connect timeout elapses.
    async fn connect(&self, peer_id: usize) -> Result<TcpStream, error::Bootstrap> {
        let addr = self.address(peer_id)?;
        let deadline = time::Instant::now() + self.connect_timeout;
        loop {
            debug!("{} dialing {} at {}", self.id, peer_id, addr);
            match TcpStream::connect(addr).await {
            | Ok(stream) => return Ok(stream),
            | Err(source) if time::Instant::now() >= deadline => {
                return Err(error::Bootstrap::Connect { id: peer_id, addr, source })
            }
            | Err(_) => time::sleep(RETRY).await,
            }
        }
    }
}
