//! RFC 8305 happy-eyeballs connector: race concurrent connect attempts
//! across address families with staggered scheduling (spec §4.E, §5).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};

use crate::error::{ConnectError, ConnectFailure};

/// RFC 8305 §8: wait this long for the IPv6 resolver to produce a first
/// result before giving up on staggering IPv4 attempts behind it.
pub const RESOLVE_DELAY: Duration = Duration::from_millis(50);
/// Extra delay after an IPv6 result arrives before draining queued IPv4
/// connect attempts.
pub const CONNECT_DELAY: Duration = Duration::from_millis(100);
/// Floor applied to the remaining total-timeout budget on every wait.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Address family tag carried through resolver/connect events and failure
/// records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Inet,
    Inet6,
}

/// The target of a connect operation: a hostname-or-literal plus port.
#[derive(Debug, Clone)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

/// A hook invoked with the raw socket after `bind` (if any) and before
/// `connect`, e.g. to set socket options. Any error aborts that one attempt
/// (reported as a connect failure, not propagated directly).
pub type PrepareHook = Arc<dyn Fn(&Socket) -> std::io::Result<()> + Send + Sync>;

/// Tuning knobs for [`connect`]. All fields default to the RFC 8305-style
/// behavior described in spec §4.E.
#[derive(Clone, Default)]
pub struct ConnectOptions {
    pub total_timeout: Option<Duration>,
    pub dns_timeout: Option<Duration>,
    pub source_address: Option<SocketAddr>,
    pub prepare: Option<PrepareHook>,
    pub use_happy_eyeballs: bool,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self {
            use_happy_eyeballs: true,
            ..Default::default()
        }
    }
}

enum Event {
    Connected(TcpStream, Family, SocketAddr),
    ResolverAddr(Family, SocketAddr),
    ResolverFailed(Family, String),
    ConnectFailed(Family, SocketAddr, String),
}

struct Ipv4Queue {
    pending: Vec<SocketAddr>,
    drained: bool,
}

/// Race concurrent connect attempts across IPv4/IPv6 and return the first
/// successful socket.
///
/// If `address.host` is already a literal IP, this bypasses racing
/// entirely and performs a single synchronous connect attempt (spec §4.E
/// "Fast path").
pub async fn connect(address: &Address, opts: ConnectOptions) -> Result<TcpStream, ConnectError> {
    if let Ok(ip) = address.host.parse::<IpAddr>() {
        return connect_one(SocketAddr::new(ip, address.port), &opts)
            .await
            .map_err(|e| {
                let family = match ip {
                    IpAddr::V4(_) => Family::Inet,
                    IpAddr::V6(_) => Family::Inet6,
                };
                ConnectError::Aggregate(vec![ConnectFailure {
                    family,
                    addr: Some(SocketAddr::new(ip, address.port)),
                    cause: e.to_string(),
                }])
            });
    }

    if !opts.use_happy_eyeballs {
        return connect_via_system_resolution(address, &opts).await;
    }

    race(address, opts).await
}

/// Single connect attempt, used by the fast path, the happy-eyeballs race,
/// and the `use_happy_eyeballs = false` override.
async fn connect_one(addr: SocketAddr, opts: &ConnectOptions) -> std::io::Result<TcpStream> {
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nonblocking(true)?;
    if let Some(src) = opts.source_address {
        socket.bind(&src.into())?;
    }
    if let Some(prepare) = &opts.prepare {
        prepare(&socket)?;
    }
    // A non-blocking `connect` either succeeds immediately or returns
    // `EINPROGRESS`/`WouldBlock`; either way the stream is handed to tokio's
    // reactor, which resolves the in-flight connect on the first writable
    // readiness event.
    match socket.connect(&addr.into()) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
        Err(e) if e.raw_os_error() == Some(libc_in_progress()) => {}
        Err(e) => return Err(e),
    }
    let std_stream: std::net::TcpStream = socket.into();
    let stream = TcpStream::from_std(std_stream)?;
    stream.writable().await?;
    if let Some(err) = stream.take_error()? {
        return Err(err);
    }
    Ok(stream)
}

/// `EINPROGRESS`'s platform value; `connect(2)` on a non-blocking socket
/// returns this instead of `WouldBlock` on Unix targets.
#[cfg(unix)]
fn libc_in_progress() -> i32 {
    libc::EINPROGRESS
}

#[cfg(not(unix))]
fn libc_in_progress() -> i32 {
    i32::MIN
}

async fn connect_via_system_resolution(
    address: &Address,
    opts: &ConnectOptions,
) -> Result<TcpStream, ConnectError> {
    let addrs = resolve_system(address, Family::Inet6, opts.dns_timeout)
        .await
        .into_iter()
        .chain(resolve_system(address, Family::Inet, opts.dns_timeout).await)
        .collect::<Vec<_>>();
    let mut failures = Vec::new();
    for addr in addrs {
        match connect_one(addr, opts).await {
            Ok(stream) => return Ok(stream),
            Err(e) => failures.push(ConnectFailure {
                family: if addr.is_ipv4() { Family::Inet } else { Family::Inet6 },
                addr: Some(addr),
                cause: e.to_string(),
            }),
        }
    }
    Err(ConnectError::Aggregate(failures))
}

async fn resolve_system(address: &Address, family: Family, dns_timeout: Option<Duration>) -> Vec<SocketAddr> {
    let host = address.host.clone();
    let port = address.port;
    let fut = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<SocketAddr>> {
        use std::net::ToSocketAddrs;
        Ok((host.as_str(), port).to_socket_addrs()?.collect())
    });
    let resolved = match dns_timeout {
        Some(d) => timeout(d, fut).await.ok().and_then(Result::ok),
        None => fut.await.ok(),
    };
    resolved
        .and_then(Result::ok)
        .unwrap_or_default()
        .into_iter()
        .filter(|a| match family {
            Family::Inet => a.is_ipv4(),
            Family::Inet6 => a.is_ipv6(),
        })
        .collect()
}

/// The racing path: two resolver tasks (one per family), a staggering task
/// that defers IPv4 connect attempts behind IPv6 per RFC 8305, and a main
/// loop draining the shared event channel.
async fn race(address: &Address, opts: ConnectOptions) -> Result<TcpStream, ConnectError> {
    let deadline = opts.total_timeout.map(|d| Instant::now() + d);
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

    let mut tasks: Vec<tokio::task::JoinHandle<()>> = Vec::new();

    spawn_resolver(&mut tasks, tx.clone(), address.clone(), Family::Inet6, opts.dns_timeout);
    spawn_resolver(&mut tasks, tx.clone(), address.clone(), Family::Inet, opts.dns_timeout);

    // Holds IPv4 candidates that arrive before the initial stagger/drain.
    // `drained` is flipped under the same lock as the drain itself, so a
    // `Family::Inet` arrival either lands in `pending` and gets swept up by
    // the drain, or observes `drained == true` and is connected immediately
    // — there's no window where an arrival is silently dropped (spec §4.E:
    // "after draining, further IPv4 arrivals are started immediately").
    let ipv4_queue: Arc<tokio::sync::Mutex<Ipv4Queue>> = Arc::new(tokio::sync::Mutex::new(Ipv4Queue {
        pending: Vec::new(),
        drained: false,
    }));
    let ipv6_seen = Arc::new(tokio::sync::Notify::new());
    let ipv6_seen_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));

    {
        let ipv4_queue = ipv4_queue.clone();
        let ipv6_seen = ipv6_seen.clone();
        let ipv6_seen_flag = ipv6_seen_flag.clone();
        let tx = tx.clone();
        let opts_clone = opts.clone();
        tasks.push(tokio::spawn(async move {
            let stagger = timeout(RESOLVE_DELAY, ipv6_seen.notified()).await.is_ok()
                || ipv6_seen_flag.load(std::sync::atomic::Ordering::SeqCst);
            if stagger {
                sleep(CONNECT_DELAY).await;
            }
            let drained: Vec<SocketAddr> = {
                let mut q = ipv4_queue.lock().await;
                q.drained = true;
                std::mem::take(&mut q.pending)
            };
            for addr in drained {
                spawn_connect(tx.clone(), addr, Family::Inet, opts_clone.clone());
            }
        }));
    }

    let mut dns_attempts: i32 = 2;
    let mut conn_attempts: i32 = 0;
    let mut failures: Vec<ConnectFailure> = Vec::new();

    let result = loop {
        let remaining = match deadline {
            Some(dl) => {
                let now = Instant::now();
                if now >= dl {
                    break Err(ConnectError::Timeout(opts.total_timeout.unwrap()));
                }
                Some((dl - now).max(MIN_TIMEOUT))
            }
            None => None,
        };

        let event = match remaining {
            Some(d) => match timeout(d, rx.recv()).await {
                Ok(Some(ev)) => ev,
                Ok(None) => break Err(ConnectError::Aggregate(failures)),
                Err(_) => break Err(ConnectError::Timeout(opts.total_timeout.unwrap())),
            },
            None => match rx.recv().await {
                Some(ev) => ev,
                None => break Err(ConnectError::Aggregate(failures)),
            },
        };

        match event {
            Event::Connected(stream, _family, _addr) => break Ok(stream),
            Event::ResolverAddr(family, addr) => {
                conn_attempts += 1;
                match family {
                    Family::Inet6 => {
                        ipv6_seen_flag.store(true, std::sync::atomic::Ordering::SeqCst);
                        ipv6_seen.notify_waiters();
                        spawn_connect(tx.clone(), addr, Family::Inet6, opts.clone());
                    }
                    Family::Inet => {
                        let queue = ipv4_queue.clone();
                        let tx = tx.clone();
                        let opts_clone = opts.clone();
                        tokio::spawn(async move {
                            let mut q = queue.lock().await;
                            if q.drained {
                                drop(q);
                                spawn_connect(tx, addr, Family::Inet, opts_clone);
                            } else {
                                q.pending.push(addr);
                            }
                        });
                    }
                }
            }
            Event::ResolverFailed(family, cause) => {
                failures.push(ConnectFailure {
                    family,
                    addr: None,
                    cause,
                });
                dns_attempts -= 1;
                if dns_attempts <= 0 && conn_attempts == 0 {
                    break Err(ConnectError::Aggregate(failures));
                }
            }
            Event::ConnectFailed(family, addr, cause) => {
                failures.push(ConnectFailure {
                    family,
                    addr: Some(addr),
                    cause,
                });
                conn_attempts -= 1;
                if conn_attempts <= 0 && dns_attempts <= 0 {
                    break Err(ConnectError::Aggregate(failures));
                }
            }
        }
    };

    for task in tasks {
        task.abort();
    }

    result
}

fn spawn_resolver(
    tasks: &mut Vec<tokio::task::JoinHandle<()>>,
    tx: mpsc::UnboundedSender<Event>,
    address: Address,
    family: Family,
    dns_timeout: Option<Duration>,
) {
    tasks.push(tokio::spawn(async move {
        let addrs = resolve_system(&address, family, dns_timeout).await;
        if addrs.is_empty() {
            let _ = tx.send(Event::ResolverFailed(family, "no addresses found".to_string()));
            return;
        }
        for addr in addrs {
            let _ = tx.send(Event::ResolverAddr(family, addr));
        }
    }));
}

fn spawn_connect(tx: mpsc::UnboundedSender<Event>, addr: SocketAddr, family: Family, opts: ConnectOptions) {
    tokio::spawn(async move {
        match connect_one(addr, &opts).await {
            Ok(stream) => {
                let _ = tx.send(Event::Connected(stream, family, addr));
            }
            Err(e) => {
                let _ = tx.send(Event::ConnectFailed(family, addr, e.to_string()));
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn fast_path_connects_to_literal_ip() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let _ = sock.write_all(b"hi").await;
        });

        let address = Address {
            host: addr.ip().to_string(),
            port: addr.port(),
        };
        let stream = connect(&address, ConnectOptions::new()).await.unwrap();
        drop(stream);
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn timeout_errors_when_nothing_listens() {
        let address = Address {
            host: "192.0.2.1".to_string(), // TEST-NET-1, guaranteed unroutable
            port: 9,
        };
        let opts = ConnectOptions {
            total_timeout: Some(Duration::from_millis(50)),
            use_happy_eyeballs: true,
            ..ConnectOptions::new()
        };
        let err = connect(&address, opts).await.unwrap_err();
        assert!(matches!(err, ConnectError::Timeout(_) | ConnectError::Aggregate(_)));
    }
}
