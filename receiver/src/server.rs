//! Accept DirectIP connections.
//!
//! Every connection gets its own thread, which reads one session, frames and decodes it, hands
//! the report to the dispatcher, optionally confirms, and closes the connection. A session must
//! arrive within the read timeout of being accepted, and connections beyond the configured limit
//! are closed straight away.

use config::Config;
use directip;
use report::{Dispatcher, Report};
use session::RawSession;
use std::io::{ErrorKind, Write};
use std::net::{Shutdown as SocketShutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use Error;

/// How long the accept loop sleeps when there's nothing to accept.
const POLL_INTERVAL_MS: u64 = 25;

/// A DirectIP receiver.
///
/// # Examples
///
/// ```
/// use receiver::{Config, Dispatcher, Server};
/// use std::thread;
///
/// let config = Config::default();
/// let server = Server::bind("127.0.0.1:0", &config, Dispatcher::new("valentia")).unwrap();
/// let shutdown = server.shutdown_handle();
/// let handle = thread::spawn(move || server.run());
/// shutdown.shutdown();
/// handle.join().unwrap().unwrap();
/// ```
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    context: Context,
    shutdown: Shutdown,
}

/// Stops a running server.
///
/// The server stops accepting connections, waits for in-flight sessions, and returns from `run`.
#[derive(Clone, Debug, Default)]
pub struct Shutdown(Arc<AtomicBool>);

#[derive(Clone, Debug)]
struct Context {
    dispatcher: Dispatcher,
    read_timeout: Duration,
    max_connections: usize,
    confirm: bool,
}

/// Holds one of the in-flight connection slots.
#[derive(Debug)]
struct Guard(Arc<AtomicUsize>);

impl Server {
    /// Binds a new server to the given address.
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        config: &Config,
        dispatcher: Dispatcher,
    ) -> Result<Server, Error> {
        let listener = TcpListener::bind(addr)?;
        Ok(Server::from_listener(listener, config, dispatcher))
    }

    /// Creates a server from a listener that's already bound, e.g. one passed in by the
    /// service manager.
    pub fn from_listener(
        listener: TcpListener,
        config: &Config,
        dispatcher: Dispatcher,
    ) -> Server {
        Server {
            listener: listener,
            context: Context {
                dispatcher: dispatcher,
                read_timeout: config.read_timeout(),
                max_connections: config.max_connections,
                confirm: config.confirm,
            },
            shutdown: Shutdown::default(),
        }
    }

    /// Returns the address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.listener.local_addr().map_err(Error::from)
    }

    /// Returns a handle that stops this server.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Accepts connections until shut down.
    ///
    /// Errors accepting a single connection are logged and don't stop the server. On shutdown
    /// the listening socket is closed before waiting for in-flight sessions.
    pub fn run(self) -> Result<(), Error> {
        let Server {
            listener,
            context,
            shutdown,
        } = self;
        listener.set_nonblocking(true)?;
        if let Ok(addr) = listener.local_addr() {
            info!("listening on {}", addr);
        }
        let in_flight = Arc::new(AtomicUsize::new(0));
        while !shutdown.is_shutdown() {
            match listener.accept() {
                Ok((stream, peer)) => {
                    let accepted = Instant::now();
                    match Guard::try_acquire(&in_flight, context.max_connections) {
                        Some(guard) => {
                            let context = context.clone();
                            thread::spawn(move || {
                                handle(stream, peer, accepted, &context);
                                drop(guard);
                            });
                        }
                        None => {
                            warn!(
                                "{}: refused, {} sessions already in flight",
                                peer, context.max_connections
                            );
                            let _ = stream.shutdown(SocketShutdown::Both);
                        }
                    }
                }
                Err(ref err) if err.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
                }
                Err(err) => {
                    warn!("could not accept connection: {}", err);
                    thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
                }
            }
        }
        drop(listener);
        let remaining = in_flight.load(Ordering::SeqCst);
        if remaining > 0 {
            info!("waiting for {} sessions to finish", remaining);
        }
        while in_flight.load(Ordering::SeqCst) > 0 {
            thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
        }
        info!("shut down");
        Ok(())
    }
}

impl Shutdown {
    /// Asks the server to stop.
    pub fn shutdown(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true if shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Guard {
    fn try_acquire(count: &Arc<AtomicUsize>, max: usize) -> Option<Guard> {
        let mut current = count.load(Ordering::SeqCst);
        loop {
            if current >= max {
                return None;
            }
            match count.compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Some(Guard(Arc::clone(count))),
                Err(next) => current = next,
            }
        }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn handle(mut stream: TcpStream, peer: SocketAddr, accepted: Instant, context: &Context) {
    debug!("{}: connected", peer);
    if let Err(err) = stream.set_nonblocking(false) {
        error!("{}: could not configure socket: {}", peer, err);
        return;
    }
    let deadline = accepted + context.read_timeout;
    let session = match RawSession::read_before(&stream, peer, deadline) {
        Ok(session) => session,
        Err(err) => {
            warn!("{}: abandoned session: {}", peer, err);
            return;
        }
    };
    let report = Report::new(session);
    report.log();
    context.dispatcher.dispatch(&report);
    if context.confirm {
        let confirmation = directip::confirmation(report.metadata.is_some());
        if let Err(err) = stream.write_all(&confirmation) {
            warn!("{}: could not send confirmation: {}", peer, err);
        }
    }
    let _ = stream.shutdown(SocketShutdown::Both);
}

#[cfg(test)]
mod tests {
    use super::*;
    use directip::SessionMetadata;
    use failure::Error as FailureError;
    use report::Status;
    use std::collections::HashMap;
    use std::io::Read;
    use std::sync::Mutex;
    use std::thread::JoinHandle;
    use store::Store;
    use tests::session;

    const FIXTURE: &[u8] = include_bytes!("../fixtures/eucaws.sbd");

    #[derive(Clone, Default)]
    struct Memory(Arc<Mutex<Vec<(String, u16, Option<Vec<u8>>)>>>);

    impl Store for Memory {
        fn store(
            &self,
            metadata: &SessionMetadata,
            payload: Option<&[u8]>,
            _: &Status,
        ) -> Result<(), FailureError> {
            self.0.lock().unwrap().push((
                metadata.imei().to_string(),
                metadata.momsn(),
                payload.map(|p| p.to_vec()),
            ));
            Ok(())
        }
    }

    impl Memory {
        fn len(&self) -> usize {
            self.0.lock().unwrap().len()
        }

        fn wait_for(&self, len: usize) {
            let start = Instant::now();
            while self.len() < len {
                assert!(
                    start.elapsed() < Duration::from_secs(10),
                    "only {} of {} sessions stored",
                    self.len(),
                    len
                );
                thread::sleep(Duration::from_millis(10));
            }
        }
    }

    fn start(config: Config, memory: &Memory) -> (SocketAddr, Shutdown, JoinHandle<()>) {
        let dispatcher = Dispatcher::new("test").with_store(memory.clone());
        let server = Server::bind("127.0.0.1:0", &config, dispatcher).unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let handle = thread::spawn(move || server.run().unwrap());
        (addr, shutdown, handle)
    }

    fn send(addr: SocketAddr, bytes: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(bytes).unwrap();
        stream.shutdown(SocketShutdown::Write).unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).unwrap();
        response
    }

    #[test]
    fn one_session() {
        let memory = Memory::default();
        let (addr, shutdown, handle) = start(Config::default(), &memory);
        assert!(send(addr, FIXTURE).is_empty());
        memory.wait_for(1);
        shutdown.shutdown();
        handle.join().unwrap();
        let stored = memory.0.lock().unwrap();
        assert_eq!("300434065263440", stored[0].0);
        assert_eq!(1234, stored[0].1);
        assert_eq!(30, stored[0].2.as_ref().unwrap().len());
    }

    #[test]
    fn confirmation() {
        let memory = Memory::default();
        let config = Config {
            confirm: true,
            ..Config::default()
        };
        let (addr, shutdown, handle) = start(config, &memory);
        assert_eq!(directip::confirmation(true), send(addr, FIXTURE));
        assert_eq!(directip::confirmation(false), send(addr, &FIXTURE[..2]));
        shutdown.shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn stalled_session_is_abandoned() {
        let memory = Memory::default();
        let config = Config {
            read_timeout: 1,
            ..Config::default()
        };
        let (addr, shutdown, handle) = start(config, &memory);
        let mut stalled = TcpStream::connect(addr).unwrap();
        stalled.write_all(&FIXTURE[..40]).unwrap();

        assert!(send(addr, FIXTURE).is_empty());
        memory.wait_for(1);

        let mut response = Vec::new();
        stalled.read_to_end(&mut response).unwrap();
        assert!(response.is_empty());
        shutdown.shutdown();
        handle.join().unwrap();
        assert_eq!(1, memory.len());
    }

    #[test]
    fn many_concurrent_sessions() {
        let memory = Memory::default();
        let config = Config {
            max_connections: 100,
            ..Config::default()
        };
        let (addr, shutdown, handle) = start(config, &memory);
        let clients: Vec<_> = (0..100u16)
            .map(|i| {
                thread::spawn(move || {
                    let imei = format!("300434065{:06}", i);
                    let sentinel = [i as u8, (i >> 8) as u8, 0xa5, 0x5a];
                    send(addr, &session(&imei, i, 1764759615, Some(&sentinel[..])));
                })
            })
            .collect();
        for client in clients {
            client.join().unwrap();
        }
        memory.wait_for(100);
        shutdown.shutdown();
        handle.join().unwrap();

        let stored = memory.0.lock().unwrap();
        assert_eq!(100, stored.len());
        let by_imei: HashMap<_, _> = stored
            .iter()
            .map(|&(ref imei, momsn, ref payload)| (imei.clone(), (momsn, payload.clone())))
            .collect();
        assert_eq!(100, by_imei.len());
        for i in 0..100u16 {
            let (momsn, ref payload) = by_imei[&format!("300434065{:06}", i)];
            assert_eq!(i, momsn);
            assert_eq!(
                Some(vec![i as u8, (i >> 8) as u8, 0xa5, 0x5a]),
                *payload
            );
        }
    }

    #[test]
    fn shutdown_waits_for_in_flight_sessions() {
        let memory = Memory::default();
        let config = Config {
            read_timeout: 1,
            ..Config::default()
        };
        let (addr, shutdown, handle) = start(config, &memory);
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(&FIXTURE[..10]).unwrap();
        thread::sleep(Duration::from_millis(100));
        shutdown.shutdown();
        stream.write_all(&FIXTURE[10..]).unwrap();
        handle.join().unwrap();
        assert_eq!(1, memory.len());
    }

    #[test]
    fn drip_fed_session_is_abandoned() {
        let memory = Memory::default();
        let config = Config {
            read_timeout: 1,
            ..Config::default()
        };
        let (addr, shutdown, handle) = start(config, &memory);
        let mut stream = TcpStream::connect(addr).unwrap();
        for chunk in FIXTURE.chunks(8) {
            if stream.write_all(chunk).is_err() {
                break;
            }
            thread::sleep(Duration::from_millis(300));
        }
        let mut response = Vec::new();
        let _ = stream.read_to_end(&mut response);
        assert!(response.is_empty());
        shutdown.shutdown();
        handle.join().unwrap();
        assert_eq!(0, memory.len());
    }

    #[test]
    fn connections_beyond_the_limit_are_refused() {
        let memory = Memory::default();
        let config = Config {
            read_timeout: 1,
            max_connections: 1,
            ..Config::default()
        };
        let (addr, shutdown, handle) = start(config, &memory);
        let mut stalled = TcpStream::connect(addr).unwrap();
        stalled.write_all(&FIXTURE[..10]).unwrap();
        thread::sleep(Duration::from_millis(100));

        let mut refused = TcpStream::connect(addr).unwrap();
        let _ = refused.write_all(FIXTURE);
        let _ = refused.shutdown(SocketShutdown::Write);
        let _ = refused.read_to_end(&mut Vec::new());
        assert_eq!(0, memory.len());

        thread::sleep(Duration::from_millis(1200));
        assert!(send(addr, FIXTURE).is_empty());
        memory.wait_for(1);
        shutdown.shutdown();
        handle.join().unwrap();
        assert_eq!(1, memory.len());
    }

    #[test]
    fn listener_is_closed_on_shutdown() {
        let memory = Memory::default();
        let config = Config {
            read_timeout: 1,
            ..Config::default()
        };
        let (addr, shutdown, handle) = start(config, &memory);
        let mut in_flight = TcpStream::connect(addr).unwrap();
        in_flight.write_all(&FIXTURE[..10]).unwrap();
        thread::sleep(Duration::from_millis(100));
        shutdown.shutdown();
        thread::sleep(Duration::from_millis(100));
        assert!(TcpStream::connect(addr).is_err());
        handle.join().unwrap();
        assert_eq!(0, memory.len());
    }
}
