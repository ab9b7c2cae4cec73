//! Threaded HTTP/2 client
//!
//! [`H2Client`] is a cheap, cloneable handle. Each connection is driven by a
//! single thread that exclusively owns the [`Connection`] and the transport;
//! handles submit commands over an mpsc channel and wait on a per-request
//! reply channel. Header encoding therefore happens in submission order and
//! the windows and HPACK tables are only ever touched by the connection
//! thread.
//!
//! A caller that gives up waiting makes the connection thread reset its
//! stream with CANCEL. Dropping the last handle sends GOAWAY(NO_ERROR) and
//! closes the transport.

use super::connection::{Connection, ConnectionConfig, Event, Response};
use super::error::{Error, ErrorCode, Result};
use super::frames::PrioritySpec;
use super::hpack::{HeaderField, IndexingPolicy};
use super::settings::SettingsBuilder;
use super::stream::StreamId;
use super::DEFAULT_CLOSED_STREAM_RETENTION;
use crate::http::tls::TlsConfig;
use crate::http::{connect_tcp, FdSessionOps, PollEvents, SessionOps, DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT};
use bytes::Bytes;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

/// Default time a caller waits for a response
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time the connection thread blocks on the transport before looking
/// at new commands
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default TCP connect timeout for [`H2Client::open`]
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const READ_BUFFER_SIZE: usize = 16384;

static PING_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Per-request options
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Overrides the client's default timeout
    pub timeout: Option<Duration>,
    pub priority: Option<PrioritySpec>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn priority(mut self, priority: PrioritySpec) -> Self {
        self.priority = Some(priority);
        self
    }
}

enum Reply {
    /// The request was encoded on this stream
    Opened(StreamId),
    Finished(Result<Response>),
}

enum Command {
    Request {
        method: String,
        path: String,
        headers: Vec<HeaderField>,
        body: Option<Bytes>,
        priority: Option<PrioritySpec>,
        reply: Sender<Reply>,
    },
    Cancel(StreamId),
    Ping {
        data: [u8; 8],
        reply: Sender<Result<()>>,
    },
    Close {
        reply: Sender<Result<()>>,
    },
}

/// Handle to an HTTP/2 connection
#[derive(Debug, Clone)]
pub struct H2Client {
    commands: Sender<Command>,
    default_timeout: Duration,
}

impl H2Client {
    /// Connect to `host:port` with default settings.
    ///
    /// With `tls` the server must select `h2` through ALPN; otherwise the
    /// connection uses cleartext HTTP/2 with prior knowledge.
    pub fn open(host: &str, port: u16, tls: bool) -> Result<Self> {
        H2ClientBuilder::new().connect(host, port, tls)
    }

    /// Run a connection over an already established transport
    pub fn new<S: SessionOps + Send + 'static>(session: S) -> Result<Self> {
        H2ClientBuilder::new().build(session)
    }

    /// Send a request and wait for the complete response
    pub fn request(
        &self,
        method: &str,
        path: &str,
        headers: &[HeaderField],
        body: Option<Bytes>,
        options: RequestOptions,
    ) -> Result<Response> {
        let deadline = Instant::now() + options.timeout.unwrap_or(self.default_timeout);
        let (reply, replies) = mpsc::channel();
        self.send(Command::Request {
            method: method.to_string(),
            path: path.to_string(),
            headers: headers.to_vec(),
            body,
            priority: options.priority,
            reply,
        })?;

        let mut stream_id = None;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match replies.recv_timeout(remaining) {
                Ok(Reply::Opened(id)) => stream_id = Some(id),
                Ok(Reply::Finished(result)) => return result,
                Err(RecvTimeoutError::Timeout) => {
                    // Before Opened arrives the connection thread notices the
                    // dropped reply channel and cancels on its own
                    if let Some(id) = stream_id {
                        log::debug!("stream {}: {} {} timed out", id, method, path);
                        let _ = self.commands.send(Command::Cancel(id));
                    }
                    return Err(Error::Timeout);
                }
                Err(RecvTimeoutError::Disconnected) => return Err(Error::ConnectionClosed),
            }
        }
    }

    pub fn get(&self, path: &str, headers: &[HeaderField]) -> Result<Response> {
        self.request("GET", path, headers, None, RequestOptions::default())
    }

    pub fn head(&self, path: &str, headers: &[HeaderField]) -> Result<Response> {
        self.request("HEAD", path, headers, None, RequestOptions::default())
    }

    pub fn options(&self, path: &str, headers: &[HeaderField]) -> Result<Response> {
        self.request("OPTIONS", path, headers, None, RequestOptions::default())
    }

    pub fn delete(&self, path: &str, headers: &[HeaderField]) -> Result<Response> {
        self.request("DELETE", path, headers, None, RequestOptions::default())
    }

    pub fn post(&self, path: &str, headers: &[HeaderField], body: impl Into<Bytes>) -> Result<Response> {
        self.request("POST", path, headers, Some(body.into()), RequestOptions::default())
    }

    pub fn put(&self, path: &str, headers: &[HeaderField], body: impl Into<Bytes>) -> Result<Response> {
        self.request("PUT", path, headers, Some(body.into()), RequestOptions::default())
    }

    pub fn patch(&self, path: &str, headers: &[HeaderField], body: impl Into<Bytes>) -> Result<Response> {
        self.request("PATCH", path, headers, Some(body.into()), RequestOptions::default())
    }

    /// Round-trip a PING through the server
    pub fn ping(&self) -> Result<Duration> {
        let data = PING_COUNTER.fetch_add(1, Ordering::Relaxed).to_be_bytes();
        let started = Instant::now();
        let (reply, replies) = mpsc::channel();
        self.send(Command::Ping { data, reply })?;

        match replies.recv_timeout(self.default_timeout) {
            Ok(result) => result.map(|()| started.elapsed()),
            Err(RecvTimeoutError::Timeout) => Err(Error::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(Error::ConnectionClosed),
        }
    }

    /// Send GOAWAY(NO_ERROR) and wait for the connection thread to finish.
    ///
    /// Requests already in flight complete; new ones fail with
    /// [`Error::ConnectionClosed`] on every handle.
    pub fn close(&self) -> Result<()> {
        let (reply, replies) = mpsc::channel();
        if self.commands.send(Command::Close { reply }).is_err() {
            return Ok(());
        }
        replies.recv().unwrap_or(Ok(()))
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::ConnectionClosed)
    }
}

/// HTTP/2 client builder
pub struct H2ClientBuilder {
    settings: SettingsBuilder,
    indexing_policy: IndexingPolicy,
    authority: Option<String>,
    scheme: Option<String>,
    timeout: Duration,
    poll_interval: Duration,
    connect_timeout: Duration,
    closed_stream_retention: usize,
    tls_config: Option<TlsConfig>,
}

impl H2ClientBuilder {
    /// Create a new client builder; settings not set keep RFC defaults
    pub fn new() -> Self {
        H2ClientBuilder {
            settings: SettingsBuilder::new(),
            indexing_policy: IndexingPolicy::default(),
            authority: None,
            scheme: None,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            closed_stream_retention: DEFAULT_CLOSED_STREAM_RETENTION,
            tls_config: None,
        }
    }

    /// Set header table size
    pub fn header_table_size(mut self, size: u32) -> Self {
        self.settings = self.settings.header_table_size(size);
        self
    }

    /// Set initial window size
    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.settings = self.settings.initial_window_size(size);
        self
    }

    /// Set max frame size
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.settings = self.settings.max_frame_size(size);
        self
    }

    /// Set max concurrent streams
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.settings = self.settings.max_concurrent_streams(max);
        self
    }

    /// Bound the decoded size of response header lists
    pub fn max_header_list_size(mut self, size: u32) -> Self {
        self.settings = self.settings.max_header_list_size(size);
        self
    }

    pub fn indexing_policy(mut self, policy: IndexingPolicy) -> Self {
        self.indexing_policy = policy;
        self
    }

    /// `:authority` of every request; defaults to the host given to
    /// [`H2ClientBuilder::connect`]
    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    /// Default response timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn closed_stream_retention(mut self, retention: usize) -> Self {
        self.closed_stream_retention = retention;
        self
    }

    /// TLS configuration used by [`H2ClientBuilder::connect`] instead of
    /// [`TlsConfig::h2`]
    pub fn tls_config(mut self, config: TlsConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Open a TCP (and optionally TLS) connection and start the client on it
    pub fn connect(mut self, host: &str, port: u16, tls: bool) -> Result<H2Client> {
        let tcp = connect_tcp(host, port, self.connect_timeout)?;

        let default_port = if tls { DEFAULT_HTTPS_PORT } else { DEFAULT_HTTP_PORT };
        if self.authority.is_none() {
            self.authority = Some(if port == default_port {
                host.to_string()
            } else {
                format!("{}:{}", host, port)
            });
        }

        if !tls {
            if self.scheme.is_none() {
                self.scheme = Some("http".to_string());
            }
            return self.build(FdSessionOps::new(tcp));
        }

        let config = match self.tls_config.take() {
            Some(config) => config,
            None => TlsConfig::h2(host)?,
        };
        let session = config.connect(tcp)?;
        match session.alpn_protocol() {
            Some(b"h2") => {}
            other => {
                log::warn!("{}:{} did not negotiate h2", host, port);
                return Err(Error::AlpnFailed(other.map(<[u8]>::to_vec)));
            }
        }
        self.build(session)
    }

    /// Start the connection thread over `session`
    pub fn build<S: SessionOps + Send + 'static>(self, mut session: S) -> Result<H2Client> {
        let config = self.connection_config()?;
        let authority = config.authority.clone();
        let conn = Connection::init(&mut session, config)?;

        let (commands, receiver) = mpsc::channel();
        let actor = Actor {
            conn,
            session,
            commands: receiver,
            waiters: HashMap::new(),
            pings: Vec::new(),
            closers: Vec::new(),
            poll_interval: self.poll_interval,
            read_buf: vec![0; READ_BUFFER_SIZE],
        };

        thread::Builder::new()
            .name(format!("h2wire {}", authority))
            .spawn(move || actor.run())
            .map_err(|e| Error::Internal(format!("cannot spawn connection thread: {}", e)))?;

        Ok(H2Client {
            commands,
            default_timeout: self.timeout,
        })
    }

    fn connection_config(&self) -> Result<ConnectionConfig> {
        let settings = self.settings.clone().build()?;
        let authority = self.authority.clone().unwrap_or_else(|| "localhost".to_string());
        Ok(ConnectionConfig::new(authority)
            .settings(settings)
            .scheme(self.scheme.clone().unwrap_or_else(|| "https".to_string()))
            .indexing_policy(self.indexing_policy)
            .closed_stream_retention(self.closed_stream_retention))
    }
}

impl Default for H2ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The connection thread
struct Actor<S> {
    conn: Connection,
    session: S,
    commands: Receiver<Command>,
    waiters: HashMap<StreamId, Sender<Reply>>,
    pings: Vec<([u8; 8], Sender<Result<()>>)>,
    closers: Vec<Sender<Result<()>>>,
    poll_interval: Duration,
    read_buf: Vec<u8>,
}

impl<S: SessionOps> Actor<S> {
    fn run(mut self) {
        log::debug!("connection thread started");
        let result = self.drive();

        let failure = match &result {
            Ok(()) => Error::ConnectionClosed,
            Err(err) => {
                log::warn!("connection failed: {}", err);
                err.for_waiter()
            }
        };
        for (_, waiter) in self.waiters.drain() {
            let _ = waiter.send(Reply::Finished(Err(failure.for_waiter())));
        }
        for (_, reply) in self.pings.drain(..) {
            let _ = reply.send(Err(failure.for_waiter()));
        }

        // A GOAWAY may still be queued
        if let Err(err) = self.conn.flush(&mut self.session) {
            log::debug!("final flush failed: {}", err);
        }
        if let Err(err) = self.session.close() {
            log::debug!("close failed: {}", err);
        }
        for reply in self.closers.drain(..) {
            let _ = reply.send(Ok(()));
        }
        log::debug!("connection thread finished");
    }

    fn drive(&mut self) -> Result<()> {
        loop {
            loop {
                match self.commands.try_recv() {
                    Ok(command) => self.command(command)?,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        log::debug!("all client handles dropped");
                        if self.conn.is_accepting() {
                            self.conn.goaway(ErrorCode::NoError, b"")?;
                        }
                        return Ok(());
                    }
                }
            }

            let events = self.conn.take_events();
            self.dispatch(events);
            self.conn.flush(&mut self.session)?;
            if self.conn.is_closed() {
                return Ok(());
            }

            if !self.session.poll(PollEvents::Read, Some(self.poll_interval))? {
                continue;
            }
            let n = match self.session.read(&mut self.read_buf) {
                Ok(n) => n,
                Err(crate::http::Error::Io(e))
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) =>
                {
                    continue
                }
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                return Err(Error::Transport(crate::http::Error::ConnectionClosed));
            }

            let events = match self.conn.handle(&self.read_buf[..n]) {
                Ok(events) => events,
                Err(err) => {
                    // Responses completed ahead of the bad frame still count
                    let events = self.conn.take_events();
                    self.dispatch(events);
                    // Push out the GOAWAY describing the failure
                    let _ = self.conn.flush(&mut self.session);
                    return Err(err);
                }
            };
            self.dispatch(events);
            self.conn.flush(&mut self.session)?;
        }
    }

    fn command(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Request {
                method,
                path,
                headers,
                body,
                priority,
                reply,
            } => match self.conn.request(&method, &path, &headers, body, priority) {
                Ok(stream_id) => {
                    if reply.send(Reply::Opened(stream_id)).is_ok() {
                        self.waiters.insert(stream_id, reply);
                    } else {
                        log::debug!("stream {}: caller gone before the request went out", stream_id);
                        self.conn.reset_stream(stream_id, ErrorCode::Cancel)?;
                    }
                }
                Err(err) => {
                    log::debug!("{} {} rejected: {}", method, path, err);
                    let _ = reply.send(Reply::Finished(Err(err)));
                }
            },
            Command::Cancel(stream_id) => {
                if self.waiters.remove(&stream_id).is_some() {
                    self.conn.reset_stream(stream_id, ErrorCode::Cancel)?;
                }
            }
            Command::Ping { data, reply } => {
                self.conn.ping(data)?;
                self.pings.push((data, reply));
            }
            Command::Close { reply } => {
                if self.conn.is_accepting() {
                    log::debug!("closing with {} streams in flight", self.conn.active_streams());
                    self.conn.goaway(ErrorCode::NoError, b"")?;
                }
                self.closers.push(reply);
            }
        }
        Ok(())
    }

    /// Hand finished streams and PING acks to whoever waits for them
    fn dispatch(&mut self, events: Vec<Event>) {
        for event in events {
            match event {
                Event::ResponseComplete(response) => {
                    if let Some(waiter) = self.waiters.remove(&response.stream_id) {
                        let _ = waiter.send(Reply::Finished(Ok(response)));
                    }
                }
                Event::StreamReset {
                    stream_id,
                    code,
                    remote,
                } => {
                    if let Some(waiter) = self.waiters.remove(&stream_id) {
                        let err = match (remote, code) {
                            (true, ErrorCode::RefusedStream) => Error::Retryable(stream_id),
                            (true, _) => Error::stream(stream_id, code, "reset by server"),
                            (false, ErrorCode::Cancel) => Error::Cancelled(stream_id),
                            (false, _) => Error::stream(stream_id, code, "malformed response"),
                        };
                        let _ = waiter.send(Reply::Finished(Err(err)));
                    }
                }
                Event::StreamRefused { stream_id } => {
                    if let Some(waiter) = self.waiters.remove(&stream_id) {
                        let _ = waiter.send(Reply::Finished(Err(Error::Retryable(stream_id))));
                    }
                }
                Event::PingAck(data) => {
                    if let Some(pos) = self.pings.iter().position(|(sent, _)| *sent == data) {
                        let (_, reply) = self.pings.swap_remove(pos);
                        let _ = reply.send(Ok(()));
                    }
                }
                other => log::trace!("{:?}", other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_options() {
        let options = RequestOptions::new()
            .timeout(Duration::from_secs(1))
            .priority(PrioritySpec::new(0, true, 200));
        assert_eq!(options.timeout, Some(Duration::from_secs(1)));
        assert_eq!(options.priority.map(|p| p.weight), Some(200));

        let default = RequestOptions::default();
        assert!(default.timeout.is_none() && default.priority.is_none());
    }

    #[test]
    fn test_builder_connection_config() {
        let config = H2ClientBuilder::new()
            .header_table_size(8192)
            .initial_window_size(1 << 20)
            .max_concurrent_streams(10)
            .max_header_list_size(65536)
            .authority("example.com:8443")
            .scheme("https")
            .indexing_policy(IndexingPolicy::ProtectSensitive)
            .closed_stream_retention(16)
            .connection_config()
            .unwrap();

        assert_eq!(config.authority, "example.com:8443");
        assert_eq!(config.scheme, "https");
        assert_eq!(config.indexing_policy, IndexingPolicy::ProtectSensitive);
        assert_eq!(config.closed_stream_retention, 16);
        assert_eq!(config.settings.header_table_size, Some(8192));
        assert_eq!(config.settings.initial_window_size, Some(1 << 20));
        assert_eq!(config.settings.max_concurrent_streams, Some(10));
        assert_eq!(config.settings.max_header_list_size, Some(65536));
        assert_eq!(config.settings.max_frame_size, None);
    }

    #[test]
    fn test_builder_rejects_invalid_settings() {
        let err = H2ClientBuilder::new().max_frame_size(1024).connection_config().unwrap_err();
        assert!(matches!(err, Error::InvalidSettings(_)));

        let err = H2ClientBuilder::new()
            .initial_window_size(0x8000_0000)
            .connection_config()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSettings(_)));
    }

    #[test]
    fn test_builder_defaults() {
        let builder = H2ClientBuilder::default();
        assert_eq!(builder.timeout, DEFAULT_TIMEOUT);
        assert_eq!(builder.poll_interval, DEFAULT_POLL_INTERVAL);

        let config = builder.connection_config().unwrap();
        assert_eq!(config.authority, "localhost");
        assert_eq!(config.scheme, "https");
        assert_eq!(config.closed_stream_retention, DEFAULT_CLOSED_STREAM_RETENTION);
    }
}
