//! Call lifecycle events as emitted by an HTTP engine.
//!
//! Every event carries the `CallId` of the call it belongs to plus a
//! phase-specific payload. Start/end pairs are correlated by consumers, not
//! here: this module only describes what happened.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Opaque handle of one in-flight call. Unique while the call runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

impl CallId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call#{}", self.0)
    }
}

/// Opaque handle of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Negotiated application protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http10,
    Http11,
    Http2,
}

/// Lifecycle event (one variant per engine callback).
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    CallStart {
        call: CallId,
    },
    CallEnd {
        call: CallId,
    },
    CallFailed {
        call: CallId,
        error: Arc<io::Error>,
    },

    DnsStart {
        call: CallId,
        domain: String,
    },
    DnsEnd {
        call: CallId,
        domain: String,
        addresses: Vec<IpAddr>,
    },

    ConnectStart {
        call: CallId,
        endpoint: SocketAddr,
    },
    SecureConnectStart {
        call: CallId,
    },
    SecureConnectEnd {
        call: CallId,
    },
    ConnectEnd {
        call: CallId,
        endpoint: SocketAddr,
        protocol: Option<Protocol>,
    },
    ConnectFailed {
        call: CallId,
        endpoint: SocketAddr,
        error: Arc<io::Error>,
    },

    ConnectionAcquired {
        call: CallId,
        connection: ConnectionId,
    },
    ConnectionReleased {
        call: CallId,
        connection: ConnectionId,
    },

    RequestHeadersStart {
        call: CallId,
    },
    RequestHeadersEnd {
        call: CallId,
    },
    RequestBodyStart {
        call: CallId,
    },
    RequestBodyEnd {
        call: CallId,
        bytes: u64,
    },
    RequestFailed {
        call: CallId,
        error: Arc<io::Error>,
    },

    ResponseHeadersStart {
        call: CallId,
    },
    ResponseHeadersEnd {
        call: CallId,
        status: u16,
    },
    ResponseBodyStart {
        call: CallId,
    },
    ResponseBodyEnd {
        call: CallId,
        bytes: u64,
    },
    ResponseFailed {
        call: CallId,
        error: Arc<io::Error>,
    },
}

/// Payload-free discriminant of `LifecycleEvent` (for logs and fault reports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    CallStart,
    CallEnd,
    CallFailed,
    DnsStart,
    DnsEnd,
    ConnectStart,
    SecureConnectStart,
    SecureConnectEnd,
    ConnectEnd,
    ConnectFailed,
    ConnectionAcquired,
    ConnectionReleased,
    RequestHeadersStart,
    RequestHeadersEnd,
    RequestBodyStart,
    RequestBodyEnd,
    RequestFailed,
    ResponseHeadersStart,
    ResponseHeadersEnd,
    ResponseBodyStart,
    ResponseBodyEnd,
    ResponseFailed,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::CallStart => "call_start",
            EventKind::CallEnd => "call_end",
            EventKind::CallFailed => "call_failed",
            EventKind::DnsStart => "dns_start",
            EventKind::DnsEnd => "dns_end",
            EventKind::ConnectStart => "connect_start",
            EventKind::SecureConnectStart => "secure_connect_start",
            EventKind::SecureConnectEnd => "secure_connect_end",
            EventKind::ConnectEnd => "connect_end",
            EventKind::ConnectFailed => "connect_failed",
            EventKind::ConnectionAcquired => "connection_acquired",
            EventKind::ConnectionReleased => "connection_released",
            EventKind::RequestHeadersStart => "request_headers_start",
            EventKind::RequestHeadersEnd => "request_headers_end",
            EventKind::RequestBodyStart => "request_body_start",
            EventKind::RequestBodyEnd => "request_body_end",
            EventKind::RequestFailed => "request_failed",
            EventKind::ResponseHeadersStart => "response_headers_start",
            EventKind::ResponseHeadersEnd => "response_headers_end",
            EventKind::ResponseBodyStart => "response_body_start",
            EventKind::ResponseBodyEnd => "response_body_end",
            EventKind::ResponseFailed => "response_failed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named sub-interval of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Call,
    Dns,
    Connect,
    SecureConnect,
    RequestHeaders,
    RequestBody,
    ResponseHeaders,
    ResponseBody,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Phase::Call,
        Phase::Dns,
        Phase::Connect,
        Phase::SecureConnect,
        Phase::RequestHeaders,
        Phase::RequestBody,
        Phase::ResponseHeaders,
        Phase::ResponseBody,
    ];

    /// Metric segment for this phase (e.g. `dns` in `dns-duration`).
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Call => "calls",
            Phase::Dns => "dns",
            Phase::Connect => "connections",
            Phase::SecureConnect => "secure-connect",
            Phase::RequestHeaders => "request-headers",
            Phase::RequestBody => "request-body",
            Phase::ResponseHeaders => "response-headers",
            Phase::ResponseBody => "response-body",
        }
    }

    /// Position in `Phase::ALL`.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether the engine reports a failure event that closes this phase.
    /// DNS and TLS failures surface as `ConnectFailed`/`CallFailed` instead.
    pub fn has_failure_event(self) -> bool {
        !matches!(self, Phase::Dns | Phase::SecureConnect)
    }
}

/// Which edge of a phase an event marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Start,
    End,
    Failed,
}

impl LifecycleEvent {
    /// Call this event belongs to.
    pub fn call(&self) -> CallId {
        match self {
            LifecycleEvent::CallStart { call }
            | LifecycleEvent::CallEnd { call }
            | LifecycleEvent::CallFailed { call, .. }
            | LifecycleEvent::DnsStart { call, .. }
            | LifecycleEvent::DnsEnd { call, .. }
            | LifecycleEvent::ConnectStart { call, .. }
            | LifecycleEvent::SecureConnectStart { call }
            | LifecycleEvent::SecureConnectEnd { call }
            | LifecycleEvent::ConnectEnd { call, .. }
            | LifecycleEvent::ConnectFailed { call, .. }
            | LifecycleEvent::ConnectionAcquired { call, .. }
            | LifecycleEvent::ConnectionReleased { call, .. }
            | LifecycleEvent::RequestHeadersStart { call }
            | LifecycleEvent::RequestHeadersEnd { call }
            | LifecycleEvent::RequestBodyStart { call }
            | LifecycleEvent::RequestBodyEnd { call, .. }
            | LifecycleEvent::RequestFailed { call, .. }
            | LifecycleEvent::ResponseHeadersStart { call }
            | LifecycleEvent::ResponseHeadersEnd { call, .. }
            | LifecycleEvent::ResponseBodyStart { call }
            | LifecycleEvent::ResponseBodyEnd { call, .. }
            | LifecycleEvent::ResponseFailed { call, .. } => *call,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            LifecycleEvent::CallStart { .. } => EventKind::CallStart,
            LifecycleEvent::CallEnd { .. } => EventKind::CallEnd,
            LifecycleEvent::CallFailed { .. } => EventKind::CallFailed,
            LifecycleEvent::DnsStart { .. } => EventKind::DnsStart,
            LifecycleEvent::DnsEnd { .. } => EventKind::DnsEnd,
            LifecycleEvent::ConnectStart { .. } => EventKind::ConnectStart,
            LifecycleEvent::SecureConnectStart { .. } => EventKind::SecureConnectStart,
            LifecycleEvent::SecureConnectEnd { .. } => EventKind::SecureConnectEnd,
            LifecycleEvent::ConnectEnd { .. } => EventKind::ConnectEnd,
            LifecycleEvent::ConnectFailed { .. } => EventKind::ConnectFailed,
            LifecycleEvent::ConnectionAcquired { .. } => EventKind::ConnectionAcquired,
            LifecycleEvent::ConnectionReleased { .. } => EventKind::ConnectionReleased,
            LifecycleEvent::RequestHeadersStart { .. } => EventKind::RequestHeadersStart,
            LifecycleEvent::RequestHeadersEnd { .. } => EventKind::RequestHeadersEnd,
            LifecycleEvent::RequestBodyStart { .. } => EventKind::RequestBodyStart,
            LifecycleEvent::RequestBodyEnd { .. } => EventKind::RequestBodyEnd,
            LifecycleEvent::RequestFailed { .. } => EventKind::RequestFailed,
            LifecycleEvent::ResponseHeadersStart { .. } => EventKind::ResponseHeadersStart,
            LifecycleEvent::ResponseHeadersEnd { .. } => EventKind::ResponseHeadersEnd,
            LifecycleEvent::ResponseBodyStart { .. } => EventKind::ResponseBodyStart,
            LifecycleEvent::ResponseBodyEnd { .. } => EventKind::ResponseBodyEnd,
            LifecycleEvent::ResponseFailed { .. } => EventKind::ResponseFailed,
        }
    }

    /// Phase edge marked by this event.
    ///
    /// `RequestFailed`/`ResponseFailed` close whichever request or response
    /// phase is open, and pool checkouts are not phases; those return `None`.
    pub fn phase_edge(&self) -> Option<(Phase, Edge)> {
        let edge = match self {
            LifecycleEvent::CallStart { .. } => (Phase::Call, Edge::Start),
            LifecycleEvent::CallEnd { .. } => (Phase::Call, Edge::End),
            LifecycleEvent::CallFailed { .. } => (Phase::Call, Edge::Failed),
            LifecycleEvent::DnsStart { .. } => (Phase::Dns, Edge::Start),
            LifecycleEvent::DnsEnd { .. } => (Phase::Dns, Edge::End),
            LifecycleEvent::ConnectStart { .. } => (Phase::Connect, Edge::Start),
            LifecycleEvent::ConnectEnd { .. } => (Phase::Connect, Edge::End),
            LifecycleEvent::ConnectFailed { .. } => (Phase::Connect, Edge::Failed),
            LifecycleEvent::SecureConnectStart { .. } => (Phase::SecureConnect, Edge::Start),
            LifecycleEvent::SecureConnectEnd { .. } => (Phase::SecureConnect, Edge::End),
            LifecycleEvent::RequestHeadersStart { .. } => (Phase::RequestHeaders, Edge::Start),
            LifecycleEvent::RequestHeadersEnd { .. } => (Phase::RequestHeaders, Edge::End),
            LifecycleEvent::RequestBodyStart { .. } => (Phase::RequestBody, Edge::Start),
            LifecycleEvent::RequestBodyEnd { .. } => (Phase::RequestBody, Edge::End),
            LifecycleEvent::ResponseHeadersStart { .. } => (Phase::ResponseHeaders, Edge::Start),
            LifecycleEvent::ResponseHeadersEnd { .. } => (Phase::ResponseHeaders, Edge::End),
            LifecycleEvent::ResponseBodyStart { .. } => (Phase::ResponseBody, Edge::Start),
            LifecycleEvent::ResponseBodyEnd { .. } => (Phase::ResponseBody, Edge::End),
            LifecycleEvent::ConnectionAcquired { .. }
            | LifecycleEvent::ConnectionReleased { .. }
            | LifecycleEvent::RequestFailed { .. }
            | LifecycleEvent::ResponseFailed { .. } => return None,
        };
        Some(edge)
    }

    /// `CallEnd` or `CallFailed`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleEvent::CallEnd { .. } | LifecycleEvent::CallFailed { .. }
        )
    }
}
