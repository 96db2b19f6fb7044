//! The error taxonomy applications see from the thread, datagram, and stream
//! APIs.
//!
//! The original C assignment reported failures through an out-parameter
//! discriminator plus a sentinel `-1` return. This crate substitutes a typed
//! `Result<T, Error>`, per the "exception substitution" note in the design
//! notes: callers match on [`Error`] instead of inspecting a side channel.

/// Unified error type for the datagram and stream APIs.
///
/// Variant names follow the taxonomy the specification assigns each failure
/// mode to, rather than the call site that produced it, so the same variant
/// is reused across the datagram and stream layers wherever their failure
/// modes coincide.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A client port, or a bounded-port slot in the datagram namespace, could
    /// not be allocated because the namespace is exhausted.
    #[error("no free ports remain in this namespace")]
    NoMorePorts,

    /// `server_create` was called for a port number already bound by a live
    /// socket.
    #[error("port is already bound by a socket")]
    PortInUse,

    /// A connect attempt exhausted all retransmission tries without a
    /// matching response.
    #[error("no server answered the connection attempt")]
    NoServer,

    /// A connect attempt was answered with `FIN` — the remote endpoint is not
    /// listening in a way compatible with a fresh connection (e.g. it is
    /// already connected to a different peer).
    #[error("peer refused the connection")]
    Busy,

    /// The transceiver reported a failure transmitting a packet.
    #[error("the transceiver failed to send a packet")]
    SendError,

    /// The socket was closed, locally or by the peer, partway through a
    /// receive, or the peer is gone.
    #[error("the socket is no longer able to receive")]
    ReceiveError,

    /// A resource allocation (stack, queue node, port record) failed.
    #[error("out of memory")]
    OutOfMemory,

    /// An argument was out of range, had the wrong polarity (e.g. a bound
    /// port number handed to `create_unbound`), or was otherwise malformed.
    #[error("invalid arguments")]
    InvalidParams,
}

/// Convenience alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, Error>;
