//! Client-side session protocol for a remote validation and generation engine.
//!
//! [`SessionStore`] is the entry point: it tracks the connection, installs
//! streamed diagnostics per document revision and coordinates a single
//! in-flight generation request.

pub mod codec;
pub mod protocol;
pub mod retry;
pub mod tcp;
pub mod transport;
pub mod types;

pub(crate) mod connection;
pub(crate) mod diagnostics;
pub(crate) mod generation;
pub(crate) mod validation;

mod store;

pub use connection::{ConnectionError, SendOutcome, Session};
pub use diagnostics::{Cursor, DiagnosticSet, ReplaceError};
pub use generation::{GenerateError, GenerationController, GenerationHandle, GenerationStatus};
pub use protocol::{ClientMessage, ServerMessage, WireDiagnostic};
pub use store::SessionStore;
pub use tcp::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT, TcpTransport};
pub use transport::{EngineEnd, Link, MemoryAcceptor, MemoryTransport, Transport, TransportError};
pub use types::{
    ConnectionConfig, ConnectionState, GenerationConfig, GenerationPhase, SessionConfig,
    StoreSnapshot,
};
pub use validation::{ValidationOutcome, ValidationStream};
