//! Crate error type.
//!
//! Everything here is recoverable by design: the protocol is best-effort
//! and self-healing, so callers fall back to "no data" or "no manager"
//! and wait for the next event rather than treating any of these as fatal.

use thiserror::Error;

use crate::codec::CodecError;

#[derive(Debug, Error)]
pub enum Error {
    /// Another process owns (or won the race for) the per-screen
    /// selection. Callers may retry later.
    #[error("selection {0} is owned by another manager")]
    SelectionOwned(String),

    #[error("display has no screen {0}")]
    BadScreen(usize),

    #[error("malformed settings property: {0}")]
    Codec(#[from] CodecError),

    #[error("X11 connection error: {0}")]
    Connection(#[from] x11rb::errors::ConnectionError),

    #[error("X11 request failed: {0}")]
    Reply(#[from] x11rb::errors::ReplyError),

    #[error("X11 request failed: {0}")]
    ReplyOrId(#[from] x11rb::errors::ReplyOrIdError),
}

pub type Result<T> = std::result::Result<T, Error>;
