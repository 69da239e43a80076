//! Read-deadline helpers shared by the handshake and the receive loop.

use std::io;

/// A read deadline expired with no data. Not an error for a polling reader.
#[inline]
pub fn is_poll_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}
