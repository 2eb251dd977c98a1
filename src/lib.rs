#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

//! The _smoligmp_ library implements the host side of the Internet Group
//! Management Protocol, versions 1, 2 and 3 ([RFC 1112], [RFC 2236],
//! [RFC 3376]), for standalone, event-loop embedded network stacks.
//!
//! It is built the same way as the rest of a small `no_std` stack would be:
//! timers are polled rather than called back, all per-interface state is
//! owned by a single [Host](iface/struct.Host.html) value that is only ever
//! touched from one cooperative task, and transmission goes through the
//! token-based [Device](phy/trait.Device.html) abstraction.
//!
//! # Table of contents
//!
//! * The [wire](wire/index.html) layer parses and emits IPv4 headers and every
//!   IGMP message format, including IGMPv3 group records.
//! * The [iface](iface/index.html) layer contains the host state machine, the
//!   inbound message dispatcher and a polling [Interface] wrapper.
//! * The [phy](phy/index.html) layer is the device abstraction reports leave
//!   through.
//!
//! # Feature flags
//!
//! * `std`: enables `std::error::Error` implementations.
//! * `log`: logs through the `log` crate.
//! * `defmt`: logs through `defmt` and derives `defmt::Format`.
//!
//! [RFC 1112]: https://tools.ietf.org/html/rfc1112
//! [RFC 2236]: https://tools.ietf.org/html/rfc2236
//! [RFC 3376]: https://tools.ietf.org/html/rfc3376
//! [Interface]: iface/struct.Interface.html

extern crate alloc;

#[cfg(all(feature = "log", feature = "defmt"))]
compile_error!("You must enable at most one of the following features: defmt, log");

use core::fmt;

#[macro_use]
mod macros;
mod rand;

pub mod iface;
pub mod phy;
pub mod time;
pub mod wire;

#[cfg(test)]
mod tests;

/// The error type for the wire and dispatch layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A packet could not be parsed or emitted because a field was out of bounds
    /// for the underlying buffer.
    Truncated,
    /// An incoming packet could not be recognized and was dropped.
    /// E.g. an IGMP message of unknown type.
    Unrecognized,
    /// An incoming packet was recognized but contained invalid data.
    /// E.g. a query received with a TTL other than 1.
    Malformed,
    /// An incoming packet had an incorrect checksum and was dropped.
    Checksum,
    /// An incoming packet has been fragmented and was dropped.
    Fragmented,
}

/// The result type for the wire and dispatch layers.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Truncated => write!(f, "truncated packet"),
            Error::Unrecognized => write!(f, "unrecognized packet"),
            Error::Malformed => write!(f, "malformed packet"),
            Error::Checksum => write!(f, "checksum error"),
            Error::Fragmented => write!(f, "fragmented packet"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
