//! librefont
//!
//! Function interception engine: prologue capture, trampoline construction
//! and inline patch installation, plus the substitution table that drives
//! the refont-gdi interceptor.
//!
//! The modules that only compute over bytes (jump encoding, prologue
//! decoding, the substitution table) are platform independent and carry the
//! unit tests. Everything that touches live process memory lives under
//! [`os`] and [`hook::trampoline`]/[`hook::install`] and is Windows only.

pub mod arch;
pub mod fnptr;
pub mod hook;
pub mod table;

#[cfg(windows)]
pub mod os;
