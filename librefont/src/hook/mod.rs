//! Inline function hooking.
//!
//! Layered bottom-up: [`thunk`] encodes raw jump instructions, [`prologue`]
//! decodes and relocates the target's entry instructions, [`trampoline`]
//! assembles the call-the-original stub in executable memory and
//! [`install`] writes the redirect patch over the target.

pub mod errors;
pub mod prologue;
pub mod thunk;

#[cfg(windows)]
pub mod install;
#[cfg(windows)]
pub mod trampoline;

pub type HookResult<T> = std::result::Result<T, errors::HookError>;
