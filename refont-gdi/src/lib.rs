//! refont-gdi
//!
//! DLL that redirects `CreateFontIndirectW` in `gdi32.dll` through a
//! substitution table loaded from `refont.json` next to the module. Face
//! names with a matching rule are rewritten (optionally with a height
//! override) before the real GDI implementation runs; everything else
//! passes through untouched.
//!
//! The hook engine lives in `librefont`; this crate owns the process
//! lifecycle (`DllMain`), settings loading, the logger and the interceptor
//! itself.

pub mod logger;
pub mod settings;

#[cfg(windows)]
mod entry;
#[cfg(windows)]
pub mod interceptor;
