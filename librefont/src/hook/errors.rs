use thiserror::Error;

use crate::fnptr::FnPtrError;
use crate::hook::prologue::PrologueError;
use crate::hook::thunk::ThunkError;

/// Installation-time failures. None of these can occur on the hot path:
/// once a hook is installed the only remaining runtime conditions are
/// table misses (a defined pass-through, not an error).
#[derive(Debug, Error)]
pub enum HookError {
    #[error("target function pointer is NULL")]
    TargetIsNull,

    #[error("export `{symbol}` not found in module `{module}`")]
    SymbolNotFound { module: String, symbol: String },

    #[error("hook slot already holds an installed hook")]
    AlreadyInstalled,

    #[error("hook slot is empty")]
    NotInstalled,

    #[error("target region too small: {available} bytes available, {needed} needed")]
    FunctionTooSmall { available: usize, needed: usize },

    #[error("trampoline build failed: {0}")]
    TrampolineBuild(#[from] PrologueError),

    #[error("jump encoding failed: {0}")]
    JumpEncoding(#[from] ThunkError),

    #[error("function pointer error: {0}")]
    FnPtr(#[from] FnPtrError),

    #[cfg(windows)]
    #[error("memory protection change failed: {0}")]
    MemoryProtection(#[source] crate::os::windows::winapi::WinapiError),

    #[cfg(windows)]
    #[error("target memory rejected: {0}")]
    Memory(#[from] crate::os::windows::memory::MemoryError),

    #[cfg(windows)]
    #[error("windows API error: {0}")]
    Winapi(#[from] crate::os::windows::winapi::WinapiError),
}
