//! Target-memory validation performed before any patch write.

use libc::c_void;
use thiserror::Error;
use windows::Win32::System::Memory::{
    MEM_COMMIT, PAGE_EXECUTE, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY,
};

use super::winapi::{WinapiError, virtual_query};

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory at 0x{0:X} is not committed")]
    NotCommitted(usize),

    #[error("memory at 0x{0:X} is not executable")]
    NotExecutable(usize),

    #[error("winapi error: {0}")]
    Winapi(#[from] WinapiError),
}

pub type MemoryResult<T> = std::result::Result<T, MemoryError>;

/// Checks that `ptr` lies in committed, executable memory and returns how
/// many bytes remain until the end of the containing region.
pub fn executable_span(ptr: *const c_void) -> MemoryResult<usize> {
    let info = virtual_query(ptr)?;

    if info.state != MEM_COMMIT.0 {
        return Err(MemoryError::NotCommitted(ptr as usize));
    }

    let executable = PAGE_EXECUTE.0
        | PAGE_EXECUTE_READ.0
        | PAGE_EXECUTE_READWRITE.0
        | PAGE_EXECUTE_WRITECOPY.0;

    if info.protect.0 & executable == 0 {
        return Err(MemoryError::NotExecutable(ptr as usize));
    }

    let region_end = info.base_address as usize + info.region_size;

    Ok(region_end.saturating_sub(ptr as usize))
}
