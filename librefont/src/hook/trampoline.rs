//! Executable stub that re-runs the stolen prologue and resumes the
//! original function.
//!
//! Layout: relocated prologue instructions, a jump back to
//! `target + prologue_len`, then `int3` padding. The allocation is made as
//! close to the target as possible so a 5-byte relative jump suffices for
//! the way back, and it is never freed: exactly one trampoline exists per
//! hooked function for the rest of the process lifetime.

use libc::c_void;

use crate::arch::{MAX_INSTRUCTION_LEN, MAX_JUMP_LEN};
use crate::hook::HookResult;
use crate::hook::errors::HookError;
use crate::hook::prologue::Prologue;
use crate::hook::thunk;
use crate::os::windows::memory::executable_span;
use crate::os::windows::winapi::{flush_instruction_cache, virtual_alloc_rwx};

const INT3: u8 = 0xCC;
const TAIL_PADDING: usize = 16;

pub struct Trampoline {
    entry: *mut c_void,
    prologue: Prologue,
}

// Safety: the stub is immutable once built and callable from any thread;
// whatever concurrency contract the original function had is unchanged.
unsafe impl Send for Trampoline {}
unsafe impl Sync for Trampoline {}

impl Trampoline {
    /// Builds the stub for `target`, where the patch that will later be
    /// written is a jump to `detour`.
    ///
    /// Fails before any target byte is touched; on error the target is
    /// bit-for-bit unchanged.
    pub fn build(target: *mut c_void, detour: *mut c_void) -> HookResult<Self> {
        let available = executable_span(target)?;

        let patch_len = thunk::jump_len(target as usize, detour as usize);
        if available < patch_len {
            return Err(HookError::FunctionTooSmall {
                available,
                needed: patch_len,
            });
        }

        // Slack past the patch width so the decoder can finish a straddling
        // instruction, clamped to the region so we never read off its end.
        let scan_len = (patch_len + MAX_INSTRUCTION_LEN).min(available);
        let code = unsafe { std::slice::from_raw_parts(target as *const u8, scan_len) };

        let prologue = Prologue::decode(code, target as u64, patch_len)?;

        log::debug!(
            "captured {} prologue bytes at {:p} for a {} byte patch",
            prologue.len(),
            target,
            patch_len
        );

        let stub_size = prologue.len() + MAX_JUMP_LEN + TAIL_PADDING;
        let entry = allocate_near(target, stub_size)?;

        let relocated = prologue.relocate(entry as u64)?;

        let resume_at = unsafe { target.add(prologue.len()) };
        let jump_back_at = unsafe { entry.add(relocated.len()) };
        let jump_back = thunk::encode_jump(jump_back_at as usize, resume_at as usize)?;

        unsafe {
            std::ptr::copy_nonoverlapping(relocated.as_ptr(), entry as *mut u8, relocated.len());
            std::ptr::copy_nonoverlapping(
                jump_back.as_ptr(),
                jump_back_at as *mut u8,
                jump_back.len(),
            );

            let used = relocated.len() + jump_back.len();
            if used < stub_size {
                std::ptr::write_bytes(entry.add(used) as *mut u8, INT3, stub_size - used);
            }
        }

        flush_instruction_cache(entry, stub_size)?;

        log::debug!("trampoline for {:p} ready at {:p}", target, entry);

        Ok(Self { entry, prologue })
    }

    /// Callable entry with the same ABI as the original function.
    pub fn entry(&self) -> *mut c_void {
        self.entry
    }

    pub fn prologue(&self) -> &Prologue {
        &self.prologue
    }
}

// Intentionally no Drop: the stub must outlive every caller that might be
// executing the original function, which means the process itself.

/// Allocates RWX memory near `target` so the jump back stays in rel32
/// range. Walks outward with exponentially growing distance on both sides,
/// falling back to an arbitrary address.
fn allocate_near(target: *mut c_void, size: usize) -> HookResult<*mut c_void> {
    #[cfg(not(target_arch = "x86"))]
    {
        const ALIGNMENT: usize = 0x10000;
        const MAX_ATTEMPTS: u32 = 20;

        let target_addr = target as usize;
        let mut distance = 0x1000usize;

        for _ in 0..MAX_ATTEMPTS {
            for candidate in [
                target_addr.checked_sub(distance),
                target_addr.checked_add(distance),
            ]
            .into_iter()
            .flatten()
            {
                let aligned = (candidate / ALIGNMENT) * ALIGNMENT;
                if aligned == 0 {
                    continue;
                }

                if let Ok(ptr) = virtual_alloc_rwx(Some(aligned as *const c_void), size) {
                    log::trace!("trampoline memory at {:p}, target {:p}", ptr, target);
                    return Ok(ptr);
                }
            }

            distance = distance.saturating_mul(2).min(0x4000_0000);
        }
    }

    // On x86 every address is in rel32 range anyway.
    let ptr = virtual_alloc_rwx(None, size)?;
    log::trace!("trampoline memory at {:p}, target {:p}", ptr, target);
    Ok(ptr)
}
