//! Patch installation.
//!
//! This module owns the only code path that writes to the target function.
//! Everything before the write (`Trampoline::build`, jump encoding) is
//! fallible with no side effects; once the write starts the patch is
//! completed, the protection restore being the single best-effort step.
//!
//! Hooks are install-only. Unpatching a function other threads may be
//! executing is riskier than leaving the redirect in place, so a hook,
//! once installed, lives for the rest of the process.

use std::ptr::NonNull;
use std::sync::atomic::{Ordering, fence};

use libc::c_void;
use parking_lot::RwLock;
use windows::Win32::System::Memory::PAGE_EXECUTE_READWRITE;

use crate::fnptr::FnPtr;
use crate::hook::HookResult;
use crate::hook::errors::HookError;
use crate::hook::thunk;
use crate::hook::trampoline::Trampoline;
use crate::os::windows::winapi::{
    WinapiError, flush_instruction_cache, get_module_handle, get_proc_address,
    with_virtual_protect,
};

/// Everything the installer changed or saved, kept for the hook's lifetime.
pub struct PatchRecord {
    target: NonNull<c_void>,
    saved_prologue: Vec<u8>,
    trampoline: *mut c_void,
}

impl PatchRecord {
    /// Entry point of the patched function.
    pub fn target_address(&self) -> *mut c_void {
        self.target.as_ptr()
    }

    /// Original entry bytes, captured before the first write.
    pub fn saved_prologue(&self) -> &[u8] {
        &self.saved_prologue
    }

    /// Entry of the stub that still reaches the original behavior.
    pub fn trampoline_address(&self) -> *mut c_void {
        self.trampoline
    }
}

/// An installed inline hook on a function with signature `F`.
pub struct FnHook<F: Copy + 'static> {
    name: String,
    record: PatchRecord,
    original: FnPtr<F>,
    // keeps the stub allocation reachable for debugging/inspection
    _trampoline: Trampoline,
}

// Safety: all fields are immutable after install; calling `original` is as
// thread-safe as the original function was.
unsafe impl<F: Copy + 'static> Send for FnHook<F> {}
unsafe impl<F: Copy + 'static> Sync for FnHook<F> {}

impl<F: Copy + 'static> FnHook<F> {
    /// Resolves `symbol` in the already-loaded `module` and installs the
    /// hook on it.
    ///
    /// # Safety
    /// `F` must match the export's calling convention and parameter layout
    /// exactly, and `detour` must uphold the original's ABI contract.
    pub unsafe fn install_export(
        name: impl Into<String>,
        module: &str,
        symbol: &str,
        detour: F,
    ) -> HookResult<Self> {
        let target = resolve_export(module, symbol)?;

        unsafe { Self::install(name, target, detour) }
    }

    /// Installs the hook on `target`.
    ///
    /// Trampoline construction happens first and aborts with the target
    /// untouched on any failure; only then is the jump patch written under
    /// a temporary RWX window.
    ///
    /// # Safety
    /// Same contract as [`FnHook::install_export`], plus `target` must be
    /// the entry point of a function no other code is concurrently
    /// patching. Installation must happen before the symbol is called from
    /// other threads, or a caller could observe a half-written patch.
    pub unsafe fn install(
        name: impl Into<String>,
        target: *mut c_void,
        detour: F,
    ) -> HookResult<Self> {
        let name = name.into();
        let target = NonNull::new(target).ok_or(HookError::TargetIsNull)?;

        let detour = unsafe { FnPtr::from_fn(detour) }?;
        let detour_addr = detour.as_raw_ptr();

        // Fail-before-mutate: everything up to the protect+write below
        // leaves the target byte-identical.
        let trampoline = Trampoline::build(target.as_ptr(), detour_addr)?;

        let patch = thunk::encode_jump(target.as_ptr() as usize, detour_addr as usize)?;

        log::debug!(
            "[{}] patching {:p} -> {:p} ({} bytes)",
            name,
            target,
            detour_addr,
            patch.len()
        );

        unsafe {
            with_virtual_protect(
                target.as_ptr(),
                PAGE_EXECUTE_READWRITE,
                patch.len(),
                || {
                    // First byte last-written-first-visible does not hold on
                    // x86 for multi-byte writes; the volatile first-byte
                    // write plus the fence below keeps the window where a
                    // torn patch is observable as small as the design allows.
                    std::ptr::write_volatile(target.as_ptr() as *mut u8, patch[0]);
                    std::ptr::copy_nonoverlapping(
                        patch[1..].as_ptr(),
                        (target.as_ptr() as *mut u8).add(1),
                        patch.len() - 1,
                    );
                },
            )
            .map_err(HookError::MemoryProtection)?;
        }

        fence(Ordering::Release);
        flush_instruction_cache(target.as_ptr(), patch.len())?;
        fence(Ordering::SeqCst);

        let original = unsafe { FnPtr::from_raw(trampoline.entry()) }?;

        let record = PatchRecord {
            target,
            saved_prologue: trampoline.prologue().bytes().to_vec(),
            trampoline: trampoline.entry(),
        };

        log::info!(
            "[{}] hook installed at {:p}, original reachable via {:p}",
            name,
            record.target_address(),
            record.trampoline_address()
        );

        Ok(Self {
            name,
            record,
            original,
            _trampoline: trampoline,
        })
    }

    /// Typed handle to the unmodified original implementation.
    pub fn original(&self) -> F {
        // Safety: `original` was built from the trampoline entry whose ABI
        // matches F by the install contract.
        unsafe { self.original.as_fn() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record(&self) -> &PatchRecord {
        &self.record
    }
}

fn resolve_export(module: &str, symbol: &str) -> HookResult<*mut c_void> {
    let handle = get_module_handle(module).map_err(|err| match err {
        WinapiError::InputNullPtr | WinapiError::WindowsCore(_) => HookError::SymbolNotFound {
            module: module.to_string(),
            symbol: symbol.to_string(),
        },
        other => HookError::Winapi(other),
    })?;

    get_proc_address(&handle, symbol).map_err(|err| match err {
        WinapiError::ProcAddressIsNull(_) => HookError::SymbolNotFound {
            module: module.to_string(),
            symbol: symbol.to_string(),
        },
        other => HookError::Winapi(other),
    })
}

/// Static-friendly slot holding at most one installed hook.
///
/// Installing twice on the same target would redirect into the first
/// pass's detour instead of the true original, so the slot rejects a
/// second install outright.
pub struct FnHookSlot<F: Copy + 'static> {
    inner: RwLock<Option<FnHook<F>>>,
}

impl<F: Copy + 'static> FnHookSlot<F> {
    pub const fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// One-shot install; see [`FnHook::install_export`] for the contract.
    ///
    /// # Safety
    /// Same as [`FnHook::install_export`].
    pub unsafe fn install_export(
        &self,
        name: &str,
        module: &str,
        symbol: &str,
        detour: F,
    ) -> HookResult<()> {
        let mut slot = self.inner.write();

        if slot.is_some() {
            return Err(HookError::AlreadyInstalled);
        }

        let hook = unsafe { FnHook::install_export(name, module, symbol, detour) }?;
        *slot = Some(hook);

        Ok(())
    }

    /// The original implementation, if a hook is installed.
    pub fn original(&self) -> HookResult<F> {
        let slot = self.inner.read();

        match slot.as_ref() {
            Some(hook) => Ok(hook.original()),
            None => Err(HookError::NotInstalled),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.inner.read().is_some()
    }
}

impl<F: Copy + 'static> Default for FnHookSlot<F> {
    fn default() -> Self {
        Self::new()
    }
}
