//! Thin result-returning wrappers over the WinAPI calls the engine needs.
//!
//! Everything else in the crate treats addresses as opaque; this module is
//! the only place raw OS calls happen.

use std::ffi::{CString, NulError, OsStr};
use std::os::windows::ffi::OsStrExt;
use std::ptr::NonNull;

use libc::c_void;
use thiserror::Error;
use windows::Win32::Foundation::{GetLastError, HMODULE};
use windows::Win32::System::Diagnostics::Debug::FlushInstructionCache;
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};
use windows::Win32::System::Memory::{
    MEM_COMMIT, MEM_RESERVE, MEMORY_BASIC_INFORMATION, PAGE_EXECUTE_READWRITE,
    PAGE_PROTECTION_FLAGS, VirtualAlloc, VirtualProtect, VirtualQuery,
};
use windows::Win32::System::Threading::GetCurrentProcess;
use windows::Win32::UI::WindowsAndMessaging::{MB_ICONERROR, MB_OK, MessageBoxW};
use windows::core::{PCSTR, PCWSTR};

#[derive(Debug, Error)]
pub enum WinapiError {
    #[error("windows core API error: {0}")]
    WindowsCore(#[from] windows::core::Error),

    #[error("input pointer is NULL")]
    InputNullPtr,

    #[error("size must not be zero")]
    ZeroSize,

    #[error("proc address is NULL for export `{0}`")]
    ProcAddressIsNull(String),

    #[error("VirtualQuery failed with error code {0}")]
    VirtualQueryFailed(u32),

    #[error("VirtualAlloc returned NULL")]
    AllocFailed,

    #[error("interior NUL byte in string: {0}")]
    NulError(#[from] NulError),
}

pub type WinapiResult<T> = std::result::Result<T, WinapiError>;

/// Non-null module handle.
#[derive(Debug)]
pub struct HModule {
    ptr: NonNull<c_void>,
}

// Safety: a module handle is just the module base address, valid process-wide.
unsafe impl Send for HModule {}
unsafe impl Sync for HModule {}

impl HModule {
    /// # Safety
    /// `ptr` must be a module base returned by the loader.
    pub unsafe fn new(ptr: *mut c_void) -> WinapiResult<Self> {
        let ptr = NonNull::new(ptr).ok_or(WinapiError::InputNullPtr)?;
        Ok(Self { ptr })
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr()
    }
}

impl From<&HModule> for HMODULE {
    fn from(value: &HModule) -> Self {
        HMODULE(value.as_ptr())
    }
}

impl TryFrom<HMODULE> for HModule {
    type Error = WinapiError;

    fn try_from(value: HMODULE) -> Result<Self, Self::Error> {
        unsafe { HModule::new(value.0) }
    }
}

/// Owned string that can hand out both ANSI and wide WinAPI views.
///
/// The backing buffers live as long as the `WinString`, so the PCSTR/PCWSTR
/// pointers handed to a closure are valid for the whole call.
#[derive(Debug)]
pub struct WinString {
    ansi: CString,
    wide: Vec<u16>,
}

impl WinString {
    pub fn new(input: &str) -> WinapiResult<Self> {
        let wide: Vec<u16> = OsStr::new(input)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        Ok(Self {
            ansi: CString::new(input)?,
            wide,
        })
    }

    pub fn with_pcstr<F, R>(&self, f: F) -> R
    where
        F: FnOnce(PCSTR) -> R,
    {
        f(PCSTR::from_raw(self.ansi.as_ptr() as *const u8))
    }

    pub fn with_pcwstr<F, R>(&self, f: F) -> R
    where
        F: FnOnce(PCWSTR) -> R,
    {
        f(PCWSTR::from_raw(self.wide.as_ptr()))
    }
}

/// WinAPI: GetModuleHandleW for an already-loaded module.
pub fn get_module_handle(module_name: &str) -> WinapiResult<HModule> {
    let name = WinString::new(module_name)?;

    let hmodule = name.with_pcwstr(|lpmodulename| unsafe { GetModuleHandleW(lpmodulename) })?;

    hmodule.try_into()
}

/// WinAPI: GetProcAddress.
pub fn get_proc_address(module: &HModule, export_name: &str) -> WinapiResult<*mut c_void> {
    let name = WinString::new(export_name)?;

    let proc = name.with_pcstr(|lpprocname| unsafe { GetProcAddress(module.into(), lpprocname) });

    match proc {
        Some(farproc) => Ok(farproc as *mut c_void),
        None => Err(WinapiError::ProcAddressIsNull(export_name.to_string())),
    }
}

/// Committed RWX allocation, optionally at a preferred base.
pub fn virtual_alloc_rwx(preferred: Option<*const c_void>, size: usize) -> WinapiResult<*mut c_void> {
    if size == 0 {
        return Err(WinapiError::ZeroSize);
    }

    let ptr = unsafe {
        VirtualAlloc(
            preferred,
            size,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_EXECUTE_READWRITE,
        )
    };

    if ptr.is_null() {
        return Err(WinapiError::AllocFailed);
    }

    Ok(ptr)
}

/// WinAPI: VirtualProtect. Returns the previous protection.
pub fn virtual_protect(
    ptr: *mut c_void,
    protection: PAGE_PROTECTION_FLAGS,
    size: usize,
) -> WinapiResult<PAGE_PROTECTION_FLAGS> {
    if ptr.is_null() {
        return Err(WinapiError::InputNullPtr);
    }

    if size == 0 {
        return Err(WinapiError::ZeroSize);
    }

    let mut old_protect = PAGE_PROTECTION_FLAGS(0);

    unsafe { VirtualProtect(ptr, size, protection, &mut old_protect)? }

    Ok(old_protect)
}

/// Runs `func` with the protection of `[ptr, ptr+size)` changed to
/// `protection`, then restores the previous protection.
///
/// A failed restore leaves the page more permissive than before but the
/// written bytes intact, so it is logged rather than propagated.
///
/// # Safety
/// The closure may write to the now-writable region; the caller owns the
/// usual self-modifying-code obligations (whole instructions, cache flush).
pub unsafe fn with_virtual_protect<T, F: FnOnce() -> T>(
    ptr: *mut c_void,
    protection: PAGE_PROTECTION_FLAGS,
    size: usize,
    func: F,
) -> WinapiResult<T> {
    let old_protect = virtual_protect(ptr, protection, size)?;

    let result = func();

    if let Err(err) = virtual_protect(ptr, old_protect, size) {
        log::warn!(
            "failed to restore page protection at {:p} ({} bytes): {}",
            ptr,
            size,
            err
        );
    }

    Ok(result)
}

/// Queried state of the region containing an address.
pub struct RegionInfo {
    pub base_address: *mut c_void,
    pub region_size: usize,
    pub state: u32,
    pub protect: PAGE_PROTECTION_FLAGS,
}

/// WinAPI: VirtualQuery.
pub fn virtual_query(ptr: *const c_void) -> WinapiResult<RegionInfo> {
    if ptr.is_null() {
        return Err(WinapiError::InputNullPtr);
    }

    let mut info: MEMORY_BASIC_INFORMATION = unsafe { std::mem::zeroed() };

    let written = unsafe {
        VirtualQuery(
            Some(ptr),
            &mut info,
            std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
        )
    };

    if written == 0 {
        let last_error = unsafe { GetLastError().0 };
        return Err(WinapiError::VirtualQueryFailed(last_error));
    }

    Ok(RegionInfo {
        base_address: info.BaseAddress,
        region_size: info.RegionSize,
        state: info.State.0,
        protect: info.Protect,
    })
}

/// WinAPI: FlushInstructionCache for the current process.
pub fn flush_instruction_cache(base: *const c_void, size: usize) -> WinapiResult<()> {
    if base.is_null() {
        return Err(WinapiError::InputNullPtr);
    }

    unsafe {
        FlushInstructionCache(GetCurrentProcess(), Some(base), size)?;
    }

    Ok(())
}

/// Blocking error dialog; used exactly once, for initialization failures.
pub fn message_box_error(caption: &str, text: &str) {
    let Ok(caption) = WinString::new(caption) else {
        return;
    };
    let Ok(text) = WinString::new(text) else {
        return;
    };

    caption.with_pcwstr(|lpcaption| {
        text.with_pcwstr(|lptext| unsafe {
            MessageBoxW(None, lptext, lpcaption, MB_OK | MB_ICONERROR);
        })
    });
}
