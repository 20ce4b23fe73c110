//! The `CreateFontIndirectW` replacement.
//!
//! Runs on whichever thread GDI's caller uses. The context is written once
//! before the hook is installed and read-only afterwards, so the hot path
//! takes no locks beyond the hook slot's read lock and allocates nothing
//! past the lookup and the optional diagnostics line.

use std::sync::OnceLock;

use windows::Win32::Graphics::Gdi::{HFONT, LOGFONTW};

use librefont::hook::HookResult;
use librefont::hook::errors::HookError;
use librefont::hook::install::FnHookSlot;
use librefont::table::{FACE_NAME_CAP, SubstitutionTable};

pub type FnCreateFontIndirectW = unsafe extern "system" fn(*const LOGFONTW) -> HFONT;

const GDI_MODULE: &str = "gdi32.dll";
const TARGET_SYMBOL: &str = "CreateFontIndirectW";

/// Process-scoped state the interceptor reads on every call.
pub struct FontContext {
    pub table: SubstitutionTable,
    pub debug: bool,
}

static CONTEXT: OnceLock<FontContext> = OnceLock::new();
static CREATE_FONT_HOOK: FnHookSlot<FnCreateFontIndirectW> = FnHookSlot::new();

/// Stores the context and installs the hook. One-shot: a second call fails
/// with [`HookError::AlreadyInstalled`] before touching the target again.
pub fn install(context: FontContext) -> HookResult<()> {
    CONTEXT
        .set(context)
        .map_err(|_| HookError::AlreadyInstalled)?;

    unsafe {
        CREATE_FONT_HOOK.install_export(
            TARGET_SYMBOL,
            GDI_MODULE,
            TARGET_SYMBOL,
            create_font_indirect_w_detour,
        )
    }
}

pub fn is_installed() -> bool {
    CREATE_FONT_HOOK.is_installed()
}

fn face_name_for_log(face_name: &[u16; FACE_NAME_CAP]) -> String {
    let len = face_name
        .iter()
        .position(|&unit| unit == 0)
        .unwrap_or(FACE_NAME_CAP);

    // lossy on purpose: a bad surrogate must not block the call
    String::from_utf16_lossy(&face_name[..len])
}

unsafe extern "system" fn create_font_indirect_w_detour(lplf: *const LOGFONTW) -> HFONT {
    let original = match CREATE_FONT_HOOK.original() {
        Ok(original) => original,
        Err(err) => {
            // unreachable once install() succeeded; fail like GDI would
            // for an invalid request rather than unwind across the ABI
            log::error!("interceptor called with empty hook slot: {err}");
            return HFONT(std::ptr::null_mut());
        }
    };

    if lplf.is_null() {
        return unsafe { original(lplf) };
    }

    // Work on a copy: the caller handed us a *const and GDI only reads the
    // struct for the duration of the call.
    let mut logfont = unsafe { *lplf };

    if let Some(context) = CONTEXT.get() {
        if context.debug {
            log::debug!(
                target: "refont::intercept",
                "CreateFontIndirectW name=\"{}\" height={}",
                face_name_for_log(&logfont.lfFaceName),
                logfont.lfHeight
            );
        }

        if context
            .table
            .apply(&mut logfont.lfFaceName, &mut logfont.lfHeight)
            && context.debug
        {
            log::debug!(
                target: "refont::intercept",
                "substituted -> name=\"{}\" height={}",
                face_name_for_log(&logfont.lfFaceName),
                logfont.lfHeight
            );
        }
    }

    unsafe { original(&logfont) }
}
