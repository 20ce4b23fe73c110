//! DLL entry point.
//!
//! Attach order matters: logger first so every later failure is visible,
//! then settings (a malformed file vetoes the attach - running with an
//! unknown substitution state is worse than not loading), then the hook.
//! A missing export only disables interception; the host keeps running.
//!
//! Detach does nothing to the hook on purpose. Unpatching code that other
//! threads may be executing is out of scope; the redirect stays for the
//! process's remaining lifetime.

use std::ffi::c_void;
use std::path::PathBuf;

use anyhow::Context;
use windows::Win32::Foundation::{HINSTANCE, HMODULE, MAX_PATH};
use windows::Win32::System::LibraryLoader::{DisableThreadLibraryCalls, GetModuleFileNameW};
use windows::Win32::System::SystemServices::{DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH};
use windows::core::BOOL;

use librefont::hook::errors::HookError;
use librefont::os::windows::winapi::message_box_error;

use crate::interceptor::{self, FontContext};
use crate::logger::GlobalLogger;
use crate::settings::Settings;

const SETTINGS_FILE: &str = "refont.json";
const LOG_FILE: &str = "refont.log";

#[unsafe(no_mangle)]
#[allow(non_snake_case)]
pub extern "system" fn DllMain(hmodule: HINSTANCE, reason: u32, _reserved: *mut c_void) -> BOOL {
    let ok = match reason {
        DLL_PROCESS_ATTACH => match attach(hmodule) {
            Ok(()) => true,
            Err(err) => {
                log::error!("attach vetoed: {err:?}");
                message_box_error("refont", &format!("Error loading {SETTINGS_FILE}: {err}"));
                false
            }
        },
        DLL_PROCESS_DETACH => {
            detach();
            true
        }
        _ => true,
    };

    BOOL::from(ok)
}

/// Initialization; an `Err` tells the loader to abort the attach entirely.
fn attach(hmodule: HINSTANCE) -> anyhow::Result<()> {
    let _ = unsafe { DisableThreadLibraryCalls(HMODULE(hmodule.0)) };

    let dir = module_directory(hmodule).context("resolving module directory")?;

    GlobalLogger::init(&dir.join(LOG_FILE));
    log::info!("process attach, module directory {}", dir.display());

    // ConfigInvalid is the one fatal case: unreadable or malformed settings
    // veto the attach instead of silently passing every font through.
    let settings = Settings::load_or_bootstrap(&dir.join(SETTINGS_FILE))
        .with_context(|| format!("loading {SETTINGS_FILE}"))?;

    if settings.debug {
        GlobalLogger::enable_debug();
    }

    let table = settings.build_table();
    log::info!(
        "{} substitution rule(s) loaded, debug={}",
        table.len(),
        settings.debug
    );

    let context = FontContext {
        table,
        debug: settings.debug,
    };

    match interceptor::install(context) {
        Ok(()) => {
            log::info!("CreateFontIndirectW interception active");
        }
        Err(err @ HookError::SymbolNotFound { .. }) => {
            // wrong gdi32 version: keep running, just without interception
            log::error!("{err}; continuing without interception");
        }
        Err(err) => {
            // trampoline/protection failures abort before any byte was
            // written, so the original function is still intact
            log::error!("hook installation failed, target untouched: {err}");
        }
    }

    Ok(())
}

fn detach() {
    if interceptor::is_installed() {
        log::info!("process detach; hook left installed by design");
    } else {
        log::info!("process detach");
    }
}

fn module_directory(hmodule: HINSTANCE) -> anyhow::Result<PathBuf> {
    use std::os::windows::ffi::OsStringExt;

    let mut buffer = [0u16; MAX_PATH as usize];
    let written = unsafe { GetModuleFileNameW(Some(HMODULE(hmodule.0)), &mut buffer) } as usize;

    if written == 0 {
        anyhow::bail!("GetModuleFileNameW failed");
    }

    let path = PathBuf::from(std::ffi::OsString::from_wide(&buffer[..written]));

    path.parent()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("module path {} has no parent", path.display()))
}
