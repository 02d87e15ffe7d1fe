//! Discovery of exported symbols in the running process.
//!
//! ## Conditional Compilation
//!
//! On Linux and macOS the lookup is performed with `dlsym(3)` using the `RTLD_NEXT` and
//! `RTLD_DEFAULT` pseudo-handles. On every other target the lookup never finds anything, which
//! leaves the extension reported as absent.

use std::ffi::{c_void, CStr};
use std::ptr::NonNull;

/// Which loaded objects a lookup searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Objects loaded after the one performing the lookup (`RTLD_NEXT`).
    Next,
    /// Every object in the global scope of the process, in load order (`RTLD_DEFAULT`).
    Default,
}

/// Finds the address of a named symbol within a `SearchScope`.
///
/// Implementations report a missing symbol as `None`; there is no failure case.
pub trait SymbolLookup {
    fn lookup(&self, scope: SearchScope, symbol: &CStr) -> Option<NonNull<c_void>>;
}

/// Looks symbols up through the platform dynamic loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct DlsymLookup;

impl SymbolLookup for DlsymLookup {
    fn lookup(&self, scope: SearchScope, symbol: &CStr) -> Option<NonNull<c_void>> {
        interface::dlsym(scope, symbol)
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
mod interface {
    use super::SearchScope;
    use std::ffi::{c_void, CStr};
    use std::ptr::NonNull;

    pub fn dlsym(scope: SearchScope, symbol: &CStr) -> Option<NonNull<c_void>> {
        let handle = match scope {
            SearchScope::Next => libc::RTLD_NEXT,
            SearchScope::Default => libc::RTLD_DEFAULT,
        };
        // SAFETY: both handles are pseudo-handles understood by the loader and `symbol` is a
        // valid NUL-terminated string for the duration of the call.
        NonNull::new(unsafe { libc::dlsym(handle, symbol.as_ptr()) })
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod interface {
    use super::SearchScope;
    use std::ffi::{c_void, CStr};
    use std::ptr::NonNull;

    #[allow(clippy::unnecessary_wraps)]
    pub fn dlsym(_scope: SearchScope, _symbol: &CStr) -> Option<NonNull<c_void>> {
        None
    }
}
