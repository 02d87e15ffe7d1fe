//! Runtime detection of tcmalloc's `MallocExtension` interface.
//!
//! The extension is provided by the allocator, which may or may not be present in the process,
//! may be loaded by another component and may be loaded before or after this crate. Nothing here
//! links against it. Instead, the first request for the extension searches the process for its
//! `MallocExtension::instance()` entry point and caches the outcome for the process lifetime.
//!
//! ## Search order
//!
//! 1. Objects loaded after the one containing this crate (`RTLD_NEXT`).
//! 2. Every object in the process (`RTLD_DEFAULT`). This covers a provider that was loaded
//!    *before* this crate, e.g. via `LD_PRELOAD` when this crate lives in a `dlopen`ed library.
//!
//! A single `INFO` event is logged via `tracing` describing which tier, if any, succeeded. An
//! absent provider is a normal outcome and never an error.
//!
//! ## Overriding
//!
//! A binary that links the allocator statically can hand the entry point over directly with
//! [`set_instance_fn`], provided it does so before anything asks for the extension. The
//! registration then replaces the symbol search entirely.
//!
//! ## Notes
//!
//! A provider loaded after the search has run is never detected.

mod lookup;
mod resolver;
mod sample_parameter;

pub use lookup::{DlsymLookup, SearchScope, SymbolLookup};
pub use resolver::{Resolution, Resolver};
pub use sample_parameter::{
    check_sample_parameter, has_sample_parameter, parse_sample_parameter, SAMPLE_PARAMETER_ENV,
};

use std::ffi::CStr;
use std::marker::{PhantomData, PhantomPinned};
use std::ptr::NonNull;

/// Mangled name of `MallocExtension::instance()`. Providers must export exactly this symbol.
pub const INSTANCE_SYMBOL: &CStr = c"_ZN15MallocExtension8instanceEv";

/// Signature of the `MallocExtension::instance()` entry point.
pub type InstanceFn = unsafe extern "C" fn() -> *mut MallocExtension;

/// Opaque handle to the allocator's extension object. Owned by the provider.
#[repr(C)]
pub struct MallocExtension {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// Errors returned when registering an entry point.
#[derive(Debug, PartialEq)]
pub enum Error {
    /// The entry point was already resolved, with the given outcome.
    AlreadyResolved(Resolution),
}

static RESOLVER: Resolver<DlsymLookup> = Resolver::new(DlsymLookup);

impl MallocExtension {
    /// Returns the process' `MallocExtension`, or `None` if no provider could be found.
    ///
    /// The first call searches for the provider; all later calls reuse that result.
    pub fn instance() -> Option<NonNull<MallocExtension>> {
        RESOLVER.instance()
    }
}

/// Registers the entry point of a statically linked provider, bypassing the symbol search.
///
/// Returns `Error::AlreadyResolved` if the extension has already been requested or registered.
///
/// # Safety
///
/// `instance_fn` must be callable from any thread for the lifetime of the process and must return
/// null or a pointer to a live `MallocExtension`.
pub unsafe fn set_instance_fn(instance_fn: InstanceFn) -> Result<(), Error> {
    RESOLVER.register(instance_fn)
}

/// How the process-wide entry point was obtained. `Resolution::Unresolved` until first use.
pub fn resolution() -> Resolution {
    RESOLVER.resolution()
}

/// Returns `true` if a `MallocExtension` is available, i.e. tcmalloc's heap profiler can be used.
pub fn is_heap_profiler_enabled() -> bool {
    MallocExtension::instance().is_some()
}
