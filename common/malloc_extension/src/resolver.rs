use crate::lookup::{SearchScope, SymbolLookup};
use crate::{Error, InstanceFn, MallocExtension, INSTANCE_SYMBOL};
use parking_lot::Once;
use std::ffi::c_void;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};
use tracing::info;

/// How the `MallocExtension::instance` entry point was obtained, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Resolution {
    /// No search or registration has completed yet.
    Unresolved = 0,
    /// Both search tiers came up empty.
    NotFound = 1,
    /// Found among the objects loaded after the caller.
    FoundNext = 2,
    /// Only found by searching every object in the process.
    FoundDefault = 3,
    /// Supplied through `Resolver::register` before the first search.
    Registered = 4,
}

impl Resolution {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Resolution::NotFound,
            2 => Resolution::FoundNext,
            3 => Resolution::FoundDefault,
            4 => Resolution::Registered,
            _ => Resolution::Unresolved,
        }
    }

    /// Returns `true` if an entry point is available.
    pub fn is_found(self) -> bool {
        matches!(
            self,
            Resolution::FoundNext | Resolution::FoundDefault | Resolution::Registered
        )
    }
}

/// Resolves the extension entry point at most once.
///
/// The first caller of `resolve` (or `register`) wins; every other caller blocks until it has
/// finished and then observes the same state for the rest of the resolver's lifetime. A provider
/// loaded after the search completed is never picked up.
pub struct Resolver<L> {
    lookup: L,
    once: Once,
    instance_fn: AtomicPtr<c_void>,
    resolution: AtomicU8,
}

impl<L> Resolver<L> {
    pub const fn new(lookup: L) -> Self {
        Self {
            lookup,
            once: Once::new(),
            instance_fn: AtomicPtr::new(ptr::null_mut()),
            resolution: AtomicU8::new(Resolution::Unresolved as u8),
        }
    }

    /// The outcome so far. Does not trigger a search.
    pub fn resolution(&self) -> Resolution {
        Resolution::from_u8(self.resolution.load(Ordering::Acquire))
    }

    /// The cached entry point. Does not trigger a search.
    pub fn instance_fn(&self) -> Option<InstanceFn> {
        let addr = self.instance_fn.load(Ordering::Acquire);
        if addr.is_null() {
            return None;
        }
        // SAFETY: only `store` writes this field, and it is always given the address of an
        // `InstanceFn`.
        Some(unsafe { std::mem::transmute::<*mut c_void, InstanceFn>(addr) })
    }

    fn store(&self, addr: Option<NonNull<c_void>>, resolution: Resolution) {
        let addr = addr.map_or(ptr::null_mut(), NonNull::as_ptr);
        self.instance_fn.store(addr, Ordering::Release);
        self.resolution.store(resolution as u8, Ordering::Release);
    }

    /// Installs `instance_fn` as the entry point, taking precedence over any symbol the loader
    /// could find.
    ///
    /// Fails without changing anything if a search or registration already happened.
    ///
    /// # Safety
    ///
    /// `instance_fn` must be sound to call from any thread at any time for the remainder of the
    /// resolver's lifetime, and must return either null or a pointer to a live `MallocExtension`
    /// owned by the provider.
    pub unsafe fn register(&self, instance_fn: InstanceFn) -> Result<(), Error> {
        let mut registered = false;
        self.once.call_once(|| {
            self.store(
                NonNull::new(instance_fn as *mut c_void),
                Resolution::Registered,
            );
            registered = true;
        });

        if registered {
            info!(
                symbol = ?INSTANCE_SYMBOL,
                "MallocExtension entry point registered, skipping symbol search"
            );
            Ok(())
        } else {
            Err(Error::AlreadyResolved(self.resolution()))
        }
    }
}

impl<L: SymbolLookup> Resolver<L> {
    /// Runs the symbol search unless it, or a registration, has already happened.
    pub fn resolve(&self) {
        self.once.call_once(|| {
            let (addr, resolution) = self.search();
            self.store(addr, resolution);
        });
    }

    /// Calls the resolved entry point, resolving first if needed.
    ///
    /// Returns `None` when no entry point exists or it returned null. No lock is held while the
    /// entry point runs.
    pub fn instance(&self) -> Option<NonNull<MallocExtension>> {
        self.resolve();
        let instance_fn = self.instance_fn()?;
        // SAFETY: the entry point was either exported under the `MallocExtension::instance`
        // mangled name, which takes no arguments and returns a pointer, or was registered by a
        // caller that upheld the contract of `register`.
        NonNull::new(unsafe { instance_fn() })
    }

    fn search(&self) -> (Option<NonNull<c_void>>, Resolution) {
        if let Some(addr) = self.lookup.lookup(SearchScope::Next, INSTANCE_SYMBOL) {
            info!(
                symbol = ?INSTANCE_SYMBOL,
                "MallocExtension symbol found with RTLD_NEXT"
            );
            return (Some(addr), Resolution::FoundNext);
        }

        // The first tier only covers objects loaded after this one. A provider that was loaded
        // earlier (e.g. through `LD_PRELOAD` while this code lives in a `dlopen`ed library) is
        // only visible to the global search.
        let addr = self.lookup.lookup(SearchScope::Default, INSTANCE_SYMBOL);
        info!(
            symbol = ?INSTANCE_SYMBOL,
            found = addr.is_some(),
            "MallocExtension symbol is not found with RTLD_NEXT, and {} found with RTLD_DEFAULT",
            if addr.is_some() { "is" } else { "not" }
        );

        match addr {
            Some(addr) => (Some(addr), Resolution::FoundDefault),
            None => (None, Resolution::NotFound),
        }
    }
}
