//! Shared state between the orchestrator and the data handler.
//!
//! Register windows, the ring and the buffer need no locking. The one lock
//! on the data path is the critical section around [`Counters`]: on a
//! hosted target `critical-section`'s `std` implementation is a
//! process-wide mutex. It is held only to copy or bump the `(ok, total)`
//! pair, never across a register read or a buffer copy.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;

/// Cell with interior mutability guarded by a critical section.
///
/// Every access runs inside `critical_section::with`, so a reader always
/// sees a value no writer is halfway through updating.
pub struct CriticalSectionCell<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> CriticalSectionCell<T> {
    /// Create a new cell
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Run `f` with exclusive mutable access
    #[inline]
    pub fn with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        critical_section::with(|cs| {
            let mut value = self.inner.borrow_ref_mut(cs);
            f(&mut value)
        })
    }

    /// Run `f` with shared access
    #[inline]
    pub fn with_ref<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        critical_section::with(|cs| {
            let value = self.inner.borrow_ref(cs);
            f(&value)
        })
    }
}

impl<T: Copy> CriticalSectionCell<T> {
    /// Copy the current value out
    #[inline]
    pub fn get(&self) -> T {
        self.with_ref(|v| *v)
    }
}

impl<T: Default> Default for CriticalSectionCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Packet counters of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Packets that matched the expected pattern
    pub ok: u64,
    /// Packets observed
    pub total: u64,
}

impl Counters {
    /// Count one packet
    #[inline]
    pub fn record(&mut self, valid: bool) {
        self.total += 1;
        if valid {
            self.ok += 1;
        }
    }

    /// True if every observed packet was valid
    #[inline]
    pub fn all_ok(&self) -> bool {
        self.ok == self.total
    }
}

/// Cooperative stop request, one writer and any number of readers
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    /// A token nobody has triggered yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop
    #[inline]
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// True once a stop was requested
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
