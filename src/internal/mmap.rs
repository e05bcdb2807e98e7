//! Owned shared mappings of device files.

use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use log::trace;

use crate::error::ResourceError;

#[cfg(test)]
thread_local! {
    /// Number of `munmap` calls issued on the current thread.
    pub(crate) static UNMAP_COUNT: core::cell::Cell<usize> = const { core::cell::Cell::new(0) };
}

fn page_size() -> u64 {
    // SAFETY: sysconf has no memory safety preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as u64 } else { 4096 }
}

/// A `MAP_SHARED` read/write mapping of `len` bytes starting at `offset`
/// of a file.
///
/// The offset does not have to be page aligned; the mapping is widened
/// down to the page boundary and all accessors are relative to `offset`.
/// The mapping is released exactly once, on drop.
pub(crate) struct MappedRegion {
    base: NonNull<u8>,
    map_len: usize,
    data_offset: usize,
    len: usize,
    path: PathBuf,
}

// SAFETY: the mapping is process-wide shared memory. Word accessors are
// volatile and bulk copies never hand out references into the mapping.
unsafe impl Send for MappedRegion {}
// SAFETY: see above; no interior state besides the mapped bytes.
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// Map `len` bytes of `file` starting at byte `offset`.
    pub(crate) fn map(
        file: &File,
        path: &Path,
        offset: u64,
        len: usize,
    ) -> Result<Self, ResourceError> {
        let page = page_size();
        let aligned = offset - offset % page;
        let data_offset = (offset - aligned) as usize;
        let map_len = len + data_offset;

        // SAFETY: a null hint lets the kernel choose the address; the file
        // descriptor stays valid for the duration of the call.
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                aligned as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(ResourceError::MapFailed {
                path: path.to_path_buf(),
                source: std::io::Error::last_os_error(),
            });
        }
        let base = NonNull::new(ptr.cast::<u8>()).ok_or_else(|| ResourceError::MapFailed {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::AddrNotAvailable),
        })?;
        trace!(
            "mmap {}: offset={offset:#x} len={len:#x} at {:p}",
            path.display(),
            base.as_ptr()
        );

        Ok(Self {
            base,
            map_len,
            data_offset,
            len,
            path: path.to_path_buf(),
        })
    }

    /// Usable length in bytes (excluding page alignment slack)
    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    fn word_ptr(&self, offset: usize) -> *mut u32 {
        assert!(
            offset % 4 == 0 && offset + 4 <= self.len,
            "register offset {offset:#x} outside {:#x}-byte window",
            self.len
        );
        // SAFETY: bounds checked above; the mapping is at least
        // data_offset + len bytes long.
        unsafe { self.base.as_ptr().add(self.data_offset + offset).cast::<u32>() }
    }

    /// Volatile 32-bit read at `offset`.
    #[inline(always)]
    pub(crate) fn read32(&self, offset: usize) -> u32 {
        // SAFETY: word_ptr returns an aligned in-bounds pointer.
        unsafe { core::ptr::read_volatile(self.word_ptr(offset)) }
    }

    /// Volatile 32-bit write at `offset`.
    #[inline(always)]
    pub(crate) fn write32(&self, offset: usize, value: u32) {
        // SAFETY: word_ptr returns an aligned in-bounds pointer.
        unsafe { core::ptr::write_volatile(self.word_ptr(offset), value) }
    }

    /// Copy `out.len()` bytes starting at `offset` into `out`.
    pub(crate) fn read_bytes(&self, offset: usize, out: &mut [u8]) {
        assert!(offset + out.len() <= self.len, "copy outside mapping");
        // SAFETY: source range checked above and cannot overlap `out`,
        // which is ordinary process memory.
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.base.as_ptr().add(self.data_offset + offset),
                out.as_mut_ptr(),
                out.len(),
            );
        }
    }

    /// Copy `data` into the mapping starting at `offset`.
    pub(crate) fn write_bytes(&self, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= self.len, "copy outside mapping");
        // SAFETY: destination range checked above.
        unsafe {
            core::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.base.as_ptr().add(self.data_offset + offset),
                data.len(),
            );
        }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: base/map_len are exactly what mmap returned and the
        // mapping is not used after this point.
        let rc = unsafe { libc::munmap(self.base.as_ptr().cast(), self.map_len) };
        if rc != 0 {
            log::warn!(
                "munmap {} failed: {}",
                self.path.display(),
                std::io::Error::last_os_error()
            );
        }
        #[cfg(test)]
        UNMAP_COUNT.with(|c| c.set(c.get() + 1));
    }
}

impl core::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("path", &self.path)
            .field("base", &self.base)
            .field("len", &self.len)
            .finish()
    }
}
