//! Internal Implementation Details
//!
//! This module contains implementation details that are not part of the public API.
//! Types in this module may change without notice between minor versions.
//!
//! # Contents
//!
//! - [`mmap`]: Owned `mmap` window with volatile word access
//! - [`sysfs`]: Text attribute parsing and device node opening
//!
//! # Stability
//!
//! **WARNING:** This module is `pub(crate)` only. Do not depend on any types
//! or functions in this module from external code.

pub(crate) mod mmap;
pub(crate) mod sysfs;
