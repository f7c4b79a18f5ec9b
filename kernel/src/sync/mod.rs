//! Synchronization primitives.
//!
//! This is a single-CPU kernel whose only concurrency comes from
//! interrupts, so `spin::Mutex`/`spin::RwLock` (used throughout
//! `process`, `fs`, and `mm`) are the only primitives needed. This
//! module just re-exports them under the kernel's own names so callers
//! don't depend on `spin` directly.

pub use spin::{Mutex, MutexGuard, Once, RwLock, RwLockReadGuard, RwLockWriteGuard};
