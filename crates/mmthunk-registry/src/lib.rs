//! Callback registry standing in for generated 16-bit thunks
//!
//! This module handles:
//! - Handing out stable callable addresses for 16-bit callback targets
//! - Reverse lookup from a callable address back to its record
//! - Releasing records one by one or by owner (session close)
//!
//! A record never holds machine code. Its callable address is a synthetic
//! value `base + 16 * slot` that the native side stores and later passes
//! back to a dispatcher, which resolves it here.

use mmthunk_common::ThunkConfig;
use mmthunk_segment::SegPtr;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Spacing between consecutive callable addresses
pub const SLOT_STRIDE: u32 = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Thunk pool exhausted ({capacity} records in use)")]
    Exhausted { capacity: usize },

    #[error("Out of memory while sizing the thunk pool")]
    OutOfMemory,

    #[error("Refusing to register a null callback target")]
    NullTarget,

    #[error("No record at callable address {0}")]
    NotFound(ThunkAddr),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Callable address handed to the native side in place of a function pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThunkAddr(pub u32);

impl std::fmt::Display for ThunkAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Runs 16-bit code on behalf of a dispatcher
pub trait Callback16: Send + Sync {
    /// Call `target` with `args` pushed in Pascal order (first argument
    /// pushed first); returns DX:AX
    fn call16(&self, target: SegPtr, args: &[u16]) -> u32;
}

/// One claimed slot: who owns it and where calls through it go
#[derive(Debug, Clone)]
pub struct ThunkRecord<C> {
    index: usize,
    addr: ThunkAddr,
    target: SegPtr,
    context: C,
    user_data: u32,
}

impl<C> ThunkRecord<C> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// The record's own callable address, which doubles as its handle
    pub fn addr(&self) -> ThunkAddr {
        self.addr
    }

    /// 16-bit procedure invoked through this record
    pub fn target(&self) -> SegPtr {
        self.target
    }

    /// Session owning the record
    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn user_data(&self) -> u32 {
        self.user_data
    }
}

struct Pool<C> {
    slots: Vec<Option<Arc<ThunkRecord<C>>>>,
    free: BTreeSet<usize>,
}

impl<C> Pool<C> {
    fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    fn grow_to(&mut self, capacity: usize) -> Result<()> {
        let old = self.slots.len();
        if capacity <= old {
            return Ok(());
        }
        self.slots
            .try_reserve_exact(capacity - old)
            .map_err(|_| RegistryError::OutOfMemory)?;
        self.slots.resize_with(capacity, || None);
        self.free.extend(old..capacity);
        Ok(())
    }
}

/// Process-wide table of callback records
///
/// The pool is created lazily on first allocation. Records are shared as
/// `Arc` snapshots, so a dispatcher keeps a consistent view even if another
/// thread releases the slot while the call is in flight.
pub struct ThunkRegistry<C> {
    config: ThunkConfig,
    pool: Mutex<Option<Pool<C>>>,
}

impl<C> ThunkRegistry<C> {
    pub fn new(config: ThunkConfig) -> Self {
        Self {
            config,
            pool: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ThunkConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Option<Pool<C>>> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Highest slot count representable above `base_address`
    fn address_limit(&self) -> usize {
        let span = u32::MAX - self.config.base_address;
        (span / SLOT_STRIDE) as usize + 1
    }

    fn capacity_limit(&self) -> usize {
        let limit = self.address_limit();
        self.config.max_slots.map_or(limit, |max| max.min(limit))
    }

    fn addr_of(&self, index: usize) -> ThunkAddr {
        ThunkAddr(self.config.base_address + SLOT_STRIDE * index as u32)
    }

    fn index_of(&self, addr: ThunkAddr) -> Option<usize> {
        let delta = addr.0.checked_sub(self.config.base_address)?;
        (delta % SLOT_STRIDE == 0).then_some((delta / SLOT_STRIDE) as usize)
    }

    fn ensure_pool<'a>(&self, guard: &'a mut Option<Pool<C>>) -> Result<&'a mut Pool<C>> {
        if guard.is_none() {
            let mut pool = Pool {
                slots: Vec::new(),
                free: BTreeSet::new(),
            };
            let initial = self.config.initial_slots.min(self.capacity_limit());
            pool.grow_to(initial)?;
            tracing::debug!("Thunk pool created with {} slots", initial);
            *guard = Some(pool);
        }
        guard.as_mut().ok_or(RegistryError::OutOfMemory)
    }

    /// Create the pool now instead of on first allocation; idempotent
    pub fn create_pool(&self) -> Result<()> {
        let mut guard = self.lock();
        self.ensure_pool(&mut guard).map(|_| ())
    }

    /// Claim the lowest free slot for `target`, owned by `context`
    pub fn allocate(
        &self,
        context: C,
        target: SegPtr,
        user_data: u32,
    ) -> Result<Arc<ThunkRecord<C>>> {
        if target.is_null() {
            return Err(RegistryError::NullTarget);
        }

        let mut guard = self.lock();
        let limit = self.capacity_limit();
        let pool = self.ensure_pool(&mut guard)?;

        if pool.free.is_empty() {
            let capacity = pool.slots.len();
            let grown = capacity.saturating_mul(2).max(1).min(limit);
            if grown <= capacity {
                tracing::warn!(
                    "Thunk pool exhausted at {} records; raise thunks.max_slots if this is expected capacity",
                    capacity
                );
                return Err(RegistryError::Exhausted { capacity });
            }
            pool.grow_to(grown)?;
            tracing::debug!("Thunk pool grown from {} to {} slots", capacity, grown);
        }

        let index = pool.free.pop_first().ok_or(RegistryError::OutOfMemory)?;
        let record = Arc::new(ThunkRecord {
            index,
            addr: self.addr_of(index),
            target,
            context,
            user_data,
        });
        pool.slots[index] = Some(Arc::clone(&record));
        tracing::trace!("Thunk {} -> {} claimed (slot {})", record.addr, target, index);
        Ok(record)
    }

    /// Record whose callable address is exactly `addr`
    pub fn find_by_callable(&self, addr: ThunkAddr) -> Option<Arc<ThunkRecord<C>>> {
        let index = self.index_of(addr)?;
        let guard = self.lock();
        guard.as_ref()?.slots.get(index)?.clone()
    }

    /// First live record matching `pred`, in slot order
    pub fn find_where(
        &self,
        mut pred: impl FnMut(&ThunkRecord<C>) -> bool,
    ) -> Option<Arc<ThunkRecord<C>>> {
        let guard = self.lock();
        guard
            .as_ref()?
            .slots
            .iter()
            .flatten()
            .find(|record| pred(record))
            .cloned()
    }

    /// Free the slot behind `addr`; returns the record it held
    pub fn release(&self, addr: ThunkAddr) -> Option<Arc<ThunkRecord<C>>> {
        let index = self.index_of(addr)?;
        let mut guard = self.lock();
        let pool = guard.as_mut()?;
        let record = pool.slots.get_mut(index)?.take()?;
        pool.free.insert(index);
        tracing::trace!("Thunk {} released", addr);
        Some(record)
    }

    /// Free every record matching `pred`; returns how many were freed
    pub fn release_where(&self, mut pred: impl FnMut(&ThunkRecord<C>) -> bool) -> usize {
        let mut guard = self.lock();
        let Some(pool) = guard.as_mut() else {
            return 0;
        };
        let mut released = 0;
        for (index, slot) in pool.slots.iter_mut().enumerate() {
            if slot.as_deref().is_some_and(&mut pred) {
                *slot = None;
                pool.free.insert(index);
                released += 1;
            }
        }
        if released > 0 {
            tracing::debug!("Released {} thunk records", released);
        }
        released
    }

    /// Hand an existing record to a new owner, keeping its address and target
    pub fn rebind(&self, addr: ThunkAddr, context: C) -> Result<Arc<ThunkRecord<C>>> {
        let index = self.index_of(addr).ok_or(RegistryError::NotFound(addr))?;
        let mut guard = self.lock();
        let slot = guard
            .as_mut()
            .and_then(|pool| pool.slots.get_mut(index))
            .ok_or(RegistryError::NotFound(addr))?;
        let old = slot.as_ref().ok_or(RegistryError::NotFound(addr))?;
        let record = Arc::new(ThunkRecord {
            index: old.index,
            addr: old.addr,
            target: old.target,
            context,
            user_data: old.user_data,
        });
        *slot = Some(Arc::clone(&record));
        Ok(record)
    }

    /// Number of claimed records
    pub fn live(&self) -> usize {
        self.lock().as_ref().map_or(0, Pool::live)
    }

    /// Current slot count (0 before the pool exists)
    pub fn capacity(&self) -> usize {
        self.lock().as_ref().map_or(0, |pool| pool.slots.len())
    }
}

impl<C> Default for ThunkRegistry<C> {
    fn default() -> Self {
        Self::new(ThunkConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    fn target(n: u16) -> SegPtr {
        SegPtr::new(0x1007, n)
    }

    #[test]
    fn test_pool_is_created_lazily() {
        let registry: ThunkRegistry<u16> = ThunkRegistry::default();
        assert_eq!(registry.capacity(), 0);
        registry.create_pool().unwrap();
        registry.create_pool().unwrap();
        assert_eq!(registry.capacity(), 32);
        assert_eq!(registry.live(), 0);
    }

    #[test]
    fn test_addresses_follow_slots() {
        let registry = ThunkRegistry::new(ThunkConfig::default());
        let a = registry.allocate(1u16, target(0x10), 0).unwrap();
        let b = registry.allocate(1u16, target(0x20), 0).unwrap();
        assert_eq!(a.addr(), ThunkAddr(0x7FF0_0000));
        assert_eq!(b.addr(), ThunkAddr(0x7FF0_0010));
        assert_eq!(b.index(), 1);
    }

    #[test]
    fn test_null_target_rejected() {
        let registry: ThunkRegistry<u16> = ThunkRegistry::default();
        assert_eq!(
            registry.allocate(1, SegPtr::NULL, 0).unwrap_err(),
            RegistryError::NullTarget
        );
        assert_eq!(registry.live(), 0);
    }

    #[test]
    fn test_lowest_free_slot_reused() {
        let registry = ThunkRegistry::new(ThunkConfig::default());
        let records: Vec<_> = (0..4)
            .map(|i| registry.allocate(7u16, target(i), 0).unwrap())
            .collect();
        registry.release(records[2].addr()).unwrap();
        registry.release(records[1].addr()).unwrap();
        let next = registry.allocate(8u16, target(9), 0).unwrap();
        assert_eq!(next.index(), 1);
    }

    #[test]
    fn test_unbounded_pool_grows() {
        let registry = ThunkRegistry::new(ThunkConfig {
            initial_slots: 2,
            ..Default::default()
        });
        for i in 0..5 {
            registry.allocate(0u16, target(i), 0).unwrap();
        }
        assert_eq!(registry.live(), 5);
        assert_eq!(registry.capacity(), 8);
    }

    #[test]
    fn test_bounded_pool_exhausts_cleanly() {
        let registry = ThunkRegistry::new(ThunkConfig::bounded(2));
        let a = registry.allocate(1u16, target(1), 0).unwrap();
        registry.allocate(1u16, target(2), 0).unwrap();
        assert_eq!(
            registry.allocate(1u16, target(3), 0).unwrap_err(),
            RegistryError::Exhausted { capacity: 2 }
        );
        assert_eq!(registry.find_by_callable(a.addr()).unwrap().target(), target(1));
    }

    #[test]
    fn test_lookup_rejects_foreign_addresses() {
        let registry = ThunkRegistry::new(ThunkConfig::default());
        let a = registry.allocate(1u16, target(1), 0).unwrap();
        assert!(registry.find_by_callable(ThunkAddr(a.addr().0 + 4)).is_none());
        assert!(registry.find_by_callable(ThunkAddr(0x1000)).is_none());
        assert!(registry.find_by_callable(ThunkAddr(0x7FF0_0100)).is_none());
    }

    #[test]
    fn test_release_where_matches_owner() {
        let registry = ThunkRegistry::new(ThunkConfig::default());
        registry.allocate(1u16, target(1), 0).unwrap();
        let kept = registry.allocate(2u16, target(2), 0).unwrap();
        registry.allocate(1u16, target(3), 0).unwrap();
        assert_eq!(registry.release_where(|r| *r.context() == 1), 2);
        assert_eq!(registry.live(), 1);
        assert!(registry.find_by_callable(kept.addr()).is_some());
    }

    #[test]
    fn test_rebind_keeps_address() {
        let registry = ThunkRegistry::new(ThunkConfig::default());
        let a = registry.allocate(0u16, target(5), 0x55).unwrap();
        let moved = registry.rebind(a.addr(), 9).unwrap();
        assert_eq!(moved.addr(), a.addr());
        assert_eq!(*moved.context(), 9);
        assert_eq!(moved.user_data(), 0x55);
        // The old snapshot is unaffected
        assert_eq!(*a.context(), 0);

        registry.release(a.addr()).unwrap();
        assert_eq!(
            registry.rebind(a.addr(), 3).unwrap_err(),
            RegistryError::NotFound(a.addr())
        );
    }

    #[test]
    fn test_snapshot_survives_release() {
        let registry = ThunkRegistry::new(ThunkConfig::default());
        let a = registry.allocate(4u16, target(4), 0).unwrap();
        let in_flight = registry.find_by_callable(a.addr()).unwrap();
        registry.release(a.addr()).unwrap();
        assert_eq!(in_flight.target(), target(4));
        assert!(registry.find_by_callable(a.addr()).is_none());
    }

    #[test]
    fn test_concurrent_allocate_and_release() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 16;

        let registry: Arc<ThunkRegistry<usize>> = Arc::new(ThunkRegistry::default());
        let start = Barrier::new(THREADS);
        let held = Barrier::new(THREADS);

        let claimed: Vec<Vec<ThunkAddr>> = thread::scope(|scope| {
            let workers: Vec<_> = (0..THREADS)
                .map(|owner| {
                    let registry = Arc::clone(&registry);
                    let (start, held) = (&start, &held);
                    scope.spawn(move || {
                        // Every thread races for the first allocation
                        start.wait();
                        let records: Vec<_> = (0..PER_THREAD)
                            .map(|n| {
                                registry
                                    .allocate(owner, target((owner * PER_THREAD + n + 1) as u16), 0)
                                    .unwrap()
                            })
                            .collect();
                        held.wait();
                        for record in &records {
                            let found = registry.find_by_callable(record.addr()).unwrap();
                            assert_eq!(*found.context(), owner);
                            assert_eq!(found.target(), record.target());
                        }
                        records.iter().map(|r| r.addr()).collect::<Vec<_>>()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        // A second pool creation would have dropped records claimed before it
        assert_eq!(registry.live(), THREADS * PER_THREAD);
        assert_eq!(registry.capacity(), THREADS * PER_THREAD);
        let unique: BTreeSet<ThunkAddr> = claimed.iter().flatten().copied().collect();
        assert_eq!(unique.len(), THREADS * PER_THREAD);

        thread::scope(|scope| {
            for addrs in &claimed {
                let registry = &registry;
                scope.spawn(move || {
                    for &addr in addrs {
                        assert!(registry.release(addr).is_some());
                    }
                });
            }
        });
        assert_eq!(registry.live(), 0);
        assert_eq!(registry.capacity(), THREADS * PER_THREAD);
    }
}
