//! Counted native heap
//!
//! Every shadow block and recoded string lives in a [`HeapBox`] or
//! [`HeapVec`]. Both report their release back to the heap on drop, so a
//! test can assert that a map/unmap pair left nothing behind.

use crate::{Result, SegmentError};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Counters {
    allocations: usize,
    frees: usize,
    /// Allocations still allowed before every request fails
    budget: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub allocations: usize,
    pub frees: usize,
}

impl HeapStats {
    pub fn live(&self) -> usize {
        self.allocations - self.frees
    }
}

/// Shared handle to the heap counters; clones observe the same heap
#[derive(Debug, Clone, Default)]
pub struct NativeHeap {
    counters: Arc<Mutex<Counters>>,
}

impl NativeHeap {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(&self) -> Result<()> {
        let mut counters = self.lock();
        if let Some(budget) = counters.budget.as_mut() {
            if *budget == 0 {
                tracing::debug!(
                    "Native allocation #{} refused (injected)",
                    counters.allocations + 1
                );
                return Err(SegmentError::OutOfMemory);
            }
            *budget -= 1;
        }
        counters.allocations += 1;
        Ok(())
    }

    fn release(&self) {
        self.lock().frees += 1;
    }

    /// Box `value` on the native heap
    pub fn alloc<T>(&self, value: T) -> Result<HeapBox<T>> {
        self.claim()?;
        Ok(HeapBox {
            value: Box::new(value),
            heap: self.clone(),
        })
    }

    /// Zero-initialised array of `len` elements
    pub fn alloc_slice<T: Default + Clone>(&self, len: usize) -> Result<HeapVec<T>> {
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| SegmentError::OutOfMemory)?;
        self.claim()?;
        data.resize(len, T::default());
        Ok(HeapVec {
            data,
            heap: self.clone(),
        })
    }

    /// Let `n` more allocations succeed, then fail every one after
    pub fn fail_after(&self, n: usize) {
        self.lock().budget = Some(n);
    }

    pub fn clear_faults(&self) {
        self.lock().budget = None;
    }

    pub fn stats(&self) -> HeapStats {
        let counters = self.lock();
        HeapStats {
            allocations: counters.allocations,
            frees: counters.frees,
        }
    }
}

/// Single value owned by the native heap
#[derive(Debug)]
pub struct HeapBox<T> {
    value: Box<T>,
    heap: NativeHeap,
}

impl<T> Deref for HeapBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for HeapBox<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Drop for HeapBox<T> {
    fn drop(&mut self) {
        self.heap.release();
    }
}

/// Fixed-length array owned by the native heap
#[derive(Debug)]
pub struct HeapVec<T> {
    data: Vec<T>,
    heap: NativeHeap,
}

impl<T> Deref for HeapVec<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T> DerefMut for HeapVec<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T> Drop for HeapVec<T> {
    fn drop(&mut self) {
        self.heap.release();
    }
}
