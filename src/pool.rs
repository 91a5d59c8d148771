// SPDX-License-Identifier: MIT

//! Fixed-capacity bump allocators backing the descriptor object graph.
//!
//! Every pool reserves its memory once, when the device is created. Slots
//! are handed out front to back and only ever returned all at once by
//! [Arena::reset]. Allocations are addressed by [Span] rather than by
//! reference so the pools can be moved and borrowed independently.

use std::ops::{Index, IndexMut};

use crate::CapacityError;

/// A contiguous run of slots inside an [Arena].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    start: usize,
    len: usize,
}

impl Span {
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug)]
pub struct Arena<T> {
    name: &'static str,
    slots: Box<[T]>,
    position: usize,
}

impl<T: Clone + Default> Arena<T> {
    /// Create a pool of `capacity` default-initialized slots.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Arena {
            name,
            slots: vec![T::default(); capacity].into_boxed_slice(),
            position: 0,
        }
    }

    /// Reserve `n` consecutive slots, reset to their default value.
    pub fn alloc(&mut self, n: usize) -> Result<Span, CapacityError> {
        if n > self.available() {
            return Err(CapacityError::PoolExhausted {
                pool: self.name,
                requested: n,
                available: self.available(),
            });
        }
        let span = Span {
            start: self.position,
            len: n,
        };
        self.slots[span.start..span.start + n].fill(T::default());
        self.position += n;
        Ok(span)
    }

    /// Reserve a single slot and initialize it with `value`.
    pub fn push(&mut self, value: T) -> Result<usize, CapacityError> {
        let span = self.alloc(1)?;
        self.slots[span.start] = value;
        Ok(span.start)
    }

    /// Release every slot. Previously handed out spans must not be used
    /// afterwards.
    pub fn reset(&mut self) {
        self.position = 0;
    }
}

impl<T> Arena<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots handed out since the last reset.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn available(&self) -> usize {
        self.slots.len() - self.position
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.allocated().get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        let position = self.position;
        self.slots[..position].get_mut(index)
    }

    /// The slots of `span`. Spans from before the last reset yield
    /// an empty slice rather than stale data.
    pub fn slice(&self, span: Span) -> &[T] {
        self.allocated().get(span.start..span.start + span.len).unwrap_or(&[])
    }

    pub fn slice_mut(&mut self, span: Span) -> &mut [T] {
        let position = self.position;
        self.slots[..position]
            .get_mut(span.start..span.start + span.len)
            .unwrap_or(&mut [])
    }

    /// All slots handed out since the last reset.
    pub fn allocated(&self) -> &[T] {
        &self.slots[..self.position]
    }
}

/// Panics if `index` was not handed out since the last reset.
impl<T> Index<usize> for Arena<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.allocated()[index]
    }
}

impl<T> IndexMut<usize> for Arena<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.slots[..self.position][index]
    }
}

/// Panics if `span` was not handed out since the last reset.
impl<T> Index<Span> for Arena<T> {
    type Output = [T];

    fn index(&self, span: Span) -> &[T] {
        &self.allocated()[span.start..span.start + span.len]
    }
}

impl<T> IndexMut<Span> for Arena<T> {
    fn index_mut(&mut self, span: Span) -> &mut [T] {
        &mut self.slots[..self.position][span.start..span.start + span.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_until_exhausted() {
        let mut pool: Arena<u32> = Arena::new("test", 8);
        let a = pool.alloc(3).unwrap();
        let b = pool.alloc(5).unwrap();
        assert_eq!(a.start(), 0);
        assert_eq!(b.start(), 3);
        assert_eq!(pool.available(), 0);

        let err = pool.alloc(1).unwrap_err();
        assert_eq!(
            err,
            CapacityError::PoolExhausted {
                pool: "test",
                requested: 1,
                available: 0
            }
        );
        // a failed allocation leaves the pool untouched
        assert_eq!(pool.position(), 8);
    }

    #[test]
    fn slices_do_not_overlap() {
        let mut pool: Arena<u32> = Arena::new("test", 6);
        let a = pool.alloc(3).unwrap();
        let b = pool.alloc(3).unwrap();
        pool.slice_mut(a).fill(1);
        pool.slice_mut(b).fill(2);
        assert_eq!(pool.slice(a), &[1, 1, 1]);
        assert_eq!(pool.slice(b), &[2, 2, 2]);
    }

    #[test]
    fn reset_reuses_zeroed_slots() {
        let mut pool: Arena<u32> = Arena::new("test", 4);
        let a = pool.alloc(4).unwrap();
        pool.slice_mut(a).fill(7);
        pool.reset();
        assert_eq!(pool.position(), 0);
        assert!(pool.slice(a).is_empty());

        let b = pool.alloc(2).unwrap();
        assert_eq!(pool.slice(b), &[0, 0]);
        assert_eq!(pool.push(9).unwrap(), 2);
        assert_eq!(pool.get(2), Some(&9));
        assert_eq!(pool.get(3), None);
    }

    #[test]
    fn index_by_slot_and_span() {
        let mut pool: Arena<u32> = Arena::new("test", 4);
        let a = pool.alloc(3).unwrap();
        pool[a].copy_from_slice(&[1, 2, 3]);
        pool[0] = 5;
        assert_eq!(&pool[a], &[5, 2, 3]);
        assert_eq!(pool[2], 3);
    }

    #[test]
    #[should_panic]
    fn index_past_position() {
        let mut pool: Arena<u32> = Arena::new("test", 4);
        pool.alloc(2).unwrap();
        let _value: u32 = pool[2];
    }

    #[test]
    #[should_panic]
    fn index_stale_span() {
        let mut pool: Arena<u32> = Arena::new("test", 4);
        let a = pool.alloc(2).unwrap();
        pool.reset();
        let _values: &[u32] = &pool[a];
    }

    #[test]
    fn zero_capacity() {
        let mut pool: Arena<u8> = Arena::new("empty", 0);
        assert!(pool.alloc(0).unwrap().is_empty());
        assert!(pool.push(1).is_err());
    }
}
