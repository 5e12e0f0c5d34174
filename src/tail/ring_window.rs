// SPDX-License-Identifier: Apache-2.0

//! Fixed-capacity circular buffers.
//!
//! [`RingWindow`] is the unsynchronized variant owned by a single reader.
//! [`SharedRingWindow`] wraps one in a mutex for observers on other threads.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::error::RingWindowError;

/// A circular buffer that keeps the most recent `capacity` elements.
///
/// Once full, every enqueue overwrites the oldest element. Iteration is
/// always oldest to newest.
#[derive(Debug, Clone)]
pub struct RingWindow<T> {
    buf: Vec<T>,
    head: usize,
    len: usize,
}

impl<T: Copy + Default> RingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![T::default(); capacity],
            head: 0,
            len: 0,
        }
    }

    /// Build a window from a slice, keeping only the last `capacity` items.
    pub fn from_slice(capacity: usize, items: &[T]) -> Self {
        let mut window = Self::new(capacity);
        window.extend_from_slice(items);
        window
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    pub fn enqueue(&mut self, item: T) {
        let cap = self.capacity();
        if cap == 0 {
            return;
        }

        let slot = (self.head + self.len) % cap;
        self.buf[slot] = item;

        if self.len == cap {
            self.head = (self.head + 1) % cap;
        } else {
            self.len += 1;
        }
    }

    pub fn extend_from_slice(&mut self, items: &[T]) {
        for item in items {
            self.enqueue(*item);
        }
    }

    pub fn dequeue(&mut self) -> Result<T, RingWindowError> {
        if self.len == 0 {
            return Err(RingWindowError::Empty);
        }

        let item = std::mem::take(&mut self.buf[self.head]);
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        Ok(item)
    }

    pub fn peek(&self) -> Result<T, RingWindowError> {
        if self.len == 0 {
            return Err(RingWindowError::Empty);
        }
        Ok(self.buf[self.head])
    }

    /// Clear the window. The backing storage is kept.
    pub fn reset(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        let cap = self.capacity();
        (0..self.len).map(move |i| self.buf[(self.head + i) % cap])
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

impl<T: Copy + Default + PartialEq> RingWindow<T> {
    /// Compare the window contents against `other`, element by element.
    pub fn matches(&self, other: &[T]) -> bool {
        self.len == other.len() && self.iter().zip(other).all(|(a, b)| a == *b)
    }
}

/// A cloneable, mutex-guarded [`RingWindow`] for cross-thread inspection.
#[derive(Debug, Clone)]
pub struct SharedRingWindow<T> {
    inner: Arc<Mutex<RingWindow<T>>>,
}

impl<T: Copy + Default> SharedRingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RingWindow::new(capacity))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingWindow<T>> {
        // A poisoned window still holds valid elements
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn enqueue(&self, item: T) {
        self.lock().enqueue(item)
    }

    pub fn dequeue(&self) -> Result<T, RingWindowError> {
        self.lock().dequeue()
    }

    pub fn peek(&self) -> Result<T, RingWindowError> {
        self.lock().peek()
    }

    pub fn reset(&self) {
        self.lock().reset()
    }

    /// Reset and refill under a single lock so observers never see a partial copy.
    pub fn replace_with(&self, items: &[T]) {
        let mut window = self.lock();
        window.reset();
        window.extend_from_slice(items);
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.lock().to_vec()
    }
}
