//! Headless native driver building blocks.
//!
//! Each backend talks to an in-process native layer shaped like the API it
//! stands in for: a Vulkan-style device with queues and fences, a GL-style
//! thread-bound context, a D3D11-style device and immediate context. Those
//! layers share the storage primitives in this module:
//!
//! - [`ObjectTable`]: handle allocation and lookup, with created/destroyed
//!   counters so tests can prove that every native object is released once;
//! - [`BufferMemory`] / [`ImageMemory`]: the bytes behind buffers and
//!   textures, addressed by offset or by (mip, layer, rectangle);
//! - [`DriverLog`]: the record of every draw and clear that reached the
//!   native layer.

mod capture;
mod memory;

use std::collections::HashMap;

pub use capture::DrawCall;
pub(crate) use capture::DriverLog;
pub(crate) use memory::{BufferMemory, ImageMemory, encode_clear_color, encode_clear_depth};

/// Live/created/destroyed counters for the objects of one native layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ObjectCounts {
    pub live: usize,
    pub created: u64,
    pub destroyed: u64,
}

impl std::ops::Add for ObjectCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            live: self.live + rhs.live,
            created: self.created + rhs.created,
            destroyed: self.destroyed + rhs.destroyed,
        }
    }
}

impl std::iter::Sum for ObjectCounts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, counts| acc + counts)
    }
}

/// Native objects of one type, keyed by a non-zero handle.
///
/// Handles are never reused within a table, so a stale handle always misses.
#[derive(Debug)]
pub(crate) struct ObjectTable<T> {
    next: u64,
    objects: HashMap<u64, T>,
    created: u64,
    destroyed: u64,
}

impl<T> Default for ObjectTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ObjectTable<T> {
    pub fn new() -> Self {
        Self {
            next: 1,
            objects: HashMap::new(),
            created: 0,
            destroyed: 0,
        }
    }

    /// Insert an object and return its new handle.
    pub fn insert(&mut self, object: T) -> u64 {
        let handle = self.next;
        self.next += 1;
        self.created += 1;
        self.objects.insert(handle, object);
        handle
    }

    pub fn get(&self, handle: u64) -> Option<&T> {
        self.objects.get(&handle)
    }

    pub fn get_mut(&mut self, handle: u64) -> Option<&mut T> {
        self.objects.get_mut(&handle)
    }

    pub fn contains(&self, handle: u64) -> bool {
        self.objects.contains_key(&handle)
    }

    /// Remove an object. Returns `None` when the handle is unknown or was
    /// already removed.
    pub fn remove(&mut self, handle: u64) -> Option<T> {
        let object = self.objects.remove(&handle);
        if object.is_some() {
            self.destroyed += 1;
        }
        object
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.objects.values_mut()
    }

    pub fn counts(&self) -> ObjectCounts {
        ObjectCounts {
            live: self.objects.len(),
            created: self.created,
            destroyed: self.destroyed,
        }
    }

    /// Remove every object, counting each as destroyed.
    pub fn drain(&mut self) -> impl Iterator<Item = (u64, T)> + '_ {
        self.destroyed += self.objects.len() as u64;
        self.objects.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_table_handles_are_unique() {
        let mut table = ObjectTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        assert_ne!(a, b);
        assert_ne!(a, 0);

        assert_eq!(table.remove(a), Some("a"));
        assert_eq!(table.remove(a), None);

        let c = table.insert("c");
        assert_ne!(c, a);
        assert_eq!(
            table.counts(),
            ObjectCounts {
                live: 2,
                created: 3,
                destroyed: 1
            }
        );
    }

    #[test]
    fn test_object_table_drain_counts_destroyed() {
        let mut table = ObjectTable::new();
        table.insert(1);
        table.insert(2);
        assert_eq!(table.drain().count(), 2);
        assert!(table.is_empty());
        assert_eq!(table.counts().destroyed, 2);
    }
}
