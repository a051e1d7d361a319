// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Opaque identities for native objects.
//!
//! A handle names a camera, stream, frame buffer or request without owning
//! it and without exposing anything that can be dereferenced. Handles compare
//! by identity only. They are valid while the object that produced them is
//! alive; keeping that bound is the caller's obligation.
//!
//! The libcamera backend keys handles by native object address. The virtual
//! backend issues them from a [`HandleTable`], which records a generation per
//! slot so that a handle to a removed object is reported as stale instead of
//! aliasing whatever reuses the slot.

use std::{fmt, marker::PhantomData};

use crate::error::{Error, Result};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct RawHandle {
    key: u64,
    generation: u32,
}

impl RawHandle {
    pub(crate) const fn new(key: u64, generation: u32) -> Self {
        Self { key, generation }
    }

    /// Handle for a native object identified by its address.
    pub(crate) fn from_ptr<T>(ptr: *const T) -> Self {
        Self::new(ptr as usize as u64, 0)
    }

    pub(crate) const fn key(&self) -> u64 {
        self.key
    }

    pub(crate) const fn generation(&self) -> u32 {
        self.generation
    }
}

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) RawHandle);

        impl $name {
            pub(crate) const KIND: &'static str = $kind;

            pub(crate) const fn from_raw(raw: RawHandle) -> Self {
                Self(raw)
            }

            pub(crate) const fn raw(&self) -> RawHandle {
                self.0
            }

            /// Recovers the native pointer the handle was built from.
            ///
            /// The result is only meaningful for handles created by the
            /// libcamera backend, and only while the object is alive.
            #[allow(dead_code)]
            pub(crate) fn as_ptr<T>(&self) -> *mut T {
                self.0.key() as usize as *mut T
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x}", stringify!($name), self.0.key())?;
                if self.0.generation() != 0 {
                    write!(f, "/{}", self.0.generation())?;
                }
                write!(f, ")")
            }
        }
    };
}

handle_type!(
    /// Non-owning identity of a camera.
    CameraHandle,
    "camera"
);
handle_type!(
    /// Non-owning identity of a stream within a camera.
    StreamHandle,
    "stream"
);
handle_type!(
    /// Non-owning identity of a buffer owned by a frame buffer allocator.
    FrameBufferHandle,
    "frame buffer"
);
handle_type!(
    /// Non-owning identity of a capture request.
    RequestHandle,
    "request"
);

/// Conversion between a typed handle and the table's raw keys.
pub(crate) trait TableHandle: Copy {
    const KIND: &'static str;
    fn to_raw(self) -> RawHandle;
    fn from_raw_handle(raw: RawHandle) -> Self;
}

macro_rules! table_handle {
    ($($name:ident),*) => {
        $(
            impl TableHandle for $name {
                const KIND: &'static str = $name::KIND;

                fn to_raw(self) -> RawHandle {
                    self.raw()
                }

                fn from_raw_handle(raw: RawHandle) -> Self {
                    Self::from_raw(raw)
                }
            }
        )*
    };
}

table_handle!(CameraHandle, StreamHandle, FrameBufferHandle, RequestHandle);

struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

/// Generation-checked arena mapping handles to values.
///
/// Slot indices are reused after removal; the generation counter of a slot
/// is bumped on every removal so old handles no longer resolve. Generations
/// start at 1, leaving 0 for address-keyed native handles.
pub(crate) struct HandleTable<H, T> {
    namespace: u32,
    entries: Vec<Entry<T>>,
    free: Vec<usize>,
    len: usize,
    _handle: PhantomData<fn() -> H>,
}

impl<H: TableHandle, T> Default for HandleTable<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: TableHandle, T> HandleTable<H, T> {
    pub(crate) fn new() -> Self {
        Self::with_namespace(0)
    }

    /// A table whose handles never collide with those of a table created
    /// with a different `namespace`.
    pub(crate) fn with_namespace(namespace: u32) -> Self {
        Self {
            namespace,
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
            _handle: PhantomData,
        }
    }

    fn make(&self, index: usize, generation: u32) -> H {
        let key = (self.namespace as u64) << 32 | index as u64;
        H::from_raw_handle(RawHandle::new(key, generation))
    }

    fn index_of(&self, raw: RawHandle) -> Option<usize> {
        ((raw.key() >> 32) as u32 == self.namespace).then_some((raw.key() & 0xffff_ffff) as usize)
    }

    pub(crate) fn insert(&mut self, value: T) -> H {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index];
            entry.value = Some(value);
            let generation = entry.generation;
            return self.make(index, generation);
        }

        self.entries.push(Entry {
            generation: 1,
            value: Some(value),
        });
        self.make(self.entries.len() - 1, 1)
    }

    fn entry(&self, handle: H) -> Option<&Entry<T>> {
        let raw = handle.to_raw();
        self.index_of(raw)
            .and_then(|index| self.entries.get(index))
            .filter(|e| e.generation == raw.generation() && e.value.is_some())
    }

    pub(crate) fn contains(&self, handle: H) -> bool {
        self.entry(handle).is_some()
    }

    pub(crate) fn get(&self, handle: H) -> Result<&T> {
        self.entry(handle)
            .and_then(|e| e.value.as_ref())
            .ok_or(Error::StaleHandle(H::KIND))
    }

    pub(crate) fn get_mut(&mut self, handle: H) -> Result<&mut T> {
        let raw = handle.to_raw();
        let index = self.index_of(raw).ok_or(Error::StaleHandle(H::KIND))?;
        self.entries
            .get_mut(index)
            .filter(|e| e.generation == raw.generation())
            .and_then(|e| e.value.as_mut())
            .ok_or(Error::StaleHandle(H::KIND))
    }

    pub(crate) fn remove(&mut self, handle: H) -> Result<T> {
        let raw = handle.to_raw();
        let index = self.index_of(raw).ok_or(Error::StaleHandle(H::KIND))?;
        let entry = self
            .entries
            .get_mut(index)
            .filter(|e| e.generation == raw.generation() && e.value.is_some())
            .ok_or(Error::StaleHandle(H::KIND))?;

        let value = entry.value.take().ok_or(Error::StaleHandle(H::KIND))?;
        entry.generation = entry.generation.wrapping_add(1).max(1);
        self.free.push(index);
        self.len -= 1;
        Ok(value)
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[allow(dead_code)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (H, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, e)| e.value.as_ref().map(|v| (self.make(index, e.generation), v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_handles_go_stale() {
        let mut table: HandleTable<StreamHandle, &str> = HandleTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
        assert_eq!(*table.get(a).unwrap(), "a");

        assert_eq!(table.remove(a).unwrap(), "a");
        assert!(!table.contains(a));
        assert!(matches!(table.get(a), Err(Error::StaleHandle("stream"))));

        // The slot is reused but the old handle does not alias the new value.
        let c = table.insert("c");
        assert_eq!(c.raw().key(), a.raw().key());
        assert_ne!(c, a);
        assert!(table.get(a).is_err());
        assert_eq!(*table.get(c).unwrap(), "c");
        assert!(table.remove(a).is_err());
    }

    #[test]
    fn iteration_skips_free_slots() {
        let mut table: HandleTable<RequestHandle, u32> = HandleTable::new();
        let handles: Vec<_> = (0..4).map(|i| table.insert(i)).collect();
        table.remove(handles[1]).unwrap();
        *table.get_mut(handles[2]).unwrap() += 10;

        let seen: Vec<_> = table.iter().map(|(h, v)| (h, *v)).collect();
        assert_eq!(
            seen,
            vec![(handles[0], 0), (handles[2], 12), (handles[3], 3)]
        );
    }

    #[test]
    fn namespaces_do_not_alias() {
        let mut a: HandleTable<StreamHandle, u8> = HandleTable::with_namespace(1);
        let mut b: HandleTable<StreamHandle, u8> = HandleTable::with_namespace(2);
        let ha = a.insert(1);
        let hb = b.insert(2);
        assert_ne!(ha, hb);
        assert!(!a.contains(hb));
        assert!(b.get(ha).is_err());
    }

    #[test]
    fn pointer_handles_round_trip() {
        let value = 7u32;
        let handle = FrameBufferHandle::from_raw(RawHandle::from_ptr(&value));
        let ptr: *mut u32 = handle.as_ptr();
        assert_eq!(ptr as *const u32, &value as *const u32);
        assert!(format!("{:?}", handle).starts_with("FrameBufferHandle(0x"));
    }
}
