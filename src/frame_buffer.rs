// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use core::fmt;
use std::{
    ffi::c_void,
    io,
    os::fd::RawFd,
    ptr::null_mut,
    slice::from_raw_parts,
    sync::Arc,
};

use libc::{lseek, mmap, munmap, sysconf, MAP_FAILED, MAP_SHARED, PROT_READ, SEEK_END, _SC_PAGESIZE};
use serde::Serialize;
use tracing::{trace, warn};

use crate::{
    error::{Error, Result},
    frame_buffer_allocator::AllocatorShared,
    handle::{FrameBufferHandle, StreamHandle},
};

/// One plane of a frame buffer: a dmabuf (or memfd) region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameBufferPlane {
    pub fd: RawFd,
    pub offset: u32,
    pub length: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum FrameStatus {
    #[default]
    Success,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FramePlaneMetadata {
    pub bytes_used: u32,
}

/// Per-frame capture metadata, copied from libcamera's `FrameMetadata`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrameMetadata {
    pub status: FrameStatus,
    pub sequence: u32,
    /// CLOCK_MONOTONIC nanoseconds at start of exposure.
    pub timestamp: u64,
    pub planes: Vec<FramePlaneMetadata>,
}

impl fmt::Display for FrameMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq: {:06} timestamp: {} bytesused: ", self.sequence, self.timestamp)?;
        for (i, plane) in self.planes.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}", plane.bytes_used)?;
        }
        Ok(())
    }
}

/// A buffer owned by a [`FrameBufferAllocator`](crate::FrameBufferAllocator).
///
/// Holding a `FrameBuffer` keeps the allocator, and so the buffer memory,
/// alive.
#[derive(Clone)]
pub struct FrameBuffer {
    pub(crate) handle: FrameBufferHandle,
    pub(crate) stream: StreamHandle,
    pub(crate) allocator: Arc<AllocatorShared>,
}

impl FrameBuffer {
    pub fn handle(&self) -> FrameBufferHandle {
        self.handle
    }

    /// The stream this buffer was allocated for.
    pub fn stream(&self) -> StreamHandle {
        self.stream
    }

    pub fn planes(&self) -> Result<Vec<FrameBufferPlane>> {
        self.allocator.native.lock().planes(self.handle)
    }

    /// Metadata of the most recent capture into this buffer.
    pub fn metadata(&self) -> Result<FrameMetadata> {
        self.allocator.native.lock().metadata(self.handle)
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("handle", &self.handle)
            .field("stream", &self.stream)
            .finish()
    }
}

impl PartialEq for FrameBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for FrameBuffer {}

struct Mapping {
    addr: *mut u8,
    len: usize,
}

/// Read-only memory mapping of every plane of a frame buffer.
///
/// Planes that share a file descriptor and are laid out back to back are
/// covered by a single mapping. The mappings are removed on drop.
///
/// The CPU view is not synchronised with the device: read a buffer only
/// after its request has completed and before it is queued again.
pub struct MappedFrameBuffer {
    buffer: FrameBuffer,
    mappings: Vec<Mapping>,
    /// `(mapping index, offset in mapping, length)` per plane.
    planes: Vec<(usize, usize, usize)>,
}

// The mappings are private to this value and only read through `&self`.
unsafe impl Send for MappedFrameBuffer {}
unsafe impl Sync for MappedFrameBuffer {}

fn page_size() -> usize {
    match unsafe { sysconf(_SC_PAGESIZE) } {
        n if n > 0 => n as usize,
        _ => 4096,
    }
}

fn fd_length(fd: RawFd) -> Result<u64> {
    let len = unsafe { lseek(fd, 0, SEEK_END) };
    if len < 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(len as u64)
}

impl MappedFrameBuffer {
    pub fn map(buffer: &FrameBuffer) -> Result<Self> {
        let planes = buffer.planes()?;
        if planes.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "{:?} has no planes",
                buffer.handle
            )));
        }

        // Coalesce contiguous planes that share an fd.
        let mut groups: Vec<(RawFd, u64, u64)> = Vec::new();
        let mut plane_group = Vec::with_capacity(planes.len());
        for plane in &planes {
            let start = plane.offset as u64;
            let end = start + plane.length as u64;
            match groups.last_mut() {
                Some((fd, _, group_end)) if *fd == plane.fd && *group_end == start => {
                    *group_end = end;
                }
                _ => groups.push((plane.fd, start, end)),
            }
            plane_group.push(groups.len() - 1);
        }

        let page = page_size() as u64;
        let mut mapped = MappedFrameBuffer {
            buffer: buffer.clone(),
            mappings: Vec::with_capacity(groups.len()),
            planes: Vec::with_capacity(planes.len()),
        };

        let mut bases = Vec::with_capacity(groups.len());
        for &(fd, start, end) in &groups {
            let fd_len = fd_length(fd)?;
            if end > fd_len {
                return Err(Error::InvalidArgument(format!(
                    "plane range {start}..{end} exceeds fd {fd} length {fd_len}"
                )));
            }

            let base = start - start % page;
            let len = (end - base) as usize;
            let addr = unsafe { mmap(null_mut(), len, PROT_READ, MAP_SHARED, fd, base as libc::off_t) };
            if addr == MAP_FAILED {
                return Err(io::Error::last_os_error().into());
            }
            trace!(fd, offset = base, len, "mapped frame buffer region");
            mapped.mappings.push(Mapping {
                addr: addr as *mut u8,
                len,
            });
            bases.push(base);
        }

        for (plane, group) in planes.iter().zip(plane_group) {
            let offset = (plane.offset as u64 - bases[group]) as usize;
            mapped.planes.push((group, offset, plane.length as usize));
        }

        Ok(mapped)
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        let &(group, offset, len) = self.planes.get(index)?;
        let mapping = &self.mappings[group];
        Some(unsafe { from_raw_parts(mapping.addr.add(offset), len) })
    }

    pub fn planes(&self) -> impl Iterator<Item = &[u8]> {
        (0..self.planes.len()).filter_map(|i| self.plane(i))
    }
}

impl Drop for MappedFrameBuffer {
    fn drop(&mut self) {
        for mapping in &self.mappings {
            if unsafe { munmap(mapping.addr.cast::<c_void>(), mapping.len) } != 0 {
                warn!("munmap failed: {}", io::Error::last_os_error());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_renders_planes() {
        let metadata = FrameMetadata {
            status: FrameStatus::Success,
            sequence: 7,
            timestamp: 1234,
            planes: vec![
                FramePlaneMetadata { bytes_used: 640 },
                FramePlaneMetadata { bytes_used: 320 },
            ],
        };
        assert_eq!(
            metadata.to_string(),
            "seq: 000007 timestamp: 1234 bytesused: 640/320"
        );
    }
}
