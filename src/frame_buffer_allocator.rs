// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::{
    backend::NativeAllocator,
    camera::Camera,
    error::Result,
    frame_buffer::FrameBuffer,
    handle::StreamHandle,
};

pub(crate) struct AllocatorShared {
    pub(crate) native: Mutex<Box<dyn NativeAllocator>>,
    // Dropped after `native`, so the camera outlives its buffers.
    pub(crate) camera: Camera,
}

/// Allocates frame buffers for the streams of a configured camera.
///
/// The allocator holds a reference to its camera, and every [`FrameBuffer`]
/// it hands out holds a reference to the allocator. Buffer memory is released
/// once the allocator and all of its buffers have been dropped.
///
/// # Example
///
/// ```no_run
/// # use libcamera_bridge::{CameraManager, FrameBufferAllocator, StreamRole};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = CameraManager::new()?;
/// let camera = manager.cameras().into_iter().next().ok_or("no camera")?;
/// camera.acquire()?;
/// let mut config = camera
///     .generate_configuration(&[StreamRole::Viewfinder])
///     .ok_or("no configuration")?;
/// config.validate();
/// camera.configure(&mut config)?;
///
/// let mut allocator = FrameBufferAllocator::new(&camera)?;
/// for stream in camera.streams() {
///     let count = allocator.allocate(stream)?;
///     println!("{} buffers for {:?}", count, stream);
/// }
/// # Ok(())
/// # }
/// ```
pub struct FrameBufferAllocator {
    shared: Arc<AllocatorShared>,
}

impl FrameBufferAllocator {
    pub fn new(camera: &Camera) -> Result<Self> {
        let native = camera.native().new_allocator()?;
        Ok(Self {
            shared: Arc::new(AllocatorShared {
                native: Mutex::new(native),
                camera: camera.clone(),
            }),
        })
    }

    pub fn camera(&self) -> &Camera {
        &self.shared.camera
    }

    /// Allocates buffers for `stream`, returning how many were allocated.
    ///
    /// Fails with `EBUSY` if the stream already has buffers, `EINVAL` if the
    /// stream is not part of the camera's active configuration and `EACCES`
    /// if the camera is not in the configured state.
    #[instrument(skip(self), fields(camera = %self.shared.camera.id()))]
    pub fn allocate(&mut self, stream: StreamHandle) -> Result<usize> {
        let count = self.shared.native.lock().allocate(stream)?;
        debug!(count, "allocated frame buffers");
        Ok(count)
    }

    /// Whether any stream has buffers allocated.
    pub fn allocated(&self) -> bool {
        self.shared.native.lock().allocated()
    }

    /// Buffers allocated for `stream`, empty if none.
    pub fn buffers(&self, stream: StreamHandle) -> Vec<FrameBuffer> {
        self.shared
            .native
            .lock()
            .buffers(stream)
            .into_iter()
            .map(|handle| FrameBuffer {
                handle,
                stream,
                allocator: self.shared.clone(),
            })
            .collect()
    }
}
