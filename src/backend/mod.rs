// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! The seam between the safe types and a native camera stack.
//!
//! Every safe type in this crate talks to the camera stack only through the
//! traits below. [`libcamera`] implements them on top of the `libcamera-sys`
//! bridge; [`virtual_camera`] implements them in-process, mirroring
//! libcamera's state machine and error codes, so the bridge can be exercised
//! on machines without camera hardware.
//!
//! Conventions shared by both implementations:
//!
//! * Failures carry the positive errno libcamera would have returned.
//! * Factory methods return `None` where libcamera returns a null pointer.
//! * Request completion handlers run on the backend's own thread.

use std::{any::Any, sync::Arc};

use crate::{
    camera_configuration::CameraConfigurationStatus,
    controls::{ControlInfoMap, ControlList},
    error::Result,
    frame_buffer::{FrameBufferPlane, FrameMetadata},
    geometry::Size,
    handle::{CameraHandle, FrameBufferHandle, RequestHandle, StreamHandle},
    pixel_format::PixelFormat,
    request::{RequestStatus, ReuseFlag},
    stream::{StreamConfig, StreamFormats, StreamRole},
};

#[cfg(feature = "libcamera")]
pub mod libcamera;
pub mod virtual_camera;

/// Handler invoked for every completed request of a camera.
pub type RequestCompletedFn = Box<dyn Fn(&dyn NativeRequest) + Send + Sync>;

/// The process-wide camera manager of a camera stack.
pub trait NativeManager: Send {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self);
    fn version(&self) -> String;
    /// Cameras known to the manager, in enumeration order.
    fn cameras(&self) -> Vec<Arc<dyn NativeCamera>>;
}

pub trait NativeCamera: Send + Sync {
    fn id(&self) -> String;
    fn handle(&self) -> CameraHandle;

    fn acquire(&self) -> Result<()>;
    fn release(&self) -> Result<()>;

    fn generate_configuration(&self, roles: &[StreamRole]) -> Option<Box<dyn NativeConfiguration>>;
    /// Applies `config`, binding each entry to a stream. The configuration
    /// must have been produced by this backend.
    fn configure(&self, config: &mut dyn NativeConfiguration) -> Result<()>;

    fn start(&self, controls: Option<&ControlList>) -> Result<()>;
    fn stop(&self) -> Result<()>;

    fn create_request(&self, cookie: u64) -> Option<Box<dyn NativeRequest>>;
    fn queue_request(&self, request: &mut dyn NativeRequest) -> Result<()>;

    /// Streams of the active configuration, in configuration order.
    fn streams(&self) -> Vec<StreamHandle>;
    fn controls(&self) -> ControlInfoMap;
    fn properties(&self) -> ControlList;

    fn connect_request_completed(
        &self,
        handler: RequestCompletedFn,
    ) -> Result<Box<dyn NativeConnection>>;

    fn new_allocator(&self) -> Result<Box<dyn NativeAllocator>>;
}

/// A camera configuration: an indexed list of stream configurations.
///
/// Indices passed to the per-entry accessors are always below `len()`; the
/// safe views check that before calling in.
pub trait NativeConfiguration: Send {
    fn len(&self) -> usize;
    fn add_configuration(&mut self, config: &StreamConfig);
    fn validate(&mut self) -> CameraConfigurationStatus;

    fn pixel_format(&self, index: usize) -> PixelFormat;
    fn set_pixel_format(&mut self, index: usize, value: PixelFormat);
    fn size(&self, index: usize) -> Size;
    fn set_size(&mut self, index: usize, value: Size);
    fn stride(&self, index: usize) -> u32;
    fn set_stride(&mut self, index: usize, value: u32);
    fn frame_size(&self, index: usize) -> u32;
    fn set_frame_size(&mut self, index: usize, value: u32);
    fn buffer_count(&self, index: usize) -> u32;
    fn set_buffer_count(&mut self, index: usize, value: u32);
    fn stream(&self, index: usize) -> Option<StreamHandle>;
    fn formats(&self, index: usize) -> StreamFormats;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub trait NativeRequest: Send + Sync {
    fn handle(&self) -> RequestHandle;
    fn cookie(&self) -> u64;
    fn sequence(&self) -> u32;
    fn status(&self) -> RequestStatus;

    fn add_buffer(&mut self, stream: StreamHandle, buffer: FrameBufferHandle) -> Result<()>;
    fn find_buffer(&self, stream: StreamHandle) -> Option<FrameBufferHandle>;
    fn buffers(&self) -> Vec<(StreamHandle, FrameBufferHandle)>;
    /// Metadata of a buffer attached to this request.
    fn buffer_metadata(&self, buffer: FrameBufferHandle) -> Option<FrameMetadata>;
    fn has_pending_buffers(&self) -> bool;
    fn reuse(&mut self, flag: ReuseFlag);

    fn controls(&self) -> ControlList;
    fn set_controls(&mut self, controls: &ControlList);
    fn metadata(&self) -> ControlList;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Buffers allocated for the streams of one camera.
pub trait NativeAllocator: Send {
    /// Allocates buffers for `stream`, returning how many were created.
    fn allocate(&mut self, stream: StreamHandle) -> Result<usize>;
    fn allocated(&self) -> bool;
    fn buffers(&self, stream: StreamHandle) -> Vec<FrameBufferHandle>;
    fn planes(&self, buffer: FrameBufferHandle) -> Result<Vec<FrameBufferPlane>>;
    fn metadata(&self, buffer: FrameBufferHandle) -> Result<FrameMetadata>;
}

/// A live signal connection. Dropping it disconnects.
pub trait NativeConnection: Send {}
