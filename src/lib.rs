// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # libcamera Bridge
//!
//! Safe Rust access to the libcamera camera stack. The library wraps
//! libcamera's camera manager, cameras, configurations, frame buffer
//! allocators and capture requests behind owned Rust types, converts
//! libcamera's value types (sizes, pixel formats, control values and control
//! lists) into plain Rust values, and adapts libcamera's request-completed
//! signal into Rust callbacks with a well-defined unsubscribe.
//!
//! ## Features
//!
//! - **Owned handles**: Every native object is owned by exactly one Rust
//!   value, or shared through reference counting, and is released exactly
//!   once. Non-owning identities ([`CameraHandle`], [`StreamHandle`],
//!   [`FrameBufferHandle`], [`RequestHandle`]) compare by identity.
//! - **Typed controls**: [`ControlValue`] and [`ControlList`] convert losslessly
//!   to and from libcamera's control types, with typed access through
//!   [`Control`] ids.
//! - **Completion callbacks**: [`RequestCompleteSlot`] delivers each completed
//!   request to a handler and guarantees no delivery after it is dropped.
//! - **Virtual cameras**: An in-process backend with libcamera's state
//!   machine and memfd-backed buffers, for development and tests on machines
//!   without camera hardware.
//!
//! ## Example
//!
//! ```no_run
//! use libcamera_bridge::{CameraManager, FrameBufferAllocator, StreamRole};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = CameraManager::new()?;
//! let camera = manager.cameras().into_iter().next().ok_or("no camera")?;
//! camera.acquire()?;
//!
//! let mut config = camera
//!     .generate_configuration(&[StreamRole::Viewfinder])
//!     .ok_or("unsupported role")?;
//! config.validate();
//! camera.configure(&mut config)?;
//!
//! let stream = camera.streams()[0];
//! let mut allocator = FrameBufferAllocator::new(&camera)?;
//! allocator.allocate(stream)?;
//!
//! let _slot = camera.on_request_completed(|request| println!("{}", request))?;
//! camera.start(None)?;
//! for (cookie, buffer) in allocator.buffers(stream).iter().enumerate() {
//!     let mut request = camera.create_request(cookie as u64).ok_or("no request")?;
//!     request.add_buffer(buffer)?;
//!     camera.queue_request(&mut request)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Requirements
//!
//! - **Linux**: memfd and dmabuf buffers, `mmap` for CPU access
//! - **libcamera**: 0.0.x or newer with pkg-config metadata, only when built
//!   with the `libcamera` feature
//!
//! ## Safety
//!
//! Native calls are confined to the `libcamera` backend and its companion
//! `libcamera-sys` crate; buffer mapping is confined to
//! [`MappedFrameBuffer`]. Everything else is safe code over the backend
//! traits.

pub mod backend;
pub mod camera;
pub mod camera_configuration;
pub mod camera_manager;
pub mod controls;
pub mod error;
pub mod frame_buffer;
pub mod frame_buffer_allocator;
pub mod geometry;
pub mod handle;
pub mod pixel_format;
pub mod request;
pub mod signal;
pub mod slot;
pub mod stream;

pub use backend::virtual_camera::{VirtualCameraConfig, VirtualConfig, VirtualFormat};
pub use camera::Camera;
pub use camera_configuration::{CameraConfiguration, CameraConfigurationStatus};
pub use camera_manager::CameraManager;
pub use controls::{Control, ControlId, ControlInfo, ControlInfoMap, ControlList, ControlValue};
pub use error::{Error, Result};
pub use frame_buffer::{FrameBuffer, FrameBufferPlane, FrameMetadata, FrameStatus, MappedFrameBuffer};
pub use frame_buffer_allocator::FrameBufferAllocator;
pub use geometry::{Rectangle, Size, SizeRange};
pub use handle::{CameraHandle, FrameBufferHandle, RequestHandle, StreamHandle};
pub use pixel_format::PixelFormat;
pub use request::{CompletedRequest, Request, RequestStatus, ReuseFlag};
pub use slot::RequestCompleteSlot;
pub use stream::{StreamConfig, StreamFormats, StreamRole};
