// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Low-level cxx bindings for libcamera.
//!
//! The bridge exposes libcamera's objects as opaque C++ types and moves
//! every value across the boundary as a plain "wire" struct, so nothing on
//! the Rust side depends on libcamera's class layouts. All functions live in
//! the `lcb` namespace of `shim.cc`.
//!
//! Built without bindings when pkg-config cannot find libcamera; check
//! [`AVAILABLE`] before relying on [`ffi`].

/// Whether the bindings were built against a libcamera installation.
pub const AVAILABLE: bool = cfg!(has_libcamera);

#[cfg(has_libcamera)]
#[cxx::bridge(namespace = "lcb")]
pub mod ffi {
    struct CameraPtr {
        camera: SharedPtr<Camera>,
    }

    struct StreamPtr {
        stream: *mut Stream,
    }

    struct FrameBufferPtr {
        buffer: *mut FrameBuffer,
    }

    struct BufferMapEntry {
        stream: *mut Stream,
        buffer: *mut FrameBuffer,
    }

    #[derive(Debug, Clone, Copy, Default)]
    struct PixelFormatWire {
        fourcc: u32,
        modifier: u64,
    }

    #[derive(Debug, Clone, Copy, Default)]
    struct SizeWire {
        width: u32,
        height: u32,
    }

    #[derive(Debug, Clone, Copy, Default)]
    struct RectangleWire {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    }

    #[derive(Debug, Clone, Copy, Default)]
    struct StreamConfigWire {
        pixel_format: PixelFormatWire,
        size: SizeWire,
        stride: u32,
        frame_size: u32,
        buffer_count: u32,
    }

    #[derive(Debug, Clone, Default)]
    struct StreamFormatWire {
        pixel_format: PixelFormatWire,
        sizes: Vec<SizeWire>,
        min: SizeWire,
        max: SizeWire,
        h_step: u32,
        v_step: u32,
    }

    /// A `ControlValue`. Only the vector matching `control_type` is
    /// populated; scalars are one-element vectors.
    #[derive(Debug, Clone, Default)]
    struct ControlValueWire {
        control_type: u32,
        is_array: bool,
        bools: Vec<bool>,
        bytes: Vec<u8>,
        int32s: Vec<i32>,
        int64s: Vec<i64>,
        floats: Vec<f32>,
        text: String,
        rectangles: Vec<RectangleWire>,
        sizes: Vec<SizeWire>,
    }

    #[derive(Debug, Clone, Default)]
    struct ControlEntryWire {
        id: u32,
        value: ControlValueWire,
    }

    #[derive(Debug, Clone, Default)]
    struct ControlInfoWire {
        id: u32,
        name: String,
        control_type: u32,
        is_array: bool,
        min: ControlValueWire,
        max: ControlValueWire,
        def: ControlValueWire,
        values: Vec<ControlValueWire>,
    }

    #[derive(Debug, Clone, Copy, Default)]
    struct PlaneWire {
        fd: i32,
        offset: u32,
        length: u32,
    }

    #[derive(Debug, Clone, Default)]
    struct FrameMetadataWire {
        status: u32,
        sequence: u32,
        timestamp: u64,
        bytes_used: Vec<u32>,
    }

    extern "Rust" {
        type CompletionContext;
    }

    #[namespace = "libcamera"]
    unsafe extern "C++" {
        include!("libcamera-sys/src/shim.h");

        type CameraManager;
        type Camera;
        type CameraConfiguration;
        type Request;
        type Stream;
        type FrameBuffer;
        type FrameBufferAllocator;
    }

    unsafe extern "C++" {
        include!("libcamera-sys/src/shim.h");

        type RequestCompleteSlot;

        fn new_camera_manager() -> UniquePtr<CameraManager>;
        fn manager_start(manager: Pin<&mut CameraManager>) -> i32;
        fn manager_stop(manager: Pin<&mut CameraManager>);
        fn manager_version() -> String;
        fn manager_cameras(manager: &CameraManager) -> Vec<CameraPtr>;

        fn camera_id(camera: &SharedPtr<Camera>) -> String;
        fn camera_acquire(camera: &SharedPtr<Camera>) -> i32;
        fn camera_release(camera: &SharedPtr<Camera>) -> i32;
        fn camera_generate_configuration(
            camera: &SharedPtr<Camera>,
            roles: &[u32],
        ) -> UniquePtr<CameraConfiguration>;
        fn camera_configure(
            camera: &SharedPtr<Camera>,
            config: Pin<&mut CameraConfiguration>,
        ) -> i32;
        fn camera_start(
            camera: &SharedPtr<Camera>,
            controls: &[ControlEntryWire],
            with_controls: bool,
        ) -> i32;
        fn camera_stop(camera: &SharedPtr<Camera>) -> i32;
        fn camera_create_request(camera: &SharedPtr<Camera>, cookie: u64) -> UniquePtr<Request>;
        fn camera_queue_request(camera: &SharedPtr<Camera>, request: Pin<&mut Request>) -> i32;
        fn camera_streams(camera: &SharedPtr<Camera>) -> Vec<StreamPtr>;
        fn camera_controls(camera: &SharedPtr<Camera>) -> Vec<ControlInfoWire>;
        fn camera_properties(camera: &SharedPtr<Camera>) -> Vec<ControlEntryWire>;
        fn camera_connect_request_completed(
            camera: &SharedPtr<Camera>,
            handler: fn(&CompletionContext, &Request),
            context: Box<CompletionContext>,
        ) -> UniquePtr<RequestCompleteSlot>;

        fn config_len(config: &CameraConfiguration) -> usize;
        fn config_add(config: Pin<&mut CameraConfiguration>, stream: &StreamConfigWire);
        fn config_validate(config: Pin<&mut CameraConfiguration>) -> u32;
        fn config_get(config: &CameraConfiguration, index: usize) -> StreamConfigWire;
        fn config_set(
            config: Pin<&mut CameraConfiguration>,
            index: usize,
            stream: &StreamConfigWire,
        );
        fn config_stream(config: &CameraConfiguration, index: usize) -> *mut Stream;
        fn config_formats(config: &CameraConfiguration, index: usize) -> Vec<StreamFormatWire>;

        fn request_cookie(request: &Request) -> u64;
        fn request_sequence(request: &Request) -> u32;
        fn request_status(request: &Request) -> u32;
        unsafe fn request_add_buffer(
            request: Pin<&mut Request>,
            stream: *const Stream,
            buffer: *mut FrameBuffer,
        ) -> i32;
        unsafe fn request_find_buffer(request: &Request, stream: *const Stream)
            -> *mut FrameBuffer;
        fn request_buffers(request: &Request) -> Vec<BufferMapEntry>;
        fn request_has_pending_buffers(request: &Request) -> bool;
        fn request_reuse(request: Pin<&mut Request>, reuse_buffers: bool);
        fn request_controls(request: &Request) -> Vec<ControlEntryWire>;
        fn request_set_controls(request: Pin<&mut Request>, controls: &[ControlEntryWire]);
        fn request_metadata(request: &Request) -> Vec<ControlEntryWire>;

        fn new_frame_buffer_allocator(
            camera: &SharedPtr<Camera>,
        ) -> UniquePtr<FrameBufferAllocator>;
        unsafe fn allocator_allocate(
            allocator: Pin<&mut FrameBufferAllocator>,
            stream: *mut Stream,
        ) -> i32;
        fn allocator_allocated(allocator: &FrameBufferAllocator) -> bool;
        unsafe fn allocator_buffers(
            allocator: &FrameBufferAllocator,
            stream: *mut Stream,
        ) -> Vec<FrameBufferPtr>;

        unsafe fn frame_buffer_planes(buffer: *const FrameBuffer) -> Vec<PlaneWire>;
        unsafe fn frame_buffer_metadata(buffer: *const FrameBuffer) -> FrameMetadataWire;
    }
}

/// Closure run for every request a camera completes.
#[cfg(has_libcamera)]
pub struct CompletionContext {
    handler: Box<dyn Fn(&ffi::Request) + Send + Sync>,
}

#[cfg(has_libcamera)]
fn deliver(context: &CompletionContext, request: &ffi::Request) {
    (context.handler)(request)
}

/// Connects `handler` to the camera's `requestCompleted` signal.
///
/// The connection lasts until the returned slot is dropped. The handler
/// runs on libcamera's pipeline thread and must not unwind.
#[cfg(has_libcamera)]
pub fn connect_request_completed<F>(
    camera: &cxx::SharedPtr<ffi::Camera>,
    handler: F,
) -> cxx::UniquePtr<ffi::RequestCompleteSlot>
where
    F: Fn(&ffi::Request) + Send + Sync + 'static,
{
    let context = Box::new(CompletionContext {
        handler: Box::new(handler),
    });
    ffi::camera_connect_request_completed(camera, deliver, context)
}

// libcamera's Camera and its signal are documented as thread-safe; the
// remaining objects are only ever used behind a lock.
#[cfg(has_libcamera)]
unsafe impl Send for ffi::CameraManager {}
#[cfg(has_libcamera)]
unsafe impl Send for ffi::Camera {}
#[cfg(has_libcamera)]
unsafe impl Sync for ffi::Camera {}
#[cfg(has_libcamera)]
unsafe impl Send for ffi::CameraConfiguration {}
#[cfg(has_libcamera)]
unsafe impl Send for ffi::Request {}
#[cfg(has_libcamera)]
unsafe impl Send for ffi::FrameBufferAllocator {}
#[cfg(has_libcamera)]
unsafe impl Send for ffi::RequestCompleteSlot {}
#[cfg(has_libcamera)]
unsafe impl Sync for ffi::RequestCompleteSlot {}
