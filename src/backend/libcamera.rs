// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Backend over the system libcamera, through the `libcamera-sys` bridge.
//!
//! Native objects cross the boundary as opaque pointers and every value as a
//! wire struct, converted here into the crate's own types. Handles are keyed
//! by native address.
//!
//! Each camera wrapper owns a single native `requestCompleted` connection
//! that forwards into a Rust [`Signal`]; completion handlers subscribe to
//! that signal. Queued requests are kept alive in an in-flight table until
//! libcamera hands them back, so dropping a [`Request`](crate::Request)
//! while it is queued never frees memory libcamera still uses.

use std::{
    any::Any,
    cell::Cell,
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Weak},
    thread,
};

use cxx::{SharedPtr, UniquePtr};
use libcamera_sys::ffi;
use parking_lot::Mutex;
use tracing::{debug, error, instrument, trace, warn};

use super::{
    NativeAllocator, NativeCamera, NativeConfiguration, NativeConnection, NativeManager,
    NativeRequest, RequestCompletedFn,
};
use crate::{
    camera_configuration::CameraConfigurationStatus,
    controls::{
        ControlArray, ControlElement, ControlId, ControlInfo, ControlInfoMap, ControlKind,
        ControlList, ControlScalar, ControlType, ControlValue,
    },
    error::{errno, Error, Result},
    frame_buffer::{FrameBufferPlane, FrameMetadata, FramePlaneMetadata, FrameStatus},
    geometry::{Rectangle, Size, SizeRange},
    handle::{CameraHandle, FrameBufferHandle, RawHandle, RequestHandle, StreamHandle},
    pixel_format::PixelFormat,
    request::{RequestStatus, ReuseFlag},
    signal::{Connection, Signal},
    stream::{StreamConfig, StreamFormatEntry, StreamFormats, StreamRole},
};

thread_local! {
    /// Address of the camera whose completion is being delivered on this
    /// thread, 0 outside deliveries.
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

fn control_type_from_wire(value: u32) -> ControlType {
    match value {
        1 => ControlType::Bool,
        2 => ControlType::Byte,
        3 => ControlType::Int32,
        4 => ControlType::Int64,
        5 => ControlType::Float,
        6 => ControlType::String,
        7 => ControlType::Rectangle,
        8 => ControlType::Size,
        _ => ControlType::None,
    }
}

fn control_type_to_wire(value: ControlType) -> u32 {
    match value {
        ControlType::None => 0,
        ControlType::Bool => 1,
        ControlType::Byte => 2,
        ControlType::Int32 => 3,
        ControlType::Int64 => 4,
        ControlType::Float => 5,
        ControlType::String => 6,
        ControlType::Rectangle => 7,
        ControlType::Size => 8,
    }
}

fn size_from_wire(size: &ffi::SizeWire) -> Size {
    Size::new(size.width, size.height)
}

fn size_to_wire(size: &Size) -> ffi::SizeWire {
    ffi::SizeWire {
        width: size.width,
        height: size.height,
    }
}

fn rectangle_from_wire(rect: &ffi::RectangleWire) -> Rectangle {
    Rectangle::new(rect.x, rect.y, rect.width, rect.height)
}

fn rectangle_to_wire(rect: &Rectangle) -> ffi::RectangleWire {
    ffi::RectangleWire {
        x: rect.x,
        y: rect.y,
        width: rect.width,
        height: rect.height,
    }
}

fn collect_value<T: ControlElement>(values: Vec<T>, is_array: bool) -> ControlValue {
    if is_array {
        return ControlValue::Array(T::into_array(values));
    }
    values
        .into_iter()
        .next()
        .map(|v| ControlValue::Scalar(v.into_scalar()))
        .unwrap_or_default()
}

fn value_from_wire(wire: &ffi::ControlValueWire) -> ControlValue {
    let is_array = wire.is_array;
    match control_type_from_wire(wire.control_type) {
        ControlType::None => ControlValue::None,
        ControlType::Bool => collect_value(wire.bools.clone(), is_array),
        ControlType::Byte => collect_value(wire.bytes.clone(), is_array),
        ControlType::Int32 => collect_value(wire.int32s.clone(), is_array),
        ControlType::Int64 => collect_value(wire.int64s.clone(), is_array),
        ControlType::Float => collect_value(wire.floats.clone(), is_array),
        ControlType::String => ControlValue::String(wire.text.clone()),
        ControlType::Rectangle => collect_value(
            wire.rectangles.iter().map(rectangle_from_wire).collect(),
            is_array,
        ),
        ControlType::Size => collect_value(wire.sizes.iter().map(size_from_wire).collect(), is_array),
    }
}

fn value_to_wire(value: &ControlValue) -> Result<ffi::ControlValueWire> {
    let mut wire = ffi::ControlValueWire {
        control_type: control_type_to_wire(value.control_type()),
        is_array: value.is_array(),
        ..Default::default()
    };

    match value {
        ControlValue::None => {}
        ControlValue::Scalar(scalar) => match *scalar {
            ControlScalar::Bool(v) => wire.bools.push(v),
            ControlScalar::Byte(v) => wire.bytes.push(v),
            ControlScalar::Int32(v) => wire.int32s.push(v),
            ControlScalar::Int64(v) => wire.int64s.push(v),
            ControlScalar::Float(v) => wire.floats.push(v),
            ControlScalar::Rectangle(v) => wire.rectangles.push(rectangle_to_wire(&v)),
            ControlScalar::Size(v) => wire.sizes.push(size_to_wire(&v)),
        },
        ControlValue::Array(array) => match array {
            ControlArray::Bool(v) => wire.bools = v.clone(),
            ControlArray::Byte(v) => wire.bytes = v.clone(),
            ControlArray::Int32(v) => wire.int32s = v.clone(),
            ControlArray::Int64(v) => wire.int64s = v.clone(),
            ControlArray::Float(v) => wire.floats = v.clone(),
            ControlArray::Rectangle(v) => wire.rectangles = v.iter().map(rectangle_to_wire).collect(),
            ControlArray::Size(v) => wire.sizes = v.iter().map(size_to_wire).collect(),
        },
        ControlValue::String(text) => wire.text = text.clone(),
        ControlValue::StringArray(_) => {
            return Err(Error::Unsupported(
                "string array control values cannot be passed to libcamera".to_owned(),
            ))
        }
    }

    Ok(wire)
}

fn list_from_wire(mut list: ControlList, entries: Vec<ffi::ControlEntryWire>) -> ControlList {
    list.extend(entries.iter().map(|e| (e.id, value_from_wire(&e.value))));
    list
}

fn list_to_wire(list: &ControlList) -> Result<Vec<ffi::ControlEntryWire>> {
    list.entries()
        .map(|(id, value)| {
            Ok(ffi::ControlEntryWire {
                id,
                value: value_to_wire(value)?,
            })
        })
        .collect()
}

fn info_from_wire(wire: &ffi::ControlInfoWire) -> (ControlId, ControlInfo) {
    let kind = ControlKind {
        control_type: control_type_from_wire(wire.control_type),
        is_array: wire.is_array,
    };
    let info = ControlInfo {
        min: value_from_wire(&wire.min),
        max: value_from_wire(&wire.max),
        def: value_from_wire(&wire.def),
        values: wire.values.iter().map(value_from_wire).collect(),
    };
    (ControlId::new(wire.id, wire.name.clone(), kind), info)
}

fn stream_config_from_wire(wire: &ffi::StreamConfigWire) -> StreamConfig {
    StreamConfig {
        pixel_format: PixelFormat::new(wire.pixel_format.fourcc, wire.pixel_format.modifier),
        size: size_from_wire(&wire.size),
        stride: wire.stride,
        frame_size: wire.frame_size,
        buffer_count: wire.buffer_count,
    }
}

fn stream_config_to_wire(config: &StreamConfig) -> ffi::StreamConfigWire {
    ffi::StreamConfigWire {
        pixel_format: ffi::PixelFormatWire {
            fourcc: config.pixel_format.fourcc(),
            modifier: config.pixel_format.modifier(),
        },
        size: size_to_wire(&config.size),
        stride: config.stride,
        frame_size: config.frame_size,
        buffer_count: config.buffer_count,
    }
}

fn formats_from_wire(formats: Vec<ffi::StreamFormatWire>) -> StreamFormats {
    StreamFormats::new(
        formats
            .iter()
            .map(|f| StreamFormatEntry {
                pixel_format: PixelFormat::new(f.pixel_format.fourcc, f.pixel_format.modifier),
                sizes: f.sizes.iter().map(size_from_wire).collect(),
                range: SizeRange::new(
                    size_from_wire(&f.min),
                    size_from_wire(&f.max),
                    f.h_step,
                    f.v_step,
                ),
            })
            .collect(),
    )
}

fn metadata_from_wire(wire: ffi::FrameMetadataWire) -> FrameMetadata {
    FrameMetadata {
        status: match wire.status {
            0 => FrameStatus::Success,
            2 => FrameStatus::Cancelled,
            _ => FrameStatus::Error,
        },
        sequence: wire.sequence,
        timestamp: wire.timestamp,
        planes: wire
            .bytes_used
            .iter()
            .map(|&bytes_used| FramePlaneMetadata { bytes_used })
            .collect(),
    }
}

fn role_to_wire(role: StreamRole) -> u32 {
    match role {
        StreamRole::Raw => 0,
        StreamRole::StillCapture => 1,
        StreamRole::VideoRecording => 2,
        StreamRole::Viewfinder => 3,
    }
}

fn stream_handle(stream: *mut ffi::Stream) -> StreamHandle {
    StreamHandle::from_raw(RawHandle::from_ptr(stream))
}

fn buffer_handle(buffer: *mut ffi::FrameBuffer) -> FrameBufferHandle {
    FrameBufferHandle::from_raw(RawHandle::from_ptr(buffer))
}

/// libcamera's process-wide `CameraManager`.
pub struct LibcameraManager {
    manager: UniquePtr<ffi::CameraManager>,
    started: bool,
    /// One wrapper per native camera, so every `Camera` sees the same
    /// completion signal.
    cameras: Mutex<HashMap<usize, Weak<LibcameraCamera>>>,
}

impl LibcameraManager {
    pub fn new() -> Result<Self> {
        let manager = ffi::new_camera_manager();
        if manager.is_null() {
            return Err(Error::AllocationFailed("camera manager"));
        }
        Ok(Self {
            manager,
            started: false,
            cameras: Mutex::new(HashMap::new()),
        })
    }
}

impl NativeManager for LibcameraManager {
    fn start(&mut self) -> Result<()> {
        if self.started {
            return errno::err("start", libc::EBUSY);
        }
        errno::ok_if_zero("start", ffi::manager_start(self.manager.pin_mut()))?;
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        if self.started {
            ffi::manager_stop(self.manager.pin_mut());
            self.started = false;
        }
    }

    fn version(&self) -> String {
        ffi::manager_version()
    }

    fn cameras(&self) -> Vec<Arc<dyn NativeCamera>> {
        let natives = ffi::manager_cameras(&self.manager);
        let mut cache = self.cameras.lock();
        cache.retain(|_, weak| weak.strong_count() > 0);

        let mut cameras: Vec<Arc<dyn NativeCamera>> = Vec::with_capacity(natives.len());
        for native in natives {
            let Some(addr) = native.camera.as_ref().map(|c| c as *const ffi::Camera as usize) else {
                continue;
            };
            let camera = match cache.get(&addr).and_then(Weak::upgrade) {
                Some(camera) => camera,
                None => {
                    let camera = LibcameraCamera::new(native.camera, addr);
                    cache.insert(addr, Arc::downgrade(&camera));
                    camera
                }
            };
            cameras.push(camera);
        }
        cameras
    }
}

/// A native request and the address it was created at.
struct RequestCell {
    addr: usize,
    cookie: u64,
    ptr: Mutex<UniquePtr<ffi::Request>>,
}

struct CamInner {
    camera: SharedPtr<ffi::Camera>,
    addr: usize,
    id: String,
    completed: Signal<LibcameraRequest>,
    /// Queued requests by native address.
    in_flight: Mutex<HashMap<usize, Arc<RequestCell>>>,
    /// Streams of the last applied configuration, in configuration order.
    streams: Mutex<Vec<StreamHandle>>,
}

impl CamInner {
    fn deliver(self: &Arc<Self>, request: &ffi::Request) {
        let addr = request as *const ffi::Request as usize;
        let Some(cell) = self.in_flight.lock().remove(&addr) else {
            trace!(camera = %self.id, addr, "completion for a request not queued here");
            return;
        };

        let view = LibcameraRequest {
            cell,
            camera: self.clone(),
        };
        let previous = DELIVERING.with(|d| d.replace(self.addr));
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.completed.emit(&view)));
        DELIVERING.with(|d| d.set(previous));

        if result.is_err() {
            error!(camera = %self.id, cookie = view.cell.cookie, "request completion handler panicked");
        }
    }
}

pub struct LibcameraCamera {
    inner: Arc<CamInner>,
    slot: Option<UniquePtr<ffi::RequestCompleteSlot>>,
}

impl LibcameraCamera {
    fn new(camera: SharedPtr<ffi::Camera>, addr: usize) -> Arc<Self> {
        let inner = Arc::new(CamInner {
            id: ffi::camera_id(&camera),
            camera,
            addr,
            completed: Signal::new(),
            in_flight: Mutex::new(HashMap::new()),
            streams: Mutex::new(Vec::new()),
        });

        let weak = Arc::downgrade(&inner);
        let slot = libcamera_sys::connect_request_completed(&inner.camera, move |request| {
            if let Some(inner) = weak.upgrade() {
                inner.deliver(request);
            }
        });
        debug!(camera = %inner.id, "connected to requestCompleted");

        Arc::new(Self {
            inner,
            slot: Some(slot),
        })
    }
}

impl Drop for LibcameraCamera {
    fn drop(&mut self) {
        let delivering = DELIVERING.with(|d| d.get()) == self.inner.addr;

        if !delivering && !self.inner.in_flight.lock().is_empty() {
            warn!(camera = %self.inner.id, "camera dropped with requests queued, stopping");
            if let Err(e) = errno::ok_if_zero("stop", ffi::camera_stop(&self.inner.camera)) {
                error!(camera = %self.inner.id, "{e}");
            }
        }

        let Some(slot) = self.slot.take() else {
            return;
        };
        if delivering {
            // The native slot is locked by the delivery running on this
            // thread and can only be destroyed once that delivery returns.
            let reaper = thread::Builder::new()
                .name("lcb-slot-reaper".to_owned())
                .spawn(move || drop(slot));
            if let Err(e) = reaper {
                error!(camera = %self.inner.id, "cannot release completion slot: {e}");
            }
        } else {
            drop(slot);
        }
    }
}

impl NativeCamera for LibcameraCamera {
    fn id(&self) -> String {
        self.inner.id.clone()
    }

    fn handle(&self) -> CameraHandle {
        CameraHandle::from_raw(RawHandle::from_ptr(self.inner.addr as *const ffi::Camera))
    }

    fn acquire(&self) -> Result<()> {
        errno::ok_if_zero("acquire", ffi::camera_acquire(&self.inner.camera))
    }

    fn release(&self) -> Result<()> {
        errno::ok_if_zero("release", ffi::camera_release(&self.inner.camera))?;
        self.inner.streams.lock().clear();
        Ok(())
    }

    fn generate_configuration(&self, roles: &[StreamRole]) -> Option<Box<dyn NativeConfiguration>> {
        let roles: Vec<u32> = roles.iter().copied().map(role_to_wire).collect();
        let config = ffi::camera_generate_configuration(&self.inner.camera, &roles);
        if config.is_null() {
            return None;
        }
        Some(Box::new(LibcameraConfiguration {
            camera: self.inner.addr,
            config,
        }))
    }

    #[instrument(skip_all, fields(camera = %self.inner.id))]
    fn configure(&self, config: &mut dyn NativeConfiguration) -> Result<()> {
        let Some(config) = config.as_any_mut().downcast_mut::<LibcameraConfiguration>() else {
            return errno::err("configure", libc::EINVAL);
        };
        if config.camera != self.inner.addr {
            return errno::err("configure", libc::EINVAL);
        }

        errno::ok_if_zero(
            "configure",
            ffi::camera_configure(&self.inner.camera, config.config.pin_mut()),
        )?;

        let streams = (0..config.len()).filter_map(|i| config.stream(i)).collect();
        *self.inner.streams.lock() = streams;
        Ok(())
    }

    fn start(&self, controls: Option<&ControlList>) -> Result<()> {
        let ret = match controls {
            Some(list) => ffi::camera_start(&self.inner.camera, &list_to_wire(list)?, true),
            None => ffi::camera_start(&self.inner.camera, &[], false),
        };
        errno::ok_if_zero("start", ret)
    }

    fn stop(&self) -> Result<()> {
        errno::ok_if_zero("stop", ffi::camera_stop(&self.inner.camera))
    }

    fn create_request(&self, cookie: u64) -> Option<Box<dyn NativeRequest>> {
        let ptr = ffi::camera_create_request(&self.inner.camera, cookie);
        let addr = ptr.as_ref()? as *const ffi::Request as usize;
        Some(Box::new(LibcameraRequest {
            cell: Arc::new(RequestCell {
                addr,
                cookie,
                ptr: Mutex::new(ptr),
            }),
            camera: self.inner.clone(),
        }))
    }

    fn queue_request(&self, request: &mut dyn NativeRequest) -> Result<()> {
        let Some(request) = request.as_any_mut().downcast_mut::<LibcameraRequest>() else {
            return errno::err("queue_request", libc::EXDEV);
        };
        if !Arc::ptr_eq(&request.camera, &self.inner) {
            return errno::err("queue_request", libc::EXDEV);
        }

        let cell = request.cell.clone();
        {
            let mut in_flight = self.inner.in_flight.lock();
            if in_flight.contains_key(&cell.addr) {
                return errno::err("queue_request", libc::EBUSY);
            }
            in_flight.insert(cell.addr, cell.clone());
        }

        let ret = {
            let mut ptr = cell.ptr.lock();
            ffi::camera_queue_request(&self.inner.camera, ptr.pin_mut())
        };
        if ret < 0 {
            self.inner.in_flight.lock().remove(&cell.addr);
        }
        errno::ok_if_zero("queue_request", ret)
    }

    fn streams(&self) -> Vec<StreamHandle> {
        let active: Vec<StreamHandle> = ffi::camera_streams(&self.inner.camera)
            .iter()
            .map(|s| stream_handle(s.stream))
            .collect();
        let mut ordered: Vec<StreamHandle> = self
            .inner
            .streams
            .lock()
            .iter()
            .copied()
            .filter(|s| active.contains(s))
            .collect();
        for stream in active {
            if !ordered.contains(&stream) {
                ordered.push(stream);
            }
        }
        ordered
    }

    fn controls(&self) -> ControlInfoMap {
        ffi::camera_controls(&self.inner.camera)
            .iter()
            .map(info_from_wire)
            .collect()
    }

    fn properties(&self) -> ControlList {
        list_from_wire(
            ControlList::properties(),
            ffi::camera_properties(&self.inner.camera),
        )
    }

    fn connect_request_completed(
        &self,
        handler: RequestCompletedFn,
    ) -> Result<Box<dyn NativeConnection>> {
        let connection = self
            .inner
            .completed
            .connect(move |request: &LibcameraRequest| handler(request));
        Ok(Box::new(LibcameraConnection(connection)))
    }

    fn new_allocator(&self) -> Result<Box<dyn NativeAllocator>> {
        let allocator = ffi::new_frame_buffer_allocator(&self.inner.camera);
        if allocator.is_null() {
            return Err(Error::AllocationFailed("frame buffer allocator"));
        }
        Ok(Box::new(LibcameraAllocator {
            camera: self.inner.clone(),
            allocator,
            streams: Vec::new(),
        }))
    }
}

struct LibcameraConnection(#[allow(dead_code)] Connection);

impl NativeConnection for LibcameraConnection {}

pub struct LibcameraConfiguration {
    camera: usize,
    config: UniquePtr<ffi::CameraConfiguration>,
}

impl LibcameraConfiguration {
    fn get(&self, index: usize) -> StreamConfig {
        stream_config_from_wire(&ffi::config_get(&self.config, index))
    }

    fn update(&mut self, index: usize, f: impl FnOnce(&mut ffi::StreamConfigWire)) {
        let mut wire = ffi::config_get(&self.config, index);
        f(&mut wire);
        ffi::config_set(self.config.pin_mut(), index, &wire);
    }
}

impl NativeConfiguration for LibcameraConfiguration {
    fn len(&self) -> usize {
        ffi::config_len(&self.config)
    }

    fn add_configuration(&mut self, config: &StreamConfig) {
        ffi::config_add(self.config.pin_mut(), &stream_config_to_wire(config));
    }

    fn validate(&mut self) -> CameraConfigurationStatus {
        match ffi::config_validate(self.config.pin_mut()) {
            0 => CameraConfigurationStatus::Valid,
            1 => CameraConfigurationStatus::Adjusted,
            _ => CameraConfigurationStatus::Invalid,
        }
    }

    fn pixel_format(&self, index: usize) -> PixelFormat {
        self.get(index).pixel_format
    }

    fn set_pixel_format(&mut self, index: usize, value: PixelFormat) {
        self.update(index, |w| {
            w.pixel_format = ffi::PixelFormatWire {
                fourcc: value.fourcc(),
                modifier: value.modifier(),
            }
        })
    }

    fn size(&self, index: usize) -> Size {
        self.get(index).size
    }

    fn set_size(&mut self, index: usize, value: Size) {
        self.update(index, |w| w.size = size_to_wire(&value))
    }

    fn stride(&self, index: usize) -> u32 {
        self.get(index).stride
    }

    fn set_stride(&mut self, index: usize, value: u32) {
        self.update(index, |w| w.stride = value)
    }

    fn frame_size(&self, index: usize) -> u32 {
        self.get(index).frame_size
    }

    fn set_frame_size(&mut self, index: usize, value: u32) {
        self.update(index, |w| w.frame_size = value)
    }

    fn buffer_count(&self, index: usize) -> u32 {
        self.get(index).buffer_count
    }

    fn set_buffer_count(&mut self, index: usize, value: u32) {
        self.update(index, |w| w.buffer_count = value)
    }

    fn stream(&self, index: usize) -> Option<StreamHandle> {
        let stream = ffi::config_stream(&self.config, index);
        (!stream.is_null()).then(|| stream_handle(stream))
    }

    fn formats(&self, index: usize) -> StreamFormats {
        formats_from_wire(ffi::config_formats(&self.config, index))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A request created by a libcamera camera, or the view of one handed to
/// completion handlers.
pub struct LibcameraRequest {
    cell: Arc<RequestCell>,
    camera: Arc<CamInner>,
}

impl LibcameraRequest {
    fn attached(&self, buffer: FrameBufferHandle) -> bool {
        ffi::request_buffers(&self.cell.ptr.lock())
            .iter()
            .any(|e| buffer_handle(e.buffer) == buffer)
    }
}

impl NativeRequest for LibcameraRequest {
    fn handle(&self) -> RequestHandle {
        RequestHandle::from_raw(RawHandle::from_ptr(self.cell.addr as *const ffi::Request))
    }

    fn cookie(&self) -> u64 {
        self.cell.cookie
    }

    fn sequence(&self) -> u32 {
        ffi::request_sequence(&self.cell.ptr.lock())
    }

    fn status(&self) -> RequestStatus {
        match ffi::request_status(&self.cell.ptr.lock()) {
            1 => RequestStatus::Complete,
            2 => RequestStatus::Cancelled,
            _ => RequestStatus::Pending,
        }
    }

    fn add_buffer(&mut self, stream: StreamHandle, buffer: FrameBufferHandle) -> Result<()> {
        if !self.camera.streams.lock().contains(&stream) {
            return errno::err("add_buffer", libc::EINVAL);
        }
        let mut ptr = self.cell.ptr.lock();
        // The stream belongs to the active configuration and the buffer is
        // kept alive by its allocator for as long as the request holds it.
        let ret = unsafe {
            ffi::request_add_buffer(
                ptr.pin_mut(),
                stream.as_ptr::<ffi::Stream>(),
                buffer.as_ptr::<ffi::FrameBuffer>(),
            )
        };
        errno::ok_if_zero("add_buffer", ret)
    }

    fn find_buffer(&self, stream: StreamHandle) -> Option<FrameBufferHandle> {
        // Only used as a map key on the native side.
        let buffer =
            unsafe { ffi::request_find_buffer(&self.cell.ptr.lock(), stream.as_ptr::<ffi::Stream>()) };
        (!buffer.is_null()).then(|| buffer_handle(buffer))
    }

    fn buffers(&self) -> Vec<(StreamHandle, FrameBufferHandle)> {
        ffi::request_buffers(&self.cell.ptr.lock())
            .iter()
            .map(|e| (stream_handle(e.stream), buffer_handle(e.buffer)))
            .collect()
    }

    fn buffer_metadata(&self, buffer: FrameBufferHandle) -> Option<FrameMetadata> {
        if !self.attached(buffer) {
            return None;
        }
        let wire = unsafe { ffi::frame_buffer_metadata(buffer.as_ptr::<ffi::FrameBuffer>()) };
        Some(metadata_from_wire(wire))
    }

    fn has_pending_buffers(&self) -> bool {
        ffi::request_has_pending_buffers(&self.cell.ptr.lock())
    }

    fn reuse(&mut self, flag: ReuseFlag) {
        if self.camera.in_flight.lock().contains_key(&self.cell.addr) {
            warn!(cookie = self.cell.cookie, "reuse of a queued request ignored");
            return;
        }
        ffi::request_reuse(self.cell.ptr.lock().pin_mut(), flag == ReuseFlag::ReuseBuffers);
    }

    fn controls(&self) -> ControlList {
        list_from_wire(ControlList::new(), ffi::request_controls(&self.cell.ptr.lock()))
    }

    fn set_controls(&mut self, controls: &ControlList) {
        match list_to_wire(controls) {
            Ok(wire) => ffi::request_set_controls(self.cell.ptr.lock().pin_mut(), &wire),
            Err(e) => warn!(cookie = self.cell.cookie, "controls not applied: {e}"),
        }
    }

    fn metadata(&self) -> ControlList {
        list_from_wire(ControlList::new(), ffi::request_metadata(&self.cell.ptr.lock()))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub struct LibcameraAllocator {
    camera: Arc<CamInner>,
    allocator: UniquePtr<ffi::FrameBufferAllocator>,
    streams: Vec<StreamHandle>,
}

impl LibcameraAllocator {
    fn check_owned(&self, buffer: FrameBufferHandle) -> Result<()> {
        if self.streams.iter().any(|s| self.buffers(*s).contains(&buffer)) {
            Ok(())
        } else {
            Err(Error::StaleHandle(FrameBufferHandle::KIND))
        }
    }
}

impl NativeAllocator for LibcameraAllocator {
    fn allocate(&mut self, stream: StreamHandle) -> Result<usize> {
        let active = ffi::camera_streams(&self.camera.camera);
        if !active.iter().any(|s| stream_handle(s.stream) == stream) {
            return errno::err("allocate", libc::EINVAL);
        }

        // `stream` is one of the camera's configured streams.
        let ret = unsafe { ffi::allocator_allocate(self.allocator.pin_mut(), stream.as_ptr()) };
        let count = errno::to_result("allocate", ret)? as usize;
        if !self.streams.contains(&stream) {
            self.streams.push(stream);
        }
        Ok(count)
    }

    fn allocated(&self) -> bool {
        ffi::allocator_allocated(&self.allocator)
    }

    fn buffers(&self, stream: StreamHandle) -> Vec<FrameBufferHandle> {
        if !self.streams.contains(&stream) {
            return Vec::new();
        }
        unsafe { ffi::allocator_buffers(&self.allocator, stream.as_ptr()) }
            .iter()
            .map(|b| buffer_handle(b.buffer))
            .collect()
    }

    fn planes(&self, buffer: FrameBufferHandle) -> Result<Vec<FrameBufferPlane>> {
        self.check_owned(buffer)?;
        let planes = unsafe { ffi::frame_buffer_planes(buffer.as_ptr::<ffi::FrameBuffer>()) };
        Ok(planes
            .iter()
            .map(|p| FrameBufferPlane {
                fd: p.fd,
                offset: p.offset,
                length: p.length,
            })
            .collect())
    }

    fn metadata(&self, buffer: FrameBufferHandle) -> Result<FrameMetadata> {
        self.check_owned(buffer)?;
        let wire = unsafe { ffi::frame_buffer_metadata(buffer.as_ptr::<ffi::FrameBuffer>()) };
        Ok(metadata_from_wire(wire))
    }
}
