// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! In-process cameras with libcamera's observable behaviour.
//!
//! Virtual cameras follow libcamera's camera state machine and report the
//! same errno values for out-of-order calls. Buffers are memfd-backed, laid
//! out plane by plane in a single fd as libcamera's dmabuf allocator does.
//! Each running camera owns a worker thread that completes queued requests
//! one frame interval apart, fills their buffers with the frame sequence
//! number and emits the request-completed signal from that thread.

use std::{
    any::Any,
    collections::HashSet,
    ffi::CString,
    fs::File,
    io,
    os::fd::{AsRawFd, FromRawFd, OwnedFd},
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
        Arc, Weak,
    },
    thread::{self, JoinHandle, ThreadId},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use super::{
    NativeAllocator, NativeCamera, NativeConfiguration, NativeConnection, NativeManager,
    NativeRequest, RequestCompletedFn,
};
use crate::{
    camera_configuration::CameraConfigurationStatus,
    controls::{self, properties, ControlInfo, ControlInfoMap, ControlList, ControlValue},
    error::{errno, Error, Result},
    frame_buffer::{FrameBufferPlane, FrameMetadata, FramePlaneMetadata, FrameStatus},
    geometry::{Rectangle, Size, SizeRange},
    handle::{CameraHandle, FrameBufferHandle, HandleTable, RawHandle, RequestHandle, StreamHandle},
    pixel_format::{formats, ColourEncoding, PixelFormat},
    request::{RequestStatus, ReuseFlag},
    signal::{Connection, Signal},
    stream::{StreamConfig, StreamFormatEntry, StreamFormats, StreamRole},
};

const DEFAULT_BUFFER_COUNT: u32 = 4;
const MAX_BUFFER_COUNT: u32 = 32;

/// A pixel format and the discrete sizes a virtual camera offers for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualFormat {
    pub pixel_format: PixelFormat,
    pub sizes: Vec<Size>,
}

/// Description of one virtual camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualCameraConfig {
    pub id: String,
    pub model: String,
    /// `properties::LOCATION` value.
    pub location: i32,
    pub rotation: i32,
    pub pixel_array_size: Size,
    pub formats: Vec<VirtualFormat>,
    /// Streams a single configuration may carry.
    pub max_streams: usize,
    /// Time between completed frames, in microseconds.
    pub frame_interval_us: u64,
    /// Write the frame sequence number into every byte of each buffer.
    pub fill_frames: bool,
}

impl Default for VirtualCameraConfig {
    fn default() -> Self {
        Self {
            id: "virtual-0".to_owned(),
            model: "virtual".to_owned(),
            location: properties::CAMERA_LOCATION_EXTERNAL,
            rotation: 0,
            pixel_array_size: Size::new(1920, 1080),
            formats: vec![VirtualFormat {
                pixel_format: formats::NV12,
                sizes: vec![Size::new(640, 480), Size::new(1280, 720), Size::new(1920, 1080)],
            }],
            max_streams: 1,
            frame_interval_us: 33_333,
            fill_frames: true,
        }
    }
}

/// Cameras presented by a virtual camera manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualConfig {
    pub cameras: Vec<VirtualCameraConfig>,
}

impl Default for VirtualConfig {
    /// A Raspberry Pi style CSI sensor and a USB webcam.
    fn default() -> Self {
        let common = [Size::new(640, 480), Size::new(1280, 720), Size::new(1920, 1080)];
        Self {
            cameras: vec![
                VirtualCameraConfig {
                    id: "/base/soc/i2c0mux/i2c@1/imx219@10".to_owned(),
                    model: "imx219".to_owned(),
                    location: properties::CAMERA_LOCATION_BACK,
                    rotation: 180,
                    pixel_array_size: Size::new(3280, 2464),
                    formats: vec![
                        VirtualFormat {
                            pixel_format: formats::NV12,
                            sizes: common.to_vec(),
                        },
                        VirtualFormat {
                            pixel_format: formats::YUV420,
                            sizes: common.to_vec(),
                        },
                        VirtualFormat {
                            pixel_format: formats::XRGB8888,
                            sizes: common.to_vec(),
                        },
                        VirtualFormat {
                            pixel_format: formats::SRGGB10_CSI2P,
                            sizes: vec![Size::new(1640, 1232), Size::new(3280, 2464)],
                        },
                    ],
                    max_streams: 2,
                    ..Default::default()
                },
                VirtualCameraConfig {
                    id: "/base/axi/pcie@120000/rp1/usb@200000-1:1.0-046d:0825".to_owned(),
                    model: "UVC Camera (046d:0825)".to_owned(),
                    location: properties::CAMERA_LOCATION_EXTERNAL,
                    rotation: 0,
                    pixel_array_size: Size::new(1280, 720),
                    formats: vec![
                        VirtualFormat {
                            pixel_format: formats::YUYV,
                            sizes: vec![
                                Size::new(320, 240),
                                Size::new(640, 480),
                                Size::new(1280, 720),
                            ],
                        },
                        VirtualFormat {
                            pixel_format: formats::MJPEG,
                            sizes: vec![Size::new(640, 480), Size::new(1280, 720)],
                        },
                    ],
                    max_streams: 1,
                    ..Default::default()
                },
            ],
        }
    }
}

impl VirtualConfig {
    /// Reads a JSON camera description.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(io::BufReader::new(file))?)
    }

    fn check(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for camera in &self.cameras {
            if !ids.insert(camera.id.as_str()) {
                return Err(Error::InvalidArgument(format!(
                    "duplicate virtual camera id {:?}",
                    camera.id
                )));
            }
            if camera.max_streams == 0 {
                return Err(Error::InvalidArgument(format!(
                    "virtual camera {:?} has no streams",
                    camera.id
                )));
            }
            for format in &camera.formats {
                for size in &format.sizes {
                    if size.width == 0 || size.height == 0 {
                        return Err(Error::InvalidArgument(format!(
                            "virtual camera {:?} offers empty size {}",
                            camera.id, size
                        )));
                    }
                    format
                        .pixel_format
                        .frame_size(size.width, size.height, 0)?;
                }
            }
        }
        Ok(())
    }
}

fn monotonic_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}

static NEXT_NAMESPACE: AtomicU32 = AtomicU32::new(1);

fn next_namespace() -> u32 {
    NEXT_NAMESPACE.fetch_add(1, Ordering::Relaxed)
}

pub struct VirtualManager {
    config: VirtualConfig,
    cameras: Vec<Arc<VirtualCamera>>,
    started: bool,
}

impl VirtualManager {
    pub fn new(config: VirtualConfig) -> Self {
        Self {
            config,
            cameras: Vec::new(),
            started: false,
        }
    }
}

impl NativeManager for VirtualManager {
    fn start(&mut self) -> Result<()> {
        if self.started {
            return errno::err("start", libc::EBUSY);
        }
        self.config.check()?;

        self.cameras = self
            .config
            .cameras
            .iter()
            .map(|c| Arc::new(VirtualCamera::new(c.clone())))
            .collect();
        self.started = true;
        debug!(cameras = self.cameras.len(), "virtual cameras enumerated");
        Ok(())
    }

    fn stop(&mut self) {
        self.cameras.clear();
        self.started = false;
    }

    fn version(&self) -> String {
        format!("v{} (virtual)", env!("CARGO_PKG_VERSION"))
    }

    fn cameras(&self) -> Vec<Arc<dyn NativeCamera>> {
        self.cameras
            .iter()
            .map(|c| c.clone() as Arc<dyn NativeCamera>)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Available,
    Acquired,
    Configured,
    Running,
}

struct BufferSlot {
    stream: StreamHandle,
    fd: OwnedFd,
    planes: Vec<FrameBufferPlane>,
    metadata: FrameMetadata,
}

enum Command {
    Capture(Arc<RequestShared>),
    Stop,
}

struct Worker {
    sender: kanal::Sender<Command>,
    stopping: Arc<AtomicBool>,
    thread: JoinHandle<()>,
    thread_id: ThreadId,
}

struct Inner {
    state: State,
    /// Streams of the active configuration, in configuration order.
    active: Vec<(StreamHandle, StreamConfig)>,
    buffers: HandleTable<FrameBufferHandle, BufferSlot>,
    worker: Option<Worker>,
    /// Worker stopped from its own completion handler, joined by the next
    /// `start`.
    stopped_worker: Option<JoinHandle<()>>,
    sequence: u32,
    start_controls: ControlList,
}

struct CameraState {
    config: VirtualCameraConfig,
    namespace: u32,
    /// Stream slots; the first N are bound by a configuration of N entries.
    streams: Vec<StreamHandle>,
    inner: Mutex<Inner>,
    completed: Signal<VirtualRequest>,
    next_allocator: AtomicU64,
}

impl CameraState {
    fn supported_formats(&self, role: Option<StreamRole>) -> StreamFormats {
        let raw_only = role == Some(StreamRole::Raw);
        let entries = self
            .config
            .formats
            .iter()
            .filter(|f| match role {
                None => true,
                Some(_) => is_raw(f.pixel_format) == raw_only,
            })
            .map(|f| {
                let min = f.sizes.iter().min_by_key(|s| s.area()).copied();
                let max = f.sizes.iter().max_by_key(|s| s.area()).copied();
                StreamFormatEntry {
                    pixel_format: f.pixel_format,
                    sizes: f.sizes.clone(),
                    range: SizeRange::new(
                        min.unwrap_or_default(),
                        max.unwrap_or_default(),
                        1,
                        1,
                    ),
                }
            })
            .collect();
        StreamFormats::new(entries)
    }
}

fn is_raw(pixel_format: PixelFormat) -> bool {
    pixel_format
        .info()
        .is_some_and(|i| i.colour_encoding == ColourEncoding::Raw)
}

/// Largest size fitting inside `target`, or the smallest size if none fits.
fn best_fit(sizes: &[Size], target: Size) -> Option<Size> {
    sizes
        .iter()
        .filter(|s| s.fits_in(&target))
        .max_by_key(|s| s.area())
        .or_else(|| sizes.iter().min_by_key(|s| s.area()))
        .copied()
}

fn default_size(role: StreamRole, sizes: &[Size]) -> Option<Size> {
    match role {
        StreamRole::Raw | StreamRole::StillCapture => sizes.iter().max_by_key(|s| s.area()).copied(),
        StreamRole::VideoRecording => best_fit(sizes, Size::new(1920, 1080)),
        StreamRole::Viewfinder => best_fit(sizes, Size::new(640, 480)),
    }
}

fn fill_layout(config: &mut StreamConfig) -> Result<()> {
    let Size { width, height } = config.size;
    config.stride = config.pixel_format.stride(width, 0, 0)?;
    config.frame_size = config.pixel_format.frame_size(width, height, 0)?;
    Ok(())
}

pub struct VirtualCamera {
    state: Arc<CameraState>,
}

impl VirtualCamera {
    pub fn new(config: VirtualCameraConfig) -> Self {
        let namespace = next_namespace();
        let mut slots: HandleTable<StreamHandle, usize> = HandleTable::with_namespace(namespace);
        let streams = (0..config.max_streams).map(|i| slots.insert(i)).collect();

        Self {
            state: Arc::new(CameraState {
                config,
                namespace,
                streams,
                inner: Mutex::new(Inner {
                    state: State::Available,
                    active: Vec::new(),
                    buffers: HandleTable::with_namespace(namespace),
                    worker: None,
                    stopped_worker: None,
                    sequence: 0,
                    start_controls: ControlList::new(),
                }),
                completed: Signal::new(),
                next_allocator: AtomicU64::new(1),
            }),
        }
    }

    fn spawn_worker(&self) -> Result<Worker> {
        let (sender, receiver) = kanal::unbounded::<Command>();
        let stopping = Arc::new(AtomicBool::new(false));
        let weak = Arc::downgrade(&self.state);
        let interval = Duration::from_micros(self.state.config.frame_interval_us);
        let flag = stopping.clone();

        let thread = thread::Builder::new()
            .name(format!("vcam-{}", self.state.namespace))
            .spawn(move || run_worker(weak, receiver, flag, interval))?;
        let thread_id = thread.thread().id();

        Ok(Worker {
            sender,
            stopping,
            thread,
            thread_id,
        })
    }
}

fn run_worker(
    state: Weak<CameraState>,
    receiver: kanal::Receiver<Command>,
    stopping: Arc<AtomicBool>,
    interval: Duration,
) {
    let mut next_frame = Instant::now() + interval;
    while let Ok(command) = receiver.recv() {
        let request = match command {
            Command::Capture(request) => request,
            Command::Stop => break,
        };

        let cancelled = stopping.load(Ordering::Acquire);
        if !cancelled {
            let now = Instant::now();
            if next_frame > now {
                thread::sleep(next_frame - now);
            }
            next_frame = next_frame.max(now) + interval;
        }

        let Some(state) = state.upgrade() else {
            break;
        };
        complete_request(&state, &request, cancelled || stopping.load(Ordering::Acquire));
    }
    trace!("virtual camera worker exiting");
}

fn fill_plane(fd: &OwnedFd, plane: &FrameBufferPlane, value: u8) -> io::Result<()> {
    let chunk = vec![value; (plane.length as usize).min(64 * 1024)];
    let mut written = 0usize;
    while written < plane.length as usize {
        let len = chunk.len().min(plane.length as usize - written);
        let offset = plane.offset as usize + written;
        let ret = unsafe {
            libc::pwrite(
                fd.as_raw_fd(),
                chunk.as_ptr().cast(),
                len,
                offset as libc::off_t,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        written += ret as usize;
    }
    Ok(())
}

fn complete_request(state: &Arc<CameraState>, request: &Arc<RequestShared>, cancelled: bool) {
    let timestamp = monotonic_ns();
    {
        let mut inner = state.inner.lock();
        let sequence = if cancelled {
            0
        } else {
            let s = inner.sequence;
            inner.sequence = inner.sequence.wrapping_add(1);
            s
        };

        let mut req = request.inner.lock();
        for (_, buffer) in &req.buffers {
            let Ok(slot) = inner.buffers.get_mut(*buffer) else {
                warn!(?buffer, "buffer freed while queued");
                continue;
            };

            slot.metadata = FrameMetadata {
                status: if cancelled {
                    FrameStatus::Cancelled
                } else {
                    FrameStatus::Success
                },
                sequence,
                timestamp,
                planes: slot
                    .planes
                    .iter()
                    .map(|p| FramePlaneMetadata {
                        bytes_used: if cancelled { 0 } else { p.length },
                    })
                    .collect(),
            };

            if !cancelled && state.config.fill_frames {
                for plane in &slot.planes {
                    if let Err(e) = fill_plane(&slot.fd, plane, sequence as u8) {
                        error!("filling frame buffer failed: {}", e);
                    }
                }
            }
        }

        req.queued = false;
        req.sequence = sequence;
        if cancelled {
            req.status = RequestStatus::Cancelled;
        } else {
            req.status = RequestStatus::Complete;
            let applied = req.controls.clone();
            req.metadata.update(&inner.start_controls);
            req.metadata.update(&applied);
            req.metadata
                .set_control(controls::SENSOR_TIMESTAMP, timestamp as i64);
            req.metadata.set_control(
                controls::FRAME_DURATION,
                state.config.frame_interval_us as i64,
            );
        }
        trace!(cookie = req.cookie, sequence, cancelled, "request completed");
    }

    let view = VirtualRequest {
        shared: request.clone(),
    };
    state.completed.emit(&view);
}

impl NativeCamera for VirtualCamera {
    fn id(&self) -> String {
        self.state.config.id.clone()
    }

    fn handle(&self) -> CameraHandle {
        CameraHandle::from_raw(RawHandle::from_ptr(Arc::as_ptr(&self.state)))
    }

    fn acquire(&self) -> Result<()> {
        let mut inner = self.state.inner.lock();
        if inner.state != State::Available {
            return errno::err("acquire", libc::EBUSY);
        }
        inner.state = State::Acquired;
        Ok(())
    }

    fn release(&self) -> Result<()> {
        let mut inner = self.state.inner.lock();
        match inner.state {
            State::Running => errno::err("release", libc::EBUSY),
            State::Available => Ok(()),
            State::Acquired | State::Configured => {
                inner.state = State::Available;
                inner.active.clear();
                Ok(())
            }
        }
    }

    fn generate_configuration(&self, roles: &[StreamRole]) -> Option<Box<dyn NativeConfiguration>> {
        if roles.len() > self.state.config.max_streams {
            debug!(roles = roles.len(), "too many roles for virtual camera");
            return None;
        }

        let mut entries = Vec::with_capacity(roles.len());
        for role in roles {
            let formats = self.state.supported_formats(Some(*role));
            let entry = formats.entries().first()?;
            let size = default_size(*role, &entry.sizes)?;
            let mut config = StreamConfig::new(entry.pixel_format, size, DEFAULT_BUFFER_COUNT);
            if let Err(e) = fill_layout(&mut config) {
                debug!("no layout for {}: {}", config, e);
                return None;
            }
            entries.push(ConfigEntry {
                config,
                stream: None,
                formats,
            });
        }

        Some(Box::new(VirtualConfiguration {
            state: self.state.clone(),
            entries,
        }))
    }

    fn configure(&self, config: &mut dyn NativeConfiguration) -> Result<()> {
        let Some(config) = config.as_any_mut().downcast_mut::<VirtualConfiguration>() else {
            return errno::err("configure", libc::EINVAL);
        };
        if !Arc::ptr_eq(&config.state, &self.state) {
            return errno::err("configure", libc::EINVAL);
        }

        let mut inner = self.state.inner.lock();
        if !matches!(inner.state, State::Acquired | State::Configured) {
            return errno::err("configure", libc::EACCES);
        }
        if config.validate() != CameraConfigurationStatus::Valid {
            return errno::err("configure", libc::EINVAL);
        }

        inner.active.clear();
        for (entry, stream) in config.entries.iter_mut().zip(&self.state.streams) {
            entry.stream = Some(*stream);
            inner.active.push((*stream, entry.config));
        }
        inner.state = State::Configured;
        Ok(())
    }

    fn start(&self, controls: Option<&ControlList>) -> Result<()> {
        let stopped = self.state.inner.lock().stopped_worker.take();
        if let Some(thread) = stopped {
            if thread.thread().id() == thread::current().id() {
                self.state.inner.lock().stopped_worker = Some(thread);
                return errno::err("start", libc::EBUSY);
            }
            if thread.join().is_err() {
                error!("virtual camera worker panicked");
            }
        }

        let mut inner = self.state.inner.lock();
        if inner.state != State::Configured {
            return errno::err("start", libc::EACCES);
        }

        inner.worker = Some(self.spawn_worker()?);
        inner.sequence = 0;
        inner.start_controls = controls.cloned().unwrap_or_default();
        inner.state = State::Running;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let worker = {
            let mut inner = self.state.inner.lock();
            if inner.state != State::Running {
                return Ok(());
            }
            inner.state = State::Configured;
            inner.worker.take()
        };

        if let Some(worker) = worker {
            worker.stopping.store(true, Ordering::Release);
            if worker.sender.send(Command::Stop).is_err() {
                warn!("virtual camera worker already gone");
            }
            if thread::current().id() == worker.thread_id {
                debug!("stop called from completion handler, joining worker on next start");
                self.state.inner.lock().stopped_worker = Some(worker.thread);
            } else if worker.thread.join().is_err() {
                error!("virtual camera worker panicked");
            }
        }
        Ok(())
    }

    fn create_request(&self, cookie: u64) -> Option<Box<dyn NativeRequest>> {
        let inner = self.state.inner.lock();
        if !matches!(inner.state, State::Configured | State::Running) {
            return None;
        }

        Some(Box::new(VirtualRequest {
            shared: Arc::new(RequestShared {
                cookie,
                camera: self.state.clone(),
                inner: Mutex::new(RequestInner {
                    status: RequestStatus::Pending,
                    sequence: 0,
                    queued: false,
                    buffers: Vec::new(),
                    controls: ControlList::new(),
                    metadata: ControlList::new(),
                    cookie,
                }),
            }),
        }))
    }

    fn queue_request(&self, request: &mut dyn NativeRequest) -> Result<()> {
        let Some(request) = request.as_any_mut().downcast_mut::<VirtualRequest>() else {
            return errno::err("queue_request", libc::EXDEV);
        };
        if !Arc::ptr_eq(&request.shared.camera, &self.state) {
            return errno::err("queue_request", libc::EXDEV);
        }

        let inner = self.state.inner.lock();
        if inner.state != State::Running {
            return errno::err("queue_request", libc::EACCES);
        }

        {
            let mut req = request.shared.inner.lock();
            if req.queued {
                return errno::err("queue_request", libc::EBUSY);
            }
            if req.status != RequestStatus::Pending || req.buffers.is_empty() {
                return errno::err("queue_request", libc::EINVAL);
            }
            for (stream, buffer) in &req.buffers {
                if !inner.active.iter().any(|(s, _)| s == stream) {
                    return errno::err("queue_request", libc::EINVAL);
                }
                inner.buffers.get(*buffer)?;
            }
            req.queued = true;
        }

        let sent = inner
            .worker
            .as_ref()
            .map(|w| w.sender.send(Command::Capture(request.shared.clone())).is_ok())
            .unwrap_or(false);
        if !sent {
            request.shared.inner.lock().queued = false;
            return errno::err("queue_request", libc::EIO);
        }
        Ok(())
    }

    fn streams(&self) -> Vec<StreamHandle> {
        self.state.inner.lock().active.iter().map(|(s, _)| *s).collect()
    }

    fn controls(&self) -> ControlInfoMap {
        let interval = self.state.config.frame_interval_us as i64;
        let array = Rectangle::from(self.state.config.pixel_array_size);
        let exposure_max = interval.min(i32::MAX as i64) as i32;

        [
            (
                controls::AE_ENABLE.control_id(),
                ControlInfo::new(false.into(), true.into(), true.into()),
            ),
            (
                controls::EXPOSURE_TIME.control_id(),
                ControlInfo::new(
                    100i32.into(),
                    exposure_max.into(),
                    exposure_max.min(10_000).into(),
                ),
            ),
            (
                controls::ANALOGUE_GAIN.control_id(),
                ControlInfo::new(1.0f32.into(), 16.0f32.into(), 1.0f32.into()),
            ),
            (
                controls::BRIGHTNESS.control_id(),
                ControlInfo::new((-1.0f32).into(), 1.0f32.into(), 0.0f32.into()),
            ),
            (
                controls::CONTRAST.control_id(),
                ControlInfo::new(0.0f32.into(), 32.0f32.into(), 1.0f32.into()),
            ),
            (
                controls::AWB_ENABLE.control_id(),
                ControlInfo::new(false.into(), true.into(), true.into()),
            ),
            (
                controls::COLOUR_GAINS.control_id(),
                ControlInfo::new(0.0f32.into(), 32.0f32.into(), ControlValue::None),
            ),
            (
                controls::SATURATION.control_id(),
                ControlInfo::new(0.0f32.into(), 32.0f32.into(), 1.0f32.into()),
            ),
            (
                controls::SHARPNESS.control_id(),
                ControlInfo::new(0.0f32.into(), 16.0f32.into(), 1.0f32.into()),
            ),
            (
                controls::SCALER_CROP.control_id(),
                ControlInfo::new(
                    Rectangle::new(0, 0, 64, 64).into(),
                    array.into(),
                    array.into(),
                ),
            ),
            (
                controls::FRAME_DURATION_LIMITS.control_id(),
                ControlInfo::new(interval.into(), 1_000_000i64.into(), interval.into()),
            ),
        ]
        .into_iter()
        .collect()
    }

    fn properties(&self) -> ControlList {
        let config = &self.state.config;
        let mut list = ControlList::properties();
        list.set_control(properties::LOCATION, config.location);
        list.set_control(properties::ROTATION, config.rotation);
        list.set_control(properties::MODEL, config.model.clone());
        list.set_control(properties::PIXEL_ARRAY_SIZE, config.pixel_array_size);
        list.set_control(
            properties::PIXEL_ARRAY_ACTIVE_AREAS,
            vec![Rectangle::from(config.pixel_array_size)],
        );
        list
    }

    fn connect_request_completed(
        &self,
        handler: RequestCompletedFn,
    ) -> Result<Box<dyn NativeConnection>> {
        let connection = self
            .state
            .completed
            .connect(move |request: &VirtualRequest| handler(request));
        Ok(Box::new(VirtualConnection(connection)))
    }

    fn new_allocator(&self) -> Result<Box<dyn NativeAllocator>> {
        Ok(Box::new(VirtualAllocator {
            state: self.state.clone(),
            id: self.state.next_allocator.fetch_add(1, Ordering::Relaxed),
            owned: Vec::new(),
        }))
    }
}

struct VirtualConnection(#[allow(dead_code)] Connection);

impl NativeConnection for VirtualConnection {}

struct ConfigEntry {
    config: StreamConfig,
    stream: Option<StreamHandle>,
    formats: StreamFormats,
}

pub struct VirtualConfiguration {
    state: Arc<CameraState>,
    entries: Vec<ConfigEntry>,
}

impl NativeConfiguration for VirtualConfiguration {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn add_configuration(&mut self, config: &StreamConfig) {
        self.entries.push(ConfigEntry {
            config: *config,
            stream: None,
            formats: self.state.supported_formats(None),
        });
    }

    fn validate(&mut self) -> CameraConfigurationStatus {
        if self.entries.is_empty() {
            return CameraConfigurationStatus::Invalid;
        }

        let mut status = CameraConfigurationStatus::Valid;
        if self.entries.len() > self.state.config.max_streams {
            self.entries.truncate(self.state.config.max_streams);
            status = CameraConfigurationStatus::Adjusted;
        }

        for entry in &mut self.entries {
            let supported = if entry.formats.is_empty() {
                self.state.supported_formats(None)
            } else {
                entry.formats.clone()
            };
            let config = &mut entry.config;

            if !supported.pixel_formats().contains(&config.pixel_format) {
                let Some(first) = supported.entries().first() else {
                    return CameraConfigurationStatus::Invalid;
                };
                config.pixel_format = first.pixel_format;
                status = CameraConfigurationStatus::Adjusted;
            }

            let sizes = supported.sizes(config.pixel_format);
            if !sizes.contains(&config.size) {
                let Some(size) = best_fit(&sizes, config.size) else {
                    return CameraConfigurationStatus::Invalid;
                };
                config.size = size;
                status = CameraConfigurationStatus::Adjusted;
            }

            if config.buffer_count == 0 {
                config.buffer_count = DEFAULT_BUFFER_COUNT;
                status = CameraConfigurationStatus::Adjusted;
            } else if config.buffer_count > MAX_BUFFER_COUNT {
                config.buffer_count = MAX_BUFFER_COUNT;
                status = CameraConfigurationStatus::Adjusted;
            }

            if let Err(e) = fill_layout(config) {
                debug!("no layout for {}: {}", config, e);
                return CameraConfigurationStatus::Invalid;
            }
        }

        status
    }

    fn pixel_format(&self, index: usize) -> PixelFormat {
        self.entries[index].config.pixel_format
    }

    fn set_pixel_format(&mut self, index: usize, value: PixelFormat) {
        self.entries[index].config.pixel_format = value;
    }

    fn size(&self, index: usize) -> Size {
        self.entries[index].config.size
    }

    fn set_size(&mut self, index: usize, value: Size) {
        self.entries[index].config.size = value;
    }

    fn stride(&self, index: usize) -> u32 {
        self.entries[index].config.stride
    }

    fn set_stride(&mut self, index: usize, value: u32) {
        self.entries[index].config.stride = value;
    }

    fn frame_size(&self, index: usize) -> u32 {
        self.entries[index].config.frame_size
    }

    fn set_frame_size(&mut self, index: usize, value: u32) {
        self.entries[index].config.frame_size = value;
    }

    fn buffer_count(&self, index: usize) -> u32 {
        self.entries[index].config.buffer_count
    }

    fn set_buffer_count(&mut self, index: usize, value: u32) {
        self.entries[index].config.buffer_count = value;
    }

    fn stream(&self, index: usize) -> Option<StreamHandle> {
        self.entries[index].stream
    }

    fn formats(&self, index: usize) -> StreamFormats {
        self.entries[index].formats.clone()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct RequestInner {
    status: RequestStatus,
    sequence: u32,
    queued: bool,
    buffers: Vec<(StreamHandle, FrameBufferHandle)>,
    controls: ControlList,
    metadata: ControlList,
    cookie: u64,
}

struct RequestShared {
    cookie: u64,
    camera: Arc<CameraState>,
    inner: Mutex<RequestInner>,
}

pub struct VirtualRequest {
    shared: Arc<RequestShared>,
}

impl NativeRequest for VirtualRequest {
    fn handle(&self) -> RequestHandle {
        RequestHandle::from_raw(RawHandle::from_ptr(Arc::as_ptr(&self.shared)))
    }

    fn cookie(&self) -> u64 {
        self.shared.cookie
    }

    fn sequence(&self) -> u32 {
        self.shared.inner.lock().sequence
    }

    fn status(&self) -> RequestStatus {
        self.shared.inner.lock().status
    }

    fn add_buffer(&mut self, stream: StreamHandle, buffer: FrameBufferHandle) -> Result<()> {
        let camera = self.shared.camera.inner.lock();
        let slot = camera.buffers.get(buffer)?;
        if slot.stream != stream {
            return errno::err("add_buffer", libc::EINVAL);
        }

        let mut req = self.shared.inner.lock();
        if req.queued {
            return errno::err("add_buffer", libc::EBUSY);
        }
        if req.buffers.iter().any(|(s, _)| *s == stream) {
            return errno::err("add_buffer", libc::EEXIST);
        }
        req.buffers.push((stream, buffer));
        Ok(())
    }

    fn find_buffer(&self, stream: StreamHandle) -> Option<FrameBufferHandle> {
        self.shared
            .inner
            .lock()
            .buffers
            .iter()
            .find(|(s, _)| *s == stream)
            .map(|(_, b)| *b)
    }

    fn buffers(&self) -> Vec<(StreamHandle, FrameBufferHandle)> {
        self.shared.inner.lock().buffers.clone()
    }

    fn buffer_metadata(&self, buffer: FrameBufferHandle) -> Option<FrameMetadata> {
        let attached = self
            .shared
            .inner
            .lock()
            .buffers
            .iter()
            .any(|(_, b)| *b == buffer);
        if !attached {
            return None;
        }

        let camera = self.shared.camera.inner.lock();
        camera.buffers.get(buffer).ok().map(|slot| slot.metadata.clone())
    }

    fn has_pending_buffers(&self) -> bool {
        let req = self.shared.inner.lock();
        req.queued && !req.buffers.is_empty()
    }

    fn reuse(&mut self, flag: ReuseFlag) {
        let mut req = self.shared.inner.lock();
        if req.queued {
            warn!(cookie = req.cookie, "reuse of a queued request ignored");
            return;
        }
        req.status = RequestStatus::Pending;
        req.sequence = 0;
        req.controls.clear();
        req.metadata.clear();
        if flag == ReuseFlag::Default {
            req.buffers.clear();
        }
    }

    fn controls(&self) -> ControlList {
        self.shared.inner.lock().controls.clone()
    }

    fn set_controls(&mut self, controls: &ControlList) {
        self.shared.inner.lock().controls.update(controls);
    }

    fn metadata(&self) -> ControlList {
        self.shared.inner.lock().metadata.clone()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub struct VirtualAllocator {
    state: Arc<CameraState>,
    id: u64,
    owned: Vec<(StreamHandle, Vec<FrameBufferHandle>)>,
}

fn memfd(name: &str, len: u64) -> Result<OwnedFd> {
    let name = CString::new(name).map_err(|e| Error::InvalidArgument(e.to_string()))?;
    let fd = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error().into());
    }
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };

    if unsafe { libc::ftruncate(fd.as_raw_fd(), len as libc::off_t) } != 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(fd)
}

impl NativeAllocator for VirtualAllocator {
    fn allocate(&mut self, stream: StreamHandle) -> Result<usize> {
        let mut inner = self.state.inner.lock();
        if inner.state != State::Configured {
            return errno::err("allocate", libc::EACCES);
        }
        let Some((_, config)) = inner.active.iter().find(|(s, _)| *s == stream).copied() else {
            return errno::err("allocate", libc::EINVAL);
        };
        if self.owned.iter().any(|(s, _)| *s == stream) {
            return errno::err("allocate", libc::EBUSY);
        }

        let pf = config.pixel_format;
        let Size { width, height } = config.size;
        let num_planes = pf.info().map(|i| i.num_planes()).unwrap_or(1);
        let lengths = (0..num_planes)
            .map(|p| pf.plane_size(width, height, p, 0))
            .collect::<Result<Vec<u32>>>()?;
        let total = lengths
            .iter()
            .try_fold(0u32, |total, l| total.checked_add(*l))
            .ok_or_else(|| Error::InvalidArgument(format!("{} frame too large", config)))?;
        if total == 0 {
            return errno::err("allocate", libc::EINVAL);
        }

        let mut handles = Vec::with_capacity(config.buffer_count as usize);
        for index in 0..config.buffer_count {
            let fd = match memfd(&format!("vcam-{}-{}", self.id, index), total as u64) {
                Ok(fd) => fd,
                Err(e) => {
                    for handle in handles.drain(..) {
                        let _ = inner.buffers.remove(handle);
                    }
                    return Err(e);
                }
            };

            let mut offset = 0u32;
            let planes = lengths
                .iter()
                .map(|&length| {
                    let plane = FrameBufferPlane {
                        fd: fd.as_raw_fd(),
                        offset,
                        length,
                    };
                    offset += length;
                    plane
                })
                .collect();

            handles.push(inner.buffers.insert(BufferSlot {
                stream,
                fd,
                planes,
                metadata: FrameMetadata::default(),
            }));
        }

        let count = handles.len();
        self.owned.push((stream, handles));
        Ok(count)
    }

    fn allocated(&self) -> bool {
        !self.owned.is_empty()
    }

    fn buffers(&self, stream: StreamHandle) -> Vec<FrameBufferHandle> {
        self.owned
            .iter()
            .find(|(s, _)| *s == stream)
            .map(|(_, handles)| handles.clone())
            .unwrap_or_default()
    }

    fn planes(&self, buffer: FrameBufferHandle) -> Result<Vec<FrameBufferPlane>> {
        self.check_owned(buffer)?;
        Ok(self.state.inner.lock().buffers.get(buffer)?.planes.clone())
    }

    fn metadata(&self, buffer: FrameBufferHandle) -> Result<FrameMetadata> {
        self.check_owned(buffer)?;
        Ok(self.state.inner.lock().buffers.get(buffer)?.metadata.clone())
    }
}

impl VirtualAllocator {
    fn check_owned(&self, buffer: FrameBufferHandle) -> Result<()> {
        if self.owned.iter().any(|(_, handles)| handles.contains(&buffer)) {
            Ok(())
        } else {
            Err(Error::StaleHandle(FrameBufferHandle::KIND))
        }
    }
}

impl Drop for VirtualAllocator {
    fn drop(&mut self) {
        let mut inner = self.state.inner.lock();
        for (_, handles) in self.owned.drain(..) {
            for handle in handles {
                let _ = inner.buffers.remove(handle);
            }
        }
        trace!(allocator = self.id, remaining = inner.buffers.len(), "freed buffers");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> VirtualCamera {
        VirtualCamera::new(VirtualConfig::default().cameras[0].clone())
    }

    #[test]
    fn state_machine_errors() {
        let cam = camera();
        assert!(cam.create_request(0).is_none());
        assert_eq!(cam.start(None).unwrap_err().errno(), Some(libc::EACCES));

        cam.acquire().unwrap();
        assert_eq!(cam.acquire().unwrap_err().errno(), Some(libc::EBUSY));

        let mut config = cam.generate_configuration(&[StreamRole::Viewfinder]).unwrap();
        cam.configure(&mut *config).unwrap();
        assert_eq!(cam.streams().len(), 1);

        cam.start(None).unwrap();
        assert_eq!(cam.release().unwrap_err().errno(), Some(libc::EBUSY));
        cam.stop().unwrap();
        cam.stop().unwrap();
        cam.release().unwrap();
        assert!(cam.streams().is_empty());
    }

    #[test]
    fn validate_adjusts_then_settles() {
        let cam = camera();
        let mut config = cam.generate_configuration(&[StreamRole::Viewfinder]).unwrap();
        assert_eq!(config.validate(), CameraConfigurationStatus::Valid);
        assert_eq!(config.size(0), Size::new(640, 480));
        assert_eq!(config.stride(0), 640);

        config.set_size(0, Size::new(1000, 700));
        config.set_buffer_count(0, 0);
        assert_eq!(config.validate(), CameraConfigurationStatus::Adjusted);
        assert_eq!(config.size(0), Size::new(640, 480));
        assert_eq!(config.buffer_count(0), DEFAULT_BUFFER_COUNT);
        assert_eq!(config.validate(), CameraConfigurationStatus::Valid);
    }

    #[test]
    fn too_many_roles_yield_nothing() {
        let cam = camera();
        assert!(cam
            .generate_configuration(&[StreamRole::Viewfinder; 3])
            .is_none());
        let raw = cam.generate_configuration(&[StreamRole::Raw]).unwrap();
        assert_eq!(raw.pixel_format(0), formats::SRGGB10_CSI2P);
    }

    #[test]
    fn planar_buffers_share_one_fd() {
        let cam = camera();
        cam.acquire().unwrap();
        let mut config = cam.generate_configuration(&[StreamRole::VideoRecording]).unwrap();
        config.set_pixel_format(0, formats::YUV420);
        config.set_size(0, Size::new(1280, 720));
        config.validate();
        cam.configure(&mut *config).unwrap();

        let stream = cam.streams()[0];
        let mut allocator = cam.new_allocator().unwrap();
        assert_eq!(allocator.allocate(stream).unwrap(), 4);
        assert_eq!(allocator.allocate(stream).unwrap_err().errno(), Some(libc::EBUSY));

        let buffer = allocator.buffers(stream)[0];
        let planes = allocator.planes(buffer).unwrap();
        assert_eq!(planes.len(), 3);
        assert!(planes.iter().all(|p| p.fd == planes[0].fd));
        assert_eq!(planes[1].offset, 1280 * 720);
        assert_eq!(planes[2].length, 640 * 360);

        drop(allocator);
        assert_eq!(cam.state.inner.lock().buffers.len(), 0);
    }
}
