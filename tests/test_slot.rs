// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use libcamera_bridge::{
    Camera, CameraManager, FrameBufferAllocator, Request, RequestCompleteSlot, RequestStatus,
    ReuseFlag, StreamRole, VirtualConfig,
};
use parking_lot::Mutex;
use serial_test::serial;
use std::{
    error::Error,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

struct Capture {
    _manager: CameraManager,
    camera: Camera,
    allocator: FrameBufferAllocator,
    requests: Vec<Request>,
}

impl Capture {
    fn new(frame_interval_us: u64) -> Result<Self, Box<dyn Error>> {
        let mut config = VirtualConfig::default();
        for camera in &mut config.cameras {
            camera.frame_interval_us = frame_interval_us;
            camera.fill_frames = false;
        }
        let manager = CameraManager::virtual_cameras(config)?;
        let camera = manager.cameras().into_iter().next().ok_or("no camera")?;
        camera.acquire()?;

        let mut config = camera
            .generate_configuration(&[StreamRole::Viewfinder])
            .ok_or("no configuration")?;
        config.validate();
        camera.configure(&mut config)?;

        let stream = camera.streams()[0];
        let mut allocator = FrameBufferAllocator::new(&camera)?;
        allocator.allocate(stream)?;

        let mut requests = Vec::new();
        for (cookie, buffer) in allocator.buffers(stream).iter().enumerate() {
            let mut request = camera.create_request(cookie as u64).ok_or("no request")?;
            request.add_buffer(buffer)?;
            requests.push(request);
        }

        Ok(Self {
            _manager: manager,
            camera,
            allocator,
            requests,
        })
    }

    fn queue_all(&mut self) -> Result<(), Box<dyn Error>> {
        for request in &mut self.requests {
            if request.status() != RequestStatus::Pending {
                request.reuse(ReuseFlag::ReuseBuffers);
            }
            self.camera.queue_request(request)?;
        }
        Ok(())
    }

    fn finish(self) -> Result<(), Box<dyn Error>> {
        let Self {
            _manager,
            camera,
            allocator,
            requests,
        } = self;
        drop(requests);
        drop(allocator);
        camera.release()?;
        Ok(())
    }
}

fn wait_for(flag: &AtomicBool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !flag.load(Ordering::SeqCst) {
        if Instant::now() > deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
    true
}

struct Context {
    calls: AtomicUsize,
    dropped: Arc<AtomicBool>,
}

impl Drop for Context {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[test]
#[serial]
fn test_no_delivery_after_drop() -> Result<(), Box<dyn Error>> {
    let mut capture = Capture::new(500)?;
    let total = Arc::new(AtomicUsize::new(0));
    let t = total.clone();
    let _observer = capture.camera.on_request_completed(move |_| {
        t.fetch_add(1, Ordering::SeqCst);
    })?;

    for round in 0..20u64 {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let slot = capture.camera.on_request_completed(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })?;

        let before = total.load(Ordering::SeqCst);
        capture.camera.start(None)?;
        capture.queue_all()?;
        thread::sleep(Duration::from_micros(250 * (round % 8)));

        drop(slot);
        let seen = count.load(Ordering::SeqCst);
        capture.camera.stop()?;

        assert_eq!(count.load(Ordering::SeqCst), seen);
        assert_eq!(total.load(Ordering::SeqCst) - before, capture.requests.len());
    }

    capture.finish()
}

#[test]
#[serial]
fn test_context_released_on_drop() -> Result<(), Box<dyn Error>> {
    let capture = Capture::new(2_000)?;
    let dropped = Arc::new(AtomicBool::new(false));

    let slot = RequestCompleteSlot::connect(
        &capture.camera,
        |ctx: &Context, _| {
            ctx.calls.fetch_add(1, Ordering::SeqCst);
        },
        Context {
            calls: AtomicUsize::new(0),
            dropped: dropped.clone(),
        },
    )?;
    assert_eq!(slot.camera(), &capture.camera);
    assert!(!dropped.load(Ordering::SeqCst));

    drop(slot);
    assert!(dropped.load(Ordering::SeqCst));
    capture.finish()
}

#[test]
#[serial]
fn test_drop_from_own_handler() -> Result<(), Box<dyn Error>> {
    let mut capture = Capture::new(2_000)?;
    let dropped = Arc::new(AtomicBool::new(false));
    let calls = Arc::new(AtomicUsize::new(0));

    let holder: Arc<Mutex<Option<RequestCompleteSlot<Context>>>> = Arc::new(Mutex::new(None));
    let h = holder.clone();
    let c = calls.clone();
    let slot = RequestCompleteSlot::connect(
        &capture.camera,
        move |ctx: &Context, _| {
            ctx.calls.fetch_add(1, Ordering::SeqCst);
            c.fetch_add(1, Ordering::SeqCst);
            let slot = h.lock().take();
            drop(slot);
        },
        Context {
            calls: AtomicUsize::new(0),
            dropped: dropped.clone(),
        },
    )?;
    *holder.lock() = Some(slot);
    drop(holder);

    let (tx, rx) = kanal::unbounded();
    let _observer = capture.camera.on_request_completed(move |request| {
        let _ = tx.send(request.cookie());
    })?;

    capture.camera.start(None)?;
    capture.queue_all()?;
    for _ in 0..capture.requests.len() {
        rx.recv_timeout(Duration::from_secs(5))
            .map_err(|e| format!("waiting for completions: {e}"))?;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(wait_for(&dropped));

    capture.camera.stop()?;
    capture.finish()
}
