// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use libcamera_bridge::{
    controls::{controls, properties},
    pixel_format::formats,
    Camera, CameraConfigurationStatus, CameraManager, ControlList, FrameBufferAllocator,
    FrameStatus, MappedFrameBuffer, Rectangle, RequestStatus, ReuseFlag, Size, StreamConfig,
    StreamRole, VirtualCameraConfig, VirtualConfig, VirtualFormat,
};
use serial_test::serial;
use std::{
    collections::HashMap,
    error::Error,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

fn fast_cameras() -> VirtualConfig {
    let mut config = VirtualConfig::default();
    for camera in &mut config.cameras {
        camera.frame_interval_us = 2_000;
    }
    config
}

fn first_camera(manager: &CameraManager) -> Result<Camera, Box<dyn Error>> {
    Ok(manager.cameras().into_iter().next().ok_or("no camera")?)
}

#[test]
#[serial]
fn test_enumeration() -> Result<(), Box<dyn Error>> {
    let manager = CameraManager::virtual_cameras(VirtualConfig::default())?;
    let cameras = manager.cameras();
    assert_eq!(cameras.len(), 2);

    let uvc = manager
        .get("/base/axi/pcie@120000/rp1/usb@200000-1:1.0-046d:0825")
        .ok_or("uvc camera missing")?;
    assert_eq!(uvc, cameras[1]);
    assert_ne!(cameras[0], cameras[1]);
    assert!(manager.get("nope").is_none());

    let props = cameras[0].properties();
    assert_eq!(
        props.get_control(properties::LOCATION)?,
        Some(properties::CAMERA_LOCATION_BACK)
    );
    assert_eq!(props.get_control(properties::ROTATION)?, Some(180));
    assert_eq!(
        props.get_control(properties::PIXEL_ARRAY_SIZE)?,
        Some(Size::new(3280, 2464))
    );
    assert_eq!(
        props.get_control(properties::PIXEL_ARRAY_ACTIVE_AREAS)?,
        Some(vec![Rectangle::new(0, 0, 3280, 2464)])
    );

    let limits = cameras[0].controls();
    assert!(limits.contains(controls::EXPOSURE_TIME.id()));
    assert!(limits.find("ScalerCrop").is_some());
    Ok(())
}

#[test]
#[serial]
fn test_duplicate_ids_rejected() {
    let config = VirtualConfig {
        cameras: vec![VirtualCameraConfig::default(), VirtualCameraConfig::default()],
    };
    assert!(CameraManager::virtual_cameras(config).is_err());
}

#[test]
#[serial]
fn test_oversize_frames_rejected() {
    let config = VirtualConfig {
        cameras: vec![VirtualCameraConfig {
            formats: vec![VirtualFormat {
                pixel_format: formats::XRGB8888,
                sizes: vec![Size::new(640, 480), Size::new(70_000, 70_000)],
            }],
            ..Default::default()
        }],
    };
    assert!(CameraManager::virtual_cameras(config).is_err());

    let config = VirtualConfig {
        cameras: vec![VirtualCameraConfig {
            formats: vec![VirtualFormat {
                pixel_format: formats::NV12,
                sizes: vec![Size::new(0, 480)],
            }],
            ..Default::default()
        }],
    };
    assert!(CameraManager::virtual_cameras(config).is_err());
}

#[test]
#[serial]
fn test_stream_config_access() -> Result<(), Box<dyn Error>> {
    let manager = CameraManager::virtual_cameras(VirtualConfig::default())?;
    let camera = first_camera(&manager)?;

    let mut config = camera
        .generate_configuration(&[StreamRole::VideoRecording])
        .ok_or("no configuration")?;
    assert_eq!(config.len(), 1);
    assert!(config.at(1).is_none());

    {
        let mut stream = config.at_mut(0).ok_or("no entry")?;
        assert_eq!(stream.size(), Size::new(1920, 1080));
        stream.set_pixel_format(formats::XRGB8888);
        stream.set_size(Size::new(1280, 720));
        stream.set_buffer_count(6);
        assert_eq!(stream.pixel_format(), formats::XRGB8888);
        assert_eq!(stream.buffer_count(), 6);
        assert!(stream.stream().is_none());
    }

    assert_eq!(config.validate(), CameraConfigurationStatus::Valid);
    let entry = config.at(0).ok_or("no entry")?;
    assert_eq!(entry.stride(), 1280 * 4);
    assert_eq!(entry.frame_size(), 1280 * 720 * 4);

    config.at_mut(0).ok_or("no entry")?.set_size(Size::new(1000, 700));
    assert_eq!(config.validate(), CameraConfigurationStatus::Adjusted);
    assert_eq!(config.snapshot()[0].size, Size::new(640, 480));
    assert_eq!(config.validate(), CameraConfigurationStatus::Valid);
    assert_eq!(config.validate(), CameraConfigurationStatus::Valid);

    let formats = config.at(0).ok_or("no entry")?.formats();
    assert_eq!(
        formats.pixel_formats(),
        vec![formats::NV12, formats::YUV420, formats::XRGB8888]
    );

    config.add_configuration(StreamConfig::new(formats::NV12, Size::new(800, 600), 2));
    assert_eq!(config.len(), 2);
    assert_eq!(config.validate(), CameraConfigurationStatus::Adjusted);
    assert_eq!(config.snapshot()[1].size, Size::new(640, 480));
    Ok(())
}

#[test]
#[serial]
fn test_stream_config_fields() -> Result<(), Box<dyn Error>> {
    let manager = CameraManager::virtual_cameras(VirtualConfig::default())?;
    let camera = first_camera(&manager)?;
    let mut config = camera
        .generate_configuration(&[StreamRole::StillCapture])
        .ok_or("no configuration")?;
    let before = config.snapshot();

    // Each setter only touches its own field.
    let mut stream = config.at_mut(0).ok_or("no entry")?;
    stream.set_pixel_format(formats::YUV420);
    stream.set_pixel_format(formats::YUV420);
    assert_eq!(stream.pixel_format(), formats::YUV420);
    stream.set_size(Size::new(1640, 1232));
    assert_eq!(stream.size(), Size::new(1640, 1232));
    stream.set_stride(4096);
    assert_eq!(stream.stride(), 4096);
    stream.set_frame_size(12345);
    assert_eq!(stream.frame_size(), 12345);
    stream.set_buffer_count(3);
    assert_eq!(stream.buffer_count(), 3);
    assert_eq!(stream.pixel_format(), formats::YUV420);
    assert_eq!(stream.size(), Size::new(1640, 1232));

    stream.apply(&before[0]);
    assert_eq!(config.snapshot(), before);
    Ok(())
}

#[test]
#[serial]
fn test_end_to_end_capture() -> Result<(), Box<dyn Error>> {
    let manager = CameraManager::virtual_cameras(fast_cameras())?;
    let camera = first_camera(&manager)?;
    camera.acquire()?;

    let mut config = camera
        .generate_configuration(&[StreamRole::Viewfinder])
        .ok_or("no configuration")?;
    config.at_mut(0).ok_or("no entry")?.set_buffer_count(4);
    assert_ne!(config.validate(), CameraConfigurationStatus::Invalid);
    camera.configure(&mut config)?;

    let stream = camera.streams()[0];
    let buffer_count = config.at(0).ok_or("no entry")?.buffer_count();
    let mut allocator = FrameBufferAllocator::new(&camera)?;
    assert_eq!(allocator.allocate(stream)?, buffer_count as usize);

    let (tx, rx) = kanal::unbounded();
    let _slot = camera.on_request_completed(move |request| {
        let _ = tx.send((request.cookie(), request.status()));
    })?;

    let mut requests = Vec::new();
    for (cookie, buffer) in allocator.buffers(stream).iter().enumerate() {
        let mut request = camera.create_request(cookie as u64).ok_or("no request")?;
        request.add_buffer(buffer)?;
        requests.push(request);
    }
    camera.start(None)?;
    for request in &mut requests {
        camera.queue_request(request)?;
    }

    let mut cookies = Vec::new();
    for _ in 0..requests.len() {
        let (cookie, status) = rx
            .recv_timeout(Duration::from_secs(5))
            .map_err(|e| format!("waiting for frames: {e}"))?;
        assert_eq!(status, RequestStatus::Complete);
        cookies.push(cookie);
    }
    assert_eq!(cookies, (0..buffer_count as u64).collect::<Vec<_>>());

    camera.stop()?;
    drop(requests);
    drop(allocator);
    camera.release()?;
    Ok(())
}

#[test]
#[serial]
fn test_streams_belong_to_their_camera() -> Result<(), Box<dyn Error>> {
    let manager = CameraManager::virtual_cameras(VirtualConfig::default())?;
    let cameras = manager.cameras();

    for camera in &cameras {
        camera.acquire()?;
        let mut config = camera
            .generate_configuration(&[StreamRole::Viewfinder])
            .ok_or("no configuration")?;
        config.validate();
        camera.configure(&mut config)?;
        assert_eq!(config.at(0).and_then(|c| c.stream()), Some(camera.streams()[0]));
    }

    let a = cameras[0].streams();
    let b = cameras[1].streams();
    assert!(cameras[0].contains_stream(a[0]));
    assert!(!cameras[0].contains_stream(b[0]));
    assert!(!cameras[1].contains_stream(a[0]));

    // A configuration only applies to the camera that generated it.
    let mut foreign = cameras[1]
        .generate_configuration(&[StreamRole::Viewfinder])
        .ok_or("no configuration")?;
    assert!(cameras[0].configure(&mut foreign).is_err());

    // Buffers of one camera cannot be attached to another camera's request.
    let mut allocator = FrameBufferAllocator::new(&cameras[0])?;
    allocator.allocate(a[0])?;
    assert_eq!(
        allocator.allocate(b[0]).unwrap_err().errno(),
        Some(libc::EINVAL)
    );
    let buffer = allocator.buffers(a[0]).remove(0);
    let mut request = cameras[1].create_request(1).ok_or("no request")?;
    assert!(request.add_buffer(&buffer).is_err());

    for camera in &cameras {
        camera.release()?;
    }
    Ok(())
}

#[test]
#[serial]
fn test_streams_follow_configuration_order() -> Result<(), Box<dyn Error>> {
    let manager = CameraManager::virtual_cameras(VirtualConfig::default())?;
    let cameras = manager.cameras();
    let camera = &cameras[0];
    camera.acquire()?;

    let mut config = camera
        .generate_configuration(&[StreamRole::Viewfinder, StreamRole::Raw])
        .ok_or("no configuration")?;
    assert_eq!(config.validate(), CameraConfigurationStatus::Valid);
    camera.configure(&mut config)?;

    let streams = camera.streams();
    assert_eq!(streams.len(), 2);
    assert_ne!(streams[0], streams[1]);
    for (index, stream) in streams.iter().enumerate() {
        let entry = config.at(index).ok_or("no entry")?;
        assert_eq!(entry.stream(), Some(*stream));
        assert!(camera.contains_stream(*stream));
        assert!(!cameras[1].contains_stream(*stream));
    }
    assert_eq!(camera.streams(), streams);

    camera.release()?;
    Ok(())
}

#[test]
#[serial]
fn test_state_machine() -> Result<(), Box<dyn Error>> {
    let manager = CameraManager::virtual_cameras(fast_cameras())?;
    let camera = first_camera(&manager)?;

    let mut config = camera
        .generate_configuration(&[StreamRole::Viewfinder])
        .ok_or("no configuration")?;
    assert_eq!(camera.configure(&mut config).unwrap_err().errno(), Some(libc::EACCES));

    camera.acquire()?;
    assert_eq!(camera.acquire().unwrap_err().errno(), Some(libc::EBUSY));
    camera.configure(&mut config)?;

    let stream = camera.streams()[0];
    let mut allocator = FrameBufferAllocator::new(&camera)?;
    assert_eq!(allocator.allocate(stream)?, 4);
    assert!(allocator.allocated());

    let buffers = allocator.buffers(stream);
    let mut request = camera.create_request(0).ok_or("no request")?;
    request.add_buffer(&buffers[0])?;
    assert_eq!(
        request.add_buffer(&buffers[1]).unwrap_err().errno(),
        Some(libc::EEXIST)
    );
    assert_eq!(request.find_buffer(stream), Some(buffers[0].clone()));

    assert_eq!(
        camera.queue_request(&mut request).unwrap_err().errno(),
        Some(libc::EACCES)
    );

    camera.start(None)?;
    assert_eq!(camera.release().unwrap_err().errno(), Some(libc::EBUSY));

    let mut empty = camera.create_request(1).ok_or("no request")?;
    assert_eq!(
        camera.queue_request(&mut empty).unwrap_err().errno(),
        Some(libc::EINVAL)
    );

    camera.stop()?;
    assert_eq!(request.status(), RequestStatus::Pending);
    drop(request);
    drop(empty);
    drop(allocator);
    camera.release()?;
    Ok(())
}

#[test]
#[serial]
fn test_capture_fills_buffers() -> Result<(), Box<dyn Error>> {
    let manager = CameraManager::virtual_cameras(fast_cameras())?;
    let camera = first_camera(&manager)?;
    camera.acquire()?;

    let mut config = camera
        .generate_configuration(&[StreamRole::Viewfinder])
        .ok_or("no configuration")?;
    config.at_mut(0).ok_or("no entry")?.set_buffer_count(2);
    config.validate();
    camera.configure(&mut config)?;

    let stream = camera.streams()[0];
    let mut allocator = FrameBufferAllocator::new(&camera)?;
    allocator.allocate(stream)?;

    let mut requests = HashMap::new();
    for (cookie, buffer) in allocator.buffers(stream).iter().enumerate() {
        let mut request = camera.create_request(cookie as u64).ok_or("no request")?;
        request.add_buffer(buffer)?;
        let mut controls = ControlList::new();
        controls.set_control(controls::EXPOSURE_TIME, 5_000 + cookie as i32);
        request.set_controls(&controls);
        requests.insert(cookie as u64, request);
    }

    let (tx, rx) = kanal::unbounded();
    let _slot = camera.on_request_completed(move |request| {
        let buffers = request.buffers();
        let metadata = buffers
            .first()
            .and_then(|(_, buffer)| request.buffer_metadata(*buffer));
        let _ = tx.send((
            request.cookie(),
            request.sequence(),
            request.status(),
            metadata,
            request.metadata(),
        ));
    })?;

    let mut start = ControlList::new();
    start.set_control(controls::ANALOGUE_GAIN, 2.0);
    camera.start(Some(&start))?;
    for request in requests.values_mut() {
        camera.queue_request(request)?;
    }
    let queued = requests.get_mut(&0).ok_or("missing request")?;
    assert!(camera.queue_request(queued).is_err());

    let mut sequences = Vec::new();
    for _ in 0..6 {
        let (cookie, sequence, status, metadata, request_metadata) = rx
            .recv_timeout(Duration::from_secs(5))
            .map_err(|e| format!("waiting for frames: {e}"))?;
        assert_eq!(status, RequestStatus::Complete);

        let metadata = metadata.ok_or("buffer metadata missing")?;
        assert_eq!(metadata.status, FrameStatus::Success);
        assert_eq!(metadata.sequence, sequence);
        assert_eq!(metadata.planes.len(), 2);
        assert_eq!(
            request_metadata.get_control(controls::EXPOSURE_TIME)?,
            Some(5_000 + cookie as i32)
        );
        assert_eq!(request_metadata.get_control(controls::ANALOGUE_GAIN)?, Some(2.0));
        assert!(request_metadata.get_control(controls::SENSOR_TIMESTAMP)?.is_some());

        let request = requests.get_mut(&cookie).ok_or("unknown cookie")?;
        let buffer = request.find_buffer(stream).ok_or("buffer missing")?;
        let mapped = MappedFrameBuffer::map(&buffer)?;
        assert_eq!(mapped.num_planes(), 2);
        assert_eq!(mapped.plane(0).map(<[u8]>::len), Some(640 * 480));
        for plane in mapped.planes() {
            assert!(plane.iter().all(|&b| b == sequence as u8));
        }
        drop(mapped);

        sequences.push(sequence);
        request.reuse(ReuseFlag::ReuseBuffers);
        assert!(request.controls().is_empty());
        let mut controls = ControlList::new();
        controls.set_control(controls::EXPOSURE_TIME, 5_000 + cookie as i32);
        request.set_controls(&controls);
        camera.queue_request(request)?;
    }
    assert_eq!(sequences, (0..6).collect::<Vec<u32>>());

    // Both requests still queued come back before stop returns, cancelled
    // unless they completed first.
    camera.stop()?;
    let mut drained = 0;
    while let Ok(Some((_, sequence, status, metadata, _))) = rx.try_recv() {
        let metadata = metadata.ok_or("buffer metadata missing")?;
        match status {
            RequestStatus::Cancelled => {
                assert_eq!(metadata.status, FrameStatus::Cancelled);
                assert_eq!(sequence, 0);
            }
            RequestStatus::Complete => assert_eq!(metadata.status, FrameStatus::Success),
            RequestStatus::Pending => panic!("pending request delivered"),
        }
        drained += 1;
    }
    assert_eq!(drained, 2);
    assert!(requests.values().all(|r| !r.has_pending_buffers()));

    drop(requests);
    drop(allocator);
    camera.release()?;
    Ok(())
}

#[test]
#[serial]
fn test_restart_after_stop_in_handler() -> Result<(), Box<dyn Error>> {
    let manager = CameraManager::virtual_cameras(fast_cameras())?;
    let camera = first_camera(&manager)?;
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

    let delivered = Arc::new(AtomicUsize::new(0));
    let stopped = Arc::new(AtomicBool::new(false));
    let (tx, rx) = kanal::unbounded();
    let d = delivered.clone();
    let handler_camera = camera.clone();
    let _slot = camera.on_request_completed(move |_| {
        d.fetch_add(1, Ordering::SeqCst);
        if !stopped.swap(true, Ordering::SeqCst) {
            let _ = tx.send(handler_camera.stop().is_ok());
        }
    })?;

    camera.start(None)?;
    for request in &mut requests {
        camera.queue_request(request)?;
    }
    let stop_ok = rx
        .recv_timeout(Duration::from_secs(5))
        .map_err(|e| format!("waiting for stop: {e}"))?;
    assert!(stop_ok);

    // Restarting waits for the stopped worker, so every request of the
    // first run has been delivered once start returns.
    camera.start(None)?;
    assert_eq!(delivered.load(Ordering::SeqCst), requests.len());
    assert!(requests
        .iter()
        .all(|r| r.status() != RequestStatus::Pending));

    camera.stop()?;
    drop(requests);
    drop(allocator);
    camera.release()?;
    Ok(())
}
