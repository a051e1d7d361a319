// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

#![cfg(feature = "libcamera")]

use libcamera_bridge::{
    controls::properties, CameraManager, FrameBufferAllocator, RequestStatus, StreamRole,
};
use serial_test::serial;
use std::{error::Error, time::Duration};

#[test]
#[serial]
fn test_manager_lifecycle() -> Result<(), Box<dyn Error>> {
    let manager = CameraManager::new()?;
    assert!(!manager.version().is_empty());

    let again = manager.cameras();
    for (a, b) in manager.cameras().iter().zip(&again) {
        assert_eq!(a, b);
        assert_eq!(manager.get(&a.id()).as_ref(), Some(a));
    }
    Ok(())
}

#[test]
#[ignore = "needs a camera"]
#[serial]
fn test_capture() -> Result<(), Box<dyn Error>> {
    let manager = CameraManager::new()?;
    let camera = manager.cameras().into_iter().next().ok_or("no camera")?;
    println!(
        "{} model={:?}",
        camera,
        camera.properties().get_control(properties::MODEL)?
    );

    camera.acquire()?;
    let mut config = camera
        .generate_configuration(&[StreamRole::Viewfinder])
        .ok_or("no configuration")?;
    config.validate();
    camera.configure(&mut config)?;
    println!("configured {}", config);

    let stream = camera.streams()[0];
    let mut allocator = FrameBufferAllocator::new(&camera)?;
    let count = allocator.allocate(stream)?;
    assert!(count > 0);

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
    for _ in 0..requests.len() {
        let (cookie, status) = rx
            .recv_timeout(Duration::from_secs(5))
            .map_err(|e| format!("waiting for frames: {e}"))?;
        assert!((cookie as usize) < requests.len());
        assert_eq!(status, RequestStatus::Complete);
    }
    camera.stop()?;

    drop(requests);
    drop(allocator);
    camera.release()?;
    Ok(())
}
