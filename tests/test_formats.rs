// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use libcamera_bridge::{
    controls::{controls, properties},
    pixel_format::{formats, fourcc},
    CameraManager, ControlList, ControlValue, FrameBufferAllocator, PixelFormat, Rectangle, Size,
    SizeRange, StreamConfig, StreamRole, VirtualConfig,
};
use serial_test::serial;
use std::error::Error;

#[test]
fn test_pixel_format_names() -> Result<(), Box<dyn Error>> {
    assert_eq!(formats::NV12.to_string(), "NV12");
    assert_eq!(formats::SRGGB10_CSI2P.to_string(), "SRGGB10_CSI2P");
    assert_eq!(formats::SRGGB10.to_string(), "SRGGB10");
    assert_eq!(PixelFormat::default().to_string(), "<INVALID>");

    let unknown = PixelFormat::new(fourcc(b'Q', b'W', b'\x01', b'Z'), 0);
    assert_eq!(unknown.to_string(), "<QW.Z>");

    assert_eq!("YUYV".parse::<PixelFormat>()?, formats::YUYV);
    assert_eq!("<ABCD>".parse::<PixelFormat>()?.fourcc(), fourcc(b'A', b'B', b'C', b'D'));
    assert!("TOO-LONG".parse::<PixelFormat>().is_err());
    Ok(())
}

#[test]
fn test_geometry_strings() {
    assert_eq!(Size::new(640, 480).to_string(), "640x480");
    assert_eq!(Rectangle::new(0, 0, 3280, 2464).to_string(), "(0, 0)/3280x2464");
    assert_eq!(
        SizeRange::new(Size::new(64, 64), Size::new(1920, 1080), 16, 8).to_string(),
        "(64x64)-(1920x1080)/(+16,+8)"
    );
    assert_eq!(
        StreamConfig::new(formats::YUV420, Size::new(1280, 720), 4).to_string(),
        "1280x720-YUV420"
    );
}

#[test]
fn test_control_strings() {
    let mut list = ControlList::new();
    list.set_control(controls::AE_ENABLE, false);
    list.set_control(controls::FRAME_DURATION_LIMITS, [33333, 66666]);
    list.set_control(controls::SCALER_CROP, Rectangle::new(16, 8, 1920, 1080));
    let rendered: Vec<String> = list.entries().map(|(_, v)| v.to_string()).collect();
    assert_eq!(rendered, ["false", "(16, 8)/1920x1080", "[ 33333, 66666 ]"]);

    assert_eq!(ControlValue::from(vec![0.5f32, 2.0]).to_string(), "[ 0.500000, 2.000000 ]");
    assert_eq!(
        ControlValue::StringArray(vec!["a".into(), "b".into()]).to_string(),
        "[ a, b ]"
    );
}

#[test]
#[serial]
fn test_object_strings() -> Result<(), Box<dyn Error>> {
    let manager = CameraManager::virtual_cameras(VirtualConfig::default())?;
    assert!(manager.version().ends_with("(virtual)"));

    let camera = manager.cameras().into_iter().next().ok_or("no camera")?;
    assert_eq!(camera.to_string(), "/base/soc/i2c0mux/i2c@1/imx219@10");
    assert_eq!(
        camera.properties().get_control(properties::MODEL)?.as_deref(),
        Some("imx219")
    );

    camera.acquire()?;
    let mut config = camera
        .generate_configuration(&[StreamRole::Viewfinder, StreamRole::Raw])
        .ok_or("no configuration")?;
    assert_eq!(config.to_string(), "640x480-NV12 3280x2464-SRGGB10_CSI2P");
    config.validate();
    camera.configure(&mut config)?;

    let stream = camera.streams()[0];
    let mut allocator = FrameBufferAllocator::new(&camera)?;
    allocator.allocate(stream)?;
    let buffer = allocator.buffers(stream).into_iter().next().ok_or("no buffer")?;

    let mut request = camera.create_request(42).ok_or("no request")?;
    assert_eq!(request.to_string(), "Request(0:P:0/0:42)");
    request.add_buffer(&buffer)?;
    assert_eq!(request.to_string(), "Request(0:P:0/1:42)");

    drop(request);
    drop(allocator);
    camera.release()?;
    Ok(())
}

#[test]
fn test_stream_config_json() -> Result<(), Box<dyn Error>> {
    let configs = [
        StreamConfig::default(),
        StreamConfig::new(formats::SRGGB10_CSI2P, Size::new(3280, 2464), 2),
        StreamConfig::new(PixelFormat::new(fourcc(b'A', b'B', b'C', b'D'), 7), Size::new(8, 8), 1),
    ];
    for config in configs {
        let json = serde_json::to_string(&config)?;
        let back: StreamConfig = serde_json::from_str(&json)?;
        assert_eq!(back, config, "{json}");
    }
    assert!("ABCD".parse::<PixelFormat>().is_err());
    Ok(())
}
