// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use args::{Args, Backend, Command};
use clap::Parser;
use libcamera_bridge::{
    controls::{control_name, property_name, properties},
    Camera, CameraConfiguration, CameraManager, CompletedRequest, ControlList, FrameBuffer,
    FrameBufferAllocator, FrameMetadata, MappedFrameBuffer, Request, RequestCompleteSlot,
    RequestStatus, ReuseFlag, Size, VirtualConfig,
};
use serde_json::json;
use std::{
    collections::{BTreeMap, HashMap},
    error::Error,
    fs::{self, File},
    io::Write,
    path::Path,
    time::{Duration, Instant},
};
use tracing::{debug, info, info_span, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

mod args;

/// What the completion handler reports back to the capture loop.
struct Completion {
    cookie: u64,
    sequence: u32,
    status: RequestStatus,
    buffers: Vec<FrameMetadata>,
    metadata: ControlList,
}

fn init_logging(args: &Args) -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));

    let journald = if args.journald {
        Some(tracing_journald::layer()?)
    } else {
        None
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(journald);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

fn open_manager(args: &Args) -> Result<CameraManager, Box<dyn Error>> {
    let manager = match args.backend {
        Backend::Libcamera => CameraManager::new()?,
        Backend::Virtual => {
            let config = match &args.virtual_config {
                Some(path) => VirtualConfig::from_file(path)?,
                None => VirtualConfig::default(),
            };
            CameraManager::virtual_cameras(config)?
        }
    };
    Ok(manager)
}

fn select_camera(manager: &CameraManager, name: &str) -> Result<Camera, Box<dyn Error>> {
    let camera = match name.parse::<usize>() {
        Ok(index) => manager.cameras().into_iter().nth(index),
        Err(_) => manager.get(name),
    };
    camera.ok_or_else(|| format!("camera {name:?} not found").into())
}

fn named(list: &ControlList, name: fn(u32) -> Option<&'static str>) -> BTreeMap<String, String> {
    list.entries()
        .map(|(id, value)| {
            let key = name(id).map(str::to_owned).unwrap_or_else(|| id.to_string());
            (key, value.to_string())
        })
        .collect()
}

fn list(manager: &CameraManager, args: &Args) -> Result<(), Box<dyn Error>> {
    let cameras = manager.cameras();
    if args.json {
        let cameras: Vec<_> = cameras
            .iter()
            .map(|c| json!({ "id": c.id(), "properties": named(&c.properties(), property_name) }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&cameras)?);
        return Ok(());
    }

    println!("libcamera {}", manager.version());
    for (index, camera) in cameras.iter().enumerate() {
        let props = camera.properties();
        let model = props
            .get_control(properties::MODEL)?
            .unwrap_or_else(|| "unknown".to_owned());
        let location = match props.get_control(properties::LOCATION)? {
            Some(properties::CAMERA_LOCATION_FRONT) => "front",
            Some(properties::CAMERA_LOCATION_BACK) => "back",
            Some(properties::CAMERA_LOCATION_EXTERNAL) => "external",
            _ => "unknown",
        };
        println!("{}: '{}' ({}) [{}]", index, model, camera.id(), location);
    }
    Ok(())
}

fn configure(camera: &Camera, args: &Args) -> Result<CameraConfiguration, Box<dyn Error>> {
    let mut config = camera
        .generate_configuration(&[args.role])
        .ok_or_else(|| format!("camera {} does not support role {}", camera, args.role))?;

    if let Some(mut stream) = config.at_mut(0) {
        if let Some(format) = args.format {
            stream.set_pixel_format(format);
        }
        if let Some(&[width, height]) = args.size.as_deref() {
            stream.set_size(Size::new(width, height));
        }
        if let Some(count) = args.buffer_count {
            stream.set_buffer_count(count);
        }
    }

    let status = config.validate();
    info!(%status, %config, "configuration validated");
    Ok(config)
}

fn formats(camera: &Camera, args: &Args) -> Result<(), Box<dyn Error>> {
    let config = camera
        .generate_configuration(&[args.role])
        .ok_or_else(|| format!("camera {} does not support role {}", camera, args.role))?;
    let stream = config.at(0).ok_or("empty configuration")?;
    let formats = stream.formats();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&formats)?);
        return Ok(());
    }

    println!("{} default: {}", args.role, stream);
    for entry in formats.entries() {
        println!("  {} {}", entry.pixel_format, entry.range);
        for size in &entry.sizes {
            println!("    {}", size);
        }
    }
    Ok(())
}

fn controls(camera: &Camera, args: &Args) -> Result<(), Box<dyn Error>> {
    let controls = camera.controls();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&controls)?);
        return Ok(());
    }

    for (id, info) in controls.iter() {
        println!("{} ({}): {} default {}", id, id.control_type(), info, info.def());
    }
    Ok(())
}

fn save_frame(dir: &Path, sequence: u32, buffer: &FrameBuffer) -> Result<(), Box<dyn Error>> {
    let mapped = MappedFrameBuffer::map(buffer)?;
    let path = dir.join(format!("frame-{sequence:06}.bin"));
    let mut file = File::create(&path)?;
    for plane in mapped.planes() {
        file.write_all(plane)?;
    }
    debug!(path = %path.display(), "frame written");
    Ok(())
}

fn capture(
    camera: &Camera,
    args: &Args,
    frames: u32,
    output: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let _span = info_span!("capture", camera = %camera.id()).entered();
    if let Some(dir) = output {
        fs::create_dir_all(dir)?;
    }

    camera.acquire()?;
    let mut config = configure(camera, args)?;
    camera.configure(&mut config)?;

    let stream = *camera.streams().first().ok_or("no stream configured")?;
    let mut allocator = FrameBufferAllocator::new(camera)?;
    allocator.allocate(stream)?;

    let mut requests: HashMap<u64, Request> = HashMap::new();
    for (cookie, buffer) in allocator.buffers(stream).iter().enumerate() {
        let mut request = camera
            .create_request(cookie as u64)
            .ok_or("cannot create request")?;
        request.add_buffer(buffer)?;
        requests.insert(cookie as u64, request);
    }

    let (tx, rx) = kanal::unbounded::<Completion>();
    let slot = RequestCompleteSlot::connect(
        camera,
        |tx: &kanal::Sender<Completion>, request: &CompletedRequest<'_>| {
            let buffers = request
                .buffers()
                .into_iter()
                .filter_map(|(_, buffer)| request.buffer_metadata(buffer))
                .collect();
            let completion = Completion {
                cookie: request.cookie(),
                sequence: request.sequence(),
                status: request.status(),
                buffers,
                metadata: request.metadata(),
            };
            if tx.send(completion).is_err() {
                warn!("capture loop gone, dropping completion");
            }
        },
        tx,
    )?;

    camera.start(None)?;
    for request in requests.values_mut() {
        camera.queue_request(request)?;
    }

    let start = Instant::now();
    let mut queued = requests.len() as u32;
    let mut captured = 0;
    while captured < frames {
        let completion = match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(completion) => completion,
            Err(e) => {
                camera.stop()?;
                return Err(format!("waiting for frames: {e}").into());
            }
        };
        if completion.status == RequestStatus::Cancelled {
            continue;
        }
        captured += 1;

        let metadata = completion.buffers.first().cloned().unwrap_or_default();
        if args.json {
            let value = json!({
                "sequence": completion.sequence,
                "buffer": metadata,
                "metadata": named(&completion.metadata, control_name),
            });
            println!("{}", value);
        } else {
            println!("{:.6} ({}) {}", start.elapsed().as_secs_f64(), completion.cookie, metadata);
        }

        let Some(request) = requests.get_mut(&completion.cookie) else {
            warn!(cookie = completion.cookie, "completion for unknown request");
            continue;
        };
        if let (Some(dir), Some(buffer)) = (output, request.find_buffer(stream)) {
            save_frame(dir, completion.sequence, &buffer)?;
        }
        if queued < frames {
            request.reuse(ReuseFlag::ReuseBuffers);
            camera.queue_request(request)?;
            queued += 1;
        }
    }

    camera.stop()?;
    drop(slot);
    drop(requests);
    drop(allocator);
    camera.release()?;

    let elapsed = start.elapsed().as_secs_f64();
    info!(frames = captured, fps = captured as f64 / elapsed, "capture complete");
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(&args)?;

    let manager = open_manager(&args)?;
    match &args.command {
        Command::List => list(&manager, &args),
        Command::Formats => formats(&select_camera(&manager, &args.camera)?, &args),
        Command::Controls => controls(&select_camera(&manager, &args.camera)?, &args),
        Command::Capture { frames, output } => capture(
            &select_camera(&manager, &args.camera)?,
            &args,
            *frames,
            output.as_deref(),
        ),
    }
}
