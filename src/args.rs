// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::{Parser, Subcommand};
use libcamera_bridge::{PixelFormat, StreamRole};
use std::path::PathBuf;

/// Camera stack backing the camera manager.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum Backend {
    /// In-process virtual cameras
    Virtual,
    /// The system's libcamera installation
    Libcamera,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List cameras with their properties
    List,

    /// Print the stream formats a camera offers for a role
    Formats,

    /// Print the controls a camera supports with their limits
    Controls,

    /// Capture frames and print their metadata
    Capture {
        /// Number of frames to capture
        #[arg(short = 'n', long, env = "FRAMES", default_value = "10")]
        frames: u32,

        /// Directory receiving the raw frame data (one file per frame)
        #[arg(short, long, env = "OUTPUT")]
        output: Option<PathBuf>,
    },
}

/// Command-line arguments for the libcamera bridge tool.
///
/// Every option can also be given through the environment variable named in
/// its help text, which suits running the tool from a systemd unit.
///
/// # Example
///
/// ```bash
/// # Capture five viewfinder frames from the first virtual camera
/// libcamera-bridge --role viewfinder capture -n 5
///
/// # Same, on real hardware
/// BACKEND=libcamera libcamera-bridge capture -n 5
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Camera stack to use
    #[arg(long, env = "BACKEND", default_value = "virtual", value_enum, global = true)]
    pub backend: Backend,

    /// JSON description of the virtual cameras (built-in pair when absent)
    #[arg(long, env = "VIRTUAL_CONFIG", global = true)]
    pub virtual_config: Option<PathBuf>,

    /// Camera index in enumeration order, or camera id
    #[arg(short, long, env = "CAMERA", default_value = "0", global = true)]
    pub camera: String,

    /// Stream role used to generate the configuration
    #[arg(long, env = "ROLE", default_value = "viewfinder", value_enum, global = true)]
    pub role: StreamRole,

    /// Override the number of buffers to allocate
    #[arg(long, env = "BUFFER_COUNT", global = true)]
    pub buffer_count: Option<u32>,

    /// Override the stream resolution in pixels (width height)
    #[arg(
        long,
        env = "SIZE",
        value_delimiter = ' ',
        num_args = 2,
        global = true
    )]
    pub size: Option<Vec<u32>>,

    /// Override the pixel format (e.g. NV12, YUYV, SRGGB10_CSI2P)
    #[arg(long, env = "FORMAT", global = true)]
    pub format: Option<PixelFormat>,

    /// Print JSON instead of text
    #[arg(long, env = "JSON", global = true)]
    pub json: bool,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Send logs to the systemd journal
    #[arg(long, env = "JOURNALD", global = true)]
    pub journald: bool,
}
