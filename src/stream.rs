// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Stream roles, stream configuration records and views.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    backend::NativeConfiguration,
    geometry::{Size, SizeRange},
    handle::StreamHandle,
    pixel_format::PixelFormat,
};

/// Intended use of a stream, as libcamera's `StreamRole`.
#[derive(
    clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum StreamRole {
    /// Unprocessed sensor data
    Raw,
    /// High resolution, low frame rate stills
    StillCapture,
    /// Frames for encoding and storage
    VideoRecording,
    /// Low latency frames for display
    Viewfinder,
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamRole::Raw => "Raw",
            StreamRole::StillCapture => "StillCapture",
            StreamRole::VideoRecording => "VideoRecording",
            StreamRole::Viewfinder => "Viewfinder",
        })
    }
}

/// Plain copy of a stream configuration's fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub pixel_format: PixelFormat,
    pub size: Size,
    pub stride: u32,
    pub frame_size: u32,
    pub buffer_count: u32,
}

impl StreamConfig {
    pub fn new(pixel_format: PixelFormat, size: Size, buffer_count: u32) -> Self {
        Self {
            pixel_format,
            size,
            stride: 0,
            frame_size: 0,
            buffer_count,
        }
    }
}

/// Renders like libcamera's `StreamConfiguration::toString()`.
impl fmt::Display for StreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.size, self.pixel_format)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamFormatEntry {
    pub pixel_format: PixelFormat,
    pub sizes: Vec<Size>,
    pub range: SizeRange,
}

/// Formats and sizes a stream supports, as libcamera's `StreamFormats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamFormats {
    entries: Vec<StreamFormatEntry>,
}

impl StreamFormats {
    pub fn new(entries: Vec<StreamFormatEntry>) -> Self {
        Self { entries }
    }

    pub fn pixel_formats(&self) -> Vec<PixelFormat> {
        self.entries.iter().map(|e| e.pixel_format).collect()
    }

    /// Discrete sizes for `pixel_format`, empty if unsupported.
    pub fn sizes(&self, pixel_format: PixelFormat) -> Vec<Size> {
        self.entry(pixel_format)
            .map(|e| e.sizes.clone())
            .unwrap_or_default()
    }

    /// Size range for `pixel_format`, the default range if unsupported.
    pub fn range(&self, pixel_format: PixelFormat) -> SizeRange {
        self.entry(pixel_format).map(|e| e.range).unwrap_or_default()
    }

    pub fn entries(&self) -> &[StreamFormatEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, pixel_format: PixelFormat) -> Option<&StreamFormatEntry> {
        self.entries.iter().find(|e| e.pixel_format == pixel_format)
    }
}

macro_rules! getters {
    () => {
        pub fn index(&self) -> usize {
            self.index
        }

        pub fn pixel_format(&self) -> PixelFormat {
            self.config.pixel_format(self.index)
        }

        pub fn size(&self) -> Size {
            self.config.size(self.index)
        }

        pub fn stride(&self) -> u32 {
            self.config.stride(self.index)
        }

        pub fn frame_size(&self) -> u32 {
            self.config.frame_size(self.index)
        }

        pub fn buffer_count(&self) -> u32 {
            self.config.buffer_count(self.index)
        }

        /// The stream this entry was bound to by `Camera::configure`, `None`
        /// before the camera has been configured with it.
        pub fn stream(&self) -> Option<StreamHandle> {
            self.config.stream(self.index)
        }

        pub fn formats(&self) -> StreamFormats {
            self.config.formats(self.index)
        }

        pub fn snapshot(&self) -> StreamConfig {
            StreamConfig {
                pixel_format: self.pixel_format(),
                size: self.size(),
                stride: self.stride(),
                frame_size: self.frame_size(),
                buffer_count: self.buffer_count(),
            }
        }
    };
}

/// Read-only view of one entry of a camera configuration.
#[derive(Clone, Copy)]
pub struct StreamConfigurationRef<'a> {
    pub(crate) config: &'a dyn NativeConfiguration,
    pub(crate) index: usize,
}

impl StreamConfigurationRef<'_> {
    getters!();
}

/// Mutable view of one entry of a camera configuration.
///
/// Setters write straight through to the native object; nothing is checked
/// until the configuration is validated.
pub struct StreamConfigurationMut<'a> {
    pub(crate) config: &'a mut dyn NativeConfiguration,
    pub(crate) index: usize,
}

impl StreamConfigurationMut<'_> {
    getters!();

    pub fn set_pixel_format(&mut self, value: PixelFormat) {
        self.config.set_pixel_format(self.index, value)
    }

    pub fn set_size(&mut self, value: Size) {
        self.config.set_size(self.index, value)
    }

    pub fn set_stride(&mut self, value: u32) {
        self.config.set_stride(self.index, value)
    }

    pub fn set_frame_size(&mut self, value: u32) {
        self.config.set_frame_size(self.index, value)
    }

    pub fn set_buffer_count(&mut self, value: u32) {
        self.config.set_buffer_count(self.index, value)
    }

    /// Writes every field of `config`.
    pub fn apply(&mut self, config: &StreamConfig) {
        self.set_pixel_format(config.pixel_format);
        self.set_size(config.size);
        self.set_stride(config.stride);
        self.set_frame_size(config.frame_size);
        self.set_buffer_count(config.buffer_count);
    }
}

impl fmt::Display for StreamConfigurationRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.snapshot().fmt(f)
    }
}

impl fmt::Display for StreamConfigurationMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.snapshot().fmt(f)
    }
}

impl fmt::Debug for StreamConfigurationRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamConfiguration")
            .field("index", &self.index)
            .field("config", &self.snapshot())
            .field("stream", &self.stream())
            .finish()
    }
}
