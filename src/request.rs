// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use core::fmt;

use serde::Serialize;
use tracing::warn;

use crate::{
    backend::NativeRequest,
    camera::Camera,
    controls::ControlList,
    error::Result,
    frame_buffer::{FrameBuffer, FrameMetadata},
    handle::{FrameBufferHandle, RequestHandle, StreamHandle},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RequestStatus {
    Pending,
    Complete,
    Cancelled,
}

impl RequestStatus {
    /// Single letter used by libcamera's request string.
    pub fn code(&self) -> char {
        match self {
            RequestStatus::Pending => 'P',
            RequestStatus::Complete => 'C',
            RequestStatus::Cancelled => 'X',
        }
    }
}

/// How much of a request [`Request::reuse`] keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReuseFlag {
    /// Drop the attached buffers.
    #[default]
    Default,
    /// Keep the attached buffers.
    ReuseBuffers,
}

fn write_request(f: &mut fmt::Formatter<'_>, request: &dyn NativeRequest) -> fmt::Result {
    let total = request.buffers().len();
    let pending = if request.has_pending_buffers() {
        total
    } else {
        0
    };
    write!(
        f,
        "Request({}:{}:{}/{}:{})",
        request.sequence(),
        request.status().code(),
        pending,
        total,
        request.cookie()
    )
}

/// A capture request created by [`Camera::create_request`].
///
/// Buffers attached with [`add_buffer`](Self::add_buffer) stay referenced by
/// the request until it is reused without
/// [`ReuseBuffers`](ReuseFlag::ReuseBuffers) or dropped.
pub struct Request {
    pub(crate) native: Box<dyn NativeRequest>,
    buffers: Vec<FrameBuffer>,
    camera: Camera,
}

impl Request {
    pub(crate) fn new(camera: Camera, native: Box<dyn NativeRequest>) -> Self {
        Self {
            native,
            buffers: Vec::new(),
            camera,
        }
    }

    pub fn handle(&self) -> RequestHandle {
        self.native.handle()
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn cookie(&self) -> u64 {
        self.native.cookie()
    }

    /// Frame sequence number, valid once the request has completed.
    pub fn sequence(&self) -> u32 {
        self.native.sequence()
    }

    pub fn status(&self) -> RequestStatus {
        self.native.status()
    }

    /// Attaches `buffer` to the request for the stream it was allocated for.
    ///
    /// Fails with `EEXIST` if the request already has a buffer for that
    /// stream.
    pub fn add_buffer(&mut self, buffer: &FrameBuffer) -> Result<()> {
        self.native.add_buffer(buffer.stream(), buffer.handle())?;
        self.buffers.push(buffer.clone());
        Ok(())
    }

    pub fn find_buffer(&self, stream: StreamHandle) -> Option<FrameBuffer> {
        let handle = self.native.find_buffer(stream)?;
        self.buffers.iter().find(|b| b.handle() == handle).cloned()
    }

    /// Attached buffers keyed by stream.
    pub fn buffers(&self) -> Vec<(StreamHandle, FrameBuffer)> {
        self.native
            .buffers()
            .into_iter()
            .filter_map(|(stream, handle)| {
                self.buffers
                    .iter()
                    .find(|b| b.handle() == handle)
                    .map(|b| (stream, b.clone()))
            })
            .collect()
    }

    pub fn has_pending_buffers(&self) -> bool {
        self.native.has_pending_buffers()
    }

    /// Resets the request to pending so it can be queued again.
    pub fn reuse(&mut self, flag: ReuseFlag) {
        if self.native.has_pending_buffers() {
            warn!(cookie = self.cookie(), "reuse of an in-flight request ignored");
            return;
        }
        self.native.reuse(flag);
        if flag == ReuseFlag::Default {
            self.buffers.clear();
        }
    }

    /// Controls that will be applied when the request is queued.
    pub fn controls(&self) -> ControlList {
        self.native.controls()
    }

    pub fn set_controls(&mut self, controls: &ControlList) {
        self.native.set_controls(controls)
    }

    /// Metadata reported by the camera on completion.
    pub fn metadata(&self) -> ControlList {
        self.native.metadata()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_request(f, &*self.native)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_request(f, &*self.native)
    }
}

/// Read-only view of a request passed to completion handlers.
#[derive(Clone, Copy)]
pub struct CompletedRequest<'a> {
    native: &'a dyn NativeRequest,
}

impl<'a> CompletedRequest<'a> {
    pub(crate) fn new(native: &'a dyn NativeRequest) -> Self {
        Self { native }
    }

    pub fn handle(&self) -> RequestHandle {
        self.native.handle()
    }

    pub fn cookie(&self) -> u64 {
        self.native.cookie()
    }

    pub fn sequence(&self) -> u32 {
        self.native.sequence()
    }

    pub fn status(&self) -> RequestStatus {
        self.native.status()
    }

    pub fn find_buffer(&self, stream: StreamHandle) -> Option<FrameBufferHandle> {
        self.native.find_buffer(stream)
    }

    pub fn buffers(&self) -> Vec<(StreamHandle, FrameBufferHandle)> {
        self.native.buffers()
    }

    /// Capture metadata of an attached buffer.
    pub fn buffer_metadata(&self, buffer: FrameBufferHandle) -> Option<FrameMetadata> {
        self.native.buffer_metadata(buffer)
    }

    pub fn has_pending_buffers(&self) -> bool {
        self.native.has_pending_buffers()
    }

    pub fn controls(&self) -> ControlList {
        self.native.controls()
    }

    pub fn metadata(&self) -> ControlList {
        self.native.metadata()
    }
}

impl fmt::Display for CompletedRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_request(f, self.native)
    }
}

impl fmt::Debug for CompletedRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_request(f, self.native)
    }
}
