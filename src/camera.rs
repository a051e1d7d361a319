// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use core::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::{
    backend::NativeCamera,
    camera_configuration::CameraConfiguration,
    camera_manager::ManagerShared,
    controls::{ControlInfoMap, ControlList},
    error::{errno, Error, Result},
    handle::{CameraHandle, StreamHandle},
    request::{CompletedRequest, Request},
    slot::RequestCompleteSlot,
    stream::StreamRole,
};

struct CameraShared {
    native: Arc<dyn NativeCamera>,
    id: String,
    // Dropped after `native`.
    _manager: Arc<ManagerShared>,
}

/// A camera known to a [`CameraManager`](crate::CameraManager).
///
/// `Camera` is a cheap, cloneable, shared handle. Every clone refers to the
/// same native camera, and the camera manager stays running while any clone
/// is alive. The libcamera state machine applies: a camera must be acquired
/// before it can be configured, configured before it can be started, and
/// started before requests can be queued. Out-of-order calls fail with the
/// errno libcamera reports (`EBUSY`, `EACCES` or `EINVAL`).
#[derive(Clone)]
pub struct Camera {
    shared: Arc<CameraShared>,
}

impl Camera {
    pub(crate) fn new(native: Arc<dyn NativeCamera>, manager: Arc<ManagerShared>) -> Self {
        let id = native.id();
        Self {
            shared: Arc::new(CameraShared {
                native,
                id,
                _manager: manager,
            }),
        }
    }

    pub(crate) fn native(&self) -> &dyn NativeCamera {
        &*self.shared.native
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn handle(&self) -> CameraHandle {
        self.shared.native.handle()
    }

    /// Claims exclusive use of the camera. Fails with `EBUSY` if it is
    /// already acquired.
    #[instrument(skip(self), fields(camera = %self.id()))]
    pub fn acquire(&self) -> Result<()> {
        self.native().acquire()?;
        debug!("acquired");
        Ok(())
    }

    /// Gives up exclusive use. Fails with `EBUSY` while the camera is running.
    #[instrument(skip(self), fields(camera = %self.id()))]
    pub fn release(&self) -> Result<()> {
        self.native().release()?;
        debug!("released");
        Ok(())
    }

    /// Generates a default configuration with one entry per role, `None` if
    /// the roles cannot be satisfied.
    pub fn generate_configuration(&self, roles: &[StreamRole]) -> Option<CameraConfiguration> {
        let native = self.native().generate_configuration(roles)?;
        Some(CameraConfiguration::new(self.clone(), native))
    }

    /// Applies a validated configuration, binding its entries to streams.
    ///
    /// Fails with `EINVAL` if the configuration does not validate as
    /// [`Valid`](crate::CameraConfigurationStatus::Valid) and with `EACCES`
    /// if the camera is not acquired or is running.
    #[instrument(skip_all, fields(camera = %self.id(), config = %config))]
    pub fn configure(&self, config: &mut CameraConfiguration) -> Result<()> {
        if config.camera() != self {
            return Err(Error::InvalidArgument(format!(
                "configuration was generated by camera {}",
                config.camera().id()
            )));
        }
        self.native().configure(&mut *config.native)?;
        info!("configured");
        Ok(())
    }

    #[instrument(skip_all, fields(camera = %self.id()))]
    pub fn start(&self, controls: Option<&ControlList>) -> Result<()> {
        self.native().start(controls)?;
        info!("started");
        Ok(())
    }

    /// Stops capture. Requests still queued complete as cancelled before
    /// this returns.
    #[instrument(skip(self), fields(camera = %self.id()))]
    pub fn stop(&self) -> Result<()> {
        self.native().stop()?;
        info!("stopped");
        Ok(())
    }

    /// Creates a request carrying `cookie`, `None` unless the camera is
    /// configured or running.
    pub fn create_request(&self, cookie: u64) -> Option<Request> {
        let native = self.native().create_request(cookie)?;
        Some(Request::new(self.clone(), native))
    }

    pub fn queue_request(&self, request: &mut Request) -> Result<()> {
        if request.camera() != self {
            return errno::err("queue_request", libc::EXDEV);
        }
        self.native().queue_request(&mut *request.native)
    }

    /// Streams of the active configuration, in configuration order.
    pub fn streams(&self) -> Vec<StreamHandle> {
        self.native().streams()
    }

    pub fn contains_stream(&self, stream: StreamHandle) -> bool {
        self.streams().contains(&stream)
    }

    pub fn controls(&self) -> ControlInfoMap {
        self.native().controls()
    }

    pub fn properties(&self) -> ControlList {
        self.native().properties()
    }

    /// Connects a context-free completion handler. Keep the returned slot
    /// alive for as long as the handler should run.
    pub fn on_request_completed<F>(&self, handler: F) -> Result<RequestCompleteSlot<()>>
    where
        F: Fn(&CompletedRequest<'_>) + Send + Sync + 'static,
    {
        RequestCompleteSlot::connect(self, move |_: &(), request| handler(request), ())
    }
}

impl PartialEq for Camera {
    fn eq(&self, other: &Self) -> bool {
        self.handle() == other.handle()
    }
}

impl Eq for Camera {}

impl fmt::Debug for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Camera")
            .field("id", &self.id())
            .field("handle", &self.handle())
            .finish()
    }
}

impl fmt::Display for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
