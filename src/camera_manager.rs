// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use core::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    backend::{virtual_camera::VirtualConfig, NativeManager},
    camera::Camera,
    error::Result,
};

pub(crate) struct ManagerShared {
    native: Mutex<Box<dyn NativeManager>>,
}

impl Drop for ManagerShared {
    fn drop(&mut self) {
        self.native.get_mut().stop();
        debug!("camera manager stopped");
    }
}

/// Entry point to a camera stack.
///
/// Creating a manager starts it; dropping the manager and every [`Camera`]
/// obtained from it stops it again.
///
/// # Example
///
/// ```no_run
/// use libcamera_bridge::CameraManager;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = CameraManager::new()?;
/// for camera in manager.cameras() {
///     println!("{}", camera.id());
/// }
/// # Ok(())
/// # }
/// ```
pub struct CameraManager {
    shared: Arc<ManagerShared>,
}

impl CameraManager {
    /// Starts libcamera's camera manager.
    #[cfg(feature = "libcamera")]
    pub fn new() -> Result<Self> {
        Self::with_backend(Box::new(crate::backend::libcamera::LibcameraManager::new()?))
    }

    /// Always fails: the crate was built without the `libcamera` feature.
    #[cfg(not(feature = "libcamera"))]
    pub fn new() -> Result<Self> {
        Err(crate::error::Error::Unsupported(
            "built without the libcamera feature".to_owned(),
        ))
    }

    /// Starts a manager over in-process virtual cameras.
    pub fn virtual_cameras(config: VirtualConfig) -> Result<Self> {
        Self::with_backend(Box::new(
            crate::backend::virtual_camera::VirtualManager::new(config),
        ))
    }

    /// Starts a manager over any backend.
    pub fn with_backend(mut native: Box<dyn NativeManager>) -> Result<Self> {
        native.start()?;
        info!(version = %native.version(), "camera manager started");
        Ok(Self {
            shared: Arc::new(ManagerShared {
                native: Mutex::new(native),
            }),
        })
    }

    pub fn version(&self) -> String {
        self.shared.native.lock().version()
    }

    /// Cameras currently known, in enumeration order.
    pub fn cameras(&self) -> Vec<Camera> {
        let natives = self.shared.native.lock().cameras();
        natives
            .into_iter()
            .map(|native| Camera::new(native, self.shared.clone()))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Camera> {
        self.cameras().into_iter().find(|c| c.id() == id)
    }
}

impl fmt::Debug for CameraManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraManager")
            .field("version", &self.version())
            .finish()
    }
}
