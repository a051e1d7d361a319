// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use core::fmt;

use serde::Serialize;
use tracing::debug;

use crate::{
    backend::NativeConfiguration,
    camera::Camera,
    stream::{StreamConfig, StreamConfigurationMut, StreamConfigurationRef},
};

/// Outcome of [`CameraConfiguration::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CameraConfigurationStatus {
    /// Accepted unchanged.
    Valid,
    /// Accepted after adjusting one or more entries.
    Adjusted,
    /// Cannot be used, even after adjustment.
    Invalid,
}

impl fmt::Display for CameraConfigurationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CameraConfigurationStatus::Valid => "Valid",
            CameraConfigurationStatus::Adjusted => "Adjusted",
            CameraConfigurationStatus::Invalid => "Invalid",
        })
    }
}

/// An ordered set of stream configurations generated by a camera.
///
/// The configuration keeps its camera alive. Entries are edited through
/// [`at_mut`](Self::at_mut) and checked with [`validate`](Self::validate)
/// before being applied with [`Camera::configure`].
pub struct CameraConfiguration {
    pub(crate) native: Box<dyn NativeConfiguration>,
    camera: Camera,
}

impl CameraConfiguration {
    pub(crate) fn new(camera: Camera, native: Box<dyn NativeConfiguration>) -> Self {
        Self { native, camera }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn len(&self) -> usize {
        self.native.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn at(&self, index: usize) -> Option<StreamConfigurationRef<'_>> {
        (index < self.len()).then(|| StreamConfigurationRef {
            config: &*self.native,
            index,
        })
    }

    pub fn at_mut(&mut self, index: usize) -> Option<StreamConfigurationMut<'_>> {
        if index >= self.len() {
            return None;
        }
        Some(StreamConfigurationMut {
            config: &mut *self.native,
            index,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = StreamConfigurationRef<'_>> {
        (0..self.len()).map(move |index| StreamConfigurationRef {
            config: &*self.native,
            index,
        })
    }

    /// Appends an entry. Stride and frame size are recomputed on validation.
    pub fn add_configuration(&mut self, config: StreamConfig) {
        self.native.add_configuration(&config);
    }

    /// Checks the configuration against the camera's capabilities, adjusting
    /// entries in place where possible.
    ///
    /// Validating a configuration that already validated, without changing
    /// it in between, returns [`Valid`](CameraConfigurationStatus::Valid) and
    /// modifies nothing.
    pub fn validate(&mut self) -> CameraConfigurationStatus {
        let status = self.native.validate();
        debug!(camera = %self.camera.id(), %status, config = %self, "validated configuration");
        status
    }

    /// Plain copies of every entry.
    pub fn snapshot(&self) -> Vec<StreamConfig> {
        self.iter().map(|c| c.snapshot()).collect()
    }
}

impl fmt::Display for CameraConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, config) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{config}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CameraConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraConfiguration")
            .field("camera", &self.camera.id())
            .field("streams", &self.iter().collect::<Vec<_>>())
            .finish()
    }
}
