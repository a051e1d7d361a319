// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Typed identifiers for libcamera's core controls and properties.
//!
//! Numeric ids follow libcamera's generated `control_ids.h` and
//! `property_ids.h` for the core namespace.

use core::{fmt, marker::PhantomData};

use super::{ControlId, ControlValueType};

/// A control id bound to the Rust type its value converts to.
pub struct Control<T> {
    id: u32,
    name: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T> Clone for Control<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Control<T> {}

impl<T> Control<T> {
    pub const fn new(id: u32, name: &'static str) -> Self {
        Self {
            id,
            name,
            _type: PhantomData,
        }
    }

    pub const fn id(&self) -> u32 {
        self.id
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: ControlValueType> Control<T> {
    /// Untyped descriptor for this control.
    pub fn control_id(&self) -> ControlId {
        ControlId::new(self.id, self.name, T::KIND)
    }
}

impl<T> fmt::Debug for Control<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

macro_rules! control_ids {
    ($table:ident { $($name:ident = $id:literal : $t:ty => $display:literal,)* }) => {
        $(
            pub const $name: Control<$t> = Control::new($id, $display);
        )*

        pub(crate) fn $table() -> Vec<ControlId> {
            vec![$(ControlId::new($id, $display, <$t as ControlValueType>::KIND),)*]
        }
    };
}

pub mod controls {
    use super::*;
    use crate::geometry::Rectangle;

    control_ids!(all {
        AE_ENABLE = 1: bool => "AeEnable",
        AE_LOCKED = 2: bool => "AeLocked",
        AE_METERING_MODE = 3: i32 => "AeMeteringMode",
        AE_CONSTRAINT_MODE = 4: i32 => "AeConstraintMode",
        AE_EXPOSURE_MODE = 5: i32 => "AeExposureMode",
        EXPOSURE_VALUE = 6: f32 => "ExposureValue",
        EXPOSURE_TIME = 7: i32 => "ExposureTime",
        ANALOGUE_GAIN = 8: f32 => "AnalogueGain",
        BRIGHTNESS = 9: f32 => "Brightness",
        CONTRAST = 10: f32 => "Contrast",
        LUX = 11: f32 => "Lux",
        AWB_ENABLE = 12: bool => "AwbEnable",
        AWB_MODE = 13: i32 => "AwbMode",
        AWB_LOCKED = 14: bool => "AwbLocked",
        COLOUR_GAINS = 15: [f32; 2] => "ColourGains",
        COLOUR_TEMPERATURE = 16: i32 => "ColourTemperature",
        SATURATION = 17: f32 => "Saturation",
        SENSOR_BLACK_LEVELS = 18: [i32; 4] => "SensorBlackLevels",
        SHARPNESS = 19: f32 => "Sharpness",
        FOCUS_FO_M = 20: i32 => "FocusFoM",
        COLOUR_CORRECTION_MATRIX = 21: [f32; 9] => "ColourCorrectionMatrix",
        SCALER_CROP = 22: Rectangle => "ScalerCrop",
        DIGITAL_GAIN = 23: f32 => "DigitalGain",
        FRAME_DURATION = 24: i64 => "FrameDuration",
        FRAME_DURATION_LIMITS = 25: [i64; 2] => "FrameDurationLimits",
        SENSOR_TEMPERATURE = 26: f32 => "SensorTemperature",
        SENSOR_TIMESTAMP = 27: i64 => "SensorTimestamp",
    });
}

pub mod properties {
    use super::*;
    use crate::geometry::{Rectangle, Size};

    control_ids!(all {
        LOCATION = 1: i32 => "Location",
        ROTATION = 2: i32 => "Rotation",
        MODEL = 3: String => "Model",
        UNIT_CELL_SIZE = 4: Size => "UnitCellSize",
        PIXEL_ARRAY_SIZE = 5: Size => "PixelArraySize",
        PIXEL_ARRAY_OPTICAL_BLACK_RECTANGLES = 6: Vec<Rectangle> => "PixelArrayOpticalBlackRectangles",
        PIXEL_ARRAY_ACTIVE_AREAS = 7: Vec<Rectangle> => "PixelArrayActiveAreas",
        SCALER_CROP_MAXIMUM = 8: Rectangle => "ScalerCropMaximum",
        SENSOR_SENSITIVITY = 9: f32 => "SensorSensitivity",
    });

    /// Values of [`LOCATION`].
    pub const CAMERA_LOCATION_FRONT: i32 = 0;
    pub const CAMERA_LOCATION_BACK: i32 = 1;
    pub const CAMERA_LOCATION_EXTERNAL: i32 = 2;
}

/// Name of a core control id, if known.
pub fn control_name(id: u32) -> Option<&'static str> {
    lookup(id, controls::all)
}

/// Name of a core property id, if known.
pub fn property_name(id: u32) -> Option<&'static str> {
    lookup(id, properties::all)
}

fn lookup(id: u32, table: fn() -> Vec<ControlId>) -> Option<&'static str> {
    table()
        .into_iter()
        .find(|c| c.id() == id)
        .and_then(|c| c.static_name())
}
