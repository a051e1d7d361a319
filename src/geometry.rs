// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A two-dimensional size in pixels.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn is_null(&self) -> bool {
        self.width == 0 && self.height == 0
    }

    pub const fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Whether both dimensions fit inside `other`.
    pub const fn fits_in(&self, other: &Size) -> bool {
        self.width <= other.width && self.height <= other.height
    }

    /// Clamps each dimension to `[min, max]`.
    pub fn bounded_to(&self, min: &Size, max: &Size) -> Size {
        Size {
            width: self.width.clamp(min.width, max.width.max(min.width)),
            height: self.height.clamp(min.height, max.height.max(min.height)),
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Size::new(width, height)
    }
}

/// An inclusive range of sizes with horizontal and vertical steps.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SizeRange {
    pub min: Size,
    pub max: Size,
    pub h_step: u32,
    pub v_step: u32,
}

impl SizeRange {
    pub const fn new(min: Size, max: Size, h_step: u32, v_step: u32) -> Self {
        Self {
            min,
            max,
            h_step,
            v_step,
        }
    }

    /// A range containing exactly one size.
    pub const fn single(size: Size) -> Self {
        Self::new(size, size, 1, 1)
    }

    pub fn contains(&self, size: &Size) -> bool {
        if size.width < self.min.width
            || size.width > self.max.width
            || size.height < self.min.height
            || size.height > self.max.height
        {
            return false;
        }

        let h_ok = self.h_step == 0 || (size.width - self.min.width) % self.h_step == 0;
        let v_ok = self.v_step == 0 || (size.height - self.min.height) % self.v_step == 0;
        h_ok && v_ok
    }
}

impl fmt::Display for SizeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({})-({})/(+{},+{})",
            self.min, self.max, self.h_step, self.v_step
        )
    }
}

/// A rectangle positioned relative to a reference frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rectangle {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl From<Size> for Rectangle {
    fn from(size: Size) -> Self {
        Rectangle::new(0, 0, size.width, size.height)
    }
}

impl fmt::Display for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {})/{}x{}",
            self.x, self.y, self.width, self.height
        )
    }
}
