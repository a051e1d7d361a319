// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Pixel formats as libcamera describes them: a DRM fourcc plus a format
//! modifier. String rendering follows libcamera's `PixelFormat::toString()`
//! so names printed here match what the native tools print.

use core::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Builds a little-endian fourcc code the way DRM's `fourcc_code()` does.
pub const fn fourcc(a: u8, b: u8, c: u8, d: u8) -> u32 {
    (a as u32) | (b as u32) << 8 | (c as u32) << 16 | (d as u32) << 24
}

/// MIPI CSI-2 packed raw Bayer modifier (`MIPI_FORMAT_MOD_CSI2_PACKED`).
pub const MIPI_FORMAT_MOD_CSI2_PACKED: u64 = 0x0a << 56 | 1;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PixelFormat {
    fourcc: u32,
    modifier: u64,
}

impl PixelFormat {
    pub const fn new(fourcc: u32, modifier: u64) -> Self {
        Self { fourcc, modifier }
    }

    pub const fn fourcc(&self) -> u32 {
        self.fourcc
    }

    pub const fn modifier(&self) -> u64 {
        self.modifier
    }

    pub const fn is_valid(&self) -> bool {
        self.fourcc != 0
    }

    /// Layout information, if the format is one libcamera knows.
    pub fn info(&self) -> Option<&'static PixelFormatInfo> {
        FORMAT_INFO.iter().find(|i| i.format == *self)
    }

    /// Bytes per line of `plane` for an image `width` pixels wide, rounded up
    /// to `align` bytes (0 or 1 for no alignment). Zero for unknown formats.
    pub fn stride(&self, width: u32, plane: usize, align: u32) -> Result<u32> {
        let Some(info) = self.info() else {
            return Ok(0);
        };
        let Some(&(bytes_per_group, _)) = info.planes.get(plane) else {
            return Ok(0);
        };
        if bytes_per_group == 0 {
            return Ok(0);
        }

        let groups = width.div_ceil(info.pixels_per_group);
        let stride = groups
            .checked_mul(bytes_per_group)
            .ok_or_else(|| self.overflow(width, 1))?;
        if align > 1 {
            stride
                .div_ceil(align)
                .checked_mul(align)
                .ok_or_else(|| self.overflow(width, 1))
        } else {
            Ok(stride)
        }
    }

    /// Size in bytes of `plane` for the given image size.
    pub fn plane_size(&self, width: u32, height: u32, plane: usize, align: u32) -> Result<u32> {
        let Some(info) = self.info() else {
            return Ok(0);
        };
        let Some(&(_, v_sub)) = info.planes.get(plane) else {
            return Ok(0);
        };
        if v_sub == 0 {
            return Ok(0);
        }

        self.stride(width, plane, align)?
            .checked_mul(height.div_ceil(v_sub))
            .ok_or_else(|| self.overflow(width, height))
    }

    /// Total bytes needed for one frame across all planes.
    pub fn frame_size(&self, width: u32, height: u32, align: u32) -> Result<u32> {
        let Some(info) = self.info() else {
            return Ok(0);
        };
        (0..info.num_planes()).try_fold(0u32, |total, p| {
            total
                .checked_add(self.plane_size(width, height, p, align)?)
                .ok_or_else(|| self.overflow(width, height))
        })
    }

    fn overflow(&self, width: u32, height: u32) -> Error {
        Error::InvalidArgument(format!("{width}x{height}-{self} frame does not fit in 32 bits"))
    }

    /// Unambiguous text form: the libcamera name when there is one,
    /// `<ABCD>` for other printable fourccs, hex otherwise.
    fn serde_name(&self) -> String {
        let printable = (0..4).all(|i| {
            let byte = (self.fourcc >> (8 * i)) as u8;
            byte.is_ascii_graphic() || byte == b' '
        });
        let named = self.info().is_some() || *self == PixelFormat::default();
        if named || (printable && self.modifier == 0) {
            self.to_string()
        } else {
            format!("{:#010x}:{:#x}", self.fourcc, self.modifier)
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(info) = self.info() {
            return f.write_str(info.name);
        }

        if *self == PixelFormat::default() {
            return f.write_str("<INVALID>");
        }

        let mut code = ['.'; 4];
        for (i, c) in code.iter_mut().enumerate() {
            let byte = (self.fourcc >> (8 * i)) as u8;
            if byte.is_ascii_graphic() || byte == b' ' {
                *c = byte as char;
            }
        }
        write!(f, "<{}{}{}{}>", code[0], code[1], code[2], code[3])
    }
}

impl FromStr for PixelFormat {
    type Err = Error;

    /// Accepts libcamera names, `<INVALID>`, `<ABCD>` fourccs and the
    /// `0xFOURCC:0xMODIFIER` hex form.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let unknown = || Error::InvalidArgument(format!("unknown pixel format {s:?}"));

        if let Some(info) = FORMAT_INFO.iter().find(|i| i.name == s) {
            return Ok(info.format);
        }
        if s == "<INVALID>" {
            return Ok(PixelFormat::default());
        }

        if let Some(code) = s.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
            let code = code.as_bytes();
            if code.len() != 4 {
                return Err(unknown());
            }
            return Ok(PixelFormat::new(
                fourcc(code[0], code[1], code[2], code[3]),
                0,
            ));
        }

        let (code, modifier) = s.split_once(':').ok_or_else(unknown)?;
        let code = code.strip_prefix("0x").ok_or_else(unknown)?;
        let modifier = modifier.strip_prefix("0x").ok_or_else(unknown)?;
        Ok(PixelFormat::new(
            u32::from_str_radix(code, 16).map_err(|_| unknown())?,
            u64::from_str_radix(modifier, 16).map_err(|_| unknown())?,
        ))
    }
}

impl Serialize for PixelFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.serde_name())
    }
}

impl<'de> Deserialize<'de> for PixelFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColourEncoding {
    Rgb,
    Yuv,
    Raw,
}

/// Memory layout of a pixel format, mirroring libcamera's `PixelFormatInfo`.
#[derive(Debug)]
pub struct PixelFormatInfo {
    pub name: &'static str,
    pub format: PixelFormat,
    pub bits_per_pixel: u32,
    pub colour_encoding: ColourEncoding,
    pub packed: bool,
    pub pixels_per_group: u32,
    /// `(bytes_per_group, vertical_sub_sampling)` for each plane.
    pub planes: &'static [(u32, u32)],
}

impl PixelFormatInfo {
    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }
}

/// Well-known pixel formats.
pub mod formats {
    use super::{fourcc, PixelFormat, MIPI_FORMAT_MOD_CSI2_PACKED};

    macro_rules! pixel_format {
        ($name:ident, $a:literal $b:literal $c:literal $d:literal) => {
            pixel_format!($name, $a $b $c $d, 0);
        };
        ($name:ident, $a:literal $b:literal $c:literal $d:literal, $modifier:expr) => {
            pub const $name: PixelFormat = PixelFormat::new(fourcc($a, $b, $c, $d), $modifier);
        };
    }

    pixel_format!(R8, b'R' b'8' b' ' b' ');
    pixel_format!(R10, b'R' b'1' b'0' b' ');
    pixel_format!(R12, b'R' b'1' b'2' b' ');
    pixel_format!(R16, b'R' b'1' b'6' b' ');
    pixel_format!(RGB565, b'R' b'G' b'1' b'6');
    pixel_format!(RGB888, b'R' b'G' b'2' b'4');
    pixel_format!(BGR888, b'B' b'G' b'2' b'4');
    pixel_format!(XRGB8888, b'X' b'R' b'2' b'4');
    pixel_format!(XBGR8888, b'X' b'B' b'2' b'4');
    pixel_format!(RGBX8888, b'R' b'X' b'2' b'4');
    pixel_format!(BGRX8888, b'B' b'X' b'2' b'4');
    pixel_format!(ARGB8888, b'A' b'R' b'2' b'4');
    pixel_format!(ABGR8888, b'A' b'B' b'2' b'4');
    pixel_format!(RGBA8888, b'R' b'A' b'2' b'4');
    pixel_format!(BGRA8888, b'B' b'A' b'2' b'4');
    pixel_format!(RGB161616, b'R' b'G' b'4' b'8');
    pixel_format!(BGR161616, b'B' b'G' b'4' b'8');
    pixel_format!(YUYV, b'Y' b'U' b'Y' b'V');
    pixel_format!(YVYU, b'Y' b'V' b'Y' b'U');
    pixel_format!(UYVY, b'U' b'Y' b'V' b'Y');
    pixel_format!(VYUY, b'V' b'Y' b'U' b'Y');
    pixel_format!(NV12, b'N' b'V' b'1' b'2');
    pixel_format!(NV21, b'N' b'V' b'2' b'1');
    pixel_format!(NV16, b'N' b'V' b'1' b'6');
    pixel_format!(NV61, b'N' b'V' b'6' b'1');
    pixel_format!(NV24, b'N' b'V' b'2' b'4');
    pixel_format!(NV42, b'N' b'V' b'4' b'2');
    pixel_format!(YUV420, b'Y' b'U' b'1' b'2');
    pixel_format!(YVU420, b'Y' b'V' b'1' b'2');
    pixel_format!(YUV422, b'Y' b'U' b'1' b'6');
    pixel_format!(YVU422, b'Y' b'V' b'1' b'6');
    pixel_format!(YUV444, b'Y' b'U' b'2' b'4');
    pixel_format!(YVU444, b'Y' b'V' b'2' b'4');
    pixel_format!(MJPEG, b'M' b'J' b'P' b'G');
    pixel_format!(SBGGR8, b'B' b'A' b'8' b'1');
    pixel_format!(SGBRG8, b'G' b'B' b'R' b'G');
    pixel_format!(SGRBG8, b'G' b'R' b'B' b'G');
    pixel_format!(SRGGB8, b'R' b'G' b'G' b'B');
    pixel_format!(SBGGR10, b'B' b'G' b'1' b'0');
    pixel_format!(SGBRG10, b'G' b'B' b'1' b'0');
    pixel_format!(SGRBG10, b'B' b'A' b'1' b'0');
    pixel_format!(SRGGB10, b'R' b'G' b'1' b'0');
    pixel_format!(SBGGR12, b'B' b'G' b'1' b'2');
    pixel_format!(SGBRG12, b'G' b'B' b'1' b'2');
    pixel_format!(SGRBG12, b'B' b'A' b'1' b'2');
    pixel_format!(SRGGB12, b'R' b'G' b'1' b'2');
    pixel_format!(SBGGR10_CSI2P, b'B' b'G' b'1' b'0', MIPI_FORMAT_MOD_CSI2_PACKED);
    pixel_format!(SGBRG10_CSI2P, b'G' b'B' b'1' b'0', MIPI_FORMAT_MOD_CSI2_PACKED);
    pixel_format!(SGRBG10_CSI2P, b'B' b'A' b'1' b'0', MIPI_FORMAT_MOD_CSI2_PACKED);
    pixel_format!(SRGGB10_CSI2P, b'R' b'G' b'1' b'0', MIPI_FORMAT_MOD_CSI2_PACKED);
    pixel_format!(SBGGR12_CSI2P, b'B' b'G' b'1' b'2', MIPI_FORMAT_MOD_CSI2_PACKED);
    pixel_format!(SGBRG12_CSI2P, b'G' b'B' b'1' b'2', MIPI_FORMAT_MOD_CSI2_PACKED);
    pixel_format!(SGRBG12_CSI2P, b'B' b'A' b'1' b'2', MIPI_FORMAT_MOD_CSI2_PACKED);
    pixel_format!(SRGGB12_CSI2P, b'R' b'G' b'1' b'2', MIPI_FORMAT_MOD_CSI2_PACKED);
}

macro_rules! info {
    ($name:ident, $bpp:expr, $enc:ident, $packed:expr, $ppg:expr, $planes:expr) => {
        PixelFormatInfo {
            name: stringify!($name),
            format: formats::$name,
            bits_per_pixel: $bpp,
            colour_encoding: ColourEncoding::$enc,
            packed: $packed,
            pixels_per_group: $ppg,
            planes: $planes,
        }
    };
}

static FORMAT_INFO: &[PixelFormatInfo] = &[
    info!(R8, 8, Yuv, false, 1, &[(1, 1)]),
    info!(R10, 10, Yuv, false, 1, &[(2, 1)]),
    info!(R12, 12, Yuv, false, 1, &[(2, 1)]),
    info!(R16, 16, Yuv, false, 1, &[(2, 1)]),
    info!(RGB565, 16, Rgb, false, 1, &[(2, 1)]),
    info!(RGB888, 24, Rgb, false, 1, &[(3, 1)]),
    info!(BGR888, 24, Rgb, false, 1, &[(3, 1)]),
    info!(XRGB8888, 32, Rgb, false, 1, &[(4, 1)]),
    info!(XBGR8888, 32, Rgb, false, 1, &[(4, 1)]),
    info!(RGBX8888, 32, Rgb, false, 1, &[(4, 1)]),
    info!(BGRX8888, 32, Rgb, false, 1, &[(4, 1)]),
    info!(ARGB8888, 32, Rgb, false, 1, &[(4, 1)]),
    info!(ABGR8888, 32, Rgb, false, 1, &[(4, 1)]),
    info!(RGBA8888, 32, Rgb, false, 1, &[(4, 1)]),
    info!(BGRA8888, 32, Rgb, false, 1, &[(4, 1)]),
    info!(RGB161616, 48, Rgb, false, 1, &[(6, 1)]),
    info!(BGR161616, 48, Rgb, false, 1, &[(6, 1)]),
    info!(YUYV, 16, Yuv, false, 2, &[(4, 1)]),
    info!(YVYU, 16, Yuv, false, 2, &[(4, 1)]),
    info!(UYVY, 16, Yuv, false, 2, &[(4, 1)]),
    info!(VYUY, 16, Yuv, false, 2, &[(4, 1)]),
    info!(NV12, 12, Yuv, false, 2, &[(2, 1), (2, 2)]),
    info!(NV21, 12, Yuv, false, 2, &[(2, 1), (2, 2)]),
    info!(NV16, 16, Yuv, false, 2, &[(2, 1), (2, 1)]),
    info!(NV61, 16, Yuv, false, 2, &[(2, 1), (2, 1)]),
    info!(NV24, 24, Yuv, false, 1, &[(1, 1), (2, 1)]),
    info!(NV42, 24, Yuv, false, 1, &[(1, 1), (2, 1)]),
    info!(YUV420, 12, Yuv, false, 2, &[(2, 1), (1, 2), (1, 2)]),
    info!(YVU420, 12, Yuv, false, 2, &[(2, 1), (1, 2), (1, 2)]),
    info!(YUV422, 16, Yuv, false, 2, &[(2, 1), (1, 1), (1, 1)]),
    info!(YVU422, 16, Yuv, false, 2, &[(2, 1), (1, 1), (1, 1)]),
    info!(YUV444, 24, Yuv, false, 1, &[(1, 1), (1, 1), (1, 1)]),
    info!(YVU444, 24, Yuv, false, 1, &[(1, 1), (1, 1), (1, 1)]),
    info!(MJPEG, 0, Yuv, false, 1, &[(1, 1)]),
    info!(SBGGR8, 8, Raw, false, 2, &[(2, 1)]),
    info!(SGBRG8, 8, Raw, false, 2, &[(2, 1)]),
    info!(SGRBG8, 8, Raw, false, 2, &[(2, 1)]),
    info!(SRGGB8, 8, Raw, false, 2, &[(2, 1)]),
    info!(SBGGR10, 10, Raw, false, 2, &[(4, 1)]),
    info!(SGBRG10, 10, Raw, false, 2, &[(4, 1)]),
    info!(SGRBG10, 10, Raw, false, 2, &[(4, 1)]),
    info!(SRGGB10, 10, Raw, false, 2, &[(4, 1)]),
    info!(SBGGR12, 12, Raw, false, 2, &[(4, 1)]),
    info!(SGBRG12, 12, Raw, false, 2, &[(4, 1)]),
    info!(SGRBG12, 12, Raw, false, 2, &[(4, 1)]),
    info!(SRGGB12, 12, Raw, false, 2, &[(4, 1)]),
    info!(SBGGR10_CSI2P, 10, Raw, true, 4, &[(5, 1)]),
    info!(SGBRG10_CSI2P, 10, Raw, true, 4, &[(5, 1)]),
    info!(SGRBG10_CSI2P, 10, Raw, true, 4, &[(5, 1)]),
    info!(SRGGB10_CSI2P, 10, Raw, true, 4, &[(5, 1)]),
    info!(SBGGR12_CSI2P, 12, Raw, true, 2, &[(3, 1)]),
    info!(SGBRG12_CSI2P, 12, Raw, true, 2, &[(3, 1)]),
    info!(SGRBG12_CSI2P, 12, Raw, true, 2, &[(3, 1)]),
    info!(SRGGB12_CSI2P, 12, Raw, true, 2, &[(3, 1)]),
];

/// Every pixel format with layout information.
pub fn known_formats() -> impl Iterator<Item = PixelFormat> {
    FORMAT_INFO.iter().map(|i| i.format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_layouts() {
        assert_eq!(formats::NV12.stride(1920, 0, 0).unwrap(), 1920);
        assert_eq!(formats::NV12.stride(1920, 1, 0).unwrap(), 1920);
        assert_eq!(formats::NV12.frame_size(1920, 1080, 0).unwrap(), 1920 * 1080 * 3 / 2);
        assert_eq!(formats::YUV420.frame_size(640, 480, 0).unwrap(), 640 * 480 * 3 / 2);
        assert_eq!(formats::YUYV.stride(641, 0, 0).unwrap(), 1284);
        assert_eq!(formats::YUYV.stride(640, 0, 256).unwrap(), 1280);
        assert_eq!(formats::RGB888.stride(100, 0, 64).unwrap(), 320);
        assert_eq!(formats::SRGGB10_CSI2P.stride(4056, 0, 0).unwrap(), 5070);
        let unknown = PixelFormat::new(fourcc(b'Z', b'Z', b'Z', b'Z'), 0);
        assert_eq!(unknown.frame_size(10, 10, 0).unwrap(), 0);
    }

    #[test]
    fn oversize_frames_are_rejected() {
        assert!(matches!(
            formats::XRGB8888.frame_size(70_000, 70_000, 0),
            Err(Error::InvalidArgument(_))
        ));
        assert!(formats::XRGB8888.stride(u32::MAX, 0, 0).is_err());
        assert!(formats::YUYV.stride(u32::MAX / 2, 0, 256).is_err());
        assert!(formats::NV12.plane_size(65_536, 65_536, 0, 0).is_err());
        assert_eq!(formats::XRGB8888.frame_size(16_384, 16_384, 0).unwrap(), 1 << 30);
    }

    #[test]
    fn modifier_distinguishes_formats() {
        assert_eq!(formats::SBGGR10.fourcc(), formats::SBGGR10_CSI2P.fourcc());
        assert_ne!(formats::SBGGR10, formats::SBGGR10_CSI2P);
        assert!(formats::SBGGR10_CSI2P.info().unwrap().packed);
    }

    #[test]
    fn serde_uses_names() {
        let json = serde_json::to_string(&formats::NV12).unwrap();
        assert_eq!(json, "\"NV12\"");
        let back: PixelFormat = serde_json::from_str("\"SRGGB10_CSI2P\"").unwrap();
        assert_eq!(back, formats::SRGGB10_CSI2P);
        assert!(serde_json::from_str::<PixelFormat>("\"NOT-A-FORMAT\"").is_err());
    }

    #[test]
    fn serde_round_trips_every_format() {
        let formats = [
            PixelFormat::default(),
            formats::SBGGR10_CSI2P,
            PixelFormat::new(fourcc(b'A', b'B', b'C', b'D'), 0),
            PixelFormat::new(fourcc(b'A', b'B', b'C', 0x01), 0),
            PixelFormat::new(fourcc(b'A', b'B', b'C', b'D'), 7),
            PixelFormat::new(0, 7),
        ];
        for format in formats {
            let json = serde_json::to_string(&format).unwrap();
            let back: PixelFormat = serde_json::from_str(&json).unwrap();
            assert_eq!(back, format, "{json}");
        }

        assert_eq!(
            serde_json::to_string(&PixelFormat::new(fourcc(b'A', b'B', b'C', b'D'), 7)).unwrap(),
            "\"0x44434241:0x7\""
        );
    }

    #[test]
    fn bare_fourccs_are_not_names() {
        assert!("ABCD".parse::<PixelFormat>().is_err());
        assert!("<ABC>".parse::<PixelFormat>().is_err());
        assert!("0xZZ:0x0".parse::<PixelFormat>().is_err());
        assert_eq!("<INVALID>".parse::<PixelFormat>().unwrap(), PixelFormat::default());
        assert_eq!(
            "<ABCD>".parse::<PixelFormat>().unwrap(),
            PixelFormat::new(fourcc(b'A', b'B', b'C', b'D'), 0)
        );
    }
}
