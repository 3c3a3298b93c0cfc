// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Source pixel format and component type descriptions.
//!
//! An upload describes its CPU-side pixels with a [`PixelFormat`] (which channels,
//! in which order) and a [`PixelType`] (how each channel, or each whole pixel for
//! packed types, is stored).  Together they determine the number of bytes one pixel
//! occupies in the caller's buffer, which drives every layout computation in the
//! streaming subsystem.
//!
//! # Examples
//!
//! ```
//! use texture_streaming::pixel_formats::{bytes_per_pixel, PixelFormat, PixelType};
//!
//! assert_eq!(bytes_per_pixel(PixelFormat::Rgba, PixelType::UnsignedByte), Ok(4));
//! assert_eq!(bytes_per_pixel(PixelFormat::Rgb, PixelType::Float), Ok(12));
//! assert_eq!(bytes_per_pixel(PixelFormat::Rgb, PixelType::UnsignedShort565), Ok(2));
//! ```

/*
Quick note on type design.  Formats are plain runtime enums rather than zero-sized types.
The pairing travels with a request produced by arbitrary asset loaders, so it is only
known at runtime and we validate it instead.
 */

use crate::request::LayoutError;

pub use half::f16;

/// Channel layout of the source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Red,
    Rg,
    Rgb,
    Bgr,
    Rgba,
    Bgra,
    RedInteger,
    RgInteger,
    RgbInteger,
    RgbaInteger,
    DepthComponent,
    StencilIndex,
}

impl PixelFormat {
    /// Number of channels stored per pixel.
    pub const fn components(self) -> u32 {
        match self {
            PixelFormat::Red
            | PixelFormat::RedInteger
            | PixelFormat::DepthComponent
            | PixelFormat::StencilIndex => 1,
            PixelFormat::Rg | PixelFormat::RgInteger => 2,
            PixelFormat::Rgb | PixelFormat::Bgr | PixelFormat::RgbInteger => 3,
            PixelFormat::Rgba | PixelFormat::Bgra | PixelFormat::RgbaInteger => 4,
        }
    }
}

/// Storage type of the source pixels.
///
/// Packed types describe an entire pixel in one machine word; the rest describe a
/// single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelType {
    UnsignedByte,
    Byte,
    UnsignedShort,
    Short,
    UnsignedInt,
    Int,
    HalfFloat,
    Float,
    UnsignedShort565,
    UnsignedShort4444,
    UnsignedShort5551,
    UnsignedInt8888Rev,
    UnsignedInt2101010Rev,
}

/// What kind of element a typed source slice must hold for a given [`PixelType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ElementKind {
    Byte,
    Short,
    Half,
    Float,
    Word,
}

impl PixelType {
    /// For packed types, the channel count the word encodes.
    const fn packed_components(self) -> Option<u32> {
        match self {
            PixelType::UnsignedShort565 => Some(3),
            PixelType::UnsignedShort4444
            | PixelType::UnsignedShort5551
            | PixelType::UnsignedInt8888Rev
            | PixelType::UnsignedInt2101010Rev => Some(4),
            _ => None,
        }
    }

    /// Size in bytes of one stored element (a channel, or a whole packed pixel).
    pub const fn element_size(self) -> u32 {
        match self {
            PixelType::UnsignedByte | PixelType::Byte => 1,
            PixelType::UnsignedShort
            | PixelType::Short
            | PixelType::HalfFloat
            | PixelType::UnsignedShort565
            | PixelType::UnsignedShort4444
            | PixelType::UnsignedShort5551 => 2,
            PixelType::UnsignedInt
            | PixelType::Int
            | PixelType::Float
            | PixelType::UnsignedInt8888Rev
            | PixelType::UnsignedInt2101010Rev => 4,
        }
    }

    pub(crate) const fn element_kind(self) -> ElementKind {
        match self {
            PixelType::UnsignedByte | PixelType::Byte => ElementKind::Byte,
            PixelType::HalfFloat => ElementKind::Half,
            PixelType::Float => ElementKind::Float,
            PixelType::UnsignedShort
            | PixelType::Short
            | PixelType::UnsignedShort565
            | PixelType::UnsignedShort4444
            | PixelType::UnsignedShort5551 => ElementKind::Short,
            PixelType::UnsignedInt
            | PixelType::Int
            | PixelType::UnsignedInt8888Rev
            | PixelType::UnsignedInt2101010Rev => ElementKind::Word,
        }
    }

    /// True when one element holds a whole pixel.
    pub const fn is_packed(self) -> bool {
        self.packed_components().is_some()
    }
}

/// Bytes one pixel occupies in a tightly packed source row.
///
/// Packed types only pair with formats of the same channel count.
pub fn bytes_per_pixel(format: PixelFormat, ty: PixelType) -> Result<u32, LayoutError> {
    match ty.packed_components() {
        Some(components) if components == format.components() => Ok(ty.element_size()),
        Some(_) => Err(LayoutError::FormatTypeMismatch { format, ty }),
        None => Ok(format.components() * ty.element_size()),
    }
}
