// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Upload requests: what to copy, where it goes, and how the source bytes are laid out.
//!
//! A request pairs an [`UploadDescriptor`] (destination texture, target, region, pixel
//! format, priority and unpack overrides) with the caller's pixels.  Pixels arrive either
//! as a borrowed [`PixelSource`] view, which [`crate::StreamingManager::stage_copy`]
//! copies out before returning, or as a shareable [`PixelData`] that
//! [`crate::StreamingManager::enqueue`] keeps alive until the render thread uploads it.
//!
//! # Layout
//!
//! Source rows follow the classic unpack rules: a row holds `row_length` pixels
//! (default: the region width), rows are padded to the unpack alignment, and an image
//! holds `image_height` rows (default: the region height).  [`UploadDescriptor::layout`]
//! derives the strides and the number of bytes the upload reads, with checked arithmetic.

use crate::bittricks::checked_align_up;
use crate::pixel_formats::{ElementKind, PixelFormat, PixelType, bytes_per_pixel, f16};
use std::sync::Arc;

/// Identifies a texture object owned by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// One face of a cube map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    /// Layer index of the face in the conventional +X, -X, +Y, -Y, +Z, -Z order.
    pub const fn layer(self) -> u32 {
        match self {
            CubeFace::PositiveX => 0,
            CubeFace::NegativeX => 1,
            CubeFace::PositiveY => 2,
            CubeFace::NegativeY => 3,
            CubeFace::PositiveZ => 4,
            CubeFace::NegativeZ => 5,
        }
    }
}

/// The kind of texture image an upload writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadTarget {
    Texture1D,
    Texture1DArray,
    Texture2D,
    Texture2DArray,
    Texture3D,
    CubeMapFace(CubeFace),
}

/// How many region extents a target may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Dimensionality {
    One,
    Two,
    Three,
}

impl UploadTarget {
    pub const fn dimensionality(self) -> Dimensionality {
        match self {
            UploadTarget::Texture1D => Dimensionality::One,
            UploadTarget::Texture1DArray
            | UploadTarget::Texture2D
            | UploadTarget::CubeMapFace(_) => Dimensionality::Two,
            UploadTarget::Texture2DArray | UploadTarget::Texture3D => Dimensionality::Three,
        }
    }
}

/// Destination sub-region of one mip level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UploadRegion {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_level: u32,
}

impl UploadRegion {
    /// A 2D region at `(x, y)` on mip level 0.
    pub const fn new_2d(x: u32, y: u32, width: u32, height: u32) -> Self {
        UploadRegion {
            x,
            y,
            z: 0,
            width,
            height,
            depth: 1,
            mip_level: 0,
        }
    }

    pub const fn with_mip_level(mut self, mip_level: u32) -> Self {
        self.mip_level = mip_level;
        self
    }
}

/**
Overrides for how source rows are unpacked.

Zero for `row_length` or `image_height` means "same as the region".
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnpackOverrides {
    pub alignment: u32,
    pub row_length: u32,
    pub image_height: u32,
}

impl Default for UnpackOverrides {
    fn default() -> Self {
        UnpackOverrides {
            alignment: 4,
            row_length: 0,
            image_height: 0,
        }
    }
}

/// Why a request cannot be uploaded as described.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("region extents must be positive")]
    NonPositiveExtent,
    #[error("region {width}x{height}x{depth} does not fit target {target:?}")]
    TargetDimensionMismatch {
        target: UploadTarget,
        width: u32,
        height: u32,
        depth: u32,
    },
    #[error("unpack alignment {0} is not 1, 2, 4 or 8")]
    BadAlignment(u32),
    #[error("row length {row_length} is smaller than the region width {width}")]
    RowLengthTooSmall { row_length: u32, width: u32 },
    #[error("image height {image_height} is smaller than the region height {height}")]
    ImageHeightTooSmall { image_height: u32, height: u32 },
    #[error("pixel type {ty:?} cannot encode format {format:?}")]
    FormatTypeMismatch { format: PixelFormat, ty: PixelType },
    #[error("source element type does not match pixel type {ty:?}")]
    SourceKindMismatch { ty: PixelType },
    #[error("byte count overflows")]
    Overflow,
    #[error("source holds {available} bytes but the upload reads {required}")]
    DataTooSmall { required: u64, available: u64 },
}

/// Derived byte layout of an upload's source data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UploadLayout {
    pub bytes_per_pixel: u32,
    /// Pixels per source row.
    pub row_length: u32,
    /// Rows per source image.
    pub image_height: u32,
    /// Bytes between the starts of consecutive rows.
    pub row_stride: u64,
    /// Bytes between the starts of consecutive images.
    pub image_stride: u64,
    /// Bytes the upload reads from the start of the source.
    pub byte_count: u64,
}

/// Describes one pixel-region copy, without the pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UploadDescriptor {
    pub texture: TextureId,
    pub target: UploadTarget,
    pub region: UploadRegion,
    pub format: PixelFormat,
    pub ty: PixelType,
    /// Negative is low, zero is normal, positive is high.
    pub priority: i32,
    pub unpack: UnpackOverrides,
}

impl UploadDescriptor {
    pub fn new(
        texture: TextureId,
        target: UploadTarget,
        region: UploadRegion,
        format: PixelFormat,
        ty: PixelType,
    ) -> Self {
        UploadDescriptor {
            texture,
            target,
            region,
            format,
            ty,
            priority: 0,
            unpack: UnpackOverrides::default(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_unpack(mut self, unpack: UnpackOverrides) -> Self {
        self.unpack = unpack;
        self
    }

    fn check_region(&self) -> Result<(), LayoutError> {
        let r = &self.region;
        if r.width == 0 || r.height == 0 || r.depth == 0 {
            return Err(LayoutError::NonPositiveExtent);
        }
        let fits = match self.target.dimensionality() {
            Dimensionality::One => r.height == 1 && r.depth == 1,
            Dimensionality::Two => r.depth == 1,
            //one slice or layer per request, z picks it
            Dimensionality::Three => r.depth == 1,
        };
        //the face picks the layer
        let face_ok = !matches!(self.target, UploadTarget::CubeMapFace(_)) || r.z == 0;
        if fits && face_ok {
            Ok(())
        } else {
            Err(LayoutError::TargetDimensionMismatch {
                target: self.target,
                width: r.width,
                height: r.height,
                depth: r.depth,
            })
        }
    }

    /// Derives the source layout, rejecting malformed descriptors.
    pub fn layout(&self) -> Result<UploadLayout, LayoutError> {
        self.check_region()?;
        let r = &self.region;
        let alignment = self.unpack.alignment;
        if !matches!(alignment, 1 | 2 | 4 | 8) {
            return Err(LayoutError::BadAlignment(alignment));
        }
        let row_length = match self.unpack.row_length {
            0 => r.width,
            n if n < r.width => {
                return Err(LayoutError::RowLengthTooSmall {
                    row_length: n,
                    width: r.width,
                });
            }
            n => n,
        };
        let image_height = match self.unpack.image_height {
            0 => r.height,
            n if n < r.height => {
                return Err(LayoutError::ImageHeightTooSmall {
                    image_height: n,
                    height: r.height,
                });
            }
            n => n,
        };
        let bpp = bytes_per_pixel(self.format, self.ty)?;

        let row_bytes = (row_length as u64).checked_mul(bpp as u64).ok_or(LayoutError::Overflow)?;
        let row_stride = checked_align_up(row_bytes, alignment as u64).ok_or(LayoutError::Overflow)?;
        let image_stride = row_stride
            .checked_mul(image_height as u64)
            .ok_or(LayoutError::Overflow)?;
        let last_row = (r.width as u64) * (bpp as u64);
        let byte_count = (r.depth as u64 - 1)
            .checked_mul(image_stride)
            .and_then(|images| {
                (r.height as u64 - 1)
                    .checked_mul(row_stride)
                    .and_then(|rows| images.checked_add(rows))
            })
            .and_then(|n| n.checked_add(last_row))
            .ok_or(LayoutError::Overflow)?;
        //staging copies index host memory with this count
        usize::try_from(byte_count).map_err(|_| LayoutError::Overflow)?;

        Ok(UploadLayout {
            bytes_per_pixel: bpp,
            row_length,
            image_height,
            row_stride,
            image_stride,
            byte_count,
        })
    }

    /// Checks that `source` can feed an upload with `layout`.
    pub fn check_source(&self, layout: &UploadLayout, source: PixelSource<'_>) -> Result<(), LayoutError> {
        if let Some(kind) = source.element_kind() {
            if kind != self.ty.element_kind() {
                return Err(LayoutError::SourceKindMismatch { ty: self.ty });
            }
        }
        let available = source.as_bytes().len() as u64;
        if available < layout.byte_count {
            return Err(LayoutError::DataTooSmall {
                required: layout.byte_count,
                available,
            });
        }
        Ok(())
    }
}

/// A borrowed view over caller pixels.
#[derive(Debug, Clone, Copy)]
pub enum PixelSource<'a> {
    /// Raw bytes; accepted for every pixel type.
    Bytes(&'a [u8]),
    Shorts(&'a [u16]),
    Halfs(&'a [f16]),
    Floats(&'a [f32]),
}

impl<'a> PixelSource<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        match *self {
            PixelSource::Bytes(b) => b,
            PixelSource::Shorts(s) => bytemuck::cast_slice(s),
            PixelSource::Halfs(h) => bytemuck::cast_slice(h),
            PixelSource::Floats(f) => bytemuck::cast_slice(f),
        }
    }

    /// The element kind a typed view commits to; `None` for raw bytes.
    pub(crate) fn element_kind(&self) -> Option<ElementKind> {
        match self {
            PixelSource::Bytes(_) => None,
            PixelSource::Shorts(_) => Some(ElementKind::Short),
            PixelSource::Halfs(_) => Some(ElementKind::Half),
            PixelSource::Floats(_) => Some(ElementKind::Float),
        }
    }
}

impl<'a> From<&'a [u8]> for PixelSource<'a> {
    fn from(value: &'a [u8]) -> Self {
        PixelSource::Bytes(value)
    }
}

/// Shareable owned pixels, kept alive by queued requests until they upload.
#[derive(Debug, Clone)]
pub enum PixelData {
    Bytes(Arc<[u8]>),
    Shorts(Arc<[u16]>),
    Halfs(Arc<[f16]>),
    Floats(Arc<[f32]>),
}

impl PixelData {
    pub fn as_source(&self) -> PixelSource<'_> {
        match self {
            PixelData::Bytes(b) => PixelSource::Bytes(b),
            PixelData::Shorts(s) => PixelSource::Shorts(s),
            PixelData::Halfs(h) => PixelSource::Halfs(h),
            PixelData::Floats(f) => PixelSource::Floats(f),
        }
    }
}

impl From<Vec<u8>> for PixelData {
    fn from(value: Vec<u8>) -> Self {
        PixelData::Bytes(value.into())
    }
}

impl From<Vec<u16>> for PixelData {
    fn from(value: Vec<u16>) -> Self {
        PixelData::Shorts(value.into())
    }
}

impl From<Vec<f16>> for PixelData {
    fn from(value: Vec<f16>) -> Self {
        PixelData::Halfs(value.into())
    }
}

impl From<Vec<f32>> for PixelData {
    fn from(value: Vec<f32>) -> Self {
        PixelData::Floats(value.into())
    }
}

/// A descriptor together with the pixels it reads.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub descriptor: UploadDescriptor,
    pub data: PixelData,
}

impl UploadRequest {
    pub fn new(descriptor: UploadDescriptor, data: impl Into<PixelData>) -> Self {
        UploadRequest {
            descriptor,
            data: data.into(),
        }
    }
}
