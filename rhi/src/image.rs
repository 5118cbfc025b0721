//! Image descriptions, view ranges and samplers.

use crate::format::Format;
use bitflags::bitflags;
use std::fmt;

/// Dimensions of an image.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum Dimensions {
    /// 1D image
    Dim1d { width: u32 },
    /// Array of 1D images
    Dim1dArray { width: u32, array_layers: u32 },
    /// 2D image
    Dim2d { width: u32, height: u32 },
    /// Array of 2D images
    Dim2dArray {
        width: u32,
        height: u32,
        array_layers: u32,
    },
    /// 3D image
    Dim3d { width: u32, height: u32, depth: u32 },
    /// Cubemap image (6 2D faces)
    Cubemap { size: u32 },
    /// Array of cubemaps
    CubemapArray { size: u32, array_layers: u32 },
}

impl Dimensions {
    /// Returns the width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        match *self {
            Dimensions::Dim1d { width } => width,
            Dimensions::Dim1dArray { width, .. } => width,
            Dimensions::Dim2d { width, .. } => width,
            Dimensions::Dim2dArray { width, .. } => width,
            Dimensions::Dim3d { width, .. } => width,
            Dimensions::Cubemap { size } => size,
            Dimensions::CubemapArray { size, .. } => size,
        }
    }

    /// Returns the height in pixels. 1 for 1D images.
    #[inline]
    pub fn height(&self) -> u32 {
        match *self {
            Dimensions::Dim1d { .. } => 1,
            Dimensions::Dim1dArray { .. } => 1,
            Dimensions::Dim2d { height, .. } => height,
            Dimensions::Dim2dArray { height, .. } => height,
            Dimensions::Dim3d { height, .. } => height,
            Dimensions::Cubemap { size } => size,
            Dimensions::CubemapArray { size, .. } => size,
        }
    }

    /// Returns the depth (third dimension). 1 for non-3D images.
    #[inline]
    pub fn depth(&self) -> u32 {
        match *self {
            Dimensions::Dim3d { depth, .. } => depth,
            _ => 1,
        }
    }

    #[inline]
    pub fn width_height(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Number of array layers, counting each cubemap as 6.
    #[inline]
    pub fn array_layers(&self) -> u32 {
        match *self {
            Dimensions::Dim1d { .. } | Dimensions::Dim2d { .. } | Dimensions::Dim3d { .. } => 1,
            Dimensions::Dim1dArray { array_layers, .. } => array_layers,
            Dimensions::Dim2dArray { array_layers, .. } => array_layers,
            Dimensions::Cubemap { .. } => 6,
            Dimensions::CubemapArray { array_layers, .. } => array_layers * 6,
        }
    }
}

impl From<(u32, u32)> for Dimensions {
    fn from((width, height): (u32, u32)) -> Dimensions {
        Dimensions::Dim2d { width, height }
    }
}

impl fmt::Debug for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Dimensions::Dim1d { width } => write!(f, "[1D {}x1]", width),
            Dimensions::Dim1dArray {
                width,
                array_layers,
            } => write!(f, "[1D Array {}x1(x{})]", width, array_layers),
            Dimensions::Dim2d { width, height } => write!(f, "[2D {}x{}]", width, height),
            Dimensions::Dim2dArray {
                width,
                height,
                array_layers,
            } => write!(f, "[2D Array {}x{}(x{})]", width, height, array_layers),
            Dimensions::Dim3d {
                width,
                height,
                depth,
            } => write!(f, "[3D {}x{}x{}]", width, height, depth),
            Dimensions::Cubemap { size } => write!(f, "[Cubemap {}x{}]", size, size),
            Dimensions::CubemapArray { size, array_layers } => {
                write!(f, "[Cubemap Array {}x{}(x{})]", size, size, array_layers)
            }
        }
    }
}

/// Number of mipmap levels to allocate for an image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MipmapsCount {
    /// A full chain down to 1x1.
    Log2,
    /// Base level only.
    One,
    Specific(u32),
}

/// Maximum number of mip levels for an image whose largest extent is `size`:
/// `1 + floor(log2(size))`.
pub fn max_mip_level_count(size: u32) -> u32 {
    32 - size.max(1).leading_zeros()
}

bitflags! {
    #[derive(Default)]
    pub struct ImageUsageFlags: u32 {
        const SAMPLED                      = 0b0000_0001;
        const STORAGE                      = 0b0000_0010;
        const COLOR_ATTACHMENT             = 0b0000_0100;
        const DEPTH_STENCIL_ATTACHMENT     = 0b0000_1000;
        const TRANSFER_SRC                 = 0b0001_0000;
        const TRANSFER_DST                 = 0b0010_0000;
        const ACCELERATION_STRUCTURE_INPUT = 0b0100_0000;
    }
}

/// Description of an image resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageDescription {
    pub name: String,
    pub dimensions: Dimensions,
    pub format: Format,
    pub mipmaps: MipmapsCount,
    pub samples: u32,
    /// Usually left empty at declaration time and inferred from accesses.
    pub usage: ImageUsageFlags,
}

impl Default for ImageDescription {
    fn default() -> Self {
        ImageDescription {
            name: String::new(),
            dimensions: Dimensions::Dim2d {
                width: 1,
                height: 1,
            },
            format: Format::Rgba8Unorm,
            mipmaps: MipmapsCount::One,
            samples: 1,
            usage: ImageUsageFlags::empty(),
        }
    }
}

impl ImageDescription {
    /// Resolved mip level count.
    pub fn mip_levels(&self) -> u32 {
        let max_extent = self
            .dimensions
            .width()
            .max(self.dimensions.height())
            .max(self.dimensions.depth());
        match self.mipmaps {
            MipmapsCount::One => 1,
            MipmapsCount::Log2 => max_mip_level_count(max_extent),
            MipmapsCount::Specific(n) => n,
        }
    }

    pub fn array_layers(&self) -> u32 {
        self.dimensions.array_layers()
    }

    /// Extent of a given mip level, clamped to 1.
    pub fn mip_extent(&self, level: u32) -> (u32, u32, u32) {
        (
            (self.dimensions.width() >> level).max(1),
            (self.dimensions.height() >> level).max(1),
            (self.dimensions.depth() >> level).max(1),
        )
    }

    /// Tightly-packed byte size over all mips and layers.
    ///
    /// The graph allocator plans offsets from this figure since the
    /// capability set has no memory-requirement query.
    pub fn byte_size(&self) -> u64 {
        let texel = self.format.bytes_per_texel() as u64;
        let layers = self.array_layers() as u64;
        let mut total = 0u64;
        for level in 0..self.mip_levels() {
            let (w, h, d) = self.mip_extent(level);
            total += w as u64 * h as u64 * d as u64 * texel;
        }
        total * layers
    }

    /// Checks the declaration invariants: positive extents, layer count,
    /// and a mip count within `[1, 1 + log2(max extent)]`.
    pub fn validate(&self) -> Result<(), String> {
        let (w, h, d) = (
            self.dimensions.width(),
            self.dimensions.height(),
            self.dimensions.depth(),
        );
        if w == 0 || h == 0 || d == 0 {
            return Err(format!("image '{}' has a zero extent", self.name));
        }
        if self.array_layers() == 0 {
            return Err(format!("image '{}' has zero array layers", self.name));
        }
        let mips = self.mip_levels();
        let max_mips = max_mip_level_count(w.max(h).max(d));
        if mips == 0 || mips > max_mips {
            return Err(format!(
                "image '{}' declares {} mip levels, valid range is 1..={}",
                self.name, mips, max_mips
            ));
        }
        Ok(())
    }
}

/// Subresource range of an image view: a span of mip levels and array
/// layers. `REMAINING` counts extend to the end of the resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageViewRange {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl ImageViewRange {
    pub const REMAINING: u32 = u32::MAX;

    /// The whole resource.
    pub const ALL: ImageViewRange = ImageViewRange {
        base_mip: 0,
        mip_count: Self::REMAINING,
        base_layer: 0,
        layer_count: Self::REMAINING,
    };

    pub fn mips(base_mip: u32, mip_count: u32) -> ImageViewRange {
        ImageViewRange {
            base_mip,
            mip_count,
            ..Self::ALL
        }
    }

    pub fn single_mip(mip: u32) -> ImageViewRange {
        Self::mips(mip, 1)
    }

    pub fn layers(base_layer: u32, layer_count: u32) -> ImageViewRange {
        ImageViewRange {
            base_layer,
            layer_count,
            ..Self::ALL
        }
    }

    pub fn single_layer(layer: u32) -> ImageViewRange {
        Self::layers(layer, 1)
    }

    /// Clamps `REMAINING` counts against the actual resource extents.
    pub fn resolve(&self, mip_levels: u32, array_layers: u32) -> ImageViewRange {
        let mip_count = if self.mip_count == Self::REMAINING {
            mip_levels.saturating_sub(self.base_mip)
        } else {
            self.mip_count
        };
        let layer_count = if self.layer_count == Self::REMAINING {
            array_layers.saturating_sub(self.base_layer)
        } else {
            self.layer_count
        };
        ImageViewRange {
            base_mip: self.base_mip,
            mip_count,
            base_layer: self.base_layer,
            layer_count,
        }
    }
}

impl Default for ImageViewRange {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum SamplerAddressMode {
    Clamp,
    Mirror,
    Wrap,
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum SamplerMipmapMode {
    Nearest,
    Linear,
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct SamplerDescription {
    pub addr_u: SamplerAddressMode,
    pub addr_v: SamplerAddressMode,
    pub addr_w: SamplerAddressMode,
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mipmap_mode: SamplerMipmapMode,
}

impl SamplerDescription {
    pub const LINEAR_MIPMAP_LINEAR: SamplerDescription = SamplerDescription {
        addr_u: SamplerAddressMode::Clamp,
        addr_v: SamplerAddressMode::Clamp,
        addr_w: SamplerAddressMode::Clamp,
        mag_filter: Filter::Linear,
        min_filter: Filter::Linear,
        mipmap_mode: SamplerMipmapMode::Linear,
    };

}

impl Default for SamplerDescription {
    fn default() -> Self {
        Self::LINEAR_MIPMAP_LINEAR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_count_helper() {
        assert_eq!(max_mip_level_count(1), 1);
        assert_eq!(max_mip_level_count(2), 2);
        assert_eq!(max_mip_level_count(256), 9);
        assert_eq!(max_mip_level_count(300), 9);
    }

    #[test]
    fn cubemap_layers() {
        let dims = Dimensions::Cubemap { size: 32 };
        assert_eq!(dims.array_layers(), 6);
        assert_eq!(dims.width_height(), (32, 32));
    }

    #[test]
    fn byte_size_sums_mips_and_layers() {
        let desc = ImageDescription {
            dimensions: Dimensions::Dim2d {
                width: 4,
                height: 4,
            },
            format: Format::Rgba8Unorm,
            mipmaps: MipmapsCount::Log2,
            ..Default::default()
        };
        // 4x4 + 2x2 + 1x1 texels, 4 bytes each
        assert_eq!(desc.byte_size(), (16 + 4 + 1) * 4);
    }

    #[test]
    fn range_resolution() {
        let r = ImageViewRange::ALL.resolve(5, 6);
        assert_eq!(r.mip_count, 5);
        assert_eq!(r.layer_count, 6);
        let r = ImageViewRange::single_layer(3).resolve(1, 6);
        assert_eq!((r.base_layer, r.layer_count), (3, 1));
        assert_eq!(r.mip_count, 1);
    }

    #[test]
    fn invalid_mip_count_rejected() {
        let desc = ImageDescription {
            dimensions: Dimensions::Dim2d {
                width: 16,
                height: 16,
            },
            mipmaps: MipmapsCount::Specific(9),
            ..Default::default()
        };
        assert!(desc.validate().is_err());
    }
}
