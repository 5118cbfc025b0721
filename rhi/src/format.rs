//! Pixel formats.

/// Storage format of image texels.
///
/// Trimmed to the formats the render graph exercises; backends may expose
/// more through their own creation paths.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Format {
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgba32Float,
    R32Uint,
    D16Unorm,
    D32Float,
    D24UnormS8Uint,
    D32FloatS8Uint,
}

impl Format {
    /// Size in bytes of one texel.
    ///
    /// `D32FloatS8Uint` counts the padded 8-byte layout most hardware uses.
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            Format::R8Unorm => 1,
            Format::Rg8Unorm => 2,
            Format::Rgba8Unorm | Format::Rgba8Srgb | Format::Bgra8Unorm => 4,
            Format::R16Float => 2,
            Format::Rg16Float => 4,
            Format::Rgba16Float => 8,
            Format::R32Float => 4,
            Format::Rg32Float => 8,
            Format::Rgba32Float => 16,
            Format::R32Uint => 4,
            Format::D16Unorm => 2,
            Format::D32Float => 4,
            Format::D24UnormS8Uint => 4,
            Format::D32FloatS8Uint => 8,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Format::D16Unorm | Format::D32Float | Format::D24UnormS8Uint | Format::D32FloatS8Uint
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Format::D24UnormS8Uint | Format::D32FloatS8Uint)
    }

    pub fn is_color(self) -> bool {
        !self.is_depth()
    }
}
