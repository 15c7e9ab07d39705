//! Common types shared across the graphics system.

// ============================================================================
// Extent3d
// ============================================================================

/// 3D extent for textures and buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth in pixels (1 for 2D textures).
    pub depth: u32,
}

impl Extent3d {
    /// Create a new 2D extent.
    pub fn new_2d(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 1,
        }
    }

    /// Create a new 3D extent.
    pub fn new_3d(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }
}

// ============================================================================
// Surface origin
// ============================================================================

/// Vertical origin convention of a surface.
///
/// Textures store rows physically top-down. A `BottomLeft` surface is one
/// whose logical row 0 is the last physical row, as with GL-style render
/// targets. Readback always produces top-down rows regardless of origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SurfaceOrigin {
    /// Logical row 0 is physical row 0.
    #[default]
    TopLeft,
    /// Logical row 0 is physical row `height - 1`.
    BottomLeft,
}

// ============================================================================
// Pixel rectangle
// ============================================================================

/// A rectangle of pixels within a 2D surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelRect {
    /// Left edge.
    pub x: u32,
    /// Top edge, in the coordinate space of the surface's origin.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelRect {
    /// Create a new rectangle.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole `width` x `height` surface.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Returns true if the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns true if the rectangle lies entirely within a surface of the
    /// given size.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(height)
    }

    /// The physical rectangle backing this logical rectangle on a surface
    /// with the given origin and height.
    pub fn to_physical(&self, origin: SurfaceOrigin, surface_height: u32) -> Self {
        match origin {
            SurfaceOrigin::TopLeft => *self,
            SurfaceOrigin::BottomLeft => Self {
                y: surface_height - self.y - self.height,
                ..*self
            },
        }
    }
}
