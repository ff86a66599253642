use kurbo::Point;

use crate::blend::{self, PremulRgba8};
use crate::error::{InkpadError, InkpadResult};

/// Straight-alpha RGB stroke color (stroke opacity is carried separately).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb8 {
    pub const BLACK: Rgb8 = Rgb8 { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Owned 2D raster buffer: W×H premultiplied RGBA8 pixels at a given DPI,
/// top-down row-major.
///
/// Dimensions are immutable after creation; growing or shrinking goes through
/// [`Surface::resized`], which allocates a fresh surface and migrates content
/// with one unscaled blit anchored at the origin.
#[derive(Clone, Debug, PartialEq)]
pub struct Surface {
    width: u32,
    height: u32,
    dpi: f32,
    data: Vec<u8>,
}

impl Surface {
    /// Allocate a transparent surface. Zero dimensions are a contract fault.
    pub fn new(width: u32, height: u32, dpi: f32) -> InkpadResult<Self> {
        if width == 0 || height == 0 {
            return Err(InkpadError::surface(format!(
                "surface dimensions must be non-zero, got {width}x{height}"
            )));
        }
        if !(dpi > 0.0) {
            return Err(InkpadError::surface("surface dpi must be > 0"));
        }
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| {
                InkpadError::surface(format!("surface {width}x{height} exceeds addressable size"))
            })?;
        Ok(Self {
            width,
            height,
            dpi,
            data: vec![0u8; len],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dpi(&self) -> f32 {
        self.dpi
    }

    /// Raw premultiplied RGBA8 bytes, top-down row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// New surface of identical size/DPI with transparent content. Deep
    /// copies are built by blitting the source into the blank clone.
    pub fn clone_blank(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            dpi: self.dpi,
            data: vec![0u8; self.data.len()],
        }
    }

    /// Deep copy: blank clone plus a full blit of `self`.
    pub fn snapshot(&self) -> Self {
        let mut copy = self.clone_blank();
        copy.blit(self);
        copy
    }

    fn idx(&self, x: u32, y: u32) -> usize {
        ((y as usize * self.width as usize) + x as usize) * 4
    }

    /// Read one premultiplied pixel. Caller must bounds-check.
    pub fn pixel(&self, x: u32, y: u32) -> PremulRgba8 {
        let i = self.idx(x, y);
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, px: PremulRgba8) {
        let i = self.idx(x, y);
        self.data[i..i + 4].copy_from_slice(&px);
    }

    /// Read back one pixel as straight color with the alpha channel forced
    /// opaque (color sampling). Caller must bounds-check.
    pub fn pixel_color(&self, x: u32, y: u32) -> Rgb8 {
        let px = self.pixel(x, y);
        let a = px[3];
        if a == 0 {
            return Rgb8::BLACK;
        }
        let un = |c: u8| ((u16::from(c) * 255 + u16::from(a) / 2) / u16::from(a)).min(255) as u8;
        Rgb8::new(un(px[0]), un(px[1]), un(px[2]))
    }

    /// Zero every pixel (fully transparent).
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Fill with one straight-alpha color.
    pub fn fill(&mut self, color: Rgb8, alpha: u8) {
        let m = |c: u8| blend::mul_div255(u16::from(c), u16::from(alpha));
        let px = [m(color.r), m(color.g), m(color.b), alpha];
        for chunk in self.data.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }

    /// Unscaled copy of `src` anchored at the origin; rows and columns that
    /// do not fit are dropped.
    pub fn blit(&mut self, src: &Surface) {
        let w = self.width.min(src.width) as usize * 4;
        let rows = self.height.min(src.height);
        for y in 0..rows {
            let di = self.idx(0, y);
            let si = src.idx(0, y);
            self.data[di..di + w].copy_from_slice(&src.data[si..si + w]);
        }
    }

    /// Replacement surface of the new size with prior content migrated by a
    /// single origin-anchored blit.
    pub fn resized(&self, width: u32, height: u32) -> InkpadResult<Surface> {
        let mut out = Surface::new(width, height, self.dpi)?;
        out.blit(self);
        Ok(out)
    }

    /// Composite a round-capped antialiased line onto the surface with the
    /// over operator.
    pub fn draw_line(&mut self, from: Point, to: Point, color: Rgb8, width: f64, opacity: f32) {
        if width <= 0.0 || opacity <= 0.0 {
            return;
        }
        let opacity = opacity.min(1.0);
        self.for_stroke_coverage(from, to, width, |data, i, cov| {
            let a = ((cov * opacity * 255.0).round() as i32).clamp(0, 255) as u8;
            if a == 0 {
                return;
            }
            let m = |c: u8| blend::mul_div255(u16::from(c), u16::from(a));
            let src = [m(color.r), m(color.g), m(color.b), a];
            let dst = [data[i], data[i + 1], data[i + 2], data[i + 3]];
            data[i..i + 4].copy_from_slice(&blend::over(dst, src, 1.0));
        });
    }

    /// Remove a round-capped stroke region: retained content is the surface
    /// minus the stroke mask. Pixels fully covered become transparent, pixels
    /// outside the mask are left bit-exact.
    pub fn erase_line(&mut self, from: Point, to: Point, width: f64) {
        if width <= 0.0 {
            return;
        }
        self.for_stroke_coverage(from, to, width, |data, i, cov| {
            let keep = 1.0 - cov;
            if keep >= 1.0 {
                return;
            }
            if keep <= 0.0 {
                data[i..i + 4].fill(0);
                return;
            }
            for c in 0..4 {
                data[i + c] = (f32::from(data[i + c]) * keep).round() as u8;
            }
        });
    }

    /// Visit every pixel whose capsule coverage for the segment is positive.
    ///
    /// The round-capped stroke of a straight segment is exactly a capsule, so
    /// coverage comes from the signed distance to the segment with a one
    /// pixel antialias band.
    fn for_stroke_coverage(
        &mut self,
        from: Point,
        to: Point,
        width: f64,
        mut apply: impl FnMut(&mut [u8], usize, f32),
    ) {
        let half = width / 2.0;
        let pad = half + 1.0;

        let x0 = ((from.x.min(to.x) - pad).floor().max(0.0)) as u32;
        let y0 = ((from.y.min(to.y) - pad).floor().max(0.0)) as u32;
        let x1 = ((from.x.max(to.x) + pad).ceil().min(f64::from(self.width))) as u32;
        let y1 = ((from.y.max(to.y) + pad).ceil().min(f64::from(self.height))) as u32;
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let d = to - from;
        let len2 = d.hypot2();
        let row_stride = self.width as usize * 4;
        for y in y0..y1 {
            let row = y as usize * row_stride;
            for x in x0..x1 {
                let p = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                let t = if len2 <= f64::EPSILON {
                    0.0
                } else {
                    ((p - from).dot(d) / len2).clamp(0.0, 1.0)
                };
                let nearest = from + d * t;
                let dist = (p - nearest).hypot();
                let cov = (half + 0.5 - dist).clamp(0.0, 1.0) as f32;
                if cov > 0.0 {
                    apply(&mut self.data, row + x as usize * 4, cov);
                }
            }
        }
    }
}
