use rayon::prelude::*;

use crate::blend::{self, BlendMode};
use crate::error::InkpadResult;
use crate::layer::LayerStack;
use crate::surface::Surface;

/// One finished composited frame: premultiplied RGBA8, top-down row-major.
#[derive(Clone, Debug)]
pub struct FrameRgba {
    pub width: u32,
    pub height: u32,
    pub dpi: f32,
    pub data: Vec<u8>,
}

impl FrameRgba {
    /// Convert to straight (non-premultiplied) RGBA8, e.g. for PNG encoders
    /// that expect unassociated alpha.
    pub fn to_straight_rgba(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        for px in out.chunks_exact_mut(4) {
            let a = px[3];
            if a == 0 || a == 255 {
                continue;
            }
            for c in px.iter_mut().take(3) {
                *c = ((u16::from(*c) * 255 + u16::from(a) / 2) / u16::from(a)).min(255) as u8;
            }
        }
        out
    }
}

/// Decorative checkerboard drawn underneath the layer stack. Not part of any
/// layer and never captured by undo history.
#[derive(Clone, Copy, Debug)]
pub struct Checkerboard {
    pub tile: u32,
    pub light: [u8; 3],
    pub dark: [u8; 3],
}

impl Default for Checkerboard {
    fn default() -> Self {
        Self {
            tile: 8,
            light: [230, 230, 230],
            dark: [200, 200, 200],
        }
    }
}

/// Produces the presented frame from the layer stack.
///
/// Owns its accumulator surface; nothing here is shared with layers or
/// history snapshots.
#[derive(Debug)]
pub struct Compositor {
    acc: Surface,
    background: Option<Checkerboard>,
}

impl Compositor {
    pub fn new(width: u32, height: u32, dpi: f32) -> InkpadResult<Self> {
        Ok(Self {
            acc: Surface::new(width, height, dpi)?,
            background: None,
        })
    }

    /// Enable or disable the checkerboard underlay.
    pub fn set_background(&mut self, background: Option<Checkerboard>) {
        self.background = background;
    }

    /// Reallocate the accumulator for a new canvas size.
    pub fn resize(&mut self, width: u32, height: u32) -> InkpadResult<()> {
        self.acc = Surface::new(width, height, self.acc.dpi())?;
        Ok(())
    }

    /// Composite the stack back-to-front into one frame.
    ///
    /// Per visible layer: attenuate alpha by `opacity/100`, then combine into
    /// the accumulator — `Normal` via alpha-over, `Addition` via additive
    /// composite, everything else through the generic blend rule.
    #[tracing::instrument(level = "debug", skip_all, fields(layers = stack.len()))]
    pub fn composite(&mut self, stack: &LayerStack) -> InkpadResult<FrameRgba> {
        self.acc.clear();
        let width = self.acc.width();
        let row_bytes = width as usize * 4;

        for layer in stack.iter_back_to_front() {
            if !layer.visible {
                continue;
            }
            let opacity = layer.opacity_factor();
            if opacity <= 0.0 {
                continue;
            }
            let src = layer.surface();
            debug_assert_eq!(src.width(), self.acc.width());
            debug_assert_eq!(src.height(), self.acc.height());

            match layer.blend {
                BlendMode::Normal => {
                    self.acc
                        .data_mut()
                        .par_chunks_mut(row_bytes)
                        .zip(src.data().par_chunks(row_bytes))
                        .for_each(|(dst_row, src_row)| {
                            combine_row(dst_row, src_row, |d, s| blend::over(d, s, opacity));
                        });
                }
                BlendMode::Addition => {
                    self.acc
                        .data_mut()
                        .par_chunks_mut(row_bytes)
                        .zip(src.data().par_chunks(row_bytes))
                        .for_each(|(dst_row, src_row)| {
                            combine_row(dst_row, src_row, |d, s| blend::add(d, s, opacity));
                        });
                }
                mode => {
                    let rule = blend::blend_rule(mode)?;
                    self.acc
                        .data_mut()
                        .par_chunks_mut(row_bytes)
                        .zip(src.data().par_chunks(row_bytes))
                        .enumerate()
                        .for_each(|(y, (dst_row, src_row))| {
                            let mut x = 0u32;
                            for (d, s) in dst_row
                                .chunks_exact_mut(4)
                                .zip(src_row.chunks_exact(4))
                            {
                                let fg = blend::attenuate([s[0], s[1], s[2], s[3]], opacity);
                                let out = rule([d[0], d[1], d[2], d[3]], fg, x, y as u32);
                                d.copy_from_slice(&out);
                                x += 1;
                            }
                        });
                }
            }
        }

        let data = match self.background {
            Some(bg) => self.present_over_checkerboard(bg),
            None => self.acc.data().to_vec(),
        };
        Ok(FrameRgba {
            width: self.acc.width(),
            height: self.acc.height(),
            dpi: self.acc.dpi(),
            data,
        })
    }

    fn present_over_checkerboard(&self, bg: Checkerboard) -> Vec<u8> {
        let tile = bg.tile.max(1);
        let width = self.acc.width();
        let mut out = vec![0u8; self.acc.data().len()];
        out.par_chunks_mut(width as usize * 4)
            .zip(self.acc.data().par_chunks(width as usize * 4))
            .enumerate()
            .for_each(|(y, (out_row, acc_row))| {
                for (x, (d, s)) in out_row
                    .chunks_exact_mut(4)
                    .zip(acc_row.chunks_exact(4))
                    .enumerate()
                {
                    let cell = ((x as u32 / tile) + (y as u32 / tile)) % 2;
                    let c = if cell == 0 { bg.light } else { bg.dark };
                    let under = [c[0], c[1], c[2], 255];
                    let px = blend::over(under, [s[0], s[1], s[2], s[3]], 1.0);
                    d.copy_from_slice(&px);
                }
            });
        out
    }
}

fn combine_row(
    dst_row: &mut [u8],
    src_row: &[u8],
    f: impl Fn(blend::PremulRgba8, blend::PremulRgba8) -> blend::PremulRgba8,
) {
    for (d, s) in dst_row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
        let out = f([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
        d.copy_from_slice(&out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Rgb8;

    fn stack_one(fill: Rgb8, alpha: u8) -> (LayerStack, crate::layer::LayerId) {
        let mut stack = LayerStack::new();
        let id = stack.add_top("base", Surface::new(8, 8, 96.0).unwrap());
        stack
            .get_mut(id)
            .unwrap()
            .surface_mut()
            .fill(fill, alpha);
        (stack, id)
    }

    fn px(frame: &FrameRgba, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * frame.width + x) * 4) as usize;
        [
            frame.data[i],
            frame.data[i + 1],
            frame.data[i + 2],
            frame.data[i + 3],
        ]
    }

    #[test]
    fn single_visible_layer_passes_through_scaled_by_opacity() {
        let (stack, _) = stack_one(Rgb8::new(255, 0, 0), 255);
        let mut comp = Compositor::new(8, 8, 96.0).unwrap();
        let frame = comp.composite(&stack).unwrap();
        assert_eq!(px(&frame, 4, 4), [255, 0, 0, 255]);
    }

    #[test]
    fn only_topmost_visible_equals_that_layer_times_opacity() {
        let mut stack = LayerStack::new();
        let below = stack.add_top("below", Surface::new(8, 8, 96.0).unwrap());
        stack
            .get_mut(below)
            .unwrap()
            .surface_mut()
            .fill(Rgb8::new(0, 255, 0), 255);
        stack.get_mut(below).unwrap().visible = false;
        let top = stack.add_top("top", Surface::new(8, 8, 96.0).unwrap());
        stack
            .get_mut(top)
            .unwrap()
            .surface_mut()
            .fill(Rgb8::new(255, 0, 0), 255);
        stack.get_mut(top).unwrap().set_opacity(50);

        let mut comp = Compositor::new(8, 8, 96.0).unwrap();
        let frame = comp.composite(&stack).unwrap();
        let got = px(&frame, 3, 3);
        // opacity/100 attenuation of a premultiplied solid red.
        assert!((i16::from(got[0]) - 128).abs() <= 1);
        assert_eq!(got[1], 0);
        assert!((i16::from(got[3]) - 128).abs() <= 1);
    }

    #[test]
    fn normal_layers_alpha_over_back_to_front() {
        let mut stack = LayerStack::new();
        let below = stack.add_top("below", Surface::new(8, 8, 96.0).unwrap());
        stack
            .get_mut(below)
            .unwrap()
            .surface_mut()
            .fill(Rgb8::new(0, 0, 255), 255);
        let top = stack.add_top("top", Surface::new(8, 8, 96.0).unwrap());
        stack
            .get_mut(top)
            .unwrap()
            .surface_mut()
            .fill(Rgb8::new(255, 0, 0), 255);

        let mut comp = Compositor::new(8, 8, 96.0).unwrap();
        let frame = comp.composite(&stack).unwrap();
        // Opaque topmost wins everywhere.
        assert_eq!(px(&frame, 0, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn addition_mode_saturates_channels() {
        let mut stack = LayerStack::new();
        let below = stack.add_top("below", Surface::new(8, 8, 96.0).unwrap());
        stack
            .get_mut(below)
            .unwrap()
            .surface_mut()
            .fill(Rgb8::new(200, 0, 0), 255);
        let top = stack.add_top("top", Surface::new(8, 8, 96.0).unwrap());
        stack
            .get_mut(top)
            .unwrap()
            .surface_mut()
            .fill(Rgb8::new(100, 50, 0), 255);
        stack.get_mut(top).unwrap().blend = BlendMode::Addition;

        let mut comp = Compositor::new(8, 8, 96.0).unwrap();
        let frame = comp.composite(&stack).unwrap();
        assert_eq!(px(&frame, 2, 2), [255, 50, 0, 255]);
    }

    #[test]
    fn multiply_layer_routes_through_generic_rule() {
        let mut stack = LayerStack::new();
        let below = stack.add_top("below", Surface::new(8, 8, 96.0).unwrap());
        stack
            .get_mut(below)
            .unwrap()
            .surface_mut()
            .fill(Rgb8::new(255, 255, 255), 255);
        let top = stack.add_top("top", Surface::new(8, 8, 96.0).unwrap());
        stack
            .get_mut(top)
            .unwrap()
            .surface_mut()
            .fill(Rgb8::new(128, 128, 128), 255);
        stack.get_mut(top).unwrap().blend = BlendMode::Multiply;

        let mut comp = Compositor::new(8, 8, 96.0).unwrap();
        let frame = comp.composite(&stack).unwrap();
        let got = px(&frame, 5, 5);
        // white * mid-gray = mid-gray
        for c in 0..3 {
            assert!((i16::from(got[c]) - 128).abs() <= 2, "{got:?}");
        }
        assert_eq!(got[3], 255);
    }

    #[test]
    fn checkerboard_shows_under_transparent_stacks() {
        let stack = LayerStack::new();
        let mut comp = Compositor::new(8, 8, 96.0).unwrap();
        comp.set_background(Some(Checkerboard {
            tile: 4,
            light: [230, 230, 230],
            dark: [200, 200, 200],
        }));
        let frame = comp.composite(&stack).unwrap();
        assert_eq!(px(&frame, 0, 0), [230, 230, 230, 255]);
        assert_eq!(px(&frame, 4, 0), [200, 200, 200, 255]);
        assert_eq!(px(&frame, 4, 4), [230, 230, 230, 255]);
    }

    #[test]
    fn frame_unpremultiplies_for_codecs() {
        let (mut stack, id) = stack_one(Rgb8::new(255, 0, 0), 255);
        stack.get_mut(id).unwrap().set_opacity(50);
        let mut comp = Compositor::new(8, 8, 96.0).unwrap();
        let frame = comp.composite(&stack).unwrap();
        let straight = frame.to_straight_rgba();
        // Premultiplied 50% red unpremultiplies back to full red.
        assert!((i16::from(straight[0]) - 255).abs() <= 3, "{}", straight[0]);
        assert!((i16::from(straight[3]) - 128).abs() <= 1);
    }
}
