use std::collections::HashMap;

use kurbo::Point;

use crate::blend::BlendMode;
use crate::compositor::{Checkerboard, Compositor, FrameRgba};
use crate::error::{InkpadError, InkpadResult};
use crate::history::History;
use crate::layer::{LayerId, LayerStack};
use crate::sink::{FrameSink, SinkConfig};
use crate::stroke::{self, DisplayMetrics, InputSample};
use crate::surface::{Rgb8, Surface};

/// What the pen deposits: ink, erasure, or a color pick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PenMode {
    #[default]
    Draw,
    Eraser,
    ColorSample,
}

/// Layered painting engine: layer stack, undo/redo history, compositor and
/// pointer-input tracking behind one facade.
///
/// All mutation goes through `&mut self`, which is what serializes edits: at
/// most one gesture can touch a layer at a time, and no draw can interleave
/// with a composite. Input arriving on another thread must be funneled
/// through a channel (or equivalent) before it reaches these methods.
pub struct PaintCanvas {
    width: u32,
    height: u32,
    dpi: f32,
    layers: LayerStack,
    history: History,
    compositor: Compositor,
    /// Per-pointer `(last position, last pressure)`, kept across move events
    /// and cleared on release.
    inputs: HashMap<u64, (Point, f64)>,
    metrics: DisplayMetrics,
    stroke_color: Rgb8,
    stroke_thickness: f64,
    pen_mode: PenMode,
    dirty: bool,
}

impl PaintCanvas {
    /// Create a canvas with one default layer, like a fresh document.
    pub fn new(width: u32, height: u32, dpi: f32) -> InkpadResult<Self> {
        let mut canvas = Self {
            width,
            height,
            dpi,
            layers: LayerStack::new(),
            history: History::new(),
            compositor: Compositor::new(width, height, dpi)?,
            inputs: HashMap::new(),
            metrics: DisplayMetrics::default(),
            stroke_color: Rgb8::BLACK,
            stroke_thickness: 4.0,
            pen_mode: PenMode::Draw,
            dirty: true,
        };
        canvas.add_layer()?;
        Ok(canvas)
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

    pub fn layers(&self) -> &LayerStack {
        &self.layers
    }

    /// Direct stack access; callers that mutate pixel content through this
    /// must [`PaintCanvas::mark_dirty`] themselves.
    pub fn layers_mut(&mut self) -> &mut LayerStack {
        &mut self.layers
    }

    pub fn stroke_color(&self) -> Rgb8 {
        self.stroke_color
    }

    pub fn set_stroke_color(&mut self, color: Rgb8) {
        self.stroke_color = color;
    }

    pub fn stroke_thickness(&self) -> f64 {
        self.stroke_thickness
    }

    pub fn set_stroke_thickness(&mut self, thickness: f64) {
        self.stroke_thickness = thickness.max(0.0);
    }

    pub fn pen_mode(&self) -> PenMode {
        self.pen_mode
    }

    pub fn set_pen_mode(&mut self, mode: PenMode) {
        self.pen_mode = mode;
    }

    pub fn set_display_metrics(&mut self, metrics: DisplayMetrics) {
        self.metrics = metrics;
    }

    pub fn set_background(&mut self, background: Option<Checkerboard>) {
        self.compositor.set_background(background);
        self.dirty = true;
    }

    /// Add a topmost layer with a generated name and make it active.
    pub fn add_layer(&mut self) -> InkpadResult<LayerId> {
        let name = format!("Layer #{}", self.layers.len() + 1);
        self.add_layer_named(name)
    }

    /// Add a topmost layer with the given name and make it active.
    pub fn add_layer_named(&mut self, name: impl Into<String>) -> InkpadResult<LayerId> {
        let surface = Surface::new(self.width, self.height, self.dpi)?;
        let id = self.layers.add_top(name, surface);
        tracing::debug!(layer = id.0, "canvas: added layer");
        self.dirty = true;
        Ok(id)
    }

    /// Remove a layer and release its surface. Outstanding history entries
    /// for it become orphans that undo/redo discard lazily.
    pub fn remove_layer(&mut self, id: LayerId) -> bool {
        let removed = self.layers.remove(id);
        if removed {
            tracing::debug!(layer = id.0, "canvas: removed layer");
            self.dirty = true;
        }
        removed
    }

    pub fn set_active_layer(&mut self, id: LayerId) -> bool {
        self.layers.set_active(id)
    }

    pub fn set_layer_visible(&mut self, id: LayerId, visible: bool) {
        if let Some(layer) = self.layers.get_mut(id) {
            layer.visible = visible;
            self.dirty = true;
        }
    }

    pub fn set_layer_locked(&mut self, id: LayerId, locked: bool) {
        if let Some(layer) = self.layers.get_mut(id) {
            layer.locked = locked;
        }
    }

    pub fn set_layer_opacity(&mut self, id: LayerId, opacity: u8) {
        if let Some(layer) = self.layers.get_mut(id) {
            layer.set_opacity(opacity);
            self.dirty = true;
        }
    }

    pub fn set_layer_blend(&mut self, id: LayerId, blend: BlendMode) {
        if let Some(layer) = self.layers.get_mut(id) {
            layer.blend = blend;
            self.dirty = true;
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    fn is_eraser_gesture(&self, sample: &InputSample) -> bool {
        sample.is_eraser || self.pen_mode == PenMode::Eraser
    }

    fn in_range(&self, pos: Point) -> bool {
        pos.x >= 0.0
            && pos.y >= 0.0
            && pos.x < f64::from(self.width)
            && pos.y < f64::from(self.height)
    }

    fn sample_color_at(&mut self, pos: Point) {
        // Outside the surface the pick is silently ignored.
        if !self.in_range(pos) {
            return;
        }
        let (x, y) = (pos.x.floor() as u32, pos.y.floor() as u32);
        if let Some(layer) = self.layers.active() {
            self.stroke_color = layer.surface().pixel_color(x, y);
        }
    }

    /// Gesture start. Records the pointer, and unless the gesture is a color
    /// sample, arms the undo history with a snapshot of the active layer.
    /// Against a locked or absent active layer this is silently a no-op.
    pub fn pointer_pressed(&mut self, sample: &InputSample) {
        let pressure = stroke::compute_pressure(sample, &self.metrics);
        self.inputs.insert(sample.pointer_id, (sample.pos, pressure));

        let Some(active) = self.layers.active() else {
            return;
        };
        if active.locked {
            return;
        }
        if !self.is_eraser_gesture(sample) && self.pen_mode == PenMode::ColorSample {
            // Color sampling draws nothing and creates no history entry.
            self.sample_color_at(sample.pos);
            return;
        }
        let id = active.id();
        let snapshot = active.surface().snapshot();
        self.history.record_edit(id, snapshot);
    }

    /// Gesture continuation: erase, sample, or draw interpolated segments
    /// from the pointer's previous position to this one.
    pub fn pointer_moved(&mut self, sample: &InputSample) {
        let Some(active) = self.layers.active() else {
            return;
        };
        if active.locked {
            return;
        }
        let Some(&(from, prev_pressure)) = self.inputs.get(&sample.pointer_id) else {
            return;
        };
        if !sample.in_contact {
            return;
        }

        let pressure = stroke::compute_pressure(sample, &self.metrics);
        if self.is_eraser_gesture(sample) {
            // Eraser bypasses pressure modulation: fixed-width subtractive
            // stroke.
            let thickness = self.stroke_thickness;
            if let Some(layer) = self.layers.active_mut() {
                layer.surface_mut().erase_line(from, sample.pos, thickness);
            }
        } else if self.pen_mode == PenMode::ColorSample {
            self.sample_color_at(sample.pos);
        } else {
            let segments = stroke::interpolate_stroke(
                from,
                sample.pos,
                prev_pressure,
                pressure,
                self.stroke_thickness,
            );
            let color = self.stroke_color;
            if let Some(layer) = self.layers.active_mut() {
                let surface = layer.surface_mut();
                for seg in &segments {
                    surface.draw_line(seg.from, seg.to, color, seg.width, seg.opacity);
                }
            }
        }

        self.inputs.insert(sample.pointer_id, (sample.pos, pressure));
        self.dirty = true;
    }

    /// Gesture end: forget the pointer's tracked position and pressure.
    pub fn pointer_released(&mut self, sample: &InputSample) {
        self.inputs.remove(&sample.pointer_id);
    }

    /// Undo one edit; no-op on an empty stack.
    pub fn undo(&mut self) -> bool {
        let applied = self.history.undo(&mut self.layers);
        if applied {
            self.dirty = true;
        }
        applied
    }

    /// Redo one edit; no-op on an empty stack.
    pub fn redo(&mut self) -> bool {
        let applied = self.history.redo(&mut self.layers);
        if applied {
            self.dirty = true;
        }
        applied
    }

    /// Change the canvas size. Every layer surface is replaced with a new
    /// allocation and prior content migrates by an unscaled origin blit.
    pub fn resize(&mut self, width: u32, height: u32) -> InkpadResult<()> {
        self.layers.resize_all(width, height)?;
        self.compositor.resize(width, height)?;
        self.width = width;
        self.height = height;
        self.dirty = true;
        Ok(())
    }

    /// Append a decoded picture as a new bottom-most layer. `pixels` is
    /// straight-alpha RGBA8, row-major.
    pub fn import_picture(
        &mut self,
        name: impl Into<String>,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> InkpadResult<LayerId> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4));
        if expected != Some(pixels.len()) {
            return Err(InkpadError::validation(format!(
                "picture byte length {} does not match {width}x{height} rgba8",
                pixels.len()
            )));
        }
        let mut decoded = Surface::new(width, height, self.dpi)?;
        for (dst, src) in decoded.data_mut().chunks_exact_mut(4).zip(pixels.chunks_exact(4)) {
            let a = u16::from(src[3]);
            dst[0] = ((u16::from(src[0]) * a + 127) / 255) as u8;
            dst[1] = ((u16::from(src[1]) * a + 127) / 255) as u8;
            dst[2] = ((u16::from(src[2]) * a + 127) / 255) as u8;
            dst[3] = src[3];
        }
        let mut surface = Surface::new(self.width, self.height, self.dpi)?;
        surface.blit(&decoded);
        let id = self.layers.add_bottom(name, surface);
        self.dirty = true;
        Ok(id)
    }

    /// `true` when an edit happened since the last [`PaintCanvas::frame`].
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Composite the current stack into a presentable frame and clear the
    /// dirty flag.
    pub fn frame(&mut self) -> InkpadResult<FrameRgba> {
        let frame = self.compositor.composite(&self.layers)?;
        self.dirty = false;
        Ok(frame)
    }

    /// Sink configuration matching this canvas.
    pub fn sink_config(&self) -> SinkConfig {
        SinkConfig {
            width: self.width,
            height: self.height,
            dpi: self.dpi,
        }
    }

    /// Composite and push one frame to the presentation target.
    pub fn present(&mut self, sink: &mut dyn FrameSink) -> InkpadResult<()> {
        let frame = self.frame()?;
        sink.push_frame(&frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::DeviceKind;

    fn pen_at(id: u64, x: f64, y: f64, pressure: f64) -> InputSample {
        let mut s = InputSample::new(id, Point::new(x, y), DeviceKind::Pen);
        s.pressure = Some(pressure);
        s
    }

    fn draw_stroke(canvas: &mut PaintCanvas, from: (f64, f64), to: (f64, f64)) {
        canvas.pointer_pressed(&pen_at(1, from.0, from.1, 0.9));
        canvas.pointer_moved(&pen_at(1, to.0, to.1, 0.9));
        canvas.pointer_released(&pen_at(1, to.0, to.1, 0.9));
    }

    fn active_pixel(canvas: &PaintCanvas, x: u32, y: u32) -> [u8; 4] {
        canvas.layers().active().unwrap().surface().pixel(x, y)
    }

    #[test]
    fn new_canvas_has_one_default_layer() {
        let canvas = PaintCanvas::new(32, 32, 96.0).unwrap();
        assert_eq!(canvas.layers().len(), 1);
        assert_eq!(canvas.layers().iter().next().unwrap().name, "Layer #1");
        assert!(canvas.layers().active_id().is_some());
    }

    #[test]
    fn drawing_deposits_ink_on_the_active_layer() {
        let mut canvas = PaintCanvas::new(32, 32, 96.0).unwrap();
        canvas.set_stroke_color(Rgb8::new(255, 0, 0));
        canvas.set_stroke_thickness(6.0);
        draw_stroke(&mut canvas, (4.0, 16.0), (28.0, 16.0));
        let px = active_pixel(&canvas, 16, 16);
        assert!(px[3] > 0, "expected ink at stroke center, got {px:?}");
        assert!(canvas.is_dirty());
    }

    #[test]
    fn locked_layer_silently_ignores_edits() {
        let mut canvas = PaintCanvas::new(32, 32, 96.0).unwrap();
        let id = canvas.layers().active_id().unwrap();
        canvas.set_layer_locked(id, true);
        draw_stroke(&mut canvas, (4.0, 16.0), (28.0, 16.0));
        assert_eq!(active_pixel(&canvas, 16, 16), [0, 0, 0, 0]);
        assert!(!canvas.can_undo());
    }

    #[test]
    fn color_sample_picks_without_history() {
        let mut canvas = PaintCanvas::new(32, 32, 96.0).unwrap();
        canvas
            .layers_mut()
            .active_mut()
            .unwrap()
            .surface_mut()
            .fill(Rgb8::new(10, 200, 30), 255);
        canvas.set_pen_mode(PenMode::ColorSample);
        canvas.pointer_pressed(&pen_at(1, 5.0, 5.0, 0.5));
        assert_eq!(canvas.stroke_color(), Rgb8::new(10, 200, 30));
        assert!(!canvas.can_undo());
    }

    #[test]
    fn color_sample_outside_bounds_is_ignored() {
        let mut canvas = PaintCanvas::new(32, 32, 96.0).unwrap();
        canvas.set_stroke_color(Rgb8::new(1, 2, 3));
        canvas.set_pen_mode(PenMode::ColorSample);
        canvas.pointer_pressed(&pen_at(1, -5.0, 5.0, 0.5));
        canvas.pointer_pressed(&pen_at(1, 5.0, 99.0, 0.5));
        assert_eq!(canvas.stroke_color(), Rgb8::new(1, 2, 3));
    }

    #[test]
    fn device_eraser_flag_overrides_pen_mode() {
        let mut canvas = PaintCanvas::new(32, 32, 96.0).unwrap();
        canvas
            .layers_mut()
            .active_mut()
            .unwrap()
            .surface_mut()
            .fill(Rgb8::new(0, 0, 255), 255);
        canvas.set_stroke_thickness(8.0);

        let mut press = pen_at(1, 2.0, 16.0, 0.5);
        press.is_eraser = true;
        let mut mv = pen_at(1, 30.0, 16.0, 0.5);
        mv.is_eraser = true;
        canvas.pointer_pressed(&press);
        canvas.pointer_moved(&mv);

        assert_eq!(active_pixel(&canvas, 16, 16), [0, 0, 0, 0]);
        // An erase is an edit, so it armed the history.
        assert!(canvas.can_undo());
    }

    #[test]
    fn move_without_press_is_ignored() {
        let mut canvas = PaintCanvas::new(32, 32, 96.0).unwrap();
        canvas.pointer_moved(&pen_at(7, 16.0, 16.0, 1.0));
        assert_eq!(active_pixel(&canvas, 16, 16), [0, 0, 0, 0]);
    }

    #[test]
    fn out_of_contact_move_is_ignored() {
        let mut canvas = PaintCanvas::new(32, 32, 96.0).unwrap();
        canvas.pointer_pressed(&pen_at(1, 4.0, 16.0, 1.0));
        let mut hover = pen_at(1, 28.0, 16.0, 1.0);
        hover.in_contact = false;
        canvas.pointer_moved(&hover);
        assert_eq!(active_pixel(&canvas, 16, 16), [0, 0, 0, 0]);
    }

    #[test]
    fn release_clears_pointer_tracking() {
        let mut canvas = PaintCanvas::new(32, 32, 96.0).unwrap();
        canvas.pointer_pressed(&pen_at(1, 4.0, 16.0, 1.0));
        canvas.pointer_released(&pen_at(1, 4.0, 16.0, 1.0));
        canvas.pointer_moved(&pen_at(1, 28.0, 16.0, 1.0));
        assert_eq!(active_pixel(&canvas, 16, 16), [0, 0, 0, 0]);
    }

    #[test]
    fn undo_after_stroke_restores_blank_layer() {
        let mut canvas = PaintCanvas::new(32, 32, 96.0).unwrap();
        canvas.set_stroke_color(Rgb8::new(255, 0, 0));
        draw_stroke(&mut canvas, (4.0, 16.0), (28.0, 16.0));
        assert!(canvas.undo());
        assert_eq!(active_pixel(&canvas, 16, 16), [0, 0, 0, 0]);
        assert!(!canvas.undo());
    }

    #[test]
    fn resize_preserves_origin_anchored_content() {
        let mut canvas = PaintCanvas::new(32, 32, 96.0).unwrap();
        canvas.set_stroke_color(Rgb8::new(255, 0, 0));
        canvas.set_stroke_thickness(6.0);
        draw_stroke(&mut canvas, (4.0, 8.0), (28.0, 8.0));
        let before = active_pixel(&canvas, 16, 8);
        canvas.resize(48, 24).unwrap();
        assert_eq!(canvas.width(), 48);
        assert_eq!(active_pixel(&canvas, 16, 8), before);
        let frame = canvas.frame().unwrap();
        assert_eq!((frame.width, frame.height), (48, 24));
    }

    #[test]
    fn import_picture_lands_bottom_most() {
        let mut canvas = PaintCanvas::new(8, 8, 96.0).unwrap();
        let pixels = vec![255u8; 4 * 4 * 4];
        let id = canvas.import_picture("Imported", &pixels, 4, 4).unwrap();
        let order: Vec<_> = canvas.layers().iter().map(|l| l.id()).collect();
        assert_eq!(order.last(), Some(&id));
        // Imported content is premultiplied into the layer surface.
        assert_eq!(canvas.layers().get(id).unwrap().surface().pixel(2, 2), [255, 255, 255, 255]);
        assert_eq!(canvas.layers().get(id).unwrap().surface().pixel(6, 6), [0, 0, 0, 0]);
    }

    #[test]
    fn import_rejects_mismatched_byte_length() {
        let mut canvas = PaintCanvas::new(8, 8, 96.0).unwrap();
        assert!(canvas.import_picture("bad", &[0u8; 10], 4, 4).is_err());
    }

    #[test]
    fn present_pushes_one_frame_to_the_sink() {
        use crate::sink::InMemorySink;
        let mut canvas = PaintCanvas::new(8, 8, 96.0).unwrap();
        let mut sink = InMemorySink::new();
        sink.begin(canvas.sink_config()).unwrap();
        canvas.present(&mut sink).unwrap();
        sink.end().unwrap();
        assert_eq!(sink.frames().len(), 1);
        assert!(!canvas.is_dirty());
    }
}
