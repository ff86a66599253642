use kurbo::{Point, Size};
use smallvec::SmallVec;

/// Input device class, as reported by the host input source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DeviceKind {
    Mouse,
    Pen,
    Touch,
}

/// One raw pointer event delivered by the host input source.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct InputSample {
    pub pointer_id: u64,
    pub pos: Point,
    /// Device-reported pressure in `[0,1]`, if the device has a sensor.
    pub pressure: Option<f64>,
    pub device: DeviceKind,
    /// Hardware eraser end of a pen, or right mouse button.
    pub is_eraser: bool,
    pub in_contact: bool,
    /// Touch contact patch in pixels, used to estimate touch pressure.
    pub contact: Option<Size>,
}

impl InputSample {
    pub fn new(pointer_id: u64, pos: Point, device: DeviceKind) -> Self {
        Self {
            pointer_id,
            pos,
            pressure: None,
            device,
            is_eraser: false,
            in_contact: true,
            contact: None,
        }
    }
}

/// Display parameters needed for the touch contact-area pressure estimate.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct DisplayMetrics {
    pub logical_dpi: f64,
    pub dpi_x: f64,
    pub dpi_y: f64,
    pub zoom: f64,
}

impl Default for DisplayMetrics {
    fn default() -> Self {
        Self {
            logical_dpi: 96.0,
            dpi_x: 96.0,
            dpi_y: 96.0,
            zoom: 1.0,
        }
    }
}

/// Reference touch contact area (mm²) that maps to full pressure.
const TOUCH_FULL_PRESSURE_AREA_MM2: f64 = 300.0;

/// Pressure ramps over at most this many segments of a move event, no matter
/// how many geometric segments the interpolator emits.
const PRESSURE_RAMP_STEPS: f64 = 4.0;

/// Travel distance covered by one interpolated segment.
const SEGMENT_SPACING_PX: f64 = 8.0;

/// Minimum number of segments per move event, so short taps still render
/// smoothly.
const MIN_SEGMENTS: usize = 4;

/// Normalized `[0,1]` pressure for a sample.
///
/// Pen and mouse report pressure directly (0.5 when absent). Touch pressure
/// is estimated from the physical contact area: the patch is converted to
/// millimetres via the raw DPI, scaled by display density and zoom, and
/// saturates at [`TOUCH_FULL_PRESSURE_AREA_MM2`].
pub fn compute_pressure(sample: &InputSample, metrics: &DisplayMetrics) -> f64 {
    let p = match sample.device {
        DeviceKind::Mouse | DeviceKind::Pen => sample.pressure.unwrap_or(0.5),
        DeviceKind::Touch => match sample.contact {
            Some(rect) => {
                let scale = (metrics.logical_dpi / 96.0) * metrics.zoom;
                let w = rect.width / (metrics.dpi_x / 25.4) * scale;
                let h = rect.height / (metrics.dpi_y / 25.4) * scale;
                (w * h / TOUCH_FULL_PRESSURE_AREA_MM2).min(1.0)
            }
            None => 0.5,
        },
    };
    p.clamp(0.0, 1.0)
}

/// Exactly `n` evenly spaced points along the straight line from `a` to `b`;
/// the last point equals `b`. Point `i` of `n` is `((n-i-1)*a + (i+1)*b)/n`.
pub fn split_segments(a: Point, b: Point, n: usize) -> SmallVec<[Point; 16]> {
    let mut points = SmallVec::new();
    let nf = n as f64;
    for i in 0..n {
        let m = (i + 1) as f64;
        let k = nf - m;
        points.push(Point::new(
            (k * a.x + m * b.x) / nf,
            (k * a.y + m * b.y) / nf,
        ));
    }
    points
}

/// One segment per [`SEGMENT_SPACING_PX`] pixels of travel, at least
/// [`MIN_SEGMENTS`].
pub fn segment_count(from: Point, to: Point) -> usize {
    let travel = from.distance(to);
    MIN_SEGMENTS.max((travel / SEGMENT_SPACING_PX) as usize)
}

/// Per-segment opacity: ramps in over the lower half of the pressure range
/// and saturates at full pressure >= 0.5.
pub fn segment_opacity(pressure: f64) -> f32 {
    if pressure < 0.5 {
        (pressure * 2.0) as f32
    } else {
        1.0
    }
}

/// One rasterizable piece of an interpolated stroke.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeSegment {
    pub from: Point,
    pub to: Point,
    pub width: f64,
    pub opacity: f32,
}

/// Convert one pointer-move event into smooth, pressure-modulated segments.
///
/// Geometry is split evenly along the straight line, but pressure advances in
/// steps of `(pressure_to - pressure_from) / 4` and holds at the target once
/// reached, so the felt ramp is the same for short and long moves.
pub fn interpolate_stroke(
    from: Point,
    to: Point,
    pressure_from: f64,
    pressure_to: f64,
    base_thickness: f64,
) -> SmallVec<[StrokeSegment; 16]> {
    let n = segment_count(from, to);
    let points = split_segments(from, to, n);
    let step = (pressure_to - pressure_from) / PRESSURE_RAMP_STEPS;
    let lo = pressure_from.min(pressure_to);
    let hi = pressure_from.max(pressure_to);

    let mut out = SmallVec::new();
    let mut prev = from;
    for (i, &pt) in points.iter().enumerate() {
        let p = (pressure_from + step * i as f64).clamp(lo, hi).clamp(0.0, 1.0);
        out.push(StrokeSegment {
            from: prev,
            to: pt,
            width: base_thickness * p,
            opacity: segment_opacity(p),
        });
        prev = pt;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_returns_exactly_n_points_ending_at_b() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 20.0);
        for n in 1..=12 {
            let pts = split_segments(a, b, n);
            assert_eq!(pts.len(), n);
            let last = pts[n - 1];
            assert!((last.x - b.x).abs() < 1e-9 && (last.y - b.y).abs() < 1e-9);
        }
    }

    #[test]
    fn split_spacing_is_strictly_monotonic() {
        let a = Point::new(-3.0, 5.0);
        let b = Point::new(21.0, -7.0);
        let pts = split_segments(a, b, 9);
        let mut prev = a.distance(pts[0]);
        for pt in pts.iter().skip(1) {
            let d = a.distance(*pt);
            assert!(d > prev);
            prev = d;
        }
    }

    #[test]
    fn segment_count_floors_distance_over_8_with_min_4() {
        let a = Point::ZERO;
        assert_eq!(segment_count(a, Point::new(1.0, 0.0)), 4);
        assert_eq!(segment_count(a, Point::new(31.0, 0.0)), 4);
        assert_eq!(segment_count(a, Point::new(32.0, 0.0)), 4);
        assert_eq!(segment_count(a, Point::new(40.0, 0.0)), 5);
        assert_eq!(segment_count(a, Point::new(80.0, 0.0)), 10);
    }

    #[test]
    fn opacity_ramps_then_saturates() {
        assert!((segment_opacity(0.4) - 0.8).abs() < 1e-6);
        assert!((segment_opacity(0.7) - 1.0).abs() < 1e-6);
        assert!((segment_opacity(0.5) - 1.0).abs() < 1e-6);
        assert!((segment_opacity(0.0) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn pressure_ramp_uses_fixed_divisor_and_holds_at_target() {
        let segs = interpolate_stroke(Point::ZERO, Point::new(80.0, 0.0), 0.2, 0.6, 10.0);
        assert_eq!(segs.len(), 10);
        // First segment starts at the previous pressure.
        assert!((segs[0].width - 2.0).abs() < 1e-9);
        // Ramp advances by (0.6-0.2)/4 = 0.1 per segment.
        assert!((segs[1].width - 3.0).abs() < 1e-9);
        assert!((segs[4].width - 6.0).abs() < 1e-9);
        // After four steps the pressure holds at the target.
        assert!((segs[9].width - 6.0).abs() < 1e-9);
    }

    #[test]
    fn stroke_segments_are_contiguous() {
        let segs = interpolate_stroke(Point::ZERO, Point::new(50.0, 10.0), 0.5, 0.5, 4.0);
        let mut prev = Point::ZERO;
        for s in &segs {
            assert_eq!(s.from, prev);
            prev = s.to;
        }
        assert!((prev.x - 50.0).abs() < 1e-9 && (prev.y - 10.0).abs() < 1e-9);
    }

    #[test]
    fn pen_reports_pressure_directly() {
        let metrics = DisplayMetrics::default();
        let mut s = InputSample::new(1, Point::ZERO, DeviceKind::Pen);
        s.pressure = Some(0.8);
        assert!((compute_pressure(&s, &metrics) - 0.8).abs() < 1e-9);
        s.pressure = None;
        assert!((compute_pressure(&s, &metrics) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn touch_pressure_scales_with_contact_area() {
        let metrics = DisplayMetrics::default();
        let mut s = InputSample::new(1, Point::ZERO, DeviceKind::Touch);
        // 96 px at 96 raw dpi = 25.4 mm per side -> area well over the
        // reference 300 mm² -> saturates.
        s.contact = Some(Size::new(96.0, 96.0));
        assert!((compute_pressure(&s, &metrics) - 1.0).abs() < 1e-9);
        // A small patch maps below full pressure.
        s.contact = Some(Size::new(24.0, 24.0));
        let p = compute_pressure(&s, &metrics);
        assert!(p > 0.0 && p < 1.0, "p = {p}");
        // No contact rect falls back to the neutral default.
        s.contact = None;
        assert!((compute_pressure(&s, &metrics) - 0.5).abs() < 1e-9);
    }
}
