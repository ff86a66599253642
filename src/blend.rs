use crate::error::{InkpadError, InkpadResult};

/// Premultiplied RGBA8 pixel (r,g,b already multiplied by a).
pub type PremulRgba8 = [u8; 4];

/// Per-layer blend mode.
///
/// `Normal` and `Addition` are handled by the compositor directly via the
/// alpha-over / additive shortcuts; every other mode goes through
/// [`blend_rule`].
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum BlendMode {
    #[default]
    Normal,
    Dissolve,
    Multiply,
    Divide,
    Screen,
    Overlay,
    Dodge,
    Burn,
    HardLight,
    SoftLight,
    Difference,
    Addition,
    Subtract,
    DarkenOnly,
    LightenOnly,
    Hue,
    Saturation,
    Color,
    Value,
}

impl BlendMode {
    /// Every mode, in layer-panel order.
    pub const ALL: [BlendMode; 19] = [
        BlendMode::Normal,
        BlendMode::Dissolve,
        BlendMode::Multiply,
        BlendMode::Divide,
        BlendMode::Screen,
        BlendMode::Overlay,
        BlendMode::Dodge,
        BlendMode::Burn,
        BlendMode::HardLight,
        BlendMode::SoftLight,
        BlendMode::Difference,
        BlendMode::Addition,
        BlendMode::Subtract,
        BlendMode::DarkenOnly,
        BlendMode::LightenOnly,
        BlendMode::Hue,
        BlendMode::Saturation,
        BlendMode::Color,
        BlendMode::Value,
    ];

    pub fn label(self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Dissolve => "Dissolve",
            BlendMode::Multiply => "Multiply",
            BlendMode::Divide => "Divide",
            BlendMode::Screen => "Screen",
            BlendMode::Overlay => "Overlay",
            BlendMode::Dodge => "Dodge",
            BlendMode::Burn => "Burn",
            BlendMode::HardLight => "Hard Light",
            BlendMode::SoftLight => "Soft Light",
            BlendMode::Difference => "Difference",
            BlendMode::Addition => "Addition",
            BlendMode::Subtract => "Subtract",
            BlendMode::DarkenOnly => "Darken Only",
            BlendMode::LightenOnly => "Lighten Only",
            BlendMode::Hue => "Hue",
            BlendMode::Saturation => "Saturation",
            BlendMode::Color => "Color",
            BlendMode::Value => "Value",
        }
    }

    /// `true` for the two modes the compositor composites without the
    /// generic rule.
    pub fn is_composite_shortcut(self) -> bool {
        matches!(self, BlendMode::Normal | BlendMode::Addition)
    }
}

/// Generic per-pixel blend rule: `(background, foreground, x, y) -> blended`.
///
/// Both inputs are premultiplied; the foreground is expected to carry its
/// layer opacity in its alpha already. `x`/`y` only matter for `Dissolve`'s
/// stipple pattern.
pub type BlendFn = fn(PremulRgba8, PremulRgba8, u32, u32) -> PremulRgba8;

/// Look up the generic blend rule for `mode`.
///
/// `Normal` and `Addition` must be composited upstream; requesting them here
/// is a caller bug.
pub fn blend_rule(mode: BlendMode) -> InkpadResult<BlendFn> {
    let f: BlendFn = match mode {
        BlendMode::Normal | BlendMode::Addition => {
            return Err(InkpadError::validation(format!(
                "blend mode {:?} must be composited directly, not via the generic rule",
                mode
            )));
        }
        BlendMode::Dissolve => dissolve,
        BlendMode::Multiply => |b, f, _, _| separable(b, f, |bc, fc| bc * fc),
        BlendMode::Divide => |b, f, _, _| separable(b, f, divide_ch),
        BlendMode::Screen => |b, f, _, _| separable(b, f, |bc, fc| 1.0 - (1.0 - bc) * (1.0 - fc)),
        BlendMode::Overlay => |b, f, _, _| separable(b, f, overlay_ch),
        BlendMode::Dodge => |b, f, _, _| separable(b, f, dodge_ch),
        BlendMode::Burn => |b, f, _, _| separable(b, f, burn_ch),
        BlendMode::HardLight => |b, f, _, _| separable(b, f, |bc, fc| overlay_ch(fc, bc)),
        BlendMode::SoftLight => |b, f, _, _| separable(b, f, soft_light_ch),
        BlendMode::Difference => |b, f, _, _| separable(b, f, |bc, fc| (bc - fc).abs()),
        BlendMode::Subtract => |b, f, _, _| separable(b, f, |bc, fc| (bc - fc).max(0.0)),
        BlendMode::DarkenOnly => |b, f, _, _| pick_by_luma(b, f, true),
        BlendMode::LightenOnly => |b, f, _, _| pick_by_luma(b, f, false),
        BlendMode::Hue => |b, f, _, _| nonseparable(b, f, NonSep::Hue),
        BlendMode::Saturation => |b, f, _, _| nonseparable(b, f, NonSep::Saturation),
        BlendMode::Color => |b, f, _, _| nonseparable(b, f, NonSep::Color),
        BlendMode::Value => |b, f, _, _| nonseparable(b, f, NonSep::Value),
    };
    Ok(f)
}

/// Standard alpha-over of premultiplied `src` onto `dst`, with an extra
/// opacity factor applied to `src`.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255(u16::from(dst[3]), inv));
    for i in 0..3 {
        let sc = mul_div255(u16::from(src[i]), op);
        let dc = mul_div255(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

/// Additive composite of premultiplied `src` onto `dst` with an extra
/// opacity factor (channel-wise saturating add).
pub fn add(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }
    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;

    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = dst[i].saturating_add(mul_div255(u16::from(src[i]), op));
    }
    out
}

/// Scale all four channels by `opacity` (premultiplied attenuation).
pub fn attenuate(px: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity >= 1.0 {
        return px;
    }
    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = mul_div255(u16::from(px[i]), op);
    }
    out
}

pub(crate) fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

// f32 straight-alpha working form for the generic rules. Premul u8 math is
// kept for the hot over/add paths only; the table modes round-trip through
// floats because the channel formulas are defined on straight color.
struct Straight {
    r: f32,
    g: f32,
    b: f32,
    a: f32,
}

fn unpremul(px: PremulRgba8) -> Straight {
    let a = f32::from(px[3]) / 255.0;
    if a <= 0.0 {
        return Straight {
            r: 0.0,
            g: 0.0,
            b: 0.0,
            a: 0.0,
        };
    }
    Straight {
        r: (f32::from(px[0]) / 255.0 / a).min(1.0),
        g: (f32::from(px[1]) / 255.0 / a).min(1.0),
        b: (f32::from(px[2]) / 255.0 / a).min(1.0),
        a,
    }
}

/// Composite blended straight-color channels over the background and
/// re-premultiply: `out_c = blended_c*fa + bg_c*ba*(1-fa)`.
fn over_blended(bg: &Straight, blended: [f32; 3], fa: f32) -> PremulRgba8 {
    let inv = 1.0 - fa;
    let out_a = fa + bg.a * inv;
    let to_u8 = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;
    [
        to_u8(blended[0] * fa + bg.r * bg.a * inv),
        to_u8(blended[1] * fa + bg.g * bg.a * inv),
        to_u8(blended[2] * fa + bg.b * bg.a * inv),
        to_u8(out_a),
    ]
}

fn separable(bg: PremulRgba8, fg: PremulRgba8, f: fn(f32, f32) -> f32) -> PremulRgba8 {
    if fg[3] == 0 {
        return bg;
    }
    let b = unpremul(bg);
    let s = unpremul(fg);
    // Where the background is transparent the mode formula has no base color
    // to act on; fall back to the foreground's own color there so strokes on
    // empty ground stay visible (matches compositing onto a cleared buffer).
    let blended = if b.a <= 0.0 {
        [s.r, s.g, s.b]
    } else {
        [f(b.r, s.r), f(b.g, s.g), f(b.b, s.b)]
    };
    over_blended(&b, blended, s.a)
}

fn overlay_ch(bc: f32, fc: f32) -> f32 {
    if bc < 0.5 {
        2.0 * bc * fc
    } else {
        1.0 - 2.0 * (1.0 - bc) * (1.0 - fc)
    }
}

fn dodge_ch(bc: f32, fc: f32) -> f32 {
    if fc >= 1.0 { 1.0 } else { (bc / (1.0 - fc)).min(1.0) }
}

fn burn_ch(bc: f32, fc: f32) -> f32 {
    if fc <= 0.0 {
        0.0
    } else {
        (1.0 - (1.0 - bc) / fc).max(0.0)
    }
}

fn divide_ch(bc: f32, fc: f32) -> f32 {
    if fc <= 0.0 { 1.0 } else { (bc / fc).min(1.0) }
}

/// W3C soft-light formula.
fn soft_light_ch(bc: f32, fc: f32) -> f32 {
    if fc <= 0.5 {
        bc - (1.0 - 2.0 * fc) * bc * (1.0 - bc)
    } else {
        let d = if bc <= 0.25 {
            ((16.0 * bc - 12.0) * bc + 4.0) * bc
        } else {
            bc.sqrt()
        };
        bc + (2.0 * fc - 1.0) * (d - bc)
    }
}

fn luma(r: f32, g: f32, b: f32) -> f32 {
    0.3 * r + 0.59 * g + 0.11 * b
}

/// Darker-color / lighter-color: keep whichever whole color has the lower
/// (resp. higher) luma.
fn pick_by_luma(bg: PremulRgba8, fg: PremulRgba8, darker: bool) -> PremulRgba8 {
    if fg[3] == 0 {
        return bg;
    }
    let b = unpremul(bg);
    let s = unpremul(fg);
    let keep_fg = if darker {
        luma(s.r, s.g, s.b) < luma(b.r, b.g, b.b)
    } else {
        luma(s.r, s.g, s.b) > luma(b.r, b.g, b.b)
    };
    let blended = if b.a <= 0.0 || keep_fg {
        [s.r, s.g, s.b]
    } else {
        [b.r, b.g, b.b]
    };
    over_blended(&b, blended, s.a)
}

enum NonSep {
    Hue,
    Saturation,
    Color,
    Value,
}

/// W3C non-separable modes (Value maps to luminosity).
fn nonseparable(bg: PremulRgba8, fg: PremulRgba8, kind: NonSep) -> PremulRgba8 {
    if fg[3] == 0 {
        return bg;
    }
    let b = unpremul(bg);
    let s = unpremul(fg);
    let bc = [b.r, b.g, b.b];
    let sc = [s.r, s.g, s.b];
    let blended = if b.a <= 0.0 {
        sc
    } else {
        match kind {
            NonSep::Hue => set_lum(set_sat(sc, sat(bc)), luma3(bc)),
            NonSep::Saturation => set_lum(set_sat(bc, sat(sc)), luma3(bc)),
            NonSep::Color => set_lum(sc, luma3(bc)),
            NonSep::Value => set_lum(bc, luma3(sc)),
        }
    };
    over_blended(&b, blended, s.a)
}

fn luma3(c: [f32; 3]) -> f32 {
    luma(c[0], c[1], c[2])
}

fn sat(c: [f32; 3]) -> f32 {
    c[0].max(c[1]).max(c[2]) - c[0].min(c[1]).min(c[2])
}

fn clip_color(mut c: [f32; 3]) -> [f32; 3] {
    let l = luma3(c);
    let n = c[0].min(c[1]).min(c[2]);
    let x = c[0].max(c[1]).max(c[2]);
    if n < 0.0 {
        for v in &mut c {
            *v = l + (*v - l) * l / (l - n);
        }
    }
    if x > 1.0 {
        for v in &mut c {
            *v = l + (*v - l) * (1.0 - l) / (x - l);
        }
    }
    c
}

fn set_lum(c: [f32; 3], l: f32) -> [f32; 3] {
    let d = l - luma3(c);
    clip_color([c[0] + d, c[1] + d, c[2] + d])
}

fn set_sat(c: [f32; 3], s: f32) -> [f32; 3] {
    // Order the channel indices so mid/min/max are rescaled in place.
    let mut idx = [0usize, 1, 2];
    idx.sort_by(|&a, &b| c[a].partial_cmp(&c[b]).unwrap_or(std::cmp::Ordering::Equal));
    let [min_i, mid_i, max_i] = idx;
    let mut out = [0.0f32; 3];
    if c[max_i] > c[min_i] {
        out[mid_i] = (c[mid_i] - c[min_i]) * s / (c[max_i] - c[min_i]);
        out[max_i] = s;
    }
    out
}

/// Deterministic stipple: the foreground wins (fully opaque) where a position
/// hash lands under its alpha, otherwise the background shows through.
fn dissolve(bg: PremulRgba8, fg: PremulRgba8, x: u32, y: u32) -> PremulRgba8 {
    if fg[3] == 0 {
        return bg;
    }
    let h = x
        .wrapping_mul(0x9E37_79B1)
        .wrapping_add(y.wrapping_mul(0x85EB_CA6B));
    let h = (h ^ (h >> 15)).wrapping_mul(0x2545_F491);
    let threshold = (h >> 24) as u8;
    if threshold < fg[3] {
        let s = unpremul(fg);
        let to_u8 = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;
        [to_u8(s.r), to_u8(s.g), to_u8(s.b), 255]
    } else {
        bg
    }
}
