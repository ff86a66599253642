use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use kurbo::Point;

use inkpad::{
    BlendMode, Checkerboard, DeviceKind, InputSample, PaintCanvas, PenMode, Rgb8,
};

#[derive(Parser, Debug)]
#[command(name = "inkpad", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a JSON stroke script and write the composited frame as a PNG.
    Paint(PaintArgs),
    /// List the available layer blend modes.
    Modes,
}

#[derive(Parser, Debug)]
struct PaintArgs {
    /// Input stroke script JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Draw a checkerboard under the layer stack.
    #[arg(long)]
    checkerboard: bool,
}

/// Canvas descriptor at the top of a script.
#[derive(Debug, serde::Deserialize)]
struct ScriptCanvas {
    width: u32,
    height: u32,
    #[serde(default = "default_dpi")]
    dpi: f32,
}

fn default_dpi() -> f32 {
    96.0
}

/// One scripted action, applied in order.
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
enum Step {
    SetColor { r: u8, g: u8, b: u8 },
    SetThickness(f64),
    SetMode(PenMode),
    /// Add a new topmost layer (becomes active).
    AddLayer { name: String },
    /// Set the active layer's blend mode.
    SetBlend(BlendMode),
    /// Set the active layer's opacity in percent.
    SetOpacity(u8),
    /// One pen gesture: `[x, y, pressure]` samples from press to release.
    Stroke { points: Vec<[f64; 3]> },
    /// One eraser gesture: `[x, y]` samples from press to release.
    Erase { points: Vec<[f64; 2]> },
    /// Decode an image file into a new bottom-most layer.
    Import { path: PathBuf },
    Undo,
    Redo,
}

#[derive(Debug, serde::Deserialize)]
struct Script {
    canvas: ScriptCanvas,
    steps: Vec<Step>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Paint(args) => cmd_paint(args),
        Command::Modes => {
            for mode in BlendMode::ALL {
                println!("{}", mode.label());
            }
            Ok(())
        }
    }
}

fn read_script(path: &Path) -> anyhow::Result<Script> {
    let f = File::open(path).with_context(|| format!("open script '{}'", path.display()))?;
    let r = BufReader::new(f);
    let script: Script = serde_json::from_reader(r).with_context(|| "parse script JSON")?;
    Ok(script)
}

fn pen_sample(id: u64, x: f64, y: f64, pressure: f64) -> InputSample {
    let mut s = InputSample::new(id, Point::new(x, y), DeviceKind::Pen);
    s.pressure = Some(pressure);
    s
}

fn replay_gesture(canvas: &mut PaintCanvas, samples: &[InputSample]) {
    let Some((first, rest)) = samples.split_first() else {
        return;
    };
    canvas.pointer_pressed(first);
    for s in rest {
        canvas.pointer_moved(s);
    }
    canvas.pointer_released(samples.last().unwrap_or(first));
}

fn cmd_paint(args: PaintArgs) -> anyhow::Result<()> {
    let script = read_script(&args.in_path)?;
    let mut canvas = PaintCanvas::new(
        script.canvas.width,
        script.canvas.height,
        script.canvas.dpi,
    )?;
    if args.checkerboard {
        canvas.set_background(Some(Checkerboard::default()));
    }

    let script_root = args.in_path.parent().unwrap_or_else(|| Path::new("."));
    for step in &script.steps {
        apply_step(&mut canvas, step, script_root)?;
    }

    let frame = canvas.frame()?;
    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        &frame.to_straight_rgba(),
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn apply_step(canvas: &mut PaintCanvas, step: &Step, script_root: &Path) -> anyhow::Result<()> {
    match step {
        Step::SetColor { r, g, b } => canvas.set_stroke_color(Rgb8::new(*r, *g, *b)),
        Step::SetThickness(t) => canvas.set_stroke_thickness(*t),
        Step::SetMode(mode) => canvas.set_pen_mode(*mode),
        Step::AddLayer { name } => {
            canvas.add_layer_named(name.clone())?;
        }
        Step::SetBlend(mode) => {
            if let Some(id) = canvas.layers().active_id() {
                canvas.set_layer_blend(id, *mode);
            }
        }
        Step::SetOpacity(opacity) => {
            if let Some(id) = canvas.layers().active_id() {
                canvas.set_layer_opacity(id, *opacity);
            }
        }
        Step::Stroke { points } => {
            let prev_mode = canvas.pen_mode();
            canvas.set_pen_mode(PenMode::Draw);
            let samples: Vec<InputSample> = points
                .iter()
                .map(|&[x, y, p]| pen_sample(1, x, y, p))
                .collect();
            replay_gesture(canvas, &samples);
            canvas.set_pen_mode(prev_mode);
        }
        Step::Erase { points } => {
            let samples: Vec<InputSample> = points
                .iter()
                .map(|&[x, y]| {
                    let mut s = pen_sample(1, x, y, 0.5);
                    s.is_eraser = true;
                    s
                })
                .collect();
            replay_gesture(canvas, &samples);
        }
        Step::Import { path } => {
            let resolved = if path.is_absolute() {
                path.clone()
            } else {
                script_root.join(path)
            };
            let img = image::open(&resolved)
                .with_context(|| format!("open picture '{}'", resolved.display()))?
                .into_rgba8();
            let (w, h) = img.dimensions();
            canvas.import_picture("Imported", img.as_raw(), w, h)?;
        }
        Step::Undo => {
            canvas.undo();
        }
        Step::Redo => {
            canvas.redo();
        }
    }
    Ok(())
}
