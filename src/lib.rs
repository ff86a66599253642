//! Inkpad is a layered raster painting engine.
//!
//! It maintains a stack of independently editable image layers, composites
//! them into a single frame with per-layer blend modes and opacity, converts
//! raw pointer input into pressure-modulated ink strokes, and supports
//! reversible edits via per-layer undo/redo snapshots.
//!
//! The public API is facade-oriented:
//!
//! - Create a [`PaintCanvas`]
//! - Feed it [`InputSample`]s for pointer press/move/release
//! - Call [`PaintCanvas::frame`] (or [`PaintCanvas::present`] with a
//!   [`FrameSink`]) whenever the canvas is dirty
#![forbid(unsafe_code)]

pub mod blend;
pub mod canvas;
pub mod compositor;
pub mod error;
pub mod history;
pub mod layer;
pub mod sink;
pub mod stroke;
pub mod surface;

pub use blend::BlendMode;
pub use canvas::{PaintCanvas, PenMode};
pub use compositor::{Checkerboard, Compositor, FrameRgba};
pub use error::{InkpadError, InkpadResult};
pub use layer::{Layer, LayerId, LayerStack};
pub use sink::{FrameSink, InMemorySink, SinkConfig};
pub use stroke::{DeviceKind, DisplayMetrics, InputSample};
pub use surface::{Rgb8, Surface};
