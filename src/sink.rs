use crate::compositor::FrameRgba;
use crate::error::InkpadResult;

/// Configuration handed to a [`FrameSink`] before the first frame.
#[derive(Debug, Clone, Copy)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    pub dpi: f32,
}

/// Presentation-target contract: consumes finished composited frames, one
/// call per logical repaint.
pub trait FrameSink {
    /// Called once before any frames are pushed.
    fn begin(&mut self, cfg: SinkConfig) -> InkpadResult<()>;
    /// Push one presented frame.
    fn push_frame(&mut self, frame: &FrameRgba) -> InkpadResult<()>;
    /// Called once after the last frame.
    fn end(&mut self) -> InkpadResult<()>;
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<FrameRgba>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The configuration captured in `begin`, if any.
    pub fn config(&self) -> Option<SinkConfig> {
        self.cfg
    }

    pub fn frames(&self) -> &[FrameRgba] {
        &self.frames
    }

    pub fn last_frame(&self) -> Option<&FrameRgba> {
        self.frames.last()
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> InkpadResult<()> {
        self.cfg = Some(cfg);
        self.frames.clear();
        Ok(())
    }

    fn push_frame(&mut self, frame: &FrameRgba) -> InkpadResult<()> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn end(&mut self) -> InkpadResult<()> {
        Ok(())
    }
}
