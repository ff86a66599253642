use crate::layer::{LayerId, LayerStack};
use crate::surface::Surface;

/// One reversible edit: the identified layer's pixel content as it was
/// before (undo) or after (redo) the edit. The entry owns its snapshot until
/// it is applied or discarded.
#[derive(Debug)]
struct HistoryEntry {
    layer: LayerId,
    snapshot: Surface,
}

/// Per-edit snapshot stacks for undo and redo.
///
/// Entries hold a [`LayerId`] rather than any reference into the stack, so a
/// deleted layer is detected at pop time by a lookup against the live stack
/// and its entry is discarded, never replayed. Layer removal itself does not
/// scan these stacks.
#[derive(Debug, Default)]
pub struct History {
    undo: Vec<HistoryEntry>,
    redo: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Arm a new edit gesture: push the layer's prior content onto the undo
    /// stack and drop the entire redo stack (any edit invalidates
    /// future-redo).
    pub fn record_edit(&mut self, layer: LayerId, snapshot: Surface) {
        tracing::debug!(layer = layer.0, "history: record edit");
        self.undo.push(HistoryEntry { layer, snapshot });
        self.redo.clear();
    }

    /// Apply the most recent live undo entry. Entries whose layer no longer
    /// exists are discarded and the next one is tried; exactly one step is
    /// applied per call. Returns `false` when nothing was undone.
    pub fn undo(&mut self, stack: &mut LayerStack) -> bool {
        Self::step(&mut self.undo, &mut self.redo, stack)
    }

    /// Symmetric counterpart of [`History::undo`].
    pub fn redo(&mut self, stack: &mut LayerStack) -> bool {
        Self::step(&mut self.redo, &mut self.undo, stack)
    }

    fn step(from: &mut Vec<HistoryEntry>, to: &mut Vec<HistoryEntry>, stack: &mut LayerStack) -> bool {
        while let Some(entry) = from.pop() {
            let Some(layer) = stack.get_mut(entry.layer) else {
                tracing::debug!(layer = entry.layer.0, "history: discarding orphaned entry");
                continue;
            };
            // Counter-snapshot the current content so the step can be
            // reversed, then restore the popped snapshot.
            to.push(HistoryEntry {
                layer: entry.layer,
                snapshot: layer.surface().snapshot(),
            });
            layer.replace_surface(entry.snapshot);
            return true;
        }
        false
    }
}
