use crate::blend::BlendMode;
use crate::error::InkpadResult;
use crate::surface::Surface;

/// Stable handle for a layer.
///
/// Ids are never reused, so history entries can detect that their layer has
/// been removed by looking the id up against the live stack.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct LayerId(pub u64);

/// A named raster editing unit: one exclusively owned surface plus
/// visibility, lock, opacity and blend attributes.
#[derive(Debug)]
pub struct Layer {
    id: LayerId,
    pub name: String,
    surface: Surface,
    pub visible: bool,
    pub locked: bool,
    opacity: u8,
    pub blend: BlendMode,
}

impl Layer {
    /// New unlocked, visible layer at full opacity and Normal blend.
    fn new(id: LayerId, name: impl Into<String>, surface: Surface) -> Self {
        Self {
            id,
            name: name.into(),
            surface,
            visible: true,
            locked: false,
            opacity: 100,
            blend: BlendMode::default(),
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut Surface {
        &mut self.surface
    }

    /// Replace the surface wholesale (resize migration, undo restore).
    pub fn replace_surface(&mut self, surface: Surface) {
        self.surface = surface;
    }

    /// Layer opacity in percent, `0..=100`.
    pub fn opacity(&self) -> u8 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: u8) {
        self.opacity = opacity.min(100);
    }

    /// Opacity as the `0..=1` attenuation factor the compositor applies.
    pub fn opacity_factor(&self) -> f32 {
        f32::from(self.opacity) / 100.0
    }
}

/// Ordered layer stack with one explicit compositing convention:
/// **index 0 is the topmost layer**, and the compositor walks from the last
/// index down to 0 (back to front). Insertion, removal and undo bookkeeping
/// all use this same order.
#[derive(Debug, Default)]
pub struct LayerStack {
    layers: Vec<Layer>,
    active: Option<LayerId>,
    next_id: u64,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Insert a new topmost layer and make it active.
    pub fn add_top(&mut self, name: impl Into<String>, surface: Surface) -> LayerId {
        let id = self.next_id();
        self.layers.insert(0, Layer::new(id, name, surface));
        self.active = Some(id);
        id
    }

    /// Append a new bottom-most layer without changing the active layer
    /// (picture import).
    pub fn add_bottom(&mut self, name: impl Into<String>, surface: Surface) -> LayerId {
        let id = self.next_id();
        self.layers.push(Layer::new(id, name, surface));
        if self.active.is_none() {
            self.active = Some(id);
        }
        id
    }

    /// Remove a layer, preserving the relative order of the rest. The active
    /// layer moves to the same index when possible, else to the last layer;
    /// it becomes `None` only when the stack empties.
    pub fn remove(&mut self, id: LayerId) -> bool {
        let Some(n) = self.layers.iter().position(|l| l.id() == id) else {
            return false;
        };
        self.layers.remove(n);
        if self.active == Some(id) {
            self.active = self
                .layers
                .get(n)
                .or_else(|| self.layers.last())
                .map(Layer::id);
        }
        true
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.layers.iter().any(|l| l.id() == id)
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    pub fn get_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id() == id)
    }

    pub fn active_id(&self) -> Option<LayerId> {
        self.active
    }

    /// Select the layer eligible to receive draw/erase operations.
    pub fn set_active(&mut self, id: LayerId) -> bool {
        if self.contains(id) {
            self.active = Some(id);
            true
        } else {
            false
        }
    }

    pub fn active(&self) -> Option<&Layer> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn active_mut(&mut self) -> Option<&mut Layer> {
        let id = self.active?;
        self.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Front (topmost, index 0) to back.
    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    /// Compositing order: back to front (last index down to 0).
    pub fn iter_back_to_front(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().rev()
    }

    /// Replace every layer surface with a resized one, migrating content by
    /// an origin-anchored blit.
    pub fn resize_all(&mut self, width: u32, height: u32) -> InkpadResult<()> {
        for layer in &mut self.layers {
            let migrated = layer.surface().resized(width, height)?;
            layer.replace_surface(migrated);
        }
        Ok(())
    }
}
