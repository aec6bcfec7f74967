use image::RgbaImage;
use tracing::info;
use uuid::Uuid;

use crate::canvas::{CanvasState, Layer, LayerId, TiledStore};
use crate::config::HistoryLimits;
use crate::error::BridgeError;
use crate::history::{HistoryManager, LayerOpCommand, LayerOperation, LayerSnapshot};
use crate::pixel::{Color, PixelFormat};

/// A layered raster project: the layer stack, its active layer and its
/// undo history.
pub struct Document {
    pub id: Uuid,
    pub name: String,
    state: CanvasState,
    history: HistoryManager,
    pub(crate) next_transaction: u64,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &(self.width(), self.height()))
            .field("layers", &self.layers().len())
            .field("undo_steps", &self.history.undo_count())
            .finish()
    }
}

impl Document {
    /// New document with one white "Background" layer.
    pub fn new(name: impl Into<String>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self::from_state(name, CanvasState::new(width, height, format))
    }

    /// Document whose background layer holds `image`.
    pub fn from_rgba_image(name: impl Into<String>, image: &RgbaImage, format: PixelFormat) -> Self {
        Self::from_state(name, CanvasState::from_rgba_image(image, format))
    }

    fn from_state(name: impl Into<String>, state: CanvasState) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            state,
            history: HistoryManager::default(),
            next_transaction: 0,
        }
    }

    pub fn with_history_limits(mut self, limits: &HistoryLimits) -> Self {
        self.history = HistoryManager::with_limits(limits);
        self
    }

    pub fn width(&self) -> u32 {
        self.state.width
    }

    pub fn height(&self) -> u32 {
        self.state.height
    }

    pub fn state(&self) -> &CanvasState {
        &self.state
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub(crate) fn history_mut(&mut self) -> &mut HistoryManager {
        &mut self.history
    }

    // ---- layers -------------------------------------------------------------

    pub fn layers(&self) -> &[Layer] {
        &self.state.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.state.layer(id)
    }

    pub(crate) fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.state.layer_mut(id)
    }

    pub fn require_layer(&self, id: LayerId) -> Result<&Layer, BridgeError> {
        self.layer(id).ok_or_else(|| BridgeError::LayerNotFound(id.to_string()))
    }

    pub fn layer_by_name(&self, name: &str) -> Result<&Layer, BridgeError> {
        self.state
            .layer_by_name(name)
            .ok_or_else(|| BridgeError::LayerNotFound(name.to_string()))
    }

    pub fn active_layer(&self) -> &Layer {
        self.state.active_layer()
    }

    pub fn active_layer_id(&self) -> LayerId {
        self.state.active_layer().id
    }

    pub fn set_active_layer(&mut self, id: LayerId) -> Result<(), BridgeError> {
        let idx = self
            .state
            .layer_index(id)
            .ok_or_else(|| BridgeError::LayerNotFound(id.to_string()))?;
        self.state.active_layer_index = idx;
        Ok(())
    }

    /// Add a transparent layer above the active one and make it active.
    pub fn add_layer(&mut self, name: &str, format: PixelFormat) -> LayerId {
        let layer = Layer::new(name, self.width(), self.height(), format, Color::TRANSPARENT);
        let id = layer.id;
        let index = (self.state.active_layer_index + 1).min(self.state.layers.len());
        self.history.push(Box::new(LayerOpCommand::new(LayerOperation::Add {
            index,
            layer: LayerSnapshot::capture(&layer),
        })));
        self.state.layers.insert(index, layer);
        self.state.active_layer_index = index;
        info!(layer = name, %format, "layer added");
        id
    }

    /// Reallocate a layer's store in another pixel format. Possibly lossy;
    /// every iterator bound to the old store becomes invalid.
    pub fn convert_layer_format(&mut self, id: LayerId, format: PixelFormat) -> Result<(), BridgeError> {
        let layer = self.layer_mut(id).ok_or_else(|| BridgeError::LayerNotFound(id.to_string()))?;
        if layer.is_locked() {
            return Err(BridgeError::LayerLocked(layer.name.clone()));
        }
        let converted = layer.pixels().converted(format);
        let before = layer.replace_pixels(converted);
        let after = layer.pixels().clone();
        info!(layer = %layer.name, from = %before.format(), to = %format, "layer format converted");
        self.history.push(Box::new(LayerOpCommand::new(LayerOperation::ConvertFormat {
            layer: id,
            before,
            after,
        })));
        Ok(())
    }

    // ---- host read path -----------------------------------------------------

    /// Pixels of one layer. Refused while the layer has an open transaction.
    pub fn read_layer(&self, id: LayerId) -> Result<&TiledStore, BridgeError> {
        let layer = self.require_layer(id)?;
        if layer.is_locked() {
            return Err(BridgeError::LayerLocked(layer.name.clone()));
        }
        Ok(layer.pixels())
    }

    /// Composite of all visible layers. Refused while any layer is locked.
    pub fn flatten(&self) -> Result<RgbaImage, BridgeError> {
        if let Some(locked) = self.layers().iter().find(|l| l.is_locked()) {
            return Err(BridgeError::LayerLocked(locked.name.clone()));
        }
        Ok(self.state.composite())
    }

    // ---- history ------------------------------------------------------------

    fn ensure_idle(&self) -> Result<(), BridgeError> {
        match self.layers().iter().find_map(|l| l.open_transaction()) {
            Some(open) => Err(BridgeError::TransactionInProgress(open.label.clone())),
            None => Ok(()),
        }
    }

    pub fn undo(&mut self) -> Result<Option<String>, BridgeError> {
        self.ensure_idle()?;
        Ok(self.history.undo(&mut self.state))
    }

    pub fn redo(&mut self) -> Result<Option<String>, BridgeError> {
        self.ensure_idle()?;
        Ok(self.history.redo(&mut self.state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_has_one_active_layer() {
        let doc = Document::new("doc", 8, 6, PixelFormat::Rgba8);
        assert_eq!(doc.layers().len(), 1);
        assert_eq!(doc.active_layer().name, "Background");
        assert_eq!((doc.width(), doc.height()), (8, 6));
    }

    #[test]
    fn added_layer_becomes_active_and_is_undoable() {
        let mut doc = Document::new("doc", 8, 6, PixelFormat::Rgba8);
        let id = doc.add_layer("ink", PixelFormat::Gray8);
        assert_eq!(doc.active_layer_id(), id);
        assert_eq!(doc.layer(id).unwrap().format(), PixelFormat::Gray8);
        doc.undo().unwrap();
        assert!(doc.layer(id).is_none());
        doc.redo().unwrap();
        assert_eq!(doc.active_layer_id(), id);
    }

    #[test]
    fn host_reads_are_locked_during_a_transaction() {
        let mut doc = Document::new("doc", 2, 2, PixelFormat::Rgba8);
        let id = doc.active_layer_id();
        doc.begin_painting(id, "paint").unwrap();
        assert_eq!(doc.read_layer(id).unwrap_err().kind(), "layer_locked");
        assert_eq!(doc.flatten().unwrap_err().kind(), "layer_locked");
        assert_eq!(doc.undo().unwrap_err().kind(), "transaction_in_progress");
        assert_eq!(doc.convert_layer_format(id, PixelFormat::Rgba16).unwrap_err().kind(), "layer_locked");
        doc.end_painting(id).unwrap();
        assert!(doc.flatten().is_ok());
    }

    #[test]
    fn format_conversion_changes_generation_and_undoes() {
        let mut doc = Document::new("doc", 2, 2, PixelFormat::Rgba8);
        let id = doc.active_layer_id();
        let old_gen = doc.layer(id).unwrap().pixels().generation();
        doc.convert_layer_format(id, PixelFormat::Rgba16).unwrap();
        let layer = doc.layer(id).unwrap();
        assert_eq!(layer.format(), PixelFormat::Rgba16);
        assert_ne!(layer.pixels().generation(), old_gen);
        assert_eq!(layer.pixels().get_pixel(0, 0), [65535; 4]);
        doc.undo().unwrap();
        assert_eq!(doc.layer(id).unwrap().format(), PixelFormat::Rgba8);
    }

    #[test]
    fn unknown_layer_lookups_fail() {
        let doc = Document::new("doc", 2, 2, PixelFormat::Rgba8);
        assert_eq!(doc.layer_by_name("missing").err().map(|e| e.kind()), Some("layer_not_found"));
        assert!(doc.require_layer(LayerId::new()).is_err());
    }
}
