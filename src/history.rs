use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::canvas::{CanvasState, Layer, LayerId, Tile, TiledStore};
use crate::config::HistoryLimits;
use crate::pixel::PixelFormat;

// ============================================================================
// COMMAND TRAIT
// ============================================================================

/// Trait for undoable/redoable commands.
pub trait Command: Send + Sync {
    fn undo(&self, canvas: &mut CanvasState);
    fn redo(&self, canvas: &mut CanvasState);
    fn description(&self) -> String;
    fn memory_size(&self) -> usize;
}

// ============================================================================
// TILE PATCH – the chunks one transaction touched
// ============================================================================

/// Chunks of one layer store captured at one point in time. Tiles are
/// `Arc`-shared with the store, so capturing costs a pointer per chunk.
#[derive(Clone)]
pub struct TilePatch {
    pub layer: LayerId,
    pub format: PixelFormat,
    pub tiles: Vec<(usize, Option<Tile>)>,
}

impl TilePatch {
    pub fn capture(layer: LayerId, store: &TiledStore, indices: &[usize]) -> Self {
        Self {
            layer,
            format: store.format(),
            tiles: indices.iter().map(|&i| (i, store.tile(i).cloned())).collect(),
        }
    }

    pub fn apply(&self, canvas: &mut CanvasState) {
        let Some(layer) = canvas.layer_mut(self.layer) else {
            warn!(layer = %self.layer, "tile patch target layer no longer exists");
            return;
        };
        if layer.format() != self.format {
            warn!(layer = %layer.name, "tile patch format mismatch, skipped");
            return;
        }
        let store = layer.pixels_mut();
        for (index, tile) in &self.tiles {
            store.set_tile(*index, tile.clone());
        }
    }

    pub fn memory_size(&self) -> usize {
        self.tiles
            .iter()
            .map(|(_, t)| t.as_ref().map_or(0, |t| t.len()) + std::mem::size_of::<usize>() * 2)
            .sum()
    }
}

// ============================================================================
// TRANSACTION COMMAND – one closed begin/end painting pair
// ============================================================================

pub struct TransactionCommand {
    label: String,
    before: TilePatch,
    after: TilePatch,
    incomplete: bool,
}

impl TransactionCommand {
    pub fn new(label: String, before: TilePatch, after: TilePatch, incomplete: bool) -> Self {
        Self { label, before, after, incomplete }
    }

    pub fn changed_tiles(&self) -> usize {
        self.after.tiles.len()
    }

    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }
}

impl Command for TransactionCommand {
    fn undo(&self, canvas: &mut CanvasState) {
        self.before.apply(canvas);
    }

    fn redo(&self, canvas: &mut CanvasState) {
        self.after.apply(canvas);
    }

    fn description(&self) -> String {
        if self.incomplete {
            format!("{} (incomplete)", self.label)
        } else {
            self.label.clone()
        }
    }

    fn memory_size(&self) -> usize {
        self.before.memory_size() + self.after.memory_size()
    }
}

// ============================================================================
// LAYER OPERATIONS – structural changes to the layer stack
// ============================================================================

/// Everything needed to rebuild a layer with its original id.
#[derive(Clone)]
pub struct LayerSnapshot {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    pub opacity: f32,
    pub pixels: TiledStore,
}

impl LayerSnapshot {
    pub fn capture(layer: &Layer) -> Self {
        Self {
            id: layer.id,
            name: layer.name.clone(),
            visible: layer.visible,
            opacity: layer.opacity,
            pixels: layer.pixels().clone(),
        }
    }

    pub fn restore(&self) -> Layer {
        let mut layer = Layer::from_store(self.name.clone(), self.pixels.clone());
        layer.id = self.id;
        layer.visible = self.visible;
        layer.opacity = self.opacity;
        layer
    }
}

pub enum LayerOperation {
    Add { index: usize, layer: LayerSnapshot },
    ConvertFormat { layer: LayerId, before: TiledStore, after: TiledStore },
}

pub struct LayerOpCommand {
    operation: LayerOperation,
}

impl LayerOpCommand {
    pub fn new(operation: LayerOperation) -> Self {
        Self { operation }
    }
}

fn swap_store(canvas: &mut CanvasState, id: LayerId, store: &TiledStore) {
    match canvas.layer_mut(id) {
        Some(layer) => {
            layer.replace_pixels(store.clone());
        }
        None => warn!(layer = %id, "format change target layer no longer exists"),
    }
}

impl Command for LayerOpCommand {
    fn undo(&self, canvas: &mut CanvasState) {
        match &self.operation {
            LayerOperation::Add { layer, .. } => {
                if let Some(idx) = canvas.layer_index(layer.id) {
                    canvas.layers.remove(idx);
                    if canvas.active_layer_index >= canvas.layers.len() {
                        canvas.active_layer_index = canvas.layers.len().saturating_sub(1);
                    }
                }
            }
            LayerOperation::ConvertFormat { layer, before, .. } => swap_store(canvas, *layer, before),
        }
    }

    fn redo(&self, canvas: &mut CanvasState) {
        match &self.operation {
            LayerOperation::Add { index, layer } => {
                let idx = (*index).min(canvas.layers.len());
                canvas.layers.insert(idx, layer.restore());
                canvas.active_layer_index = idx;
            }
            LayerOperation::ConvertFormat { layer, after, .. } => swap_store(canvas, *layer, after),
        }
    }

    fn description(&self) -> String {
        match &self.operation {
            LayerOperation::Add { layer, .. } => format!("Add Layer \"{}\"", layer.name),
            LayerOperation::ConvertFormat { after, .. } => format!("Convert Layer to {}", after.format()),
        }
    }

    fn memory_size(&self) -> usize {
        match &self.operation {
            LayerOperation::Add { layer, .. } => layer.pixels.memory_bytes_total(),
            LayerOperation::ConvertFormat { before, after, .. } => {
                before.memory_bytes_total() + after.memory_bytes_total()
            }
        }
    }
}

// ============================================================================
// HISTORY MANAGER
// ============================================================================

pub struct HistoryManager {
    undo_stack: VecDeque<Box<dyn Command>>,
    redo_stack: VecDeque<Box<dyn Command>>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::with_limits(&HistoryLimits::default())
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size,
            max_memory_bytes: HistoryLimits::default().max_memory_bytes,
            total_memory: 0,
        }
    }

    pub fn with_limits(limits: &HistoryLimits) -> Self {
        let mut history = Self::new(limits.max_steps);
        history.max_memory_bytes = limits.max_memory_bytes;
        history
    }

    pub fn push(&mut self, command: Box<dyn Command>) {
        // A new action invalidates everything that was undone
        for cmd in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(cmd.memory_size());
        }
        debug!(entry = %command.description(), "history push");
        self.total_memory += command.memory_size();
        self.undo_stack.push_back(command);
        self.prune();
    }

    pub fn undo(&mut self, canvas: &mut CanvasState) -> Option<String> {
        let command = self.undo_stack.pop_back()?;
        let description = command.description();
        command.undo(canvas);
        self.redo_stack.push_back(command);
        Some(description)
    }

    pub fn redo(&mut self, canvas: &mut CanvasState) -> Option<String> {
        let command = self.redo_stack.pop_back()?;
        let description = command.description();
        command.redo(canvas);
        self.undo_stack.push_back(command);
        Some(description)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(|c| c.description())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.back().map(|c| c.description())
    }

    /// All undo descriptions, most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|c| c.description()).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }
        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::Color;

    struct Marker(&'static str, usize);

    impl Command for Marker {
        fn undo(&self, _: &mut CanvasState) {}
        fn redo(&self, _: &mut CanvasState) {}
        fn description(&self) -> String {
            self.0.to_string()
        }
        fn memory_size(&self) -> usize {
            self.1
        }
    }

    #[test]
    fn push_clears_redo() {
        let mut canvas = CanvasState::new(1, 1, PixelFormat::Rgba8);
        let mut history = HistoryManager::new(10);
        history.push(Box::new(Marker("a", 1)));
        history.push(Box::new(Marker("b", 1)));
        assert_eq!(history.undo(&mut canvas).as_deref(), Some("b"));
        assert_eq!(history.redo_count(), 1);
        history.push(Box::new(Marker("c", 1)));
        assert_eq!(history.redo_count(), 0);
        assert_eq!(history.undo_history(), vec!["c".to_string(), "a".to_string()]);
    }

    #[test]
    fn prunes_oldest_by_count_and_memory() {
        let mut history = HistoryManager::with_limits(&HistoryLimits { max_steps: 2, max_memory_bytes: Some(10) });
        history.push(Box::new(Marker("a", 1)));
        history.push(Box::new(Marker("b", 1)));
        history.push(Box::new(Marker("c", 1)));
        assert_eq!(history.undo_history(), vec!["c".to_string(), "b".to_string()]);
        history.push(Box::new(Marker("big", 20)));
        assert_eq!(history.undo_count(), 1);
        assert_eq!(history.memory_usage(), 20);
    }

    #[test]
    fn transaction_command_restores_captured_tiles() {
        let mut canvas = CanvasState::new(70, 10, PixelFormat::Rgba8);
        let id = canvas.layers[0].id;
        let before_store = canvas.layers[0].pixels().clone();
        canvas.layers[0].pixels_mut().put_pixel(65, 1, &[1, 2, 3, 4]);
        let changed = canvas.layers[0].pixels().changed_tiles(&before_store);
        assert_eq!(changed, vec![1]);

        let cmd = TransactionCommand::new(
            "stroke".into(),
            TilePatch::capture(id, &before_store, &changed),
            TilePatch::capture(id, canvas.layers[0].pixels(), &changed),
            true,
        );
        assert_eq!(cmd.description(), "stroke (incomplete)");
        cmd.undo(&mut canvas);
        assert_eq!(canvas.layers[0].pixels().get_pixel(65, 1), [255, 255, 255, 255]);
        cmd.redo(&mut canvas);
        assert_eq!(canvas.layers[0].pixels().get_pixel(65, 1), [1, 2, 3, 4]);
    }

    #[test]
    fn layer_add_round_trips() {
        let mut canvas = CanvasState::new(4, 4, PixelFormat::Rgba8);
        let layer = Layer::new("ink", 4, 4, PixelFormat::Gray8, Color::BLACK);
        let cmd = LayerOpCommand::new(LayerOperation::Add { index: 1, layer: LayerSnapshot::capture(&layer) });
        cmd.redo(&mut canvas);
        assert_eq!(canvas.layers.len(), 2);
        assert_eq!(canvas.layers[1].id, layer.id);
        cmd.undo(&mut canvas);
        assert_eq!(canvas.layers.len(), 1);
        assert_eq!(canvas.active_layer_index, 0);
    }
}
