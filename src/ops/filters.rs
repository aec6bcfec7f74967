// ============================================================================
// FILTER REGISTRY: named pixel transforms and their invocation
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::canvas::LayerId;
use crate::document::Document;
use crate::error::BridgeError;
use crate::guard::ExecutionGuard;
use crate::ops::effects::{self, PixelRegion};
use crate::pixel::{PixelFormat, Rect};

/// Numeric filter settings by property name.
pub type FilterConfig = BTreeMap<String, f64>;

const ALL_FORMATS: &[PixelFormat] = &[PixelFormat::Gray8, PixelFormat::Rgba8, PixelFormat::Rgba16];
const RGBA_FORMATS: &[PixelFormat] = &[PixelFormat::Rgba8, PixelFormat::Rgba16];
const EIGHT_BIT_FORMATS: &[PixelFormat] = &[PixelFormat::Gray8, PixelFormat::Rgba8];

pub trait Filter: Send + Sync {
    fn id(&self) -> &str;
    fn supported_formats(&self) -> &[PixelFormat];
    fn default_config(&self) -> FilterConfig {
        FilterConfig::new()
    }
    /// Transform `region` in place. Only called with a supported format.
    fn apply(&self, region: &mut PixelRegion, config: &FilterConfig, guard: &ExecutionGuard) -> Result<(), BridgeError>;
}

fn config_of(pairs: &[(&str, f64)]) -> FilterConfig {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn value(config: &FilterConfig, name: &str, fallback: f64) -> f64 {
    config.get(name).copied().unwrap_or(fallback)
}

// ============================================================================
// BUILT-IN FILTERS
// ============================================================================

struct Invert;

impl Filter for Invert {
    fn id(&self) -> &str {
        "invert"
    }
    fn supported_formats(&self) -> &[PixelFormat] {
        ALL_FORMATS
    }
    fn apply(&self, region: &mut PixelRegion, _: &FilterConfig, guard: &ExecutionGuard) -> Result<(), BridgeError> {
        guard.poll()?;
        effects::invert_core(region);
        Ok(())
    }
}

struct Desaturate;

impl Filter for Desaturate {
    fn id(&self) -> &str {
        "desaturate"
    }
    fn supported_formats(&self) -> &[PixelFormat] {
        RGBA_FORMATS
    }
    fn apply(&self, region: &mut PixelRegion, _: &FilterConfig, guard: &ExecutionGuard) -> Result<(), BridgeError> {
        guard.poll()?;
        effects::desaturate_core(region);
        Ok(())
    }
}

struct Sepia;

impl Filter for Sepia {
    fn id(&self) -> &str {
        "sepia"
    }
    fn supported_formats(&self) -> &[PixelFormat] {
        &[PixelFormat::Rgba8]
    }
    fn default_config(&self) -> FilterConfig {
        config_of(&[("strength", 1.0)])
    }
    fn apply(&self, region: &mut PixelRegion, config: &FilterConfig, guard: &ExecutionGuard) -> Result<(), BridgeError> {
        guard.poll()?;
        effects::sepia_core(region, value(config, "strength", 1.0) as f32);
        Ok(())
    }
}

struct Levels;

impl Filter for Levels {
    fn id(&self) -> &str {
        "levels"
    }
    fn supported_formats(&self) -> &[PixelFormat] {
        EIGHT_BIT_FORMATS
    }
    fn default_config(&self) -> FilterConfig {
        config_of(&[("black", 0.0), ("white", 255.0), ("gamma", 1.0)])
    }
    fn apply(&self, region: &mut PixelRegion, config: &FilterConfig, guard: &ExecutionGuard) -> Result<(), BridgeError> {
        guard.poll()?;
        let black = value(config, "black", 0.0).clamp(0.0, 255.0) as f32;
        let white = value(config, "white", 255.0).clamp(0.0, 255.0) as f32;
        effects::levels_core(region, black, white, value(config, "gamma", 1.0) as f32);
        Ok(())
    }
}

struct BoxBlur;

impl Filter for BoxBlur {
    fn id(&self) -> &str {
        "box_blur"
    }
    fn supported_formats(&self) -> &[PixelFormat] {
        EIGHT_BIT_FORMATS
    }
    fn default_config(&self) -> FilterConfig {
        config_of(&[("radius", 1.0)])
    }
    fn apply(&self, region: &mut PixelRegion, config: &FilterConfig, guard: &ExecutionGuard) -> Result<(), BridgeError> {
        guard.poll()?;
        let radius = value(config, "radius", 1.0).clamp(0.0, 256.0).round() as u32;
        effects::box_blur_core(region, radius, guard)
    }
}

struct Pixelate;

impl Filter for Pixelate {
    fn id(&self) -> &str {
        "pixelate"
    }
    fn supported_formats(&self) -> &[PixelFormat] {
        ALL_FORMATS
    }
    fn default_config(&self) -> FilterConfig {
        config_of(&[("size", 4.0)])
    }
    fn apply(&self, region: &mut PixelRegion, config: &FilterConfig, guard: &ExecutionGuard) -> Result<(), BridgeError> {
        guard.poll()?;
        let size = value(config, "size", 4.0).clamp(2.0, 4096.0).round() as u32;
        effects::pixelate_core(region, size, guard)
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

pub struct FilterRegistry {
    filters: BTreeMap<String, Arc<dyn Filter>>,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(Invert));
        registry.register(Arc::new(Desaturate));
        registry.register(Arc::new(Sepia));
        registry.register(Arc::new(Levels));
        registry.register(Arc::new(BoxBlur));
        registry.register(Arc::new(Pixelate));
        registry
    }
}

impl FilterRegistry {
    pub fn empty() -> Self {
        Self { filters: BTreeMap::new() }
    }

    pub fn register(&mut self, filter: Arc<dyn Filter>) {
        self.filters.insert(filter.id().to_string(), filter);
    }

    /// A fresh handle carrying the filter's default configuration.
    pub fn get(&self, id: &str) -> Result<FilterHandle, BridgeError> {
        let filter = self
            .filters
            .get(id)
            .cloned()
            .ok_or_else(|| BridgeError::FilterNotFound(id.to_string()))?;
        let config = filter.default_config();
        Ok(FilterHandle { filter, config })
    }

    pub fn ids(&self) -> Vec<String> {
        self.filters.keys().cloned().collect()
    }
}

/// A filter plus its own configuration. Handles are independent: changing
/// one handle's properties never affects another.
#[derive(Clone)]
pub struct FilterHandle {
    filter: Arc<dyn Filter>,
    config: FilterConfig,
}

impl std::fmt::Debug for FilterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterHandle")
            .field("id", &self.filter.id())
            .field("config", &self.config)
            .finish()
    }
}

impl FilterHandle {
    pub fn id(&self) -> &str {
        self.filter.id()
    }

    pub fn supported_formats(&self) -> &[PixelFormat] {
        self.filter.supported_formats()
    }

    pub fn supports(&self, format: PixelFormat) -> bool {
        self.supported_formats().contains(&format)
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn property(&self, name: &str) -> Option<f64> {
        self.config.get(name).copied()
    }

    /// Only properties the filter declares can be set.
    pub fn set_property(&mut self, name: &str, value: f64) -> Result<(), BridgeError> {
        let id = self.filter.id().to_string();
        let Some(slot) = self.config.get_mut(name) else {
            return Err(BridgeError::InvalidArgument(format!("filter '{id}' has no property '{name}'")));
        };
        if !value.is_finite() {
            return Err(BridgeError::InvalidArgument(format!("filter property '{name}' must be a finite number")));
        }
        *slot = value;
        Ok(())
    }

    /// Apply the filter to `area` of `layer` (the whole layer when `None`),
    /// clipped to the layer bounds. The change joins the layer's open
    /// transaction, or gets its own undo step labeled with the filter id.
    /// On any error the layer is left unchanged.
    pub fn process(
        &self,
        doc: &mut Document,
        layer: LayerId,
        area: Option<(i64, i64, i64, i64)>,
        guard: &ExecutionGuard,
    ) -> Result<(), BridgeError> {
        let target = doc.require_layer(layer)?;
        let format = target.format();
        if !self.supports(format) {
            debug!("Filter '{}' refused on layer '{}' ({})", self.id(), target.name, format);
            return Err(BridgeError::IncompatibleFormat { filter: self.id().to_string(), format });
        }
        let rect = match area {
            Some((x, y, w, h)) => Rect::clip(x, y, w, h, target.width(), target.height()),
            None => target.pixels().bounds(),
        };
        if rect.is_empty() {
            return Ok(());
        }

        let mut region = PixelRegion::read(target.pixels(), rect);
        if let Err(e) = self.filter.apply(&mut region, &self.config, guard) {
            debug!("Filter '{}' failed: {}", self.id(), e);
            return Err(e);
        }

        let implicit = doc.transaction_id(layer).is_none();
        if implicit {
            doc.begin_painting(layer, self.id())?;
        }
        if let Some(target) = doc.layer_mut(layer) {
            target.pixels_mut().write_region(region.rect, &region.pixels);
        }
        if implicit {
            doc.end_painting(layer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(format: PixelFormat, value: [u16; 4]) -> (Document, LayerId) {
        let mut doc = Document::new("f", 4, 3, format);
        let id = doc.active_layer_id();
        doc.begin_painting(id, "seed").unwrap();
        doc.layer_mut(id).unwrap().pixels_mut().fill(value);
        doc.end_painting(id).unwrap();
        (doc, id)
    }

    #[test]
    fn invert_gets_its_own_undo_step() {
        let (mut doc, id) = doc_with(PixelFormat::Rgba8, [10, 20, 30, 255]);
        let before = doc.history().undo_count();
        let invert = FilterRegistry::default().get("invert").unwrap();
        invert.process(&mut doc, id, None, &ExecutionGuard::unlimited()).unwrap();
        let store = doc.read_layer(id).unwrap();
        assert!(store.bounds().positions().all(|(x, y)| store.get_pixel(x, y) == [245, 235, 225, 255]));
        assert_eq!(doc.history().undo_count(), before + 1);
        assert_eq!(doc.history().undo_description().as_deref(), Some("invert"));
    }

    #[test]
    fn filter_joins_an_open_transaction() {
        let (mut doc, id) = doc_with(PixelFormat::Rgba8, [0, 0, 0, 255]);
        let before = doc.history().undo_count();
        doc.begin_painting(id, "edit").unwrap();
        let invert = FilterRegistry::default().get("invert").unwrap();
        invert.process(&mut doc, id, Some((1, 1, 2, 2)), &ExecutionGuard::unlimited()).unwrap();
        assert_eq!(doc.history().undo_count(), before);
        doc.end_painting(id).unwrap();
        assert_eq!(doc.history().undo_description().as_deref(), Some("edit"));
        let store = doc.read_layer(id).unwrap();
        assert_eq!(store.get_pixel(1, 1), [255, 255, 255, 255]);
        assert_eq!(store.get_pixel(0, 0), [0, 0, 0, 255]);
    }

    #[test]
    fn incompatible_format_leaves_layer_untouched() {
        let (mut doc, id) = doc_with(PixelFormat::Gray8, [77, 0, 0, 0]);
        let before = doc.history().undo_count();
        let sepia = FilterRegistry::default().get("sepia").unwrap();
        let err = sepia.process(&mut doc, id, None, &ExecutionGuard::unlimited()).unwrap_err();
        assert_eq!(err.kind(), "incompatible_format");
        assert_eq!(doc.read_layer(id).unwrap().get_pixel(2, 2)[0], 77);
        assert_eq!(doc.history().undo_count(), before);
    }

    #[test]
    fn empty_area_is_a_no_op() {
        let (mut doc, id) = doc_with(PixelFormat::Rgba8, [1, 2, 3, 4]);
        let before = doc.history().undo_count();
        let invert = FilterRegistry::default().get("invert").unwrap();
        invert.process(&mut doc, id, Some((10, 10, 5, 5)), &ExecutionGuard::unlimited()).unwrap();
        assert_eq!(doc.history().undo_count(), before);
    }

    #[test]
    fn cancelled_filter_commits_nothing() {
        let (mut doc, id) = doc_with(PixelFormat::Rgba8, [1, 2, 3, 4]);
        let guard = ExecutionGuard::unlimited();
        guard.cancel_token().cancel();
        let invert = FilterRegistry::default().get("invert").unwrap();
        let err = invert.process(&mut doc, id, None, &guard).unwrap_err();
        assert_eq!(err.kind(), "cancelled");
        assert_eq!(doc.read_layer(id).unwrap().get_pixel(0, 0), [1, 2, 3, 4]);
    }

    #[test]
    fn properties_are_validated() {
        let registry = FilterRegistry::default();
        let mut blur = registry.get("box_blur").unwrap();
        assert_eq!(blur.property("radius"), Some(1.0));
        blur.set_property("radius", 3.0).unwrap();
        assert_eq!(blur.property("radius"), Some(3.0));
        assert_eq!(registry.get("box_blur").unwrap().property("radius"), Some(1.0));
        assert!(blur.set_property("sigma", 2.0).is_err());
        assert!(blur.set_property("radius", f64::NAN).is_err());
    }

    #[test]
    fn unknown_filter_is_reported() {
        let registry = FilterRegistry::default();
        assert_eq!(registry.get("emboss").unwrap_err().kind(), "filter_not_found");
        assert_eq!(registry.ids(), vec!["box_blur", "desaturate", "invert", "levels", "pixelate", "sepia"]);
    }
}
