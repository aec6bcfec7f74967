//! Layer storage: tiled copy-on-write pixel stores, layers and the layer
//! stack with compositing.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use tracing::warn;
use uuid::Uuid;

use crate::pixel::{Color, PixelFormat, PixelValue, Rect};
use crate::transaction::OpenTransaction;

// ============================================================================
// TILED STORE – sparse 64×64 chunk storage in any supported pixel format
// ============================================================================

pub const CHUNK_SIZE: u32 = 64;

/// One chunk's raw bytes, `CHUNK_SIZE²` pixels in the store's format.
/// 16-bit channels are little-endian.
pub type Tile = Arc<Vec<u8>>;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Sparse tiled pixel store backed by a flat `Vec<Option<Tile>>`.
/// Chunk coordinates map to a flat index via `cy * chunks_per_row + cx`.
///
/// Tiles are `Arc`-shared for copy-on-write: `clone()` only bumps reference
/// counts, and writes use `Arc::make_mut` to copy just the touched tile. Undo
/// snapshots are plain clones of the store.
///
/// `generation` identifies one allocation. It changes when the store is
/// replaced wholesale (format conversion), never on pixel writes.
#[derive(Clone)]
pub struct TiledStore {
    width: u32,
    height: u32,
    format: PixelFormat,
    chunks_per_row: u32,
    chunks: Vec<Option<Tile>>,
    generation: u64,
}

impl fmt::Debug for TiledStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiledStore")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("tiles", &self.tile_count())
            .field("generation", &self.generation)
            .finish()
    }
}

impl TiledStore {
    // ---- construction -------------------------------------------------------

    /// Create an empty (all channels zero) store.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        // Clamp dimensions to prevent overflow (max ~256 megapixels)
        let (width, height) = {
            let total = (width as u64) * (height as u64);
            if total > 256_000_000 || width == 0 || height == 0 {
                warn!(width, height, "store dimensions out of range, clamped to 1×1");
                (1, 1)
            } else {
                (width, height)
            }
        };
        let chunks_per_row = width.div_ceil(CHUNK_SIZE);
        let chunks_per_col = height.div_ceil(CHUNK_SIZE);
        Self {
            width,
            height,
            format,
            chunks_per_row,
            chunks: vec![None; (chunks_per_row * chunks_per_col) as usize],
            generation: next_generation(),
        }
    }

    /// Create a store with every pixel set to `value`. An all-zero value
    /// allocates nothing.
    pub fn new_filled(width: u32, height: u32, format: PixelFormat, value: PixelValue) -> Self {
        let mut store = Self::new(width, height, format);
        if value.iter().any(|&v| v != 0) {
            store.fill(value);
        }
        store
    }

    /// Import a flat RGBA8 image, converting into `format`. Fully zero
    /// chunks stay unallocated. Chunk conversion runs on rayon.
    pub fn from_rgba_image(src: &RgbaImage, format: PixelFormat) -> Self {
        let mut store = Self::new(src.width(), src.height(), format);
        let (width, height) = (store.width, store.height);
        let cpr = store.chunks_per_row;
        let bpp = format.bytes_per_pixel();

        let tiles: Vec<Option<Tile>> = (0..store.chunks.len())
            .into_par_iter()
            .map(|flat| {
                let cx = flat as u32 % cpr;
                let cy = flat as u32 / cpr;
                let base_x = cx * CHUNK_SIZE;
                let base_y = cy * CHUNK_SIZE;
                let cw = CHUNK_SIZE.min(width - base_x);
                let ch = CHUNK_SIZE.min(height - base_y);

                let mut data = vec![0u8; (CHUNK_SIZE * CHUNK_SIZE) as usize * bpp];
                let mut has_content = false;
                for ly in 0..ch {
                    for lx in 0..cw {
                        let (sx, sy) = (base_x + lx, base_y + ly);
                        if sx >= src.width() || sy >= src.height() {
                            continue;
                        }
                        let p = src.get_pixel(sx, sy);
                        let native = format.from_color(Color::new(p[0], p[1], p[2], p[3]));
                        let off = (ly * CHUNK_SIZE + lx) as usize * bpp;
                        encode(format, &native, &mut data[off..off + bpp]);
                        has_content |= native.iter().any(|&v| v != 0);
                    }
                }
                has_content.then(|| Arc::new(data))
            })
            .collect();

        store.chunks = tiles;
        store
    }

    /// Export as a flat RGBA8 image.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width, self.height);
        for (x, y, px) in out.enumerate_pixels_mut() {
            *px = Rgba(self.format.to_color(&self.get_pixel(x, y)).to_array());
        }
        out
    }

    // ---- accessors ----------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    #[inline]
    fn chunk_coord(x: u32, y: u32) -> (u32, u32) {
        (x / CHUNK_SIZE, y / CHUNK_SIZE)
    }

    #[inline]
    fn local_offset(&self, x: u32, y: u32) -> usize {
        ((y % CHUNK_SIZE) * CHUNK_SIZE + (x % CHUNK_SIZE)) as usize * self.format.bytes_per_pixel()
    }

    #[inline]
    fn flat_index(&self, cx: u32, cy: u32) -> usize {
        (cy * self.chunks_per_row + cx) as usize
    }

    fn tile_bytes(&self) -> usize {
        (CHUNK_SIZE * CHUNK_SIZE) as usize * self.format.bytes_per_pixel()
    }

    // ---- pixel access -------------------------------------------------------

    /// Read a pixel. Missing chunks and out-of-bounds positions read as zero.
    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> PixelValue {
        if x >= self.width || y >= self.height {
            return [0; 4];
        }
        let (cx, cy) = Self::chunk_coord(x, y);
        let idx = self.flat_index(cx, cy);
        match &self.chunks[idx] {
            Some(tile) => {
                let off = self.local_offset(x, y);
                decode(self.format, &tile[off..off + self.format.bytes_per_pixel()])
            }
            None => [0; 4],
        }
    }

    /// Write a pixel (creates the chunk on demand, COW-copies if shared).
    /// Out-of-bounds writes are ignored.
    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, value: &PixelValue) {
        if x >= self.width || y >= self.height {
            return;
        }
        let (cx, cy) = Self::chunk_coord(x, y);
        let idx = self.flat_index(cx, cy);
        let off = self.local_offset(x, y);
        let bpp = self.format.bytes_per_pixel();
        let tile_bytes = self.tile_bytes();
        let format = self.format;
        let tile = self.chunks[idx].get_or_insert_with(|| Arc::new(vec![0u8; tile_bytes]));
        encode(format, value, &mut Arc::make_mut(tile)[off..off + bpp]);
    }

    pub fn get_channel(&self, x: u32, y: u32, channel: usize) -> u16 {
        self.get_pixel(x, y).get(channel).copied().unwrap_or(0)
    }

    pub fn set_channel(&mut self, x: u32, y: u32, channel: usize, value: u16) {
        if channel >= self.format.channel_count() {
            return;
        }
        let mut px = self.get_pixel(x, y);
        px[channel] = value;
        self.put_pixel(x, y, &px);
    }

    /// Copy a clipped rectangle out, row-major.
    pub fn read_region(&self, rect: Rect) -> Vec<PixelValue> {
        let rect = rect.intersect(&self.bounds());
        rect.positions().map(|(x, y)| self.get_pixel(x, y)).collect()
    }

    /// Inverse of [`read_region`](Self::read_region); `pixels` must hold
    /// `rect.area()` values for the clipped rectangle.
    pub fn write_region(&mut self, rect: Rect, pixels: &[PixelValue]) {
        let rect = rect.intersect(&self.bounds());
        debug_assert_eq!(pixels.len() as u64, rect.area());
        for ((x, y), px) in rect.positions().zip(pixels) {
            self.put_pixel(x, y, px);
        }
    }

    /// Set every pixel to `value`.
    pub fn fill(&mut self, value: PixelValue) {
        let bpp = self.format.bytes_per_pixel();
        let mut pattern = vec![0u8; bpp];
        encode(self.format, &value, &mut pattern);
        let tile: Tile = Arc::new(pattern.repeat((CHUNK_SIZE * CHUNK_SIZE) as usize));
        for slot in &mut self.chunks {
            *slot = Some(Arc::clone(&tile));
        }
    }

    /// New store holding this one's pixels in `target` format. Always a new
    /// generation, even when the format is unchanged.
    pub fn converted(&self, target: PixelFormat) -> TiledStore {
        let source = self.format;
        let src_bpp = source.bytes_per_pixel();
        let dst_bpp = target.bytes_per_pixel();
        let chunks = self
            .chunks
            .par_iter()
            .map(|slot| {
                slot.as_ref().map(|tile| {
                    let mut out = vec![0u8; (CHUNK_SIZE * CHUNK_SIZE) as usize * dst_bpp];
                    for (src, dst) in tile.chunks_exact(src_bpp).zip(out.chunks_exact_mut(dst_bpp)) {
                        let px = source.convert(&decode(source, src), target);
                        encode(target, &px, dst);
                    }
                    Arc::new(out)
                })
            })
            .collect();
        TiledStore {
            width: self.width,
            height: self.height,
            format: target,
            chunks_per_row: self.chunks_per_row,
            chunks,
            generation: next_generation(),
        }
    }

    /// Give this store a fresh generation, invalidating cursors bound to it.
    pub(crate) fn regenerate(&mut self) {
        self.generation = next_generation();
    }

    // ---- tile access --------------------------------------------------------

    pub fn chunk_slots(&self) -> usize {
        self.chunks.len()
    }

    /// Number of allocated chunks.
    pub fn tile_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }

    pub(crate) fn tile(&self, index: usize) -> Option<&Tile> {
        self.chunks.get(index).and_then(|c| c.as_ref())
    }

    pub(crate) fn set_tile(&mut self, index: usize, tile: Option<Tile>) {
        if let Some(slot) = self.chunks.get_mut(index) {
            *slot = tile;
        }
    }

    /// Chunk indices whose tile differs (by identity) from `other`.
    /// Both stores must share geometry and format.
    pub(crate) fn changed_tiles(&self, other: &TiledStore) -> Vec<usize> {
        self.chunks
            .iter()
            .zip(&other.chunks)
            .enumerate()
            .filter_map(|(i, (a, b))| match (a, b) {
                (Some(a), Some(b)) if Arc::ptr_eq(a, b) => None,
                (None, None) => None,
                _ => Some(i),
            })
            .collect()
    }

    /// Approximate memory usage in bytes. Chunks shared with undo snapshots
    /// are counted at pointer cost only.
    pub fn memory_bytes(&self) -> usize {
        let tile_bytes = self.tile_bytes();
        self.chunks
            .iter()
            .filter_map(|c| c.as_ref())
            .map(|tile| {
                if Arc::strong_count(tile) == 1 {
                    tile_bytes
                } else {
                    std::mem::size_of::<usize>() * 2
                }
            })
            .sum()
    }

    /// Total pixel memory ignoring sharing.
    pub fn memory_bytes_total(&self) -> usize {
        self.tile_count() * self.tile_bytes()
    }
}

#[inline]
fn decode(format: PixelFormat, raw: &[u8]) -> PixelValue {
    let mut px = [0u16; 4];
    match format.bytes_per_channel() {
        1 => {
            for (c, v) in raw.iter().enumerate() {
                px[c] = *v as u16;
            }
        }
        _ => {
            for (c, pair) in raw.chunks_exact(2).enumerate() {
                px[c] = u16::from_le_bytes([pair[0], pair[1]]);
            }
        }
    }
    px
}

#[inline]
fn encode(format: PixelFormat, px: &PixelValue, out: &mut [u8]) {
    match format.bytes_per_channel() {
        1 => {
            for (c, b) in out.iter_mut().enumerate() {
                *b = px[c].min(255) as u8;
            }
        }
        _ => {
            for (c, pair) in out.chunks_exact_mut(2).enumerate() {
                pair.copy_from_slice(&px[c].to_le_bytes());
            }
        }
    }
}

/// Straight-alpha source-over in normalized RGBA.
pub fn blend_normal(base: [f32; 4], top: [f32; 4], opacity: f32) -> [f32; 4] {
    let top_a = top[3] * opacity.clamp(0.0, 1.0);
    if top_a <= 0.0 {
        return base;
    }
    if top_a >= 1.0 {
        return [top[0], top[1], top[2], 1.0];
    }
    let base_a = base[3];
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return [0.0; 4];
    }
    let mix = |t: f32, b: f32| (t * top_a + b * base_a * (1.0 - top_a)) / out_a;
    [mix(top[0], base[0]), mix(top[1], base[1]), mix(top[2], base[2]), out_a]
}

// ============================================================================
// LAYERS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayerId(Uuid);

impl LayerId {
    pub fn new() -> Self {
        LayerId(Uuid::new_v4())
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    pub opacity: f32,
    pixels: TiledStore,
    /// Open painting transaction, if any. While set the host read path for
    /// this layer is locked.
    pub(crate) transaction: Option<OpenTransaction>,
}

impl Layer {
    pub fn new(name: impl Into<String>, width: u32, height: u32, format: PixelFormat, fill: Color) -> Self {
        Self::from_store(name, TiledStore::new_filled(width, height, format, format.from_color(fill)))
    }

    pub fn from_store(name: impl Into<String>, pixels: TiledStore) -> Self {
        Self {
            id: LayerId::new(),
            name: name.into(),
            visible: true,
            opacity: 1.0,
            pixels,
            transaction: None,
        }
    }

    /// Unchecked read. Hosts go through [`Document::read_layer`], which
    /// refuses while a transaction is open.
    ///
    /// [`Document::read_layer`]: crate::document::Document::read_layer
    pub(crate) fn pixels(&self) -> &TiledStore {
        &self.pixels
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut TiledStore {
        &mut self.pixels
    }

    /// Swap in a different allocation. The new store always gets a fresh
    /// generation so existing iterators notice.
    pub(crate) fn replace_pixels(&mut self, mut store: TiledStore) -> TiledStore {
        store.regenerate();
        std::mem::replace(&mut self.pixels, store)
    }

    pub fn format(&self) -> PixelFormat {
        self.pixels.format()
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn open_transaction(&self) -> Option<&OpenTransaction> {
        self.transaction.as_ref()
    }

    pub fn is_locked(&self) -> bool {
        self.transaction.is_some()
    }
}

// ============================================================================
// CANVAS STATE
// ============================================================================

pub struct CanvasState {
    pub width: u32,
    pub height: u32,
    pub layers: Vec<Layer>,
    pub active_layer_index: usize,
}

impl CanvasState {
    /// Canvas with a single opaque white "Background" layer.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self::with_layer(Layer::new("Background", width, height, format, Color::WHITE))
    }

    pub fn from_rgba_image(image: &RgbaImage, format: PixelFormat) -> Self {
        Self::with_layer(Layer::from_store("Background", TiledStore::from_rgba_image(image, format)))
    }

    fn with_layer(layer: Layer) -> Self {
        Self {
            width: layer.width(),
            height: layer.height(),
            layers: vec![layer],
            active_layer_index: 0,
        }
    }

    pub fn layer_index(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn layer_by_name(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn active_layer(&self) -> &Layer {
        let idx = self.active_layer_index.min(self.layers.len().saturating_sub(1));
        &self.layers[idx]
    }

    /// Composite all visible layers bottom-up with normal blending.
    pub fn composite(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width, self.height);
        for layer in self.layers.iter().filter(|l| l.visible && l.opacity > 0.0) {
            let store = layer.pixels();
            let format = store.format();
            for (x, y, px) in out.enumerate_pixels_mut() {
                let base = Color::new(px[0], px[1], px[2], px[3]).to_normalized();
                let top = format.to_normalized(&store.get_pixel(x, y));
                let mixed = PixelFormat::Rgba8.from_normalized(blend_normal(base, top, layer.opacity));
                *px = Rgba([mixed[0] as u8, mixed[1] as u8, mixed[2] as u8, mixed[3] as u8]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixels_round_trip_in_every_format() {
        for &format in PixelFormat::all() {
            let mut store = TiledStore::new(130, 70, format);
            let px = format.from_color(Color::new(10, 200, 30, 40));
            store.put_pixel(129, 69, &px);
            assert_eq!(store.get_pixel(129, 69), px);
            assert_eq!(store.get_pixel(0, 0), [0; 4]);
            assert_eq!(store.tile_count(), 1);
        }
    }

    #[test]
    fn sixteen_bit_values_keep_full_precision() {
        let mut store = TiledStore::new(4, 4, PixelFormat::Rgba16);
        store.put_pixel(1, 1, &[1, 300, 65535, 40000]);
        assert_eq!(store.get_pixel(1, 1), [1, 300, 65535, 40000]);
    }

    #[test]
    fn clones_share_tiles_until_written() {
        let mut store = TiledStore::new_filled(100, 100, PixelFormat::Rgba8, [1, 2, 3, 4]);
        let snapshot = store.clone();
        assert!(store.changed_tiles(&snapshot).is_empty());
        store.put_pixel(70, 5, &[9, 9, 9, 9]);
        assert_eq!(store.changed_tiles(&snapshot), vec![1]);
        assert_eq!(snapshot.get_pixel(70, 5), [1, 2, 3, 4]);
    }

    #[test]
    fn conversion_allocates_a_new_generation() {
        let store = TiledStore::new_filled(8, 8, PixelFormat::Rgba8, [255, 0, 0, 255]);
        let wide = store.converted(PixelFormat::Rgba16);
        assert_ne!(store.generation(), wide.generation());
        assert_eq!(wide.get_pixel(3, 3), [65535, 0, 0, 65535]);
        let gray = store.converted(PixelFormat::Gray8);
        assert_eq!(gray.get_pixel(0, 0)[0], Color::new(255, 0, 0, 255).luma() as u16);
    }

    #[test]
    fn regions_are_clipped_and_row_major() {
        let mut store = TiledStore::new(3, 2, PixelFormat::Gray8);
        store.write_region(Rect::new(0, 0, 3, 2), &[[1, 0, 0, 0], [2, 0, 0, 0], [3, 0, 0, 0], [4, 0, 0, 0], [5, 0, 0, 0], [6, 0, 0, 0]]);
        let row = store.read_region(Rect::new(1, 1, 10, 10));
        assert_eq!(row, vec![[5, 0, 0, 0], [6, 0, 0, 0]]);
    }

    #[test]
    fn rgba_image_import_and_export_agree() {
        let mut img = RgbaImage::new(3, 3);
        img.put_pixel(2, 1, Rgba([12, 34, 56, 78]));
        let store = TiledStore::from_rgba_image(&img, PixelFormat::Rgba8);
        assert_eq!(store.get_pixel(2, 1), [12, 34, 56, 78]);
        assert_eq!(store.to_rgba_image(), img);
    }

    #[test]
    fn composite_skips_hidden_layers() {
        let mut canvas = CanvasState::new(2, 2, PixelFormat::Rgba8);
        let mut top = Layer::new("top", 2, 2, PixelFormat::Rgba8, Color::new(255, 0, 0, 255));
        top.visible = false;
        canvas.layers.push(top);
        assert_eq!(*canvas.composite().get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        canvas.layers[1].visible = true;
        assert_eq!(*canvas.composite().get_pixel(0, 0), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn half_opacity_blends_evenly() {
        let out = blend_normal([0.0, 0.0, 0.0, 1.0], [1.0, 1.0, 1.0, 1.0], 0.5);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert_eq!(out[3], 1.0);
    }
}
