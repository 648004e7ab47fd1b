use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::chunk::column::SectionColumn;
use crate::chunk::data_array::DataArray;
use crate::chunk::pool::Recycle;
use crate::chunk::reserved::RESERVED;
use crate::chunk::section::SectionLock;
use crate::chunk::{
    biome_index, block_index, section_layer, Biome, BlockState, LIGHT_UNSET, MAX_LIGHT,
    SECTION_BIOMES, SECTION_BLOCKS,
};
use crate::config::StoreConfig;
use crate::types::{CompoundTag, HeightMapType, Position};

/// Per-layer side data, allocated for the whole column on first write and per layer on first touch.
type LayerData<T> = Option<Vec<Option<Box<[T]>>>>;

fn layer_slot<T: Clone>(layers: &mut LayerData<T>, count: usize, offset: usize, len: usize, fill: T) -> &mut [T] {
    let layers = layers.get_or_insert_with(|| (0..count).map(|_| None).collect());
    layers[offset].get_or_insert_with(|| vec![fill; len].into_boxed_slice())
}

fn layer_ref<T>(layers: &LayerData<T>, offset: Option<usize>) -> Option<&[T]> {
    layers.as_ref()?.get(offset?)?.as_deref()
}

/**
 * Pending changes to one chunk column: block sections plus biomes, light, tiles, entities and
 * height maps. Obtained from a [`Pool`](crate::chunk::pool::Pool), filled through the setters,
 * handed to whoever applies it, then recycled.
 *
 * Blocks left at [`RESERVED`] mean "no change". Light values of [`LIGHT_UNSET`] likewise.
 */
#[derive(Debug)]
pub struct ChunkEdit {
    column: SectionColumn,
    biomes: LayerData<Option<Biome>>,
    light: LayerData<u8>,
    sky_light: LayerData<u8>,
    tiles: HashMap<Position, CompoundTag>,
    entities: HashSet<CompoundTag>,
    entity_removes: HashSet<Uuid>,
    height_maps: HashMap<HeightMapType, Box<[i32]>>,
    fast_mode: bool,
    bit_mask: i32,
}

impl ChunkEdit {
    pub fn new(min_section: i32, max_section: i32) -> Self {
        Self {
            column: SectionColumn::new(min_section, max_section, RESERVED),
            biomes: None,
            light: None,
            sky_light: None,
            tiles: HashMap::new(),
            entities: HashSet::new(),
            entity_removes: HashSet::new(),
            height_maps: HashMap::new(),
            fast_mode: false,
            bit_mask: -1,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.initial_min_section, config.initial_max_section)
    }

    /// Read access to the block sections. Writes go through the edit so side data stays aligned.
    pub fn column(&self) -> &SectionColumn {
        &self.column
    }

    pub fn min_section_position(&self) -> i32 {
        self.column.min_section_position()
    }

    pub fn max_section_position(&self) -> i32 {
        self.column.max_section_position()
    }

    /// Grows every per-layer array so `layer` is addressable.
    fn update_section_index_range(&mut self, layer: i32) -> usize {
        if let Some(extension) = self.column.extend_to(layer) {
            for layers in [&mut self.light, &mut self.sky_light] {
                if let Some(layers) = layers.as_mut() {
                    extension.apply(layers, || None);
                }
            }
            if let Some(layers) = self.biomes.as_mut() {
                extension.apply(layers, || None);
            }
        }
        (layer - self.column.min_section_position()) as usize
    }

    pub fn has_section(&self, layer: i32) -> bool {
        self.column.has_section(layer)
    }

    pub fn load(&mut self, layer: i32) -> &mut DataArray {
        self.update_section_index_range(layer);
        self.column.load(layer)
    }

    pub fn load_if_present(&self, layer: i32) -> Option<&DataArray> {
        self.column.load_if_present(layer)
    }

    pub fn set_blocks(&mut self, layer: i32, data: Option<DataArray>) {
        self.update_section_index_range(layer);
        self.column.set_blocks(layer, data);
    }

    pub fn replace_blocks(&mut self, layer: i32, data: Option<DataArray>) -> Option<DataArray> {
        self.update_section_index_range(layer);
        self.column.replace_blocks(layer, data)
    }

    pub fn fill_section(&mut self, layer: i32, ordinal: BlockState) {
        self.update_section_index_range(layer);
        self.column.fill_section(layer, ordinal);
    }

    pub fn trim_all(&mut self) -> usize {
        self.column.trim_all()
    }

    pub fn section_lock(&mut self, layer: i32) -> SectionLock {
        self.update_section_index_range(layer);
        self.column.section_lock(layer)
    }

    pub fn get_block(&self, x: i32, y: i32, z: i32) -> BlockState {
        self.column.get_block(x, y, z)
    }

    pub fn set_block(&mut self, x: i32, y: i32, z: i32, ordinal: BlockState) {
        self.update_section_index_range(section_layer(y));
        self.column.set_block(x, y, z, ordinal);
    }

    pub fn get_biome(&self, x: i32, y: i32, z: i32) -> Option<Biome> {
        let offset = self.column.offset(section_layer(y));
        layer_ref(&self.biomes, offset)?[biome_index(x, y, z)]
    }

    pub fn set_biome(&mut self, x: i32, y: i32, z: i32, biome: Biome) {
        let offset = self.update_section_index_range(section_layer(y));
        let count = self.column.section_count();
        layer_slot(&mut self.biomes, count, offset, SECTION_BIOMES, None)[biome_index(x, y, z)] = Some(biome);
    }

    /// The biome grid of `layer`, if any cell of it was set.
    pub fn get_biomes(&self, layer: i32) -> Option<&[Option<Biome>]> {
        layer_ref(&self.biomes, self.column.offset(layer))
    }

    pub fn has_biomes(&self, layer: i32) -> bool {
        self.get_biomes(layer).is_some()
    }

    /// Block light at the position, [`LIGHT_UNSET`] if this edit does not change it.
    pub fn get_block_light(&self, x: i32, y: i32, z: i32) -> u8 {
        let offset = self.column.offset(section_layer(y));
        layer_ref(&self.light, offset).map_or(LIGHT_UNSET, |light| light[block_index(x, y, z)])
    }

    pub fn get_sky_light(&self, x: i32, y: i32, z: i32) -> u8 {
        let offset = self.column.offset(section_layer(y));
        layer_ref(&self.sky_light, offset).map_or(LIGHT_UNSET, |light| light[block_index(x, y, z)])
    }

    /// # Panics
    /// Panics if `value` is above [`MAX_LIGHT`].
    pub fn set_block_light(&mut self, x: i32, y: i32, z: i32, value: u8) {
        assert!(value <= MAX_LIGHT, "light level {value} out of range");
        let offset = self.update_section_index_range(section_layer(y));
        let count = self.column.section_count();
        layer_slot(&mut self.light, count, offset, SECTION_BLOCKS, LIGHT_UNSET)[block_index(x, y, z)] = value;
    }

    /// # Panics
    /// Panics if `value` is above [`MAX_LIGHT`].
    pub fn set_sky_light(&mut self, x: i32, y: i32, z: i32, value: u8) {
        assert!(value <= MAX_LIGHT, "light level {value} out of range");
        let offset = self.update_section_index_range(section_layer(y));
        let count = self.column.section_count();
        layer_slot(&mut self.sky_light, count, offset, SECTION_BLOCKS, LIGHT_UNSET)[block_index(x, y, z)] = value;
    }

    pub fn get_light_layer(&self, layer: i32) -> Option<&[u8]> {
        layer_ref(&self.light, self.column.offset(layer))
    }

    pub fn get_sky_light_layer(&self, layer: i32) -> Option<&[u8]> {
        layer_ref(&self.sky_light, self.column.offset(layer))
    }

    fn fill_light(&mut self, layer: i32, sky: bool, value: u8) {
        let offset = self.update_section_index_range(layer);
        let count = self.column.section_count();
        let target = if sky { &mut self.sky_light } else { &mut self.light };
        layer_slot(target, count, offset, SECTION_BLOCKS, LIGHT_UNSET).fill(value);
    }

    /// Replaces the block light of a whole section.
    ///
    /// # Panics
    /// Panics if `light` is not one section long.
    pub fn set_light_layer(&mut self, layer: i32, light: Box<[u8]>) {
        assert_eq!(light.len(), SECTION_BLOCKS, "light layer has the wrong length");
        let offset = self.update_section_index_range(layer);
        let count = self.column.section_count();
        self.light.get_or_insert_with(|| (0..count).map(|_| None).collect())[offset] = Some(light);
    }

    /// # Panics
    /// Panics if `light` is not one section long.
    pub fn set_sky_light_layer(&mut self, layer: i32, light: Box<[u8]>) {
        assert_eq!(light.len(), SECTION_BLOCKS, "light layer has the wrong length");
        let offset = self.update_section_index_range(layer);
        let count = self.column.section_count();
        self.sky_light.get_or_insert_with(|| (0..count).map(|_| None).collect())[offset] = Some(light);
    }

    /// Darkens a section: block light to 0, and sky light as well when `sky` is set.
    pub fn remove_section_lighting(&mut self, layer: i32, sky: bool) {
        self.fill_light(layer, false, 0);
        if sky {
            self.fill_light(layer, true, 0);
        }
    }

    pub fn set_full_bright(&mut self, layer: i32) {
        self.fill_light(layer, false, MAX_LIGHT);
        self.fill_light(layer, true, MAX_LIGHT);
    }

    /// Tiles are keyed by their position inside the column.
    pub fn set_tile(&mut self, x: i32, y: i32, z: i32, tile: CompoundTag) {
        self.update_section_index_range(section_layer(y));
        self.tiles.insert(Position::new(x, y, z).local(), tile);
    }

    pub fn get_tile(&self, x: i32, y: i32, z: i32) -> Option<&CompoundTag> {
        self.tiles.get(&Position::new(x, y, z).local())
    }

    pub fn tiles(&self) -> &HashMap<Position, CompoundTag> {
        &self.tiles
    }

    pub fn set_entity(&mut self, entity: CompoundTag) {
        self.entities.insert(entity);
    }

    pub fn entities(&self) -> &HashSet<CompoundTag> {
        &self.entities
    }

    pub fn remove_entity(&mut self, uuid: Uuid) {
        self.entity_removes.insert(uuid);
    }

    pub fn entity_removes(&self) -> &HashSet<Uuid> {
        &self.entity_removes
    }

    pub fn set_height_map(&mut self, kind: HeightMapType, heights: Box<[i32]>) {
        self.height_maps.insert(kind, heights);
    }

    pub fn height_maps(&self) -> &HashMap<HeightMapType, Box<[i32]>> {
        &self.height_maps
    }

    pub fn is_fast_mode(&self) -> bool {
        self.fast_mode
    }

    pub fn set_fast_mode(&mut self, fast_mode: bool) {
        self.fast_mode = fast_mode;
    }

    pub fn bit_mask(&self) -> i32 {
        self.bit_mask
    }

    pub fn set_bit_mask(&mut self, bit_mask: i32) {
        self.bit_mask = bit_mask;
    }

    /// True when applying this edit would change nothing.
    pub fn is_empty(&self) -> bool {
        if self.biomes.is_some() || self.light.is_some() || self.sky_light.is_some() {
            return false;
        }
        if !self.tiles.is_empty()
            || !self.entities.is_empty()
            || !self.entity_removes.is_empty()
            || !self.height_maps.is_empty()
        {
            return false;
        }
        self.column.is_empty()
    }

    /// A deep copy that shares no storage with this edit.
    pub fn create_copy(&self) -> Self {
        Self {
            column: self.column.create_copy(),
            biomes: self.biomes.clone(),
            light: self.light.clone(),
            sky_light: self.sky_light.clone(),
            tiles: self.tiles.clone(),
            entities: self.entities.clone(),
            entity_removes: self.entity_removes.clone(),
            height_maps: self.height_maps.clone(),
            fast_mode: self.fast_mode,
            bit_mask: self.bit_mask,
        }
    }
}

impl Recycle for ChunkEdit {
    /// Drops all side data and clears every section. The vertical range and block arrays stay
    /// allocated for the next user.
    fn reset(&mut self) {
        self.column.reset();
        self.biomes = None;
        self.light = None;
        self.sky_light = None;
        self.tiles.clear();
        self.entities.clear();
        self.entity_removes.clear();
        self.height_maps.clear();
        self.fast_mode = false;
        self.bit_mask = -1;
    }
}
