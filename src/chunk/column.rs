use log::trace;

use crate::chunk::data_array::DataArray;
use crate::chunk::section::{new_lock, SectionLock, SectionState};
use crate::chunk::{block_index, section_layer, BlockState};

/// How a column grew to reach a new layer. Every array indexed by layer has to grow the same way.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Extension {
    /// Number of layers added.
    pub diff: usize,
    /// `true` when the layers were added above the previous maximum, `false` when below the minimum.
    pub append: bool,
}

impl Extension {
    /// Grows `items` by `diff` entries produced by `fill`, at the end or at the front.
    pub fn apply<T>(&self, items: &mut Vec<T>, mut fill: impl FnMut() -> T) {
        let fresh = (0..self.diff).map(|_| fill());
        if self.append {
            items.extend(fresh);
        } else {
            items.splice(0..0, fresh);
        }
    }
}

/**
 * A vertical column of sections, addressed by layer (`y >> 4`).
 * The materialized range `[min, max]` only ever grows; touching a layer outside of it
 * reallocates every per-layer array so lookups stay plain indexing.
 *
 * Arrays kept under a tag other than [`SectionState::Present`] are spare buffers left over
 * from a reset or trim. They are never read and get refilled before reuse.
 */
#[derive(Debug)]
pub struct SectionColumn {
    min_section: i32,
    max_section: i32,
    states: Vec<SectionState>,
    blocks: Vec<Option<DataArray>>,
    locks: Vec<SectionLock>,
    default_ordinal: BlockState,
}

impl SectionColumn {
    /// # Panics
    /// Panics if `min_section > max_section`.
    pub fn new(min_section: i32, max_section: i32, default_ordinal: BlockState) -> Self {
        assert!(
            min_section <= max_section,
            "section range {min_section}..={max_section} is inverted"
        );
        let count = (max_section - min_section + 1) as usize;
        Self {
            min_section,
            max_section,
            states: vec![SectionState::Empty; count],
            blocks: (0..count).map(|_| None).collect(),
            locks: (0..count).map(|_| new_lock()).collect(),
            default_ordinal,
        }
    }

    pub fn min_section_position(&self) -> i32 {
        self.min_section
    }

    pub fn max_section_position(&self) -> i32 {
        self.max_section
    }

    pub fn section_count(&self) -> usize {
        self.states.len()
    }

    /// Ordinal every block of an empty section reads as.
    pub fn default_ordinal(&self) -> BlockState {
        self.default_ordinal
    }

    /// Position of `layer` in the per-layer arrays, if it lies in the materialized range.
    pub fn offset(&self, layer: i32) -> Option<usize> {
        (self.min_section..=self.max_section)
            .contains(&layer)
            .then(|| (layer - self.min_section) as usize)
    }

    fn offset_of_extended(&mut self, layer: i32) -> usize {
        self.extend_to(layer);
        (layer - self.min_section) as usize
    }

    /// Grows the materialized range so it contains `layer`.
    /// Returns how the range grew, or `None` if `layer` was already in range.
    pub fn extend_to(&mut self, layer: i32) -> Option<Extension> {
        let extension = if layer < self.min_section {
            let diff = (self.min_section - layer) as usize;
            self.min_section = layer;
            Extension { diff, append: false }
        } else if layer > self.max_section {
            let diff = (layer - self.max_section) as usize;
            self.max_section = layer;
            Extension { diff, append: true }
        } else {
            return None;
        };
        extension.apply(&mut self.states, || SectionState::Empty);
        extension.apply(&mut self.blocks, || None);
        extension.apply(&mut self.locks, new_lock);
        trace!(
            "Section column grew by {} layer(s) to {}..={}",
            extension.diff,
            self.min_section,
            self.max_section
        );
        Some(extension)
    }

    pub fn state(&self, layer: i32) -> SectionState {
        self.offset(layer)
            .map_or(SectionState::Empty, |offset| self.states[offset])
    }

    /// Whether `layer` carries any data. Never allocates.
    pub fn has_section(&self, layer: i32) -> bool {
        !self.state(layer).is_empty()
    }

    /// Layers that carry data, lowest first.
    pub fn section_layers(&self) -> impl Iterator<Item = i32> + '_ {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, state)| !state.is_empty())
            .map(move |(offset, _)| self.min_section + offset as i32)
    }

    /// True when no layer in the materialized range carries data.
    pub fn is_empty(&self) -> bool {
        self.states.iter().all(SectionState::is_empty)
    }

    /// Stores `data` as the blocks of `layer`. `None` clears the layer back to empty.
    pub fn set_blocks(&mut self, layer: i32, data: Option<DataArray>) {
        self.replace_blocks(layer, data);
    }

    /// Like [`set_blocks`](Self::set_blocks) but hands back the array that was present before.
    pub fn replace_blocks(&mut self, layer: i32, data: Option<DataArray>) -> Option<DataArray> {
        let offset = self.offset_of_extended(layer);
        let previous_state = self.states[offset];
        self.states[offset] = if data.is_some() {
            SectionState::Present
        } else {
            SectionState::Empty
        };
        let previous = std::mem::replace(&mut self.blocks[offset], data);
        previous.filter(|_| previous_state == SectionState::Present)
    }

    /// The backing array of `layer`, materializing it from the section's tag if needed.
    pub fn load(&mut self, layer: i32) -> &mut DataArray {
        let offset = self.offset_of_extended(layer);
        let fill = match self.states[offset] {
            SectionState::Present => None,
            SectionState::Empty => Some(self.default_ordinal),
            SectionState::Uniform(value) => Some(value),
        };
        if let Some(fill) = fill {
            match self.blocks[offset].as_mut() {
                Some(spare) => spare.set_all(fill),
                None => self.blocks[offset] = Some(DataArray::create_filled(fill)),
            }
            self.states[offset] = SectionState::Present;
        }
        let default = self.default_ordinal;
        self.blocks[offset].get_or_insert_with(|| DataArray::create_filled(default))
    }

    /// The backing array of `layer` if it has one. Never allocates.
    pub fn load_if_present(&self, layer: i32) -> Option<&DataArray> {
        let offset = self.offset(layer)?;
        match self.states[offset] {
            SectionState::Present => self.blocks[offset].as_ref(),
            _ => None,
        }
    }

    pub fn get_block(&self, x: i32, y: i32, z: i32) -> BlockState {
        let Some(offset) = self.offset(section_layer(y)) else {
            return self.default_ordinal;
        };
        match self.states[offset] {
            SectionState::Empty => self.default_ordinal,
            SectionState::Uniform(value) => value,
            SectionState::Present => self.blocks[offset]
                .as_ref()
                .map_or(self.default_ordinal, |blocks| blocks.get_at(block_index(x, y, z))),
        }
    }

    pub fn set_block(&mut self, x: i32, y: i32, z: i32, ordinal: BlockState) {
        let layer = section_layer(y);
        if self.state(layer) == SectionState::Uniform(ordinal) {
            return;
        }
        self.load(layer).set_at(block_index(x, y, z), ordinal);
    }

    /// Marks every block of `layer` as `ordinal` without keeping an array.
    pub fn fill_section(&mut self, layer: i32, ordinal: BlockState) {
        let offset = self.offset_of_extended(layer);
        self.states[offset] = if ordinal == self.default_ordinal {
            SectionState::Empty
        } else {
            SectionState::Uniform(ordinal)
        };
    }

    /// Drops the array of `layer` if all its blocks hold the same value.
    /// Returns whether the section was collapsed.
    pub fn trim(&mut self, layer: i32) -> bool {
        let Some(offset) = self.offset(layer) else {
            return false;
        };
        if self.states[offset] != SectionState::Present {
            return false;
        }
        let Some(value) = self.blocks[offset].as_ref().and_then(DataArray::uniform_value) else {
            return false;
        };
        self.states[offset] = if value == self.default_ordinal {
            SectionState::Empty
        } else {
            SectionState::Uniform(value)
        };
        true
    }

    /// Trims every layer, returning how many sections were collapsed.
    pub fn trim_all(&mut self) -> usize {
        (self.min_section..=self.max_section)
            .filter(|layer| self.trim(*layer))
            .count()
    }

    /// Lock handle for `layer`. See [`SectionLock`].
    pub fn section_lock(&mut self, layer: i32) -> SectionLock {
        let offset = self.offset_of_extended(layer);
        self.locks[offset].clone()
    }

    /// Clears every layer back to empty. The range and the arrays are kept for reuse.
    pub fn reset(&mut self) {
        self.states.fill(SectionState::Empty);
    }

    /// A deep copy sharing no arrays or locks with this column.
    pub fn create_copy(&self) -> Self {
        let blocks = self
            .states
            .iter()
            .zip(&self.blocks)
            .map(|(state, blocks)| match state {
                SectionState::Present => blocks.clone(),
                _ => None,
            })
            .collect();
        Self {
            min_section: self.min_section,
            max_section: self.max_section,
            states: self.states.clone(),
            blocks,
            locks: self.locks.iter().map(|_| new_lock()).collect(),
            default_ordinal: self.default_ordinal,
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::chunk::reserved::{AIR, RESERVED};

    fn assert_parallel(column: &SectionColumn) {
        let count = column.section_count();
        assert_eq!(
            count as i32,
            column.max_section_position() - column.min_section_position() + 1
        );
        assert_eq!(column.blocks.len(), count);
        assert_eq!(column.locks.len(), count);
    }

    #[test]
    fn growth_preserves_data() {
        for downward_first in [true, false] {
            let mut column = SectionColumn::new(0, 15, RESERVED);
            column.set_block(1, 5 * 16 + 2, 3, 77);
            if downward_first {
                column.extend_to(5 - 8);
                column.extend_to(5 + 20);
            } else {
                column.extend_to(5 + 20);
                column.extend_to(5 - 8);
            }
            assert_eq!(column.min_section_position(), -3);
            assert_eq!(column.max_section_position(), 25);
            assert_parallel(&column);
            assert_eq!(column.get_block(1, 5 * 16 + 2, 3), 77);
            assert!(column.has_section(5));
            assert!(!column.has_section(-3));
            assert!(!column.has_section(25));
            assert_eq!(column.section_layers().collect::<Vec<_>>(), vec![5]);
        }
    }

    #[test]
    fn extension_reports_growth() {
        let mut column = SectionColumn::new(0, 3, RESERVED);
        assert_eq!(column.extend_to(2), None);
        assert_eq!(column.extend_to(-2), Some(Extension { diff: 2, append: false }));
        assert_eq!(column.extend_to(5), Some(Extension { diff: 2, append: true }));
        assert_eq!(column.section_count(), 8);
    }

    #[test]
    fn extension_prepends_and_appends() {
        let mut items = vec![1, 2];
        Extension { diff: 2, append: false }.apply(&mut items, || 0);
        assert_eq!(items, vec![0, 0, 1, 2]);
        Extension { diff: 1, append: true }.apply(&mut items, || 9);
        assert_eq!(items, vec![0, 0, 1, 2, 9]);
    }

    #[test]
    fn set_blocks_tags_sections() {
        let mut column = SectionColumn::new(0, 15, RESERVED);
        column.set_blocks(-4, Some(DataArray::create_filled(AIR)));
        assert_eq!(column.state(-4), SectionState::Present);
        assert_eq!(column.min_section_position(), -4);
        assert_eq!(column.load_if_present(-4).map(|a| a.get_at(0)), Some(AIR));

        let previous = column.replace_blocks(-4, None);
        assert_eq!(previous, Some(DataArray::create_filled(AIR)));
        assert_eq!(column.state(-4), SectionState::Empty);
        assert!(column.load_if_present(-4).is_none());
        assert!(!column.has_section(-4));
    }

    #[test]
    fn load_materializes_default() {
        let mut column = SectionColumn::new(0, 15, AIR);
        assert!(column.load_if_present(3).is_none());
        assert!(column.load(3).iter().all(|v| v == AIR));
        assert_eq!(column.state(3), SectionState::Present);

        column.fill_section(4, 12);
        assert_eq!(column.get_block(0, 64, 0), 12);
        assert!(column.load_if_present(4).is_none());
        assert!(column.load(4).iter().all(|v| v == 12));
    }

    #[test]
    fn reset_reuses_arrays() {
        let mut column = SectionColumn::new(0, 15, RESERVED);
        column.set_block(0, 200, 0, 5);
        column.extend_to(20);
        column.reset();
        assert!(column.is_empty());
        assert_eq!(column.max_section_position(), 20);
        assert_eq!(column.get_block(0, 200, 0), RESERVED);
        // the spare array is refilled before it is handed out again
        assert!(column.load(200 >> 4).is_empty());
    }

    #[test]
    fn trim_collapses_uniform_sections() {
        let mut column = SectionColumn::new(0, 15, RESERVED);
        column.load(1).set_all(9);
        column.load(2);
        column.set_block(0, 48, 0, 4);
        assert_eq!(column.trim_all(), 2);
        assert_eq!(column.state(1), SectionState::Uniform(9));
        assert_eq!(column.state(2), SectionState::Empty);
        assert_eq!(column.state(3), SectionState::Present);
        assert_eq!(column.get_block(7, 16, 7), 9);
    }

    #[test]
    fn copy_is_deep() {
        let mut column = SectionColumn::new(0, 15, RESERVED);
        column.set_block(0, 0, 0, 3);
        let copy = column.create_copy();
        column.set_block(0, 0, 0, 4);
        assert_eq!(copy.get_block(0, 0, 0), 3);
        assert!(!Arc::ptr_eq(&column.locks[0], &copy.locks[0]));
    }

    #[test]
    fn locks_survive_growth() {
        let mut column = SectionColumn::new(0, 1, RESERVED);
        let lock = column.section_lock(1);
        column.extend_to(-5);
        assert!(Arc::ptr_eq(&lock, &column.section_lock(1)));
        let _guard = lock.lock();
        assert!(column.section_lock(1).try_lock().is_none());
    }
}
