use log::trace;
use serde::{Deserialize, Serialize};

use crate::chunk::column::SectionColumn;
use crate::chunk::data_array::DataArray;
use crate::chunk::packed_array::PackedArray;
use crate::chunk::reserved::{is_air, AIR, RESERVED};
use crate::chunk::section::SectionState;
use crate::chunk::{
    log2nlz, Biome, BlockState, MAX_PALETTE_BITS_BIOMES, MAX_PALETTE_BITS_BLOCKS,
    MIN_PALETTE_BITS_BIOMES, MIN_PALETTE_BITS_BLOCKS, SECTION_BIOMES, SECTION_BLOCKS,
};
use crate::err::StoreError;

const UNSET: u32 = u32::MAX;

/// Words needed for a section packed at the widest supported width (32 bits, two per word).
pub const MAX_PACKED_WORDS: usize = SECTION_BLOCKS / 2;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum PaletteKind {
    Blocks,
    Biomes,
}

impl PaletteKind {
    pub fn container_length(&self) -> usize {
        match &self {
            PaletteKind::Blocks => SECTION_BLOCKS,
            PaletteKind::Biomes => SECTION_BIOMES,
        }
    }

    fn min_palette_bits(&self) -> usize {
        match &self {
            PaletteKind::Blocks => MIN_PALETTE_BITS_BLOCKS,
            PaletteKind::Biomes => MIN_PALETTE_BITS_BIOMES,
        }
    }

    fn max_palette_bits(&self) -> usize {
        match &self {
            PaletteKind::Blocks => MAX_PALETTE_BITS_BLOCKS,
            PaletteKind::Biomes => MAX_PALETTE_BITS_BIOMES,
        }
    }

    /**
     * Bits per entry for a local palette of `palette_len` distinct values, or `None` when the
     * section has to use the global palette instead.
     * Small non-zero widths are raised to the kind's minimum so a palette growing past a
     * power of two does not force a repack every time.
     */
    pub fn local_bits(&self, palette_len: usize) -> Option<usize> {
        let bits = log2nlz(palette_len.saturating_sub(1) as u32);
        if bits > self.max_palette_bits() {
            None
        } else if bits > 0 && bits < self.min_palette_bits() {
            Some(self.min_palette_bits())
        } else {
            Some(bits)
        }
    }
}

/// Process-wide mapping between block-state ordinals and the host's global palette ids.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GlobalPalette {
    ordinal_to_id: Vec<u32>,
    id_to_ordinal: Vec<u32>,
}

impl GlobalPalette {
    /// # Panics
    /// Panics if `id_to_ordinal` is empty.
    pub fn new(ordinal_to_id: Vec<u32>, id_to_ordinal: Vec<u32>) -> Self {
        assert!(!id_to_ordinal.is_empty(), "global palette has no ids");
        debug_assert!(id_to_ordinal
            .iter()
            .enumerate()
            .all(|(id, ordinal)| ordinal_to_id.get(*ordinal as usize) == Some(&(id as u32))));
        Self {
            ordinal_to_id,
            id_to_ordinal,
        }
    }

    /// A palette whose ids are the ordinals themselves.
    pub fn identity(size: u32) -> Self {
        let ids: Vec<u32> = (0..size.max(1)).collect();
        Self::new(ids.clone(), ids)
    }

    pub fn len(&self) -> usize {
        self.id_to_ordinal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_ordinal.is_empty()
    }

    /// Width of a globally indexed section.
    pub fn bits(&self) -> usize {
        log2nlz(self.len() as u32 - 1)
    }

    /// # Panics
    /// Panics if `ordinal` is outside the registry.
    pub fn id_of(&self, ordinal: BlockState) -> u32 {
        self.ordinal_to_id[ordinal as usize]
    }

    pub fn ordinal_of(&self, id: u64) -> Option<BlockState> {
        self.id_to_ordinal.get(id as usize).copied()
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum SectionPalette {
    /// Every entry holds this value; no packed data.
    Single(u32),
    /// Distinct values in first-seen order; packed entries index into it.
    Indirect(Vec<u32>),
    /// Packed entries are global palette ids.
    Global,
}

/// One section in palette form: the palette plus the packed per-entry indices.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct EncodedSection {
    pub kind: PaletteKind,
    pub palette: SectionPalette,
    pub data: PackedArray,
    /// Blocks outside the air family. Always `0` for biomes.
    pub non_air_blocks: u16,
}

impl EncodedSection {
    fn single(kind: PaletteKind, value: u32, non_air_blocks: u16) -> Self {
        Self {
            kind,
            palette: SectionPalette::Single(value),
            data: PackedArray::new(kind.container_length(), 0),
            non_air_blocks,
        }
    }

    /// Rebuilds a section from parts produced elsewhere, checking the packed word count.
    pub fn from_parts(
        kind: PaletteKind,
        palette: SectionPalette,
        bits_per_entry: usize,
        words: Vec<u64>,
        non_air_blocks: u16,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            kind,
            palette,
            data: PackedArray::from_words(kind.container_length(), bits_per_entry, words)?,
            non_air_blocks,
        })
    }

    pub fn bits_per_entry(&self) -> usize {
        self.data.bits_per_value()
    }

    /// Number of local palette entries, `None` for globally indexed sections.
    pub fn palette_len(&self) -> Option<usize> {
        match &self.palette {
            SectionPalette::Single(_) => Some(1),
            SectionPalette::Indirect(palette) => Some(palette.len()),
            SectionPalette::Global => None,
        }
    }

    /// The local palette in index order. Empty for globally indexed sections.
    pub fn palette_entries(&self) -> &[u32] {
        match &self.palette {
            SectionPalette::Single(value) => std::slice::from_ref(value),
            SectionPalette::Indirect(palette) => palette,
            SectionPalette::Global => &[],
        }
    }

    pub fn is_global(&self) -> bool {
        self.palette == SectionPalette::Global
    }

    pub fn words(&self) -> &[u64] {
        self.data.words()
    }

    fn resolve(&self, raw: u64, global: &GlobalPalette) -> Result<u32, StoreError> {
        match &self.palette {
            SectionPalette::Single(value) => Ok(*value),
            SectionPalette::Indirect(palette) => palette
                .get(raw as usize)
                .copied()
                .ok_or(StoreError::PaletteIndexOutOfRange {
                    index: raw,
                    len: palette.len(),
                }),
            SectionPalette::Global => {
                global
                    .ordinal_of(raw)
                    .ok_or(StoreError::PaletteIndexOutOfRange {
                        index: raw,
                        len: global.len(),
                    })
            }
        }
    }

    /// The value at `index`, looked up through the palette.
    pub fn get(&self, index: usize, global: &GlobalPalette) -> Result<u32, StoreError> {
        let raw = self.data.get(index).ok_or_else(|| {
            StoreError::Any(format!(
                "entry {} out of range for {} entries",
                index,
                self.data.len()
            ))
        })?;
        self.resolve(raw, global)
    }

    pub fn decode(&self, global: &GlobalPalette) -> Result<Vec<u32>, StoreError> {
        self.data.iter().map(|raw| self.resolve(raw, global)).collect()
    }

    /// Writes the decoded block states into `out`.
    pub fn decode_into(&self, out: &mut DataArray, global: &GlobalPalette) -> Result<(), StoreError> {
        if self.kind != PaletteKind::Blocks {
            return Err(StoreError::Any(format!("cannot decode {:?} into block data", self.kind)));
        }
        for (index, raw) in self.data.iter().enumerate() {
            out.set_at(index, self.resolve(raw, global)?);
        }
        Ok(())
    }
}

struct PaletteStats {
    distinct: usize,
    non_air: u16,
}

/**
 * Reusable scratch space for encoding block sections. One instance per thread; the buffers are
 * left clean after every encode so the next section starts from scratch.
 */
pub struct PaletteBuffers {
    block_to_palette: Vec<u32>,
    palette_to_block: Vec<u32>,
    blocks_copy: Vec<u32>,
    block_states: Vec<u64>,
}

impl PaletteBuffers {
    pub fn new(state_count: u32) -> Self {
        Self::with_sizes(state_count as usize, MAX_PACKED_WORDS)
    }

    /// Buffers for ordinals below `state_count`, packing into at most `packed_words` words.
    pub fn with_sizes(state_count: usize, packed_words: usize) -> Self {
        Self {
            block_to_palette: vec![UNSET; state_count],
            palette_to_block: vec![UNSET; SECTION_BLOCKS],
            blocks_copy: vec![0; SECTION_BLOCKS],
            block_states: vec![0; packed_words],
        }
    }

    /// Assigns palette indices in first-seen order, treating reserved entries as air.
    fn first_pass(&mut self, set: &DataArray) -> PaletteStats {
        let mut non_air = SECTION_BLOCKS as u16;
        let mut distinct = 0;
        for index in 0..SECTION_BLOCKS {
            let mut ordinal = set.get_at(index);
            if is_air(ordinal) {
                non_air -= 1;
                if ordinal == RESERVED {
                    ordinal = AIR;
                }
            }
            let slot = &mut self.block_to_palette[ordinal as usize];
            if *slot == UNSET {
                *slot = distinct as u32;
                self.palette_to_block[distinct] = ordinal;
                distinct += 1;
            }
        }
        PaletteStats { distinct, non_air }
    }

    /// Rewrites every entry to its palette index, or to its global id when `global` is given.
    fn second_pass(&mut self, set: &DataArray, global: Option<&GlobalPalette>) {
        for index in 0..SECTION_BLOCKS {
            let mut ordinal = set.get_at(index);
            if ordinal == RESERVED {
                ordinal = AIR;
            }
            self.blocks_copy[index] = match global {
                Some(global) => global.id_of(ordinal),
                None => self.block_to_palette[ordinal as usize],
            };
        }
    }

    fn clear(&mut self, distinct: usize) {
        for ordinal in &self.palette_to_block[..distinct] {
            self.block_to_palette[*ordinal as usize] = UNSET;
        }
        self.palette_to_block[..distinct].fill(UNSET);
    }

    fn pack(&mut self, bits: usize, palette: SectionPalette, non_air: u16) -> EncodedSection {
        let words = PackedArray::pack_into(bits, &self.blocks_copy, &mut self.block_states);
        EncodedSection {
            kind: PaletteKind::Blocks,
            palette,
            data: PackedArray::from_packed(SECTION_BLOCKS, bits, self.block_states[..words].to_vec()),
            non_air_blocks: non_air,
        }
    }

    /**
     * Encodes a section of block-state ordinals.
     *
     * # Panics
     * Panics if an ordinal is outside the registry these buffers were sized for, or the
     * packed data does not fit the scratch words.
     */
    pub fn encode(&mut self, set: &DataArray, global: &GlobalPalette) -> EncodedSection {
        let kind = PaletteKind::Blocks;
        let stats = self.first_pass(set);
        let section = match kind.local_bits(stats.distinct) {
            Some(0) => EncodedSection::single(kind, self.palette_to_block[0], stats.non_air),
            Some(bits) => {
                self.second_pass(set, None);
                let palette = SectionPalette::Indirect(self.palette_to_block[..stats.distinct].to_vec());
                self.pack(bits, palette, stats.non_air)
            }
            None => {
                trace!(
                    "Section with {} distinct states falls back to the global palette",
                    stats.distinct
                );
                self.second_pass(set, Some(global));
                self.pack(global.bits(), SectionPalette::Global, stats.non_air)
            }
        };
        self.clear(stats.distinct);
        section
    }

    /**
     * Encodes an edit on top of the world's current section. Reserved entries in `set` take
     * their value from `base` and the resolved values are written back into `set`, so the edit
     * describes the section exactly as it will be stored.
     */
    pub fn encode_merged(
        &mut self,
        set: &mut DataArray,
        base: &DataArray,
        global: &GlobalPalette,
    ) -> EncodedSection {
        for index in 0..SECTION_BLOCKS {
            if set.get_at(index) == RESERVED {
                let resolved = match base.get_at(index) {
                    RESERVED => AIR,
                    ordinal => ordinal,
                };
                set.set_at(index, resolved);
            }
        }
        self.encode(set, global)
    }

    /// Encodes one layer of a column. Empty layers yield `None`, uniform layers are not scanned.
    pub fn encode_column_section(
        &mut self,
        column: &SectionColumn,
        layer: i32,
        global: &GlobalPalette,
    ) -> Option<EncodedSection> {
        match column.state(layer) {
            SectionState::Empty => None,
            SectionState::Uniform(value) => {
                let value = if value == RESERVED { AIR } else { value };
                let non_air = if is_air(value) { 0 } else { SECTION_BLOCKS as u16 };
                Some(EncodedSection::single(PaletteKind::Blocks, value, non_air))
            }
            SectionState::Present => column
                .load_if_present(layer)
                .map(|blocks| self.encode(blocks, global)),
        }
    }
}

/**
 * Encodes one section's 4x4x4 biome grid. Unset cells take `default_biome`.
 * Biome palettes have no minimum width and switch to `global` ids above 3 bits.
 *
 * # Panics
 * Panics if `biomes` is not exactly one section's worth of cells.
 */
pub fn encode_biomes(
    biomes: &[Option<Biome>],
    default_biome: Biome,
    global: &GlobalPalette,
) -> EncodedSection {
    let kind = PaletteKind::Biomes;
    assert_eq!(
        biomes.len(),
        kind.container_length(),
        "biome grid has the wrong number of cells"
    );
    // typically 1-4 biomes, a linear scan beats hashing
    let mut palette: Vec<u32> = Vec::with_capacity(4);
    let mut indexes = [0u32; SECTION_BIOMES];
    for (slot, biome) in indexes.iter_mut().zip(biomes) {
        let biome = biome.unwrap_or(default_biome) as u32;
        *slot = match palette.iter().position(|known| *known == biome) {
            Some(index) => index as u32,
            None => {
                palette.push(biome);
                (palette.len() - 1) as u32
            }
        };
    }
    match kind.local_bits(palette.len()) {
        Some(0) => EncodedSection::single(kind, palette[0], 0),
        Some(bits) => EncodedSection {
            kind,
            data: PackedArray::from_raw(bits, &indexes),
            palette: SectionPalette::Indirect(palette),
            non_air_blocks: 0,
        },
        None => {
            for slot in indexes.iter_mut() {
                *slot = global.id_of(palette[*slot as usize]);
            }
            EncodedSection {
                kind,
                data: PackedArray::from_raw(global.bits(), &indexes),
                palette: SectionPalette::Global,
                non_air_blocks: 0,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::chunk::reserved::CAVE_AIR;

    const STATES: u32 = 8192;

    fn section_with_distinct(count: usize, rng: &mut StdRng) -> DataArray {
        let mut values: Vec<u32> = (0..SECTION_BLOCKS).map(|i| 4 + (i % count) as u32).collect();
        values.shuffle(rng);
        let mut array = DataArray::create_empty();
        for (index, value) in values.into_iter().enumerate() {
            array.set_at(index, value);
        }
        array
    }

    fn expected_bits(distinct: usize) -> usize {
        match distinct {
            1 => 0,
            2..=16 => 4,
            17..=256 => log2nlz(distinct as u32 - 1),
            _ => log2nlz(STATES - 1),
        }
    }

    #[test]
    fn round_trip_across_widths() {
        let mut rng = StdRng::seed_from_u64(0x5ec7);
        let global = GlobalPalette::identity(STATES);
        let mut buffers = PaletteBuffers::new(STATES);
        for distinct in [1, 2, 16, 17, 256, 257, 4096] {
            let array = section_with_distinct(distinct, &mut rng);
            let section = buffers.encode(&array, &global);
            assert_eq!(section.bits_per_entry(), expected_bits(distinct), "{distinct} distinct");
            assert_eq!(section.is_global(), distinct > 256);
            if !section.is_global() {
                assert_eq!(section.palette_len(), Some(distinct));
            }
            let mut decoded = DataArray::create_empty();
            section.decode_into(&mut decoded, &global).unwrap();
            assert_eq!(decoded, array, "{distinct} distinct");
        }
    }

    #[test]
    fn width_never_shrinks_as_palette_grows() {
        let mut rng = StdRng::seed_from_u64(7);
        let global = GlobalPalette::identity(STATES);
        let mut buffers = PaletteBuffers::new(STATES);
        let mut previous = 0;
        for distinct in (1..=300).chain([512, 1024, 4096]) {
            let section = buffers.encode(&section_with_distinct(distinct, &mut rng), &global);
            let bits = section.bits_per_entry();
            assert!(bits >= previous, "{distinct} distinct: {bits} < {previous}");
            assert!(bits == 0 || bits >= MIN_PALETTE_BITS_BLOCKS);
            assert!(bits <= MAX_PALETTE_BITS_BLOCKS || section.is_global());
            previous = bits;
        }
    }

    #[test]
    fn uniform_section_has_no_words() {
        let global = GlobalPalette::identity(STATES);
        let mut buffers = PaletteBuffers::new(STATES);
        let section = buffers.encode(&DataArray::create_filled(42), &global);
        assert_eq!(section.palette_len(), Some(1));
        assert_eq!(section.palette_entries(), &[42]);
        assert_eq!(section.bits_per_entry(), 0);
        assert!(section.words().is_empty());
        assert_eq!(section.non_air_blocks, SECTION_BLOCKS as u16);
        assert_eq!(section.get(4095, &global).unwrap(), 42);
    }

    #[test]
    fn reserved_becomes_air() {
        let global = GlobalPalette::identity(STATES);
        let mut buffers = PaletteBuffers::new(STATES);
        let mut array = DataArray::create_empty();
        array.set_at(10, 7);
        array.set_at(11, AIR);
        array.set_at(12, CAVE_AIR);
        let section = buffers.encode(&array, &global);
        assert_eq!(section.palette_entries(), &[AIR, 7, CAVE_AIR]);
        assert_eq!(section.non_air_blocks, 1);
        assert_eq!(section.get(0, &global).unwrap(), AIR);
        assert_eq!(section.get(10, &global).unwrap(), 7);
        assert_eq!(section.get(12, &global).unwrap(), CAVE_AIR);
    }

    #[test]
    fn palette_is_first_seen_order() {
        let global = GlobalPalette::identity(STATES);
        let mut buffers = PaletteBuffers::new(STATES);
        let mut array = DataArray::create_filled(30);
        array.set_at(0, 20);
        array.set_at(5, 10);
        array.set_at(6, 20);
        let section = buffers.encode(&array, &global);
        assert_eq!(section.palette_entries(), &[20, 30, 10]);
        assert_eq!(section.data.get(0), Some(0));
        assert_eq!(section.data.get(1), Some(1));
        assert_eq!(section.data.get(5), Some(2));
    }

    #[test]
    fn buffers_are_clean_between_sections() {
        let mut rng = StdRng::seed_from_u64(99);
        let global = GlobalPalette::identity(STATES);
        let mut buffers = PaletteBuffers::new(STATES);
        for _ in 0..20 {
            let distinct = rng.gen_range(1..600);
            let array = section_with_distinct(distinct, &mut rng);
            let section = buffers.encode(&array, &global);
            assert_eq!(section.decode(&global).unwrap(), array.iter().collect::<Vec<_>>());
        }
        assert!(buffers.block_to_palette.iter().all(|slot| *slot == UNSET));
        assert!(buffers.palette_to_block.iter().all(|slot| *slot == UNSET));
    }

    #[test]
    fn global_fallback_uses_host_ids() {
        let size = 1024u32;
        let ids: Vec<u32> = (0..size).rev().collect();
        let global = GlobalPalette::new(ids.clone(), ids);
        let mut buffers = PaletteBuffers::new(size);
        let mut array = DataArray::create_empty();
        for index in 0..SECTION_BLOCKS {
            array.set_at(index, 4 + (index % 300) as u32);
        }
        let section = buffers.encode(&array, &global);
        assert!(section.is_global());
        assert_eq!(section.bits_per_entry(), 10);
        assert!(section.palette_entries().is_empty());
        assert_eq!(section.data.get(0), Some((size - 1 - 4) as u64));
        assert_eq!(section.decode(&global).unwrap(), array.iter().collect::<Vec<_>>());
    }

    #[test]
    fn merged_encoding_resolves_from_base() {
        let global = GlobalPalette::identity(STATES);
        let mut buffers = PaletteBuffers::new(STATES);
        let mut set = DataArray::create_empty();
        set.set_at(0, 7);
        let mut base = DataArray::create_filled(9);
        base.set_at(1, RESERVED);

        let section = buffers.encode_merged(&mut set, &base, &global);
        assert_eq!(set.get_at(0), 7);
        assert_eq!(set.get_at(1), AIR);
        assert_eq!(set.get_at(2), 9);
        assert_eq!(section.palette_entries(), &[7, AIR, 9]);
        assert_eq!(section.non_air_blocks, SECTION_BLOCKS as u16 - 1);
    }

    #[test]
    fn column_sections() {
        let global = GlobalPalette::identity(STATES);
        let mut buffers = PaletteBuffers::new(STATES);
        let mut column = SectionColumn::new(0, 3, RESERVED);
        column.fill_section(1, 5);
        column.set_block(0, 32, 0, 6);

        assert!(buffers.encode_column_section(&column, 0, &global).is_none());
        assert!(buffers.encode_column_section(&column, 40, &global).is_none());
        let uniform = buffers.encode_column_section(&column, 1, &global).unwrap();
        assert_eq!(uniform.palette, SectionPalette::Single(5));
        let present = buffers.encode_column_section(&column, 2, &global).unwrap();
        assert_eq!(present.palette_entries(), &[6, AIR]);
    }

    #[test]
    #[should_panic]
    fn undersized_scratch_panics() {
        let mut rng = StdRng::seed_from_u64(1);
        let global = GlobalPalette::identity(STATES);
        let mut buffers = PaletteBuffers::with_sizes(STATES as usize, 16);
        buffers.encode(&section_with_distinct(17, &mut rng), &global);
    }

    #[test]
    fn decoder_rejects_bad_input() {
        let global = GlobalPalette::identity(16);
        let section = EncodedSection::from_parts(
            PaletteKind::Blocks,
            SectionPalette::Indirect(vec![AIR, 5]),
            4,
            vec![u64::MAX; 256],
            0,
        )
        .unwrap();
        assert!(matches!(
            section.get(0, &global),
            Err(StoreError::PaletteIndexOutOfRange { index: 15, len: 2 })
        ));
        assert!(matches!(
            EncodedSection::from_parts(PaletteKind::Blocks, SectionPalette::Global, 4, vec![0; 3], 0),
            Err(StoreError::MalformedSection { expected: 256, actual: 3 })
        ));
        let global_section =
            EncodedSection::from_parts(PaletteKind::Blocks, SectionPalette::Global, 5, vec![u64::MAX >> 4; 342], 0)
                .unwrap();
        assert!(global_section.decode(&global).is_err());
    }

    #[test]
    fn biome_palettes() {
        let global = GlobalPalette::identity(64);
        let mut biomes = [None; SECTION_BIOMES];
        let single = encode_biomes(&biomes, 3, &global);
        assert_eq!(single.palette, SectionPalette::Single(3));
        assert_eq!(single.bits_per_entry(), 0);

        biomes[0] = Some(8);
        biomes[63] = Some(9);
        let local = encode_biomes(&biomes, 3, &global);
        assert_eq!(local.palette_entries(), &[8, 3, 9]);
        assert_eq!(local.bits_per_entry(), 2);
        let decoded = local.decode(&global).unwrap();
        assert_eq!(decoded[0], 8);
        assert_eq!(decoded[1], 3);
        assert_eq!(decoded[63], 9);

        for (index, slot) in biomes.iter_mut().enumerate() {
            *slot = Some((index % 9) as Biome + 10);
        }
        let wide = encode_biomes(&biomes, 3, &global);
        assert!(wide.is_global());
        assert_eq!(wide.bits_per_entry(), 6);
        assert_eq!(wide.decode(&global).unwrap()[17], (17 % 9) + 10);
    }
}
