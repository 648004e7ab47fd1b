pub mod column;
pub mod data_array;
pub mod edit;
pub mod packed_array;
pub mod palette;
pub mod pool;
pub mod section;

/// Dense, process-wide identifier of a block state.
pub type BlockState = u32;

/// Identifier of a biome in the global biome registry.
pub type Biome = u16;

pub const SECTION_EDGE: usize = 16;
pub const SECTION_BLOCKS: usize = SECTION_EDGE * SECTION_EDGE * SECTION_EDGE;

/// Biomes are stored at a quarter of the block resolution on each axis.
pub const BIOME_EDGE: usize = SECTION_EDGE / 4;
pub const SECTION_BIOMES: usize = BIOME_EDGE * BIOME_EDGE * BIOME_EDGE;

pub const MIN_PALETTE_BITS_BLOCKS: usize = 4;
pub const MAX_PALETTE_BITS_BLOCKS: usize = 8;
pub const MIN_PALETTE_BITS_BIOMES: usize = 0;
pub const MAX_PALETTE_BITS_BIOMES: usize = 3;

/// Light values are 0..=15, anything above means "not written by this edit".
pub const MAX_LIGHT: u8 = 15;
pub const LIGHT_UNSET: u8 = 16;

/// Ordinals with a fixed meaning in every block-state registry.
pub mod reserved {
    use super::BlockState;

    /// Placeholder for "no edit here". Never written to the world.
    pub const RESERVED: BlockState = 0;
    pub const AIR: BlockState = 1;
    pub const CAVE_AIR: BlockState = 2;
    pub const VOID_AIR: BlockState = 3;

    pub fn is_air(ordinal: BlockState) -> bool {
        matches!(ordinal, RESERVED | AIR | CAVE_AIR | VOID_AIR)
    }
}

/// Number of bits needed to represent `value`, i.e. `32 - leading_zeros`.
pub fn log2nlz(value: u32) -> usize {
    (u32::BITS - value.leading_zeros()) as usize
}

/// Section layer containing the world height `y`.
pub fn section_layer(y: i32) -> i32 {
    y >> 4
}

/// Index of a block inside its section, y-major then z then x.
pub fn block_index(x: i32, y: i32, z: i32) -> usize {
    (((y & 15) << 8) | ((z & 15) << 4) | (x & 15)) as usize
}

/// Index of the 4x4x4 biome cell containing the block.
pub fn biome_index(x: i32, y: i32, z: i32) -> usize {
    (((y & 12) << 2) | (z & 12) | ((x & 12) >> 2)) as usize
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn log2nlz_matches_bit_length() {
        assert_eq!(log2nlz(0), 0);
        assert_eq!(log2nlz(1), 1);
        assert_eq!(log2nlz(15), 4);
        assert_eq!(log2nlz(16), 5);
        assert_eq!(log2nlz(255), 8);
        assert_eq!(log2nlz(256), 9);
    }

    #[test]
    fn indices_cover_section() {
        assert_eq!(block_index(0, 0, 0), 0);
        assert_eq!(block_index(15, 15, 15), SECTION_BLOCKS - 1);
        assert_eq!(block_index(17, 64, -1), block_index(1, 0, 15));
        assert_eq!(biome_index(15, 15, 15), SECTION_BIOMES - 1);
        assert_eq!(biome_index(3, 3, 3), 0);
        assert_eq!(biome_index(4, 0, 0), 1);
        assert_eq!(biome_index(0, 0, 4), 4);
        assert_eq!(biome_index(0, 4, 0), 16);
    }

    #[test]
    fn negative_heights_floor_to_layer() {
        assert_eq!(section_layer(-1), -1);
        assert_eq!(section_layer(-16), -1);
        assert_eq!(section_layer(-17), -2);
        assert_eq!(section_layer(64), 4);
        assert_eq!(block_index(0, -1, 0), block_index(0, 15, 0));
    }
}
