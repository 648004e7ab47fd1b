use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chunk::{biome_index, block_index, section_layer};
use crate::err::StoreError;

/// A block position inside one chunk column. `x` and `z` are taken modulo 16, `y` is the world height.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The same block with `x` and `z` reduced to the column.
    pub fn local(&self) -> Self {
        Self::new(self.x & 15, self.y, self.z & 15)
    }

    pub fn layer(&self) -> i32 {
        section_layer(self.y)
    }

    pub fn block_index(&self) -> usize {
        block_index(self.x, self.y, self.z)
    }

    pub fn biome_index(&self) -> usize {
        biome_index(self.x, self.y, self.z)
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/**
 * An NBT compound serialized by the host. Tile and entity data pass through the edit
 * untouched, so only the encoded bytes are kept.
 */
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CompoundTag(Vec<u8>);

impl CompoundTag {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for CompoundTag {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeightMapType {
    WorldSurface,
    OceanFloor,
    MotionBlocking,
    MotionBlockingNoLeaves,
}

impl HeightMapType {
    pub const ALL: [HeightMapType; 4] = [
        HeightMapType::WorldSurface,
        HeightMapType::OceanFloor,
        HeightMapType::MotionBlocking,
        HeightMapType::MotionBlockingNoLeaves,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HeightMapType::WorldSurface => "WORLD_SURFACE",
            HeightMapType::OceanFloor => "OCEAN_FLOOR",
            HeightMapType::MotionBlocking => "MOTION_BLOCKING",
            HeightMapType::MotionBlockingNoLeaves => "MOTION_BLOCKING_NO_LEAVES",
        }
    }
}

impl Display for HeightMapType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HeightMapType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HeightMapType::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| StoreError::UnknownHeightMap(s.to_string()))
    }
}
