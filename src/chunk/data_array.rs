use std::fmt::{Debug, Formatter};

use log::{debug, warn};
use once_cell::sync::OnceCell;

use crate::chunk::{BlockState, SECTION_BLOCKS};

static ARRAY_WIDTH: OnceCell<ArrayWidth> = OnceCell::new();

static EMPTY_NARROW: [u16; SECTION_BLOCKS] = [0; SECTION_BLOCKS];
static EMPTY_WIDE: [u32; SECTION_BLOCKS] = [0; SECTION_BLOCKS];

/// Element width backing every [`DataArray`] created through the process-wide constructors.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ArrayWidth {
    Narrow,
    Wide,
}

impl ArrayWidth {
    /// Narrow storage is used when every state ordinal fits in 16 bits.
    pub fn for_state_count(state_count: u32) -> Self {
        if state_count < u16::MAX as u32 {
            ArrayWidth::Narrow
        } else {
            ArrayWidth::Wide
        }
    }

    /// Fixes the process-wide width from the size of the block-state registry.
    /// Only the first call decides; later calls return the width already chosen.
    pub fn init(state_count: u32) -> Self {
        let chosen = *ARRAY_WIDTH.get_or_init(|| Self::for_state_count(state_count));
        debug!("Section arrays use {:?} storage ({} block states)", chosen, state_count);
        chosen
    }

    /// The process-wide width. Falls back to wide storage if [`init`](Self::init) was never
    /// called, since it holds every ordinal.
    pub fn current() -> Self {
        Self::current_in(&ARRAY_WIDTH)
    }

    fn current_in(cell: &OnceCell<ArrayWidth>) -> Self {
        *cell.get_or_init(|| {
            warn!("Section array width requested before init, defaulting to wide storage");
            ArrayWidth::Wide
        })
    }
}

fn narrow(value: BlockState) -> u16 {
    assert!(
        value <= u16::MAX as BlockState,
        "ordinal {value} exceeds narrow storage"
    );
    value as u16
}

/**
 * The block states of one 16x16x16 section, stored densely.
 * Indices follow the section layout `y << 8 | z << 4 | x`.
 */
#[derive(Clone, Eq, PartialEq)]
pub enum DataArray {
    Narrow(Box<[u16]>),
    Wide(Box<[u32]>),
}

impl DataArray {
    /// An array with every entry set to `0`, using the process-wide width.
    pub fn create_empty() -> Self {
        Self::empty_with(ArrayWidth::current())
    }

    pub fn empty_with(width: ArrayWidth) -> Self {
        match width {
            ArrayWidth::Narrow => DataArray::Narrow(vec![0; SECTION_BLOCKS].into_boxed_slice()),
            ArrayWidth::Wide => DataArray::Wide(vec![0; SECTION_BLOCKS].into_boxed_slice()),
        }
    }

    pub fn create_filled(value: BlockState) -> Self {
        let mut array = Self::create_empty();
        array.set_all(value);
        array
    }

    /// # Panics
    /// Panics if `other` does not use the process-wide width.
    pub fn create_copy(other: &DataArray) -> Self {
        let mut array = Self::create_empty();
        other.copy_into(&mut array);
        array
    }

    pub fn width(&self) -> ArrayWidth {
        match self {
            DataArray::Narrow(_) => ArrayWidth::Narrow,
            DataArray::Wide(_) => ArrayWidth::Wide,
        }
    }

    /// # Panics
    /// Panics if `index >= SECTION_BLOCKS`.
    #[inline]
    pub fn get_at(&self, index: usize) -> BlockState {
        match self {
            DataArray::Narrow(data) => data[index] as BlockState,
            DataArray::Wide(data) => data[index],
        }
    }

    /// # Panics
    /// Panics if `index >= SECTION_BLOCKS` or `value` does not fit the width.
    #[inline]
    pub fn set_at(&mut self, index: usize, value: BlockState) {
        match self {
            DataArray::Narrow(data) => data[index] = narrow(value),
            DataArray::Wide(data) => data[index] = value,
        }
    }

    /// Sets `[start, end)` to `value`.
    ///
    /// # Panics
    /// Panics if `start > end`, `end > SECTION_BLOCKS` or `value` does not fit the width.
    pub fn set_range(&mut self, start: usize, end: usize, value: BlockState) {
        match self {
            DataArray::Narrow(data) => data[start..end].fill(narrow(value)),
            DataArray::Wide(data) => data[start..end].fill(value),
        }
    }

    pub fn set_all(&mut self, value: BlockState) {
        self.set_range(0, SECTION_BLOCKS, value);
    }

    /// Copies every entry of this array into `other`.
    ///
    /// # Panics
    /// Panics if the two arrays have different widths.
    pub fn copy_into(&self, other: &mut DataArray) {
        match (self, other) {
            (DataArray::Narrow(src), DataArray::Narrow(dst)) => dst.copy_from_slice(src),
            (DataArray::Wide(src), DataArray::Wide(dst)) => dst.copy_from_slice(src),
            (src, dst) => panic!(
                "cannot copy {:?} section data into {:?} section data",
                src.width(),
                dst.width()
            ),
        }
    }

    /// True when every entry is `0`. Compares the whole array at once instead of scanning for
    /// the first non-zero entry.
    pub fn is_empty(&self) -> bool {
        match self {
            DataArray::Narrow(data) => **data == EMPTY_NARROW[..],
            DataArray::Wide(data) => **data == EMPTY_WIDE[..],
        }
    }

    /// The single value held by every entry, if there is one.
    pub fn uniform_value(&self) -> Option<BlockState> {
        let first = self.get_at(0);
        let uniform = match self {
            DataArray::Narrow(data) => data.iter().all(|v| *v as BlockState == first),
            DataArray::Wide(data) => data.iter().all(|v| *v == first),
        };
        uniform.then_some(first)
    }

    pub fn iter(&self) -> impl Iterator<Item = BlockState> + '_ {
        (0..SECTION_BLOCKS).map(move |i| self.get_at(i))
    }
}

impl Debug for DataArray {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let distinct = self.iter().collect::<std::collections::BTreeSet<_>>();
        write!(f, "DataArray({:?}, distinct: {:?})", self.width(), distinct)
    }
}
