use std::sync::Arc;

use parking_lot::Mutex;

use crate::chunk::BlockState;

/// What a section layer of a [`SectionColumn`](crate::chunk::column::SectionColumn) holds.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SectionState {
    /// Nothing stored; every block reads as the column's default ordinal.
    #[default]
    Empty,
    /// Every block holds the given ordinal. No backing array is kept.
    Uniform(BlockState),
    /// A backing array holds the blocks.
    Present,
}

impl SectionState {
    pub fn is_empty(&self) -> bool {
        matches!(self, SectionState::Empty)
    }
}

/**
 * Per-section lock handle. The column never takes these itself; collaborators that
 * replace or mutate a single section from several threads agree to hold it.
 */
pub type SectionLock = Arc<Mutex<()>>;

pub(crate) fn new_lock() -> SectionLock {
    Arc::new(Mutex::new(()))
}
