pub mod chunk;
pub mod config;
pub mod err;
pub mod types;

pub use chunk::column::SectionColumn;
pub use chunk::data_array::{ArrayWidth, DataArray};
pub use chunk::edit::ChunkEdit;
pub use chunk::palette::{EncodedSection, GlobalPalette, PaletteBuffers};
pub use chunk::pool::{EditPool, Pool, Recycle};
pub use config::StoreConfig;
pub use err::StoreError;
