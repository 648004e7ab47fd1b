use std::env;
use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Instant;

use dotenv::dotenv;
use log::{debug, error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use chunkstore::chunk::palette::encode_biomes;
use chunkstore::chunk::reserved::{AIR, RESERVED};
use chunkstore::chunk::Biome;
use chunkstore::types::CompoundTag;
use chunkstore::{ArrayWidth, DataArray, EditPool, GlobalPalette, PaletteBuffers, StoreConfig, StoreError};

const DEFAULT_WORKERS: usize = 4;
const EDITS_PER_WORKER: usize = 256;
const MAX_DISTINCT: u32 = 300;

#[derive(Debug, Default)]
struct Report {
    edits: usize,
    sections: usize,
    global_sections: usize,
    trimmed: usize,
    packed_bytes: usize,
    tile_bytes: usize,
}

impl AddAssign for Report {
    fn add_assign(&mut self, other: Self) {
        self.edits += other.edits;
        self.sections += other.sections;
        self.global_sections += other.global_sections;
        self.trimmed += other.trimmed;
        self.packed_bytes += other.packed_bytes;
        self.tile_bytes += other.tile_bytes;
    }
}

struct Shared {
    config: StoreConfig,
    pool: EditPool,
    blocks: GlobalPalette,
    biomes: GlobalPalette,
}

/**
 * Builds random edits, encodes every section they touch and checks that decoding gives the
 * same blocks back.
 */
fn run_worker(worker: usize, shared: &Shared) -> Result<Report, StoreError> {
    let mut rng = StdRng::seed_from_u64(worker as u64);
    let mut buffers = PaletteBuffers::new(shared.config.block_state_count);
    let mut report = Report::default();
    let distinct_limit = (shared.config.block_state_count - 4).min(MAX_DISTINCT);

    for _ in 0..EDITS_PER_WORKER {
        let mut edit = shared.pool.poll();
        let distinct = rng.gen_range(1..=distinct_limit);
        let fill = 4 + rng.gen_range(0..distinct);
        edit.fill_section(rng.gen_range(-4..0), fill);
        for _ in 0..rng.gen_range(1..2048) {
            let (x, y, z) = (rng.gen_range(0..16), rng.gen_range(-64..320), rng.gen_range(0..16));
            edit.set_block(x, y, z, 4 + rng.gen_range(0..distinct));
        }
        edit.set_biome(0, 0, 0, rng.gen_range(0..shared.config.biome_count) as Biome);
        edit.set_tile(rng.gen_range(0..16), 64, rng.gen_range(0..16), CompoundTag::new(vec![10, 0]));
        report.trimmed += edit.trim_all();

        for layer in edit.column().section_layers() {
            let Some(section) = buffers.encode_column_section(edit.column(), layer, &shared.blocks) else {
                continue;
            };
            let mut decoded = DataArray::create_empty();
            section.decode_into(&mut decoded, &shared.blocks)?;
            if let Some(blocks) = edit.load_if_present(layer) {
                for (index, ordinal) in blocks.iter().enumerate() {
                    let expected = if ordinal == RESERVED { AIR } else { ordinal };
                    if decoded.get_at(index) != expected {
                        return Err(StoreError::Any(format!(
                            "worker {worker}: layer {layer} index {index} decoded as {} instead of {expected}",
                            decoded.get_at(index)
                        )));
                    }
                }
            }
            report.sections += 1;
            report.global_sections += section.is_global() as usize;
            report.packed_bytes += section.words().len() * 8;
        }
        if let Some(biomes) = edit.get_biomes(0) {
            let section = encode_biomes(biomes, shared.config.default_biome, &shared.biomes);
            report.packed_bytes += section.words().len() * 8;
        }

        report.tile_bytes += edit.tiles().values().map(|tile| tile.as_bytes().len()).sum::<usize>();
        report.edits += 1;
        shared.pool.recycle(edit);
    }
    debug!("Worker {} finished: {:?}", worker, report);
    Ok(report)
}

fn worker_count() -> Result<usize, StoreError> {
    match env::var("CHUNKSTORE_WORKERS") {
        Ok(raw) => raw
            .parse()
            .map_err(|_| StoreError::InvalidConfig(format!("CHUNKSTORE_WORKERS={raw:?} cannot be parsed"))),
        Err(env::VarError::NotPresent) => Ok(DEFAULT_WORKERS),
        Err(e) => Err(StoreError::InvalidConfig(format!("CHUNKSTORE_WORKERS: {e}"))),
    }
}

async fn run() -> Result<(), StoreError> {
    let config = StoreConfig::from_env()?;
    if config.block_state_count < 5 {
        return Err(StoreError::InvalidConfig(
            "the demo needs at least one block state besides the air family".into(),
        ));
    }
    ArrayWidth::init(config.block_state_count);
    let workers = worker_count()?;
    info!(
        "Running {} workers, {} edits each, pool of {}",
        workers, EDITS_PER_WORKER, config.pool_size
    );

    let shared = Arc::new(Shared {
        pool: EditPool::for_edits(&config),
        blocks: GlobalPalette::identity(config.block_state_count),
        biomes: GlobalPalette::identity(config.biome_count),
        config,
    });

    let start = Instant::now();
    let handles: Vec<_> = (0..workers)
        .map(|worker| {
            let shared = shared.clone();
            tokio::task::spawn_blocking(move || run_worker(worker, &shared))
        })
        .collect();

    let mut total = Report::default();
    for handle in handles {
        total += handle
            .await
            .map_err(|e| StoreError::Any(format!("worker failed: {e}")))??;
    }
    info!(
        "Encoded {} sections ({} global, {} trimmed) from {} edits into {} bytes plus {} tile bytes in {:?}",
        total.sections,
        total.global_sections,
        total.trimmed,
        total.edits,
        total.packed_bytes,
        total.tile_bytes,
        start.elapsed()
    );
    info!("{} edits idle in the pool", shared.pool.idle());
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    if let Err(e) = run().await {
        error!("{e}");
        std::process::exit(1);
    }
}
