// Runs a seeded insert/delete workload against a page file, checks the
// resulting tree and logs its shape. Settings come from `IDTREE_*`
// environment variables, see `idtree::config`.
use std::collections::BTreeSet;

use idtree::btree::{BTree, NodeCache, render};
use idtree::storage::FileStorage;
use idtree::{BTreeError, TreeConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SEED: u64 = 0x1d7e_e5ee_d000_0001;
const INSERTS: usize = 20_000;
const DELETES: usize = 8_000;

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "idtree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match TreeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: data_file={}, cache_capacity={:?}, orders={}/{}",
        config.data_file.display(),
        config.cache_capacity,
        config.orders.leaf(),
        config.orders.internal()
    );

    if let Err(e) = run(&config) {
        tracing::error!("Workload failed: {e}");
        std::process::exit(1);
    }
}

fn run(config: &TreeConfig) -> Result<(), BTreeError> {
    let storage = FileStorage::open(&config.data_file)?;
    let mut tree = BTree::new(NodeCache::new(storage, config.cache_config()));
    let mut rng = StdRng::seed_from_u64(SEED);
    let mut keys = BTreeSet::new();

    for _ in 0..INSERTS {
        let key = rng.random::<u64>() >> 16;
        tree.set(key, key.wrapping_mul(31))?;
        keys.insert(key);
    }
    tracing::info!(keys = tree.len(), root = tree.root_id(), "inserts done");

    // Every other key, in key order.
    let doomed: Vec<u64> = keys.iter().copied().step_by(2).take(DELETES).collect();
    for key in &doomed {
        tree.delete(*key)?;
        keys.remove(key);
    }
    tracing::info!(keys = tree.len(), root = tree.root_id(), "deletes done");

    let stats = tree.verify()?;
    tracing::info!(
        height = stats.height,
        internal_nodes = stats.internal_nodes,
        leaf_nodes = stats.leaf_nodes,
        keys = stats.keys,
        "tree verified"
    );

    if let (Some(&lo), Some(&hi)) = (keys.first(), keys.last()) {
        let span = tree.get_range(lo, hi)?;
        tracing::info!(lo, hi, values = span.len(), "range scan");
    }

    tree.describe(|depth, node| {
        if depth < 2 {
            tracing::debug!("{:indent$}{}", "", render(node), indent = depth * 2);
        }
    })?;

    tree.flush()?;
    let meta = tree.meta();
    let storage = tree.cache().storage();
    let pages = storage.page_count()?;
    tracing::info!(
        root = meta.root_id,
        size = meta.size,
        next_internal = meta.counters.next_internal,
        next_leaf = meta.counters.next_leaf,
        pages,
        "flushed to {}",
        storage.path().display()
    );
    Ok(())
}
