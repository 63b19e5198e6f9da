//! Cache statistics and maintenance commands.

use tokio::runtime::Runtime;

use anisource::cache::{Namespace, TtlCache};
use anisource::config::Config;

fn open(config: &Config) -> anyhow::Result<TtlCache> {
    config.validate()?;
    Ok(TtlCache::new(config.cache_options()))
}

/// Show entry counts per shard
pub fn cmd_cache_stats(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    let cache = open(config)?;
    rt.block_on(async {
        let stats = cache.stats().await;

        println!("Cache Statistics");
        println!("================");
        let mut total = 0;
        for shard in &stats {
            if !shard.available {
                println!("  shard-{}: ✗ unavailable", shard.shard);
                continue;
            }
            total += shard.total();
            let detail = shard
                .entries
                .iter()
                .map(|(ns, n)| format!("{} {}", n, ns))
                .collect::<Vec<_>>()
                .join(", ");
            if detail.is_empty() {
                println!("  shard-{}: empty", shard.shard);
            } else {
                println!("  shard-{}: {}", shard.shard, detail);
            }
        }
        println!();
        println!("Total entries: {}", total);
    });
    Ok(())
}

/// Delete expired entries
pub fn cmd_cache_purge(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    let cache = open(config)?;
    let removed = rt.block_on(cache.purge_expired());
    println!("Removed {} expired entries", removed);
    Ok(())
}

/// Delete entries of a namespace by key prefix
pub fn cmd_cache_invalidate(
    rt: &Runtime,
    config: &Config,
    namespace: &str,
    prefix: &str,
) -> anyhow::Result<()> {
    let namespace: Namespace = namespace.parse()?;
    let cache = open(config)?;
    let removed = rt.block_on(cache.invalidate(namespace, prefix));
    if prefix.is_empty() {
        println!("Removed {} {} entries", removed, namespace);
    } else {
        println!("Removed {} {} entries starting with {:?}", removed, namespace, prefix);
    }
    Ok(())
}
