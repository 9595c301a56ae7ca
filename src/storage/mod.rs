mod mem_release_log;
mod release_log;
mod sled_release_log;

#[cfg(test)]
mod storage_test;

use std::path::Path;

pub use mem_release_log::*;
pub use release_log::*;
pub use sled_release_log::*;
use tracing::debug;
use tracing::warn;

use crate::ServerConfig;

/// Opens the sled database backing the release log under `{db_root_dir}/release_log`.
pub fn init_sled_release_log_db(
    sled_db_root_path: impl AsRef<Path> + std::fmt::Debug,
    config: &ServerConfig,
) -> std::result::Result<sled::Db, std::io::Error> {
    debug!("init_sled_release_log_db from path: {:?}", &sled_db_root_path);

    let path = sled_db_root_path.as_ref().join("release_log");

    sled::Config::default()
        .path(&path)
        .cache_capacity(config.db_cache_capacity)
        .flush_every_ms(Some(config.db_flush_every_ms))
        .use_compression(true)
        .compression_factor(1)
        .mode(sled::Mode::HighThroughput)
        .open()
        .map_err(|e| {
            warn!("Try to open DB at this location: {:?} and failed: {:?}", path, e);
            std::io::Error::other(e)
        })
}
