use std::{
    path::PathBuf,
    time::Duration,
};

use clap::Parser;
use mhist::DiskStoreConfig;

/// Deployment configuration. Every flag can also be set through the
/// environment variable named next to it.
#[derive(Parser, Clone, Debug)]
#[clap(version, about = "Measurement history service")]
pub struct ServerConfig {
    /// Directory holding block files and the meta catalog
    #[clap(long, env = "MHIST_DATA_PATH", default_value = "data")]
    pub data_path: PathBuf,

    /// Rotate threshold for block files, in bytes
    #[clap(long, env = "MHIST_MAX_FILE_SIZE", default_value_t = 16 * 1024 * 1024)]
    pub max_file_size: i64,

    /// Disk budget, in bytes; the oldest block file is dropped above it
    #[clap(long, env = "MHIST_MAX_DISK_SIZE", default_value_t = 1024 * 1024 * 1024)]
    pub max_disk_size: i64,

    /// In-memory footprint above which pool misses shrink the series tier
    #[clap(long, env = "MHIST_SOFT_LIMIT", default_value_t = 64 * 1024 * 1024)]
    pub soft_limit: usize,

    /// In-memory footprint above which harvested shrink stock is discarded
    #[clap(long, env = "MHIST_MAX_SIZE", default_value_t = 128 * 1024 * 1024)]
    pub max_size: usize,

    /// Port to listen on for publishers and subscribers
    #[clap(long, env = "MHIST_TCP_PORT", default_value_t = 6666)]
    pub tcp_port: u16,

    /// Seconds between block flushes
    #[clap(long, env = "MHIST_FLUSH_INTERVAL", default_value_t = 5)]
    pub flush_interval: u64,

    /// Peer addresses (host:port) to replicate accepted writes to
    #[clap(long, env = "MHIST_REPLICATE_TO", value_delimiter = ',')]
    pub replicate_to: Vec<String>,
}

impl ServerConfig {
    pub fn disk_store_config(&self) -> DiskStoreConfig {
        let mut config =
            DiskStoreConfig::new(&self.data_path, self.max_file_size, self.max_disk_size);
        config.flush_interval = Duration::from_secs(self.flush_interval);
        config
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::ServerConfig;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::try_parse_from(["mhist_server"]).unwrap();
        assert_eq!(config.tcp_port, 6666);
        assert_eq!(config.flush_interval, 5);
        assert!(config.replicate_to.is_empty());
        assert!(config.soft_limit < config.max_size);
    }

    #[test]
    fn test_replication_peers_are_comma_separated() {
        let config = ServerConfig::try_parse_from([
            "mhist_server",
            "--replicate-to",
            "10.0.0.1:6666,10.0.0.2:6666",
        ])
        .unwrap();
        assert_eq!(
            config.replicate_to,
            vec!["10.0.0.1:6666".to_owned(), "10.0.0.2:6666".to_owned()]
        );
    }
}
