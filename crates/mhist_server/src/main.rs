use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cmd_util::env::config_service;
use mhist::{
    DiskStore,
    MemoryStore,
    Pools,
    Store,
};
use mhist_server::{
    config::ServerConfig,
    replication::Replication,
    tcp::TcpHandler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = config_service();
    let config = ServerConfig::parse();
    tracing::info!("Starting mhist with {config:?}");

    let pools = Arc::new(Pools::new());
    let memory = MemoryStore::new(pools.clone(), config.soft_limit, config.max_size);
    pools.attach_shrinker(memory.clone());

    let disk_store = DiskStore::start(pools.clone(), config.disk_store_config())
        .await
        .context("Couldn't start the disk store")?;
    let handler = TcpHandler::new(pools.clone());

    let mut store = Store::new();
    store.add_subscriber(memory);
    store.attach_disk_store(disk_store);
    store.add_subscriber(handler.clone());
    for address in &config.replicate_to {
        store.add_replication(Replication::connect(address.clone(), pools.clone()));
    }
    let store = Arc::new(store);

    let server = tokio::spawn(handler.run(store.clone(), config.tcp_port));

    tokio::signal::ctrl_c()
        .await
        .context("Couldn't listen for ctrl-c")?;
    tracing::info!("Shutting down");
    server.abort();
    store.shutdown().await;
    Ok(())
}
