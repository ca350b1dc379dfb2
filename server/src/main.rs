//! Entry point: loads configuration, connects to the disk service, opens
//! (but does not format) the filesystem, and runs the reactor.

mod config;
mod datefmt;
mod dispatcher;
mod reactor;

use std::path::PathBuf;

use anyhow::Context;
use log::info;
use myfs_block::TcpBlockDevice;
use myfs_core::fs::Filesystem;

use config::Config;

/// `--config <path>` is the only argument surface; anything else is
/// rejected. Process startup/argument parsing is otherwise out of scope.
fn config_path_from_args() -> anyhow::Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    match args.next() {
        None => Ok(None),
        Some(flag) if flag == "--config" => {
            let path = args.next().context("--config requires a path argument")?;
            Ok(Some(PathBuf::from(path)))
        }
        Some(other) => anyhow::bail!("unrecognized argument: {other}"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .write_style(env_logger::WriteStyle::Never)
        .init();

    let config_path = config_path_from_args()?;
    let config = Config::load(config_path.as_deref())?;
    info!("config: listen={} disk={} ninodes={}", config.listen_addr, config.disk_addr, config.ninodes);

    let dev = TcpBlockDevice::connect(&config.disk_addr)
        .with_context(|| format!("connecting to disk service at {}", config.disk_addr))?;
    let fs = Filesystem::open(dev).context("reading superblock from disk service")?;
    if fs.is_formatted() {
        info!("superblock already formatted");
    } else {
        info!("device not formatted; waiting for an `f` command");
    }

    reactor::run(&config.listen_addr, fs, config.max_sessions, config.ninodes).await
}
