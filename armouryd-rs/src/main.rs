mod actor;
mod armoury;
mod attributes;
mod config;
mod dbus;
mod dmi;
mod logging;
mod tunables;
mod wmi;

use anyhow::{Context, Result, bail};
use nix::unistd::Uid;
use tracing::{info, warn};

use crate::armoury::{Armoury, Quirks};
use crate::dmi::DmiInfo;
use crate::tunables::RogTunables;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config::config_path();
    let config = config::load_config(&config_path)?;
    logging::setup_logging(&config.log_level)?;

    info!(
        "armouryd {} starting (config {})",
        env!("CARGO_PKG_VERSION"),
        config_path.display()
    );

    if config.backend == "debugfs" && !Uid::effective().is_root() {
        bail!("armouryd must run as root to use the debugfs backend");
    }

    let dmi = DmiInfo::read().unwrap_or_else(|e| {
        warn!("Failed to read DMI information: {e:#}");
        DmiInfo::default()
    });
    let product_name = config
        .product_name
        .clone()
        .unwrap_or_else(|| dmi.product_name.clone());

    let models = tunables::load_model_database(&config.model_dir);
    let tunables = RogTunables::for_product(&product_name, &models);

    let backend = wmi::create_backend(&config).context("Failed to set up the WMI backend")?;
    let quirks = Quirks {
        rog_ally: dmi.is_rog_ally(),
    };

    let armoury = Armoury::probe(backend, tunables, quirks).await;
    if armoury.attributes().is_empty() {
        warn!("No firmware attributes found on '{}'", product_name);
    }

    let handle = actor::spawn_armoury_actor(armoury);
    dbus::run_server(handle, product_name).await
}
