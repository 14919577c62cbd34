/* Machine identification from the DMI tables, read through udev. */

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

const DMI_SYSPATH: &str = "/sys/class/dmi/id";

/* Board names of the ROG Ally handhelds. */
const ROG_ALLY_BOARDS: &[&str] = &["RC71L", "RC72L"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DmiInfo {
    pub product_name: String,
    pub board_name: String,
}

impl DmiInfo {
    pub fn read() -> Result<Self> {
        let device = udev::Device::from_syspath(Path::new(DMI_SYSPATH))
            .with_context(|| format!("Failed to open {DMI_SYSPATH}"))?;

        let attr = |name: &str| {
            device
                .attribute_value(name)
                .map(|v| v.to_string_lossy().trim().to_string())
                .unwrap_or_default()
        };

        let info = Self {
            product_name: attr("product_name"),
            board_name: attr("board_name"),
        };
        debug!(
            "DMI product '{}', board '{}'",
            info.product_name, info.board_name
        );
        Ok(info)
    }

    pub fn is_rog_ally(&self) -> bool {
        ROG_ALLY_BOARDS
            .iter()
            .any(|board| self.board_name.contains(board))
    }
}
