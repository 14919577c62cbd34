pub mod debugfs;
#[cfg(any(test, feature = "dev-hooks"))]
pub mod simulated;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/* Method ids understood by the ASUS ACPI-WMI interface. */
pub const METHODID_DSTS: u32 = 0x5354_5344; /* "DSTS": get device status */
pub const METHODID_DEVS: u32 = 0x5356_4544; /* "DEVS": set device state */

/* Bits of the word returned by DSTS. */
pub const DSTS_STATUS_BIT: u32 = 0x0000_0001;
pub const DSTS_PRESENCE_BIT: u32 = 0x0001_0000;

/* Sentinel returned by firmware that does not implement the method. */
pub const UNSUPPORTED_METHOD: u32 = 0xFFFF_FFFE;

/* Device ids. Several features moved to a new id between generations,
 * those come in pairs and are probed in order. */
pub const DEVID_PANEL_OD: u32 = 0x0005_0019;
pub const DEVID_PANEL_HD: u32 = 0x0005_001C;
pub const DEVID_MINI_LED_MODE: u32 = 0x0005_001E;
pub const DEVID_MINI_LED_MODE2: u32 = 0x0005_002E;

pub const DEVID_GPU_MUX: u32 = 0x0009_0016;
pub const DEVID_GPU_MUX_VIVO: u32 = 0x0009_0026;
pub const DEVID_EGPU_CONNECTED: u32 = 0x0009_0018;
pub const DEVID_EGPU: u32 = 0x0009_0019;
pub const DEVID_DGPU: u32 = 0x0009_0020;

pub const DEVID_CHARGE_MODE: u32 = 0x0012_006C;
pub const DEVID_DGPU_SET_TGP: u32 = 0x0012_0098;
pub const DEVID_DGPU_BASE_TGP: u32 = 0x0012_0099;
pub const DEVID_PPT_PL2_SPPT: u32 = 0x0012_00A0;
pub const DEVID_PPT_PL1_SPL: u32 = 0x0012_00A3;
pub const DEVID_PPT_APU_SPPT: u32 = 0x0012_00B0;
pub const DEVID_PPT_PLAT_SPPT: u32 = 0x0012_00B1;
pub const DEVID_NV_DYN_BOOST: u32 = 0x0012_00C0;
pub const DEVID_PPT_FPPT: u32 = 0x0012_00C1;
pub const DEVID_NV_THERM_TARGET: u32 = 0x0012_00C2;
pub const DEVID_MCU_POWERSAVE: u32 = 0x0012_00E2;

pub const DEVID_BOOT_SOUND: u32 = 0x0013_0022;

/* Errors raised by a WMI backend. */
#[derive(Debug, Error)]
pub enum WmiError {
    #[error("WMI device {dev_id:#010x} is not supported by this firmware")]
    NotSupported { dev_id: u32 },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed WMI reply: {0}")]
    Protocol(String),
}

/* The interface to the platform's ACPI-WMI method dispatcher.
 *
 * Backends only implement `evaluate`; the device-state helpers are layered
 * on top of it. Only the actor task calls into a backend. */
#[async_trait]
pub trait WmiBackend: Send + Sync {
    /* Returns the backend name for logging purposes. */
    fn name(&self) -> &str;

    /* Evaluate `method_id` with two 32-bit arguments and return the
     * integer the firmware replied with. */
    async fn evaluate(&mut self, method_id: u32, dev_id: u32, ctrl_param: u32)
    -> Result<u32, WmiError>;

    /* Read the raw DSTS word for `dev_id`, presence bit included. */
    async fn get_devstate_dsts(&mut self, dev_id: u32) -> Result<u32, WmiError> {
        let retval = self.evaluate(METHODID_DSTS, dev_id, 0).await?;
        if retval == UNSUPPORTED_METHOD || retval == u32::MAX {
            return Err(WmiError::NotSupported { dev_id });
        }
        Ok(retval)
    }

    /* True when the firmware reports `dev_id` as present. */
    async fn is_present(&mut self, dev_id: u32) -> bool {
        match self.get_devstate_dsts(dev_id).await {
            Ok(retval) => {
                debug!("is_present({dev_id:#010x}), retval: {retval:#010x}");
                retval & DSTS_PRESENCE_BIT != 0
            }
            Err(e) => {
                debug!("is_present({dev_id:#010x}) failed: {e}");
                false
            }
        }
    }

    /* Write `value` to `dev_id`. Returns the firmware result word,
     * where 1 means success. */
    async fn set_devstate(&mut self, dev_id: u32, value: u32) -> Result<u32, WmiError> {
        self.evaluate(METHODID_DEVS, dev_id, value).await
    }
}

/* The value part of a DSTS word. */
pub fn strip_presence(retval: u32) -> u32 {
    retval & !DSTS_PRESENCE_BIT
}

/* Instantiate the backend named in the daemon configuration. */
pub fn create_backend(
    config: &crate::config::DaemonConfig,
) -> anyhow::Result<Box<dyn WmiBackend>> {
    match config.backend.as_str() {
        "debugfs" => Ok(Box::new(debugfs::DebugfsWmi::new(&config.debugfs_path))),
        #[cfg(feature = "dev-hooks")]
        "simulated" => {
            let path = config.simulated_firmware.as_ref().ok_or_else(|| {
                anyhow::anyhow!("Backend=simulated needs SimulatedFirmware to be set")
            })?;
            Ok(Box::new(simulated::SimulatedWmi::from_json_file(path)?))
        }
        other => anyhow::bail!("Unknown WMI backend: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simulated::SimulatedWmi;

    #[test]
    fn strip_presence_keeps_value_bits() {
        assert_eq!(strip_presence(0x0001_0001), 1);
        assert_eq!(strip_presence(0x0001_0000), 0);
        assert_eq!(strip_presence(0x0000_0046), 0x46);
    }

    #[tokio::test]
    async fn dsts_unsupported_method_is_not_supported() {
        let mut wmi = SimulatedWmi::new();
        let err = wmi.get_devstate_dsts(DEVID_GPU_MUX).await.unwrap_err();
        assert!(matches!(err, WmiError::NotSupported { dev_id } if dev_id == DEVID_GPU_MUX));
    }

    #[tokio::test]
    async fn is_present_checks_presence_bit() {
        let mut wmi = SimulatedWmi::new().with_device(DEVID_GPU_MUX, 1);
        assert!(wmi.is_present(DEVID_GPU_MUX).await);
        assert!(!wmi.is_present(DEVID_GPU_MUX_VIVO).await);

        wmi.set_raw_dsts(DEVID_GPU_MUX_VIVO, 0x0000_0001);
        assert!(!wmi.is_present(DEVID_GPU_MUX_VIVO).await);
    }

    #[tokio::test]
    async fn set_devstate_returns_firmware_result() {
        let mut wmi = SimulatedWmi::new()
            .with_device(DEVID_BOOT_SOUND, 0)
            .with_devs_result(DEVID_PANEL_OD, 0);
        assert_eq!(wmi.set_devstate(DEVID_BOOT_SOUND, 1).await.unwrap(), 1);
        assert_eq!(wmi.set_devstate(DEVID_PANEL_OD, 1).await.unwrap(), 0);
    }
}
