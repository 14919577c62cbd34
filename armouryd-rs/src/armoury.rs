/* The attribute engine.
 *
 * Owns the WMI backend, the probed attribute set and the little state the
 * firmware cannot hold for us (cached tunables, the pending-reboot flag).
 * Every write follows the same steps: parse, range check, cross-attribute
 * guard, DEVS call, result check, notify. Only the actor task touches an
 * `Armoury`, so there is no locking in here. */

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::attributes::{ARMOURY_ATTRIBUTES, Attribute, GPU_MUX_MODE, Guard, Kind, MCU_POWERSAVE};
use crate::tunables::RogTunables;
use crate::wmi::{
    DEVID_DGPU, DEVID_EGPU, DEVID_EGPU_CONNECTED, DEVID_MINI_LED_MODE2, DSTS_STATUS_BIT,
    WmiBackend, WmiError, strip_presence,
};

pub const PENDING_REBOOT: &str = "pending_reboot";

const MINI_LED_MODE_MASK: u32 = 0x03;
/* Modes as seen by users, same as the first generation on the wire. */
const MINI_LED_OFF: u32 = 0x00;
const MINI_LED_ON: u32 = 0x01;
const MINI_LED_STRONG_MODE: u32 = 0x02;
/* Wire encoding of the 2024 generation (MODE2). */
const MINI_LED_2024_WEAK: u32 = 0x00;
const MINI_LED_2024_STRONG: u32 = 0x01;
const MINI_LED_2024_OFF: u32 = 0x02;

/* Capacity of the change-event channel. */
const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Error)]
pub enum ArmouryError {
    #[error("no attribute named '{0}'")]
    NotFound(String),

    #[error("attribute '{0}' is read-only")]
    ReadOnly(String),

    #[error("invalid value '{0}': expected a base-10 unsigned integer")]
    InvalidValue(String),

    #[error("value {value} out of range {min}..={max}")]
    OutOfRange { value: u32, min: u32, max: u32 },

    #[error("{0}")]
    Blocked(String),

    #[error("firmware rejected {name} (result): {result:#x}")]
    FirmwareRejected { name: String, result: u32 },

    #[error(transparent)]
    Wmi(#[from] WmiError),

    #[error("attribute service is not running")]
    Unavailable,
}

/* Sent to subscribers whenever something visible changed. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArmouryEvent {
    Changed { name: String, value: u32 },
    PendingReboot,
}

/* Machine-specific adjustments to what gets exposed. */
#[derive(Debug, Clone, Copy, Default)]
pub struct Quirks {
    /* MCU powersave is unreliable on the ROG Ally handhelds. */
    pub rog_ally: bool,
}

/* Translate a MODE2 wire value into the user-visible mode. */
pub fn mini_led_from_wire(dev_id: u32, wire: u32) -> u32 {
    if dev_id != DEVID_MINI_LED_MODE2 {
        return wire;
    }
    match wire {
        MINI_LED_2024_WEAK => MINI_LED_ON,
        MINI_LED_2024_STRONG => MINI_LED_STRONG_MODE,
        MINI_LED_2024_OFF => MINI_LED_OFF,
        other => other,
    }
}

/* Translate a user-visible mode into the MODE2 wire value. */
pub fn mini_led_to_wire(dev_id: u32, mode: u32) -> u32 {
    if dev_id != DEVID_MINI_LED_MODE2 {
        return mode;
    }
    match mode {
        MINI_LED_OFF => MINI_LED_2024_OFF,
        MINI_LED_ON => MINI_LED_2024_WEAK,
        MINI_LED_STRONG_MODE => MINI_LED_2024_STRONG,
        other => other,
    }
}

/* Parse a written value the way sysfs stores do: base 10 with an optional
 * leading '+'. Surrounding whitespace is ignored, which is looser than
 * kstrtou32 (only a trailing newline there). */
pub fn parse_value(text: &str) -> Result<u32, ArmouryError> {
    let trimmed = text.trim();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ArmouryError::InvalidValue(trimmed.to_string()));
    }
    digits
        .parse()
        .map_err(|_| ArmouryError::InvalidValue(trimmed.to_string()))
}

pub struct Armoury {
    backend: Box<dyn WmiBackend>,
    attributes: Vec<Attribute>,
    cached: HashMap<&'static str, u32>,
    pending_reboot: bool,
    events: broadcast::Sender<ArmouryEvent>,
}

impl Armoury {
    /* Probe the firmware and build the attribute set for this machine.
     * A device that fails to probe is only logged, it never stops the
     * remaining attributes from being created. */
    pub async fn probe(
        mut backend: Box<dyn WmiBackend>,
        tunables: RogTunables,
        quirks: Quirks,
    ) -> Self {
        let mut attributes = Vec::new();
        let mut cached = HashMap::new();

        for desc in ARMOURY_ATTRIBUTES {
            if desc.name == MCU_POWERSAVE && quirks.rog_ally {
                debug!("Skipping {} on ROG Ally", desc.name);
                continue;
            }

            let mut found = None;
            for &dev_id in desc.dev_ids {
                if backend.is_present(dev_id).await {
                    found = Some(dev_id);
                    break;
                }
            }
            let Some(dev_id) = found else {
                debug!("{} not present", desc.name);
                continue;
            };

            let attr = Attribute::new(desc, dev_id, &tunables);
            if let Kind::Tunable(group, seed) = desc.kind {
                cached.insert(desc.name, tunables.seed(group, seed));
            }
            debug!("Created attribute {} (dev_id {dev_id:#010x})", desc.name);
            attributes.push(attr);
        }

        info!(
            "Probed {} attributes with the {} backend",
            attributes.len(),
            backend.name()
        );

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            attributes,
            cached,
            pending_reboot: false,
            events,
        }
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> broadcast::Receiver<ArmouryEvent> {
        self.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<ArmouryEvent> {
        self.events.clone()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Result<&Attribute, ArmouryError> {
        self.attributes
            .iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| ArmouryError::NotFound(name.to_string()))
    }

    pub fn pending_reboot(&self) -> bool {
        self.pending_reboot
    }

    fn gpu_mux_dev_id(&self) -> Option<u32> {
        self.attribute(GPU_MUX_MODE).ok().map(|a| a.dev_id)
    }

    /* DSTS value with the presence bit stripped. */
    async fn dsts_value(&mut self, dev_id: u32) -> Result<u32, ArmouryError> {
        Ok(strip_presence(self.backend.get_devstate_dsts(dev_id).await?))
    }

    /* Current value of `name`. */
    pub async fn read(&mut self, name: &str) -> Result<u32, ArmouryError> {
        if name == PENDING_REBOOT {
            return Ok(u32::from(self.pending_reboot));
        }

        let attr = self.attribute(name)?;
        let (kind, dev_id) = (attr.desc.kind, attr.dev_id);

        match kind {
            Kind::Tunable(..) => self
                .cached
                .get(name)
                .copied()
                .ok_or_else(|| ArmouryError::NotFound(name.to_string())),
            Kind::MiniLed => {
                let wire = self.dsts_value(dev_id).await? & MINI_LED_MODE_MASK;
                Ok(mini_led_from_wire(dev_id, wire))
            }
            Kind::Bool | Kind::EnumInt(_) | Kind::ValueOnly => self.dsts_value(dev_id).await,
        }
    }

    /* Store a textual value, as written to a `current_value` file. */
    pub async fn write(&mut self, name: &str, text: &str) -> Result<u32, ArmouryError> {
        let value = parse_value(text)?;
        self.write_value(name, value).await?;
        Ok(value)
    }

    /* Validate and store `value`. */
    pub async fn write_value(&mut self, name: &str, value: u32) -> Result<(), ArmouryError> {
        if name == PENDING_REBOOT {
            return Err(ArmouryError::ReadOnly(name.to_string()));
        }

        let attr = self.attribute(name)?.clone();
        if attr.desc.read_only {
            return Err(ArmouryError::ReadOnly(name.to_string()));
        }
        if !attr.values.accepts(value) {
            let (min, max) = attr.values.bounds();
            return Err(ArmouryError::OutOfRange { value, min, max });
        }

        match attr.desc.guard {
            Guard::None => {}
            Guard::GpuMux => self.check_gpu_mux(value).await?,
            Guard::DgpuDisable => self.check_dgpu_disable(value).await?,
            Guard::EgpuEnable => self.check_egpu_enable(value).await?,
        }

        let wire = match attr.desc.kind {
            Kind::MiniLed => mini_led_to_wire(attr.dev_id, value),
            _ => value,
        };

        let result = self
            .backend
            .set_devstate(attr.dev_id, wire)
            .await
            .inspect_err(|e| warn!("Failed to set {name}: {e}"))?;
        /* Anything but 1 is a failure as far as ASUS is concerned */
        if result != 1 {
            warn!("Failed to set {name} (result): {result:#x}");
            return Err(ArmouryError::FirmwareRejected {
                name: name.to_string(),
                result,
            });
        }

        if let Kind::Tunable(..) = attr.desc.kind {
            self.cached.insert(attr.desc.name, value);
        }
        info!("{name} set to {value}");
        let _ = self.events.send(ArmouryEvent::Changed {
            name: name.to_string(),
            value,
        });

        if attr.desc.requires_reboot {
            self.pending_reboot = true;
            let _ = self.events.send(ArmouryEvent::PendingReboot);
        }

        Ok(())
    }

    /* Switching the MUX to dGPU mode (0) needs the dGPU powered and the
     * eGPU off. */
    async fn check_gpu_mux(&mut self, optimus: u32) -> Result<(), ArmouryError> {
        if optimus != 0 {
            return Ok(());
        }

        if self.backend.is_present(DEVID_DGPU).await && self.dsts_value(DEVID_DGPU).await? != 0 {
            warn!("Can not switch MUX to dGPU mode when dGPU is disabled");
            return Err(ArmouryError::Blocked(
                "Can not switch MUX to dGPU mode when dGPU is disabled".to_string(),
            ));
        }

        if self.backend.is_present(DEVID_EGPU).await && self.dsts_value(DEVID_EGPU).await? != 0 {
            warn!("Can not switch MUX to dGPU mode when eGPU is enabled");
            return Err(ArmouryError::Blocked(
                "Can not switch MUX to dGPU mode when eGPU is enabled".to_string(),
            ));
        }

        Ok(())
    }

    /* The mode reported by the MUX, if this machine has one. */
    async fn mux_mode(&mut self) -> Result<Option<u32>, ArmouryError> {
        match self.gpu_mux_dev_id() {
            Some(dev_id) => Ok(Some(self.dsts_value(dev_id).await?)),
            None => Ok(None),
        }
    }

    async fn check_dgpu_disable(&mut self, disable: u32) -> Result<(), ArmouryError> {
        if disable == 0 {
            return Ok(());
        }
        if self.mux_mode().await? == Some(0) {
            warn!("Can not disable dGPU when the MUX is in dGPU mode");
            return Err(ArmouryError::Blocked(
                "Can not disable dGPU when the MUX is in dGPU mode".to_string(),
            ));
        }
        Ok(())
    }

    /* The ACPI call that enables the eGPU also disables the internal dGPU. */
    async fn check_egpu_enable(&mut self, enable: u32) -> Result<(), ArmouryError> {
        let connected = self
            .backend
            .get_devstate_dsts(DEVID_EGPU_CONNECTED)
            .await
            .inspect_err(|e| warn!("Failed to get eGPU connection status: {e}"))?;

        if enable == 0 {
            return Ok(());
        }

        if self.mux_mode().await? == Some(0) {
            warn!("Can not enable eGPU when the MUX is in dGPU mode");
            return Err(ArmouryError::Blocked(
                "Can not enable eGPU when the MUX is in dGPU mode".to_string(),
            ));
        }

        if connected & DSTS_STATUS_BIT == 0 {
            warn!("Can not enable eGPU when it is not connected");
            return Err(ArmouryError::Blocked(
                "Can not enable eGPU when it is not connected".to_string(),
            ));
        }

        Ok(())
    }
}
