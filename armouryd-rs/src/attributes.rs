/* The attribute catalogue.
 *
 * Every firmware attribute the daemon can expose is described here once.
 * Probing (see `armoury.rs`) turns the descriptors whose WMI device is
 * present into `Attribute`s with their limits resolved for this machine. */

use crate::tunables::{RogTunables, Seed, TunableGroup};
use crate::wmi::*;

pub const MINI_LED_MODE: &str = "mini_led_mode";
pub const GPU_MUX_MODE: &str = "gpu_mux_mode";
pub const MCU_POWERSAVE: &str = "mcu_powersave";

/* How the value of an attribute is represented and where it comes from. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /* Enumeration "0;1" read back through DSTS. */
    Bool,
    /* Enumeration of fixed values read back through DSTS. */
    EnumInt(&'static [u32]),
    /* Integer the firmware cannot report back; the last written value is
     * cached, starting at the seed. */
    Tunable(TunableGroup, Seed),
    /* Read-only integer without limits. */
    ValueOnly,
    /* Enumeration whose range and encoding depend on the probed device id. */
    MiniLed,
}

/* Cross-attribute rule checked before the firmware is called. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    None,
    GpuMux,
    DgpuDisable,
    EgpuEnable,
}

#[derive(Debug)]
pub struct AttrDesc {
    pub name: &'static str,
    pub display_name: &'static str,
    /* Candidate device ids, probed in order; the first present one wins. */
    pub dev_ids: &'static [u32],
    pub kind: Kind,
    pub guard: Guard,
    pub read_only: bool,
    pub requires_reboot: bool,
}

/* The firmware-attributes ABI types. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    Integer,
    Enumeration,
}

impl AttrType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttrType::Integer => "integer",
            AttrType::Enumeration => "enumeration",
        }
    }
}

/* Accepted values of a probed attribute. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Values {
    Integer {
        min: u32,
        max: u32,
        default: u32,
        scalar_increment: u32,
    },
    Enumeration(Vec<u32>),
    ValueOnly,
}

impl Values {
    pub fn attr_type(&self) -> AttrType {
        match self {
            Values::Enumeration(_) => AttrType::Enumeration,
            Values::Integer { .. } | Values::ValueOnly => AttrType::Integer,
        }
    }

    pub fn accepts(&self, value: u32) -> bool {
        match self {
            Values::Integer { min, max, .. } => (*min..=*max).contains(&value),
            Values::Enumeration(possible) => possible.contains(&value),
            Values::ValueOnly => false,
        }
    }

    /* `(min, max)` for error reporting and the DBus limits. */
    pub fn bounds(&self) -> (u32, u32) {
        match self {
            Values::Integer { min, max, .. } => (*min, *max),
            Values::Enumeration(possible) => (
                possible.iter().copied().min().unwrap_or(0),
                possible.iter().copied().max().unwrap_or(0),
            ),
            Values::ValueOnly => (0, 0),
        }
    }

    /* The `possible_values` string of the firmware-attributes ABI. */
    #[cfg(test)]
    pub fn possible_values_string(&self) -> String {
        match self {
            Values::Enumeration(possible) => possible
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(";"),
            _ => String::new(),
        }
    }
}

/* An attribute present on this machine. */
#[derive(Debug, Clone)]
pub struct Attribute {
    pub desc: &'static AttrDesc,
    pub dev_id: u32,
    pub values: Values,
}

impl Attribute {
    pub fn new(desc: &'static AttrDesc, dev_id: u32, tunables: &RogTunables) -> Self {
        let values = match desc.kind {
            Kind::Bool => Values::Enumeration(vec![0, 1]),
            Kind::EnumInt(possible) => Values::Enumeration(possible.to_vec()),
            Kind::Tunable(group, _) => {
                let limits = tunables.limits(group);
                Values::Integer {
                    min: limits.min,
                    max: limits.max,
                    default: limits.default,
                    scalar_increment: 1,
                }
            }
            Kind::ValueOnly => Values::ValueOnly,
            Kind::MiniLed if dev_id == DEVID_MINI_LED_MODE2 => Values::Enumeration(vec![0, 1, 2]),
            Kind::MiniLed => Values::Enumeration(vec![0, 1]),
        };
        Self {
            desc,
            dev_id,
            values,
        }
    }

    pub fn name(&self) -> &'static str {
        self.desc.name
    }

    pub fn default_value(&self) -> Option<u32> {
        match self.values {
            Values::Integer { default, .. } => Some(default),
            _ => None,
        }
    }
}

const fn rw(name: &'static str, display_name: &'static str, dev_id: &'static [u32], kind: Kind) -> AttrDesc {
    AttrDesc {
        name,
        display_name,
        dev_ids: dev_id,
        kind,
        guard: Guard::None,
        read_only: false,
        requires_reboot: false,
    }
}

const fn ro(name: &'static str, display_name: &'static str, dev_id: &'static [u32], kind: Kind) -> AttrDesc {
    AttrDesc {
        read_only: true,
        ..rw(name, display_name, dev_id, kind)
    }
}

/* Probe order. The two multi-variant attributes come first so that the
 * guards of the GPU attributes can find the MUX. */
pub static ARMOURY_ATTRIBUTES: &[AttrDesc] = &[
    rw(
        MINI_LED_MODE,
        "Set the mini-LED backlight mode",
        &[DEVID_MINI_LED_MODE, DEVID_MINI_LED_MODE2],
        Kind::MiniLed,
    ),
    AttrDesc {
        guard: Guard::GpuMux,
        requires_reboot: true,
        ..rw(
            GPU_MUX_MODE,
            "Set the GPU display MUX mode",
            &[DEVID_GPU_MUX, DEVID_GPU_MUX_VIVO],
            Kind::Bool,
        )
    },
    ro(
        "egpu_connected",
        "Show the eGPU connection status",
        &[DEVID_EGPU_CONNECTED],
        Kind::Bool,
    ),
    AttrDesc {
        guard: Guard::EgpuEnable,
        ..rw(
            "egpu_enable",
            "Enable the eGPU (also disables dGPU)",
            &[DEVID_EGPU],
            Kind::Bool,
        )
    },
    AttrDesc {
        guard: Guard::DgpuDisable,
        ..rw("dgpu_disable", "Disable the dGPU", &[DEVID_DGPU], Kind::Bool)
    },
    rw(
        "ppt_pl1_spl",
        "Set the CPU slow package limit",
        &[DEVID_PPT_PL1_SPL],
        Kind::Tunable(TunableGroup::Cpu, Seed::CpuDefault),
    ),
    rw(
        "ppt_pl2_sppt",
        "Set the CPU fast package limit",
        &[DEVID_PPT_PL2_SPPT],
        Kind::Tunable(TunableGroup::Cpu, Seed::CpuDefault),
    ),
    rw(
        "ppt_apu_sppt",
        "Set the APU package limit",
        &[DEVID_PPT_APU_SPPT],
        Kind::Tunable(TunableGroup::Platform, Seed::CpuDefault),
    ),
    rw(
        "ppt_platform_sppt",
        "Set the platform package limit",
        &[DEVID_PPT_PLAT_SPPT],
        Kind::Tunable(TunableGroup::Platform, Seed::PlatformDefault),
    ),
    rw(
        "ppt_fppt",
        "Set the CPU fastest package limit",
        &[DEVID_PPT_FPPT],
        Kind::Tunable(TunableGroup::Cpu, Seed::CpuDefault),
    ),
    rw(
        "nv_dynamic_boost",
        "Set the Nvidia dynamic boost limit",
        &[DEVID_NV_DYN_BOOST],
        Kind::Tunable(TunableGroup::NvBoost, Seed::Min),
    ),
    rw(
        "nv_temp_target",
        "Set the Nvidia max thermal limit",
        &[DEVID_NV_THERM_TARGET],
        Kind::Tunable(TunableGroup::NvTemp, Seed::Min),
    ),
    ro(
        "dgpu_base_tgp",
        "Read the base TGP value",
        &[DEVID_DGPU_BASE_TGP],
        Kind::ValueOnly,
    ),
    rw(
        "dgpu_tgp",
        "Set the additional TGP on top of the base TGP",
        &[DEVID_DGPU_SET_TGP],
        Kind::Tunable(TunableGroup::DgpuTgp, Seed::Max),
    ),
    ro(
        "charge_mode",
        "Show the current mode of charging",
        &[DEVID_CHARGE_MODE],
        Kind::EnumInt(&[0, 1, 2]),
    ),
    rw("boot_sound", "Set the boot POST sound", &[DEVID_BOOT_SOUND], Kind::Bool),
    rw(
        MCU_POWERSAVE,
        "Set MCU powersaving mode",
        &[DEVID_MCU_POWERSAVE],
        Kind::Bool,
    ),
    rw(
        "panel_overdrive",
        "Set the panel refresh overdrive",
        &[DEVID_PANEL_OD],
        Kind::Bool,
    ),
    AttrDesc {
        requires_reboot: true,
        ..rw(
            "panel_hd_mode",
            "Set the panel HD mode to UHD<0> or FHD<1>",
            &[DEVID_PANEL_HD],
            Kind::Bool,
        )
    },
];

#[cfg(test)]
pub fn find_desc(name: &str) -> Option<&'static AttrDesc> {
    ARMOURY_ATTRIBUTES.iter().find(|d| d.name == name)
}
