/* In-memory firmware used by the test-suite and, with the dev-hooks
 * feature, by the daemon itself. Device states are kept as raw DSTS words
 * so that presence bits and unsupported sentinels can be simulated too. */

#![cfg_attr(not(test), allow(dead_code))]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{
    DSTS_PRESENCE_BIT, METHODID_DEVS, METHODID_DSTS, UNSUPPORTED_METHOD, WmiBackend, WmiError,
};

/* One recorded `evaluate` call. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WmiCall {
    pub method_id: u32,
    pub dev_id: u32,
    pub ctrl_param: u32,
}

#[derive(Debug, Default)]
struct SimulatedState {
    dsts: HashMap<u32, u32>,
    devs_results: HashMap<u32, u32>,
    calls: Vec<WmiCall>,
}

/* Cloning shares the same firmware state, which lets a test keep a handle
 * after the backend has been boxed and moved into the engine. */
#[derive(Debug, Clone, Default)]
pub struct SimulatedWmi {
    state: Arc<Mutex<SimulatedState>>,
}

/* JSON description of a simulated machine:
 *
 * { "devices": { "0x00090016": 1 }, "devs_results": { "0x00050019": 0 } }
 *
 * Device ids are hex strings, values are the state without presence bit. */
#[derive(Debug, Default, Deserialize)]
pub struct SimulatedMachine {
    #[serde(default)]
    pub devices: HashMap<String, u32>,
    #[serde(default)]
    pub devs_results: HashMap<String, u32>,
}

fn parse_dev_id(s: &str) -> Result<u32, WmiError> {
    let digits = s.trim().trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16)
        .map_err(|e| WmiError::Protocol(format!("invalid device id '{s}': {e}")))
}

impl SimulatedWmi {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /* Add a present device holding `value`. */
    pub fn with_device(self, dev_id: u32, value: u32) -> Self {
        self.state().dsts.insert(dev_id, value | DSTS_PRESENCE_BIT);
        self
    }

    /* Make every DEVS call on `dev_id` return `result`. */
    pub fn with_devs_result(self, dev_id: u32, result: u32) -> Self {
        self.state().devs_results.insert(dev_id, result);
        self
    }

    /* Overwrite the raw DSTS word, presence bit not implied. */
    pub fn set_raw_dsts(&self, dev_id: u32, raw: u32) {
        self.state().dsts.insert(dev_id, raw);
    }

    /* Change the state of an existing device, as the firmware would on its own. */
    pub fn set_value(&self, dev_id: u32, value: u32) {
        self.state().dsts.insert(dev_id, value | DSTS_PRESENCE_BIT);
    }

    /* Current state of `dev_id` without the presence bit. */
    pub fn value(&self, dev_id: u32) -> Option<u32> {
        self.state().dsts.get(&dev_id).map(|v| v & !DSTS_PRESENCE_BIT)
    }

    pub fn calls(&self) -> Vec<WmiCall> {
        self.state().calls.clone()
    }

    /* The `(dev_id, value)` pairs of every DEVS call so far. */
    pub fn devs_calls(&self) -> Vec<(u32, u32)> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.method_id == METHODID_DEVS)
            .map(|c| (c.dev_id, c.ctrl_param))
            .collect()
    }

    pub fn from_machine(machine: SimulatedMachine) -> Result<Self, WmiError> {
        let mut wmi = Self::new();
        for (id, value) in &machine.devices {
            wmi = wmi.with_device(parse_dev_id(id)?, *value);
        }
        for (id, result) in &machine.devs_results {
            wmi = wmi.with_devs_result(parse_dev_id(id)?, *result);
        }
        Ok(wmi)
    }

    pub fn from_json(json: &str) -> Result<Self, WmiError> {
        if json.trim().is_empty() {
            return Ok(Self::new());
        }
        let machine: SimulatedMachine = serde_json::from_str(json)
            .map_err(|e| WmiError::Protocol(format!("simulated firmware JSON: {e}")))?;
        Self::from_machine(machine)
    }

    #[cfg(feature = "dev-hooks")]
    pub fn from_json_file(path: &std::path::Path) -> Result<Self, WmiError> {
        let json = std::fs::read_to_string(path).map_err(|source| WmiError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

#[async_trait]
impl WmiBackend for SimulatedWmi {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn evaluate(
        &mut self,
        method_id: u32,
        dev_id: u32,
        ctrl_param: u32,
    ) -> Result<u32, WmiError> {
        let mut state = self.state();
        state.calls.push(WmiCall {
            method_id,
            dev_id,
            ctrl_param,
        });

        match method_id {
            METHODID_DSTS => Ok(state.dsts.get(&dev_id).copied().unwrap_or(UNSUPPORTED_METHOD)),
            METHODID_DEVS => {
                let present = state.dsts.contains_key(&dev_id);
                let result = state
                    .devs_results
                    .get(&dev_id)
                    .copied()
                    .unwrap_or(u32::from(present));
                if result == 1 {
                    state.dsts.insert(dev_id, ctrl_param | DSTS_PRESENCE_BIT);
                }
                debug!("DEVS({dev_id:#010x}, {ctrl_param:#x}) = {result:#x}");
                Ok(result)
            }
            _ => Err(WmiError::Protocol(format!(
                "simulated firmware has no method {method_id:#010x}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wmi::{DEVID_DGPU, DEVID_GPU_MUX, DEVID_PANEL_OD};

    #[tokio::test]
    async fn devs_updates_state_on_success() {
        let mut wmi = SimulatedWmi::new().with_device(DEVID_DGPU, 0);
        let handle = wmi.clone();

        assert_eq!(wmi.set_devstate(DEVID_DGPU, 1).await.unwrap(), 1);
        assert_eq!(handle.value(DEVID_DGPU), Some(1));
        assert_eq!(handle.devs_calls(), vec![(DEVID_DGPU, 1)]);
    }

    #[tokio::test]
    async fn devs_failure_leaves_state_alone() {
        let mut wmi = SimulatedWmi::new()
            .with_device(DEVID_PANEL_OD, 0)
            .with_devs_result(DEVID_PANEL_OD, 2);

        assert_eq!(wmi.set_devstate(DEVID_PANEL_OD, 1).await.unwrap(), 2);
        assert_eq!(wmi.value(DEVID_PANEL_OD), Some(0));
    }

    #[tokio::test]
    async fn devs_on_absent_device_fails() {
        let mut wmi = SimulatedWmi::new();
        assert_eq!(wmi.set_devstate(DEVID_GPU_MUX, 0).await.unwrap(), 0);
    }

    #[test]
    fn parses_json_description() {
        let wmi = SimulatedWmi::from_json(
            r#"{ "devices": { "0x00090016": 1, "00090020": 0 },
                 "devs_results": { "0x00050019": 0 } }"#,
        )
        .unwrap();
        assert_eq!(wmi.value(DEVID_GPU_MUX), Some(1));
        assert_eq!(wmi.value(DEVID_DGPU), Some(0));
        assert_eq!(wmi.value(DEVID_PANEL_OD), None);
    }

    #[test]
    fn empty_json_is_an_empty_machine() {
        let wmi = SimulatedWmi::from_json("  ").unwrap();
        assert!(wmi.calls().is_empty());
        assert_eq!(wmi.value(DEVID_GPU_MUX), None);
    }

    #[test]
    fn bad_device_id_is_rejected() {
        assert!(SimulatedWmi::from_json(r#"{ "devices": { "zz": 1 } }"#).is_err());
    }

    #[test]
    fn shipped_g14_description_parses() {
        let wmi = SimulatedWmi::from_json(include_str!("../../data/simulated/g14.json")).unwrap();
        assert_eq!(wmi.value(DEVID_GPU_MUX), Some(1));
        assert_eq!(wmi.value(DEVID_PANEL_OD), Some(1));
    }
}
