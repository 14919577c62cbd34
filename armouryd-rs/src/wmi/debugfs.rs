/*
 * WMI backend over the asus-nb-wmi debugfs directory.
 *
 * The platform driver exposes its method dispatcher for debugging:
 *   dev_id, ctrl_param, method_id   writable argument registers
 *   dsts   read: "DSTS(0x90016) = 0x10001"
 *   devs   read: "DEVS(0x90016, 0x1) = 0x1"
 *   call   read: "0x53545344(0x90016, 0) = 0x10001"
 *
 * Reading one of the result files evaluates the method with whatever the
 * registers currently hold, so a call is always "write args, read result".
 */

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{METHODID_DEVS, METHODID_DSTS, WmiBackend, WmiError};

pub const DEFAULT_DEBUGFS_PATH: &str = "/sys/kernel/debug/asus-nb-wmi";

pub struct DebugfsWmi {
    root: PathBuf,
}

impl DebugfsWmi {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    async fn write_register(&self, name: &str, value: u32) -> Result<(), WmiError> {
        let path = self.root.join(name);
        tokio::fs::write(&path, format!("{value:#010x}"))
            .await
            .map_err(|source| WmiError::Io { path, source })
    }

    async fn read_result(&self, name: &str) -> Result<u32, WmiError> {
        let path = self.root.join(name);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| WmiError::Io { path, source })?;
        debug!("debugfs {name}: {}", text.trim_end());
        parse_result_line(&text)
    }
}

/* Extract the value after the last `=` of a debugfs result line. The kernel
 * prints with `%#x`, which leaves zero without a `0x` prefix. */
fn parse_result_line(line: &str) -> Result<u32, WmiError> {
    let (_, value) = line
        .trim()
        .rsplit_once('=')
        .ok_or_else(|| WmiError::Protocol(format!("no '=' in '{}'", line.trim())))?;
    let value = value.trim();
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u32::from_str_radix(digits, 16)
        .map_err(|e| WmiError::Protocol(format!("bad value '{value}': {e}")))
}

#[async_trait]
impl WmiBackend for DebugfsWmi {
    fn name(&self) -> &str {
        "debugfs"
    }

    async fn evaluate(
        &mut self,
        method_id: u32,
        dev_id: u32,
        ctrl_param: u32,
    ) -> Result<u32, WmiError> {
        self.write_register("dev_id", dev_id).await?;
        match method_id {
            METHODID_DSTS => self.read_result("dsts").await,
            METHODID_DEVS => {
                self.write_register("ctrl_param", ctrl_param).await?;
                self.read_result("devs").await
            }
            _ => {
                self.write_register("ctrl_param", ctrl_param).await?;
                self.write_register("method_id", method_id).await?;
                self.read_result("call").await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dsts_line() {
        assert_eq!(parse_result_line("DSTS(0x90016) = 0x10001\n").unwrap(), 0x10001);
    }

    #[test]
    fn parse_devs_line() {
        assert_eq!(parse_result_line("DEVS(0x90016, 0x1) = 0x1\n").unwrap(), 1);
    }

    #[test]
    fn parse_zero_without_prefix() {
        assert_eq!(parse_result_line("DEVS(0x90016, 0) = 0\n").unwrap(), 0);
    }

    #[test]
    fn parse_unsupported_sentinel() {
        assert_eq!(
            parse_result_line("DSTS(0x5002e) = 0xfffffffe").unwrap(),
            0xFFFF_FFFE
        );
    }

    #[test]
    fn parse_garbage_fails() {
        assert!(parse_result_line("").is_err());
        assert!(parse_result_line("DSTS(0x1) = t:4").is_err());
    }

    /* A plain directory stands in for debugfs: result files are
     * pre-populated, the registers are checked after the call. */
    #[tokio::test]
    async fn devs_writes_registers_then_reads_result() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("devs"), "DEVS(0x90016, 0x1) = 0x1\n").unwrap();

        let mut wmi = DebugfsWmi::new(dir.path());
        let result = wmi.set_devstate(0x0009_0016, 1).await.unwrap();
        assert_eq!(result, 1);

        let dev_id = std::fs::read_to_string(dir.path().join("dev_id")).unwrap();
        let param = std::fs::read_to_string(dir.path().join("ctrl_param")).unwrap();
        assert_eq!(dev_id, "0x00090016");
        assert_eq!(param, "0x00000001");
    }

    #[tokio::test]
    async fn dsts_reads_dsts_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dsts"), "DSTS(0x90020) = 0x10000\n").unwrap();

        let mut wmi = DebugfsWmi::new(dir.path());
        assert!(wmi.is_present(0x0009_0020).await);
        assert_eq!(wmi.get_devstate_dsts(0x0009_0020).await.unwrap(), 0x10000);
    }

    #[tokio::test]
    async fn missing_directory_is_an_io_error() {
        let mut wmi = DebugfsWmi::new(Path::new("/nonexistent/asus-nb-wmi"));
        let err = wmi.get_devstate_dsts(0x0009_0020).await.unwrap_err();
        assert!(matches!(err, WmiError::Io { .. }));
    }
}
