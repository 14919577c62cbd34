/* armouryctl DBus client: thin wrapper over the org.asuslinux.Armoury1 API,
 * covering the manager properties and the per-attribute objects. */
//! Low-level DBus client for `org.asuslinux.Armoury1`.
//!
//! All communication with the daemon goes through this module.

use anyhow::{Context, Result, anyhow};
use zbus::Connection;
use zbus::zvariant::{OwnedValue, Value};

const BUS_NAME: &str = "org.asuslinux.Armoury1";
const MANAGER_PATH: &str = "/org/asuslinux/Armoury1";
const MANAGER_IFACE: &str = "org.asuslinux.Armoury1.Manager";
const ATTRIBUTE_IFACE: &str = "org.asuslinux.Armoury1.Attribute";

/// A client that talks to `armouryd` over the system DBus.
pub struct ArmouryClient {
    conn: Connection,
}

/// Everything the daemon exposes about one attribute.
#[derive(Debug)]
pub struct AttributeInfo {
    pub name: String,
    pub display_name: String,
    pub attr_type: String,
    pub read_only: bool,
    pub current_value: Option<u32>,
    pub default_value: u32,
    pub min_value: u32,
    pub max_value: u32,
    pub scalar_increment: u32,
    pub possible_values: Vec<u32>,
    pub requires_reboot: bool,
}

impl ArmouryClient {
    /// Connect to the system bus.
    pub async fn connect() -> Result<Self> {
        let conn = Connection::system()
            .await
            .context("Cannot connect to the system DBus")?;
        Ok(Self { conn })
    }

    // -----------------------------------------------------------------------
    // Manager
    // -----------------------------------------------------------------------

    pub async fn get_api_version(&self) -> Result<i32> {
        self.get_i32_property(MANAGER_PATH, MANAGER_IFACE, "APIVersion").await
    }

    pub async fn get_product_name(&self) -> Result<String> {
        self.get_string_property(MANAGER_PATH, MANAGER_IFACE, "ProductName")
            .await
    }

    pub async fn get_pending_reboot(&self) -> Result<bool> {
        self.get_bool_property(MANAGER_PATH, MANAGER_IFACE, "PendingReboot")
            .await
    }

    /// Object paths of every attribute the daemon exposes.
    pub async fn list_attributes(&self) -> Result<Vec<String>> {
        let val = self
            .get_property(MANAGER_PATH, MANAGER_IFACE, "Attributes")
            .await?;
        extract_object_path_array(val).context("Failed to parse Attributes property")
    }

    /// Resolve an attribute name to its object path.
    pub async fn resolve_attribute(&self, name: &str) -> Result<String> {
        let attributes = self.list_attributes().await?;
        attributes
            .into_iter()
            .find(|path| attribute_name(path) == name)
            .with_context(|| format!("No attribute named '{}' on this machine", name))
    }

    // -----------------------------------------------------------------------
    // Attribute
    // -----------------------------------------------------------------------

    pub async fn get_display_name(&self, path: &str) -> Result<String> {
        self.get_string_property(path, ATTRIBUTE_IFACE, "DisplayName")
            .await
    }

    pub async fn get_current_value(&self, path: &str) -> Result<u32> {
        self.get_u32_property(path, ATTRIBUTE_IFACE, "CurrentValue")
            .await
    }

    /// Store a textual value; the daemon parses and validates it and
    /// returns the stored number.
    pub async fn store(&self, path: &str, value: &str) -> Result<u32> {
        let reply = self
            .conn
            .call_method(Some(BUS_NAME), path, Some(ATTRIBUTE_IFACE), "Store", &(value,))
            .await
            .with_context(|| format!("Failed to set {}", attribute_name(path)))?;
        let stored: u32 = reply.body().deserialize()?;
        Ok(stored)
    }

    pub async fn get_attribute_info(&self, path: &str) -> Result<AttributeInfo> {
        Ok(AttributeInfo {
            name: self.get_string_property(path, ATTRIBUTE_IFACE, "Name").await?,
            display_name: self.get_display_name(path).await?,
            attr_type: self.get_string_property(path, ATTRIBUTE_IFACE, "Type").await?,
            read_only: self.get_bool_property(path, ATTRIBUTE_IFACE, "ReadOnly").await?,
            /* a firmware read can fail without the rest being unusable */
            current_value: self.get_current_value(path).await.ok(),
            default_value: self
                .get_u32_property(path, ATTRIBUTE_IFACE, "DefaultValue")
                .await?,
            min_value: self.get_u32_property(path, ATTRIBUTE_IFACE, "MinValue").await?,
            max_value: self.get_u32_property(path, ATTRIBUTE_IFACE, "MaxValue").await?,
            scalar_increment: self
                .get_u32_property(path, ATTRIBUTE_IFACE, "ScalarIncrement")
                .await?,
            possible_values: self
                .get_vec_u32_property(path, ATTRIBUTE_IFACE, "PossibleValues")
                .await?,
            requires_reboot: self
                .get_bool_property(path, ATTRIBUTE_IFACE, "RequiresReboot")
                .await?,
        })
    }

    // -----------------------------------------------------------------------
    // Generic helpers
    // -----------------------------------------------------------------------

    async fn get_property(&self, path: &str, iface: &str, prop: &str) -> Result<OwnedValue> {
        let reply = self
            .conn
            .call_method(
                Some(BUS_NAME),
                path,
                Some("org.freedesktop.DBus.Properties"),
                "Get",
                &(iface, prop),
            )
            .await
            .with_context(|| format!("Get {}.{} at {} failed", iface, prop, path))?;
        let val: OwnedValue = reply.body().deserialize()?;
        Ok(val)
    }

    async fn get_string_property(&self, path: &str, iface: &str, prop: &str) -> Result<String> {
        let val = self.get_property(path, iface, prop).await?;
        val.downcast_ref::<String>()
            .with_context(|| format!("Type mismatch for {}.{} at {}", iface, prop, path))
    }

    async fn get_u32_property(&self, path: &str, iface: &str, prop: &str) -> Result<u32> {
        let val = self.get_property(path, iface, prop).await?;
        val.downcast_ref::<u32>()
            .with_context(|| format!("Type mismatch for {}.{} at {}", iface, prop, path))
    }

    async fn get_i32_property(&self, path: &str, iface: &str, prop: &str) -> Result<i32> {
        let val = self.get_property(path, iface, prop).await?;
        val.downcast_ref::<i32>()
            .with_context(|| format!("Type mismatch for {}.{} at {}", iface, prop, path))
    }

    async fn get_bool_property(&self, path: &str, iface: &str, prop: &str) -> Result<bool> {
        let val = self.get_property(path, iface, prop).await?;
        val.downcast_ref::<bool>()
            .with_context(|| format!("Type mismatch for {}.{} at {}", iface, prop, path))
    }

    async fn get_vec_u32_property(&self, path: &str, iface: &str, prop: &str) -> Result<Vec<u32>> {
        let val = self.get_property(path, iface, prop).await?;
        extract_u32_array(val)
            .with_context(|| format!("Type mismatch for {}.{} at {}", iface, prop, path))
    }
}

/// The attribute name is the last element of its object path.
pub fn attribute_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Extract a `Vec<String>` of object-path strings from an `OwnedValue`
/// that wraps an array of object-paths.
fn extract_object_path_array(val: OwnedValue) -> Result<Vec<String>> {
    let inner: Value<'_> = val.into();
    match inner {
        Value::Array(arr) => {
            let mut out = Vec::with_capacity(arr.len());
            for item in arr.iter() {
                match item {
                    Value::ObjectPath(p) => out.push(p.to_string()),
                    _ => return Err(anyhow!("Array contains non-object-path value")),
                }
            }
            Ok(out)
        }
        _ => Err(anyhow!("Value is not an array of object paths")),
    }
}

/// Extract a `Vec<u32>` from an `OwnedValue` that wraps an array of u32.
fn extract_u32_array(val: OwnedValue) -> Result<Vec<u32>> {
    let inner: Value<'_> = val.into();
    match inner {
        Value::Array(arr) => {
            let mut out = Vec::with_capacity(arr.len());
            for value in arr.iter() {
                if let Value::U32(number) = value {
                    out.push(*number);
                } else {
                    return Err(anyhow!("Array contains non-u32 value"));
                }
            }
            Ok(out)
        }
        _ => Err(anyhow!("Value is not an array of u32")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_name_is_last_path_element() {
        assert_eq!(
            attribute_name("/org/asuslinux/Armoury1/attributes/gpu_mux_mode"),
            "gpu_mux_mode"
        );
        assert_eq!(attribute_name("boot_sound"), "boot_sound");
    }
}
