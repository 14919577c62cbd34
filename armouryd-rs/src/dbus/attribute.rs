use zbus::interface;

use crate::actor::ActorHandle;
use crate::attributes::{Attribute, Values};

/* The org.asuslinux.Armoury1.Attribute interface. */
/*  */
/* One firmware attribute, mirroring a firmware-attributes class
 * directory. Everything but `CurrentValue` is fixed at probe time. */
pub struct ArmouryAttribute {
    attr: Attribute,
    actor: ActorHandle,
}

impl ArmouryAttribute {
    pub fn new(attr: Attribute, actor: ActorHandle) -> Self {
        Self { attr, actor }
    }
}

#[interface(name = "org.asuslinux.Armoury1.Attribute")]
impl ArmouryAttribute {
    #[zbus(property)]
    async fn name(&self) -> String {
        self.attr.name().to_string()
    }

    #[zbus(property)]
    async fn display_name(&self) -> String {
        self.attr.desc.display_name.to_string()
    }

    /* "integer" or "enumeration". */
    #[zbus(property, name = "Type")]
    async fn attr_type(&self) -> String {
        self.attr.values.attr_type().as_str().to_string()
    }

    #[zbus(property)]
    async fn read_only(&self) -> bool {
        self.attr.desc.read_only
    }

    /* Current value, read from the firmware (read-write). */
    #[zbus(property)]
    async fn current_value(&self) -> zbus::fdo::Result<u32> {
        Ok(self.actor.read(self.attr.name()).await?)
    }

    #[zbus(property)]
    async fn set_current_value(&self, value: u32) -> zbus::fdo::Result<()> {
        Ok(self.actor.write(self.attr.name(), value).await?)
    }

    /* Default of a tunable; 0 for everything else. */
    #[zbus(property)]
    async fn default_value(&self) -> u32 {
        self.attr.default_value().unwrap_or(0)
    }

    #[zbus(property)]
    async fn min_value(&self) -> u32 {
        self.attr.values.bounds().0
    }

    #[zbus(property)]
    async fn max_value(&self) -> u32 {
        self.attr.values.bounds().1
    }

    #[zbus(property)]
    async fn scalar_increment(&self) -> u32 {
        match self.attr.values {
            Values::Integer {
                scalar_increment, ..
            } => scalar_increment,
            _ => 0,
        }
    }

    /* Accepted values of an enumeration; empty for integers. */
    #[zbus(property)]
    async fn possible_values(&self) -> Vec<u32> {
        match &self.attr.values {
            Values::Enumeration(possible) => possible.clone(),
            _ => Vec::new(),
        }
    }

    #[zbus(property)]
    async fn requires_reboot(&self) -> bool {
        self.attr.desc.requires_reboot
    }

    /* Store a value given as text, the way `current_value` is written in
     * sysfs. Returns the stored value. */
    async fn store(&self, value: &str) -> zbus::fdo::Result<u32> {
        Ok(self.actor.store(self.attr.name(), value).await?)
    }
}
