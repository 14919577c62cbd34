use zbus::interface;
use zbus::zvariant::ObjectPath;

use crate::actor::ActorHandle;

/* DBus API version exposed to clients. */
pub const API_VERSION: i32 = 1;

/* The org.asuslinux.Armoury1.Manager interface. */
/*  */
/* Entry point for clients to discover the attributes this machine has. */
pub struct ArmouryManager {
    product_name: String,
    attributes: Vec<String>,
    actor: ActorHandle,
}

impl ArmouryManager {
    pub fn new(product_name: String, attributes: Vec<String>, actor: ActorHandle) -> Self {
        Self {
            product_name,
            attributes,
            actor,
        }
    }
}

#[interface(name = "org.asuslinux.Armoury1.Manager")]
impl ArmouryManager {
    /* The DBus API version (constant, read-only). */
    #[zbus(property, name = "APIVersion")]
    async fn api_version(&self) -> i32 {
        API_VERSION
    }

    /* DMI product name, or the configured override. */
    #[zbus(property)]
    async fn product_name(&self) -> String {
        self.product_name.clone()
    }

    /* Object paths of the probed attributes. */
    #[zbus(property)]
    async fn attributes(&self) -> Vec<ObjectPath<'static>> {
        self.attributes
            .iter()
            .filter_map(|p| ObjectPath::try_from(p.as_str()).ok())
            .map(|p| p.to_owned())
            .collect()
    }

    /* True once a setting that only applies after a reboot was changed. */
    #[zbus(property)]
    async fn pending_reboot(&self) -> zbus::fdo::Result<bool> {
        Ok(self.actor.pending_reboot().await?)
    }
}
