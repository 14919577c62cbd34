pub mod attribute;
pub mod manager;

use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, info, warn};
use zbus::connection::Builder;
use zbus::fdo;

use crate::actor::ActorHandle;
use crate::armoury::{ArmouryError, ArmouryEvent};
use crate::wmi::WmiError;

pub const BUS_NAME: &str = "org.asuslinux.Armoury1";
pub const MANAGER_PATH: &str = "/org/asuslinux/Armoury1";

pub fn attribute_path(name: &str) -> String {
    format!("{MANAGER_PATH}/attributes/{name}")
}

impl From<ArmouryError> for fdo::Error {
    fn from(err: ArmouryError) -> Self {
        let msg = err.to_string();
        match err {
            ArmouryError::NotFound(_)
            | ArmouryError::InvalidValue(_)
            | ArmouryError::OutOfRange { .. } => fdo::Error::InvalidArgs(msg),
            ArmouryError::ReadOnly(_) => fdo::Error::AccessDenied(msg),
            ArmouryError::Wmi(WmiError::NotSupported { .. }) => fdo::Error::NotSupported(msg),
            ArmouryError::Wmi(_) | ArmouryError::FirmwareRejected { .. } => {
                fdo::Error::IOError(msg)
            }
            ArmouryError::Blocked(_) | ArmouryError::Unavailable => fdo::Error::Failed(msg),
        }
    }
}

/* Turn an actor event into `PropertiesChanged` on the matching object. */
/* PendingReboot only ever goes from false to true, so it is announced once. */
fn should_forward(reboot_announced: &mut bool, event: &ArmouryEvent) -> bool {
    if *event == ArmouryEvent::PendingReboot {
        if *reboot_announced {
            return false;
        }
        *reboot_announced = true;
    }
    true
}

async fn emit_change(conn: &zbus::Connection, event: &ArmouryEvent) -> zbus::Result<()> {
    let object_server = conn.object_server();
    match event {
        ArmouryEvent::Changed { name, .. } => {
            let iface_ref = object_server
                .interface::<_, attribute::ArmouryAttribute>(attribute_path(name).as_str())
                .await?;
            iface_ref
                .get()
                .await
                .current_value_changed(iface_ref.signal_emitter())
                .await
        }
        ArmouryEvent::PendingReboot => {
            let iface_ref = object_server
                .interface::<_, manager::ArmouryManager>(MANAGER_PATH)
                .await?;
            iface_ref
                .get()
                .await
                .pending_reboot_changed(iface_ref.signal_emitter())
                .await
        }
    }
}

/* Starts the DBus server and registers the manager and one object per
 * probed attribute. */
/*  */
/* Blocks until SIGINT or SIGTERM, then unregisters everything and stops
 * the actor. */
pub async fn run_server(actor: ActorHandle, product_name: String) -> Result<()> {
    let attributes = actor.list().await.context("Failed to list attributes")?;
    let paths: Vec<String> = attributes.iter().map(|a| attribute_path(a.name())).collect();

    /* Subscribe before anything is reachable so no change is missed */
    let mut events = BroadcastStream::new(actor.subscribe());

    let manager = manager::ArmouryManager::new(product_name, paths.clone(), actor.clone());
    let conn = Builder::system()?
        .name(BUS_NAME)?
        .serve_at(MANAGER_PATH, manager)?
        .build()
        .await
        .context("Failed to connect to the system bus")?;

    let object_server = conn.object_server();
    for (attr, path) in attributes.into_iter().zip(&paths) {
        let name = attr.name();
        let obj = attribute::ArmouryAttribute::new(attr, actor.clone());
        if let Err(e) = object_server.at(path.as_str(), obj).await {
            warn!("Failed to register attribute {}: {}", name, e);
        }
    }

    info!(
        "DBus server ready on {} ({} attributes)",
        BUS_NAME,
        paths.len()
    );

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut reboot_announced = false;

    /* Main event loop: forward actor events until asked to stop */
    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(Ok(event)) => {
                    if !should_forward(&mut reboot_announced, &event) {
                        continue;
                    }
                    debug!("Forwarding {:?}", event);
                    if let Err(e) = emit_change(&conn, &event).await {
                        warn!("Failed to emit change for {:?}: {}", event, e);
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(n))) => {
                    warn!("Dropped {} attribute events", n);
                }
                None => {
                    info!("Event channel closed, shutting down");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                break;
            }
        }
    }

    for path in paths.iter().rev() {
        let _ = object_server
            .remove::<attribute::ArmouryAttribute, _>(path.as_str())
            .await;
    }
    let _ = object_server
        .remove::<manager::ArmouryManager, _>(MANAGER_PATH)
        .await;
    actor.shutdown().await;

    info!("Removed {} attribute objects", paths.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_reboot_is_forwarded_once() {
        let mut announced = false;
        let changed = ArmouryEvent::Changed { name: "panel_hd_mode".to_string(), value: 1 };

        assert!(should_forward(&mut announced, &changed));
        assert!(should_forward(&mut announced, &ArmouryEvent::PendingReboot));
        assert!(announced);
        assert!(!should_forward(&mut announced, &ArmouryEvent::PendingReboot));
        assert!(should_forward(&mut announced, &changed));
    }

    #[test]
    fn attribute_paths_are_valid_object_paths() {
        for desc in crate::attributes::ARMOURY_ATTRIBUTES {
            let path = attribute_path(desc.name);
            assert!(
                zbus::zvariant::ObjectPath::try_from(path.as_str()).is_ok(),
                "{path}"
            );
        }
        assert_eq!(
            attribute_path("gpu_mux_mode"),
            "/org/asuslinux/Armoury1/attributes/gpu_mux_mode"
        );
    }

    #[test]
    fn errors_map_to_dbus_errors() {
        assert!(matches!(
            fdo::Error::from(ArmouryError::OutOfRange { value: 9, min: 0, max: 1 }),
            fdo::Error::InvalidArgs(_)
        ));
        assert!(matches!(
            fdo::Error::from(ArmouryError::InvalidValue("x".into())),
            fdo::Error::InvalidArgs(_)
        ));
        assert!(matches!(
            fdo::Error::from(ArmouryError::ReadOnly("charge_mode".into())),
            fdo::Error::AccessDenied(_)
        ));
        assert!(matches!(
            fdo::Error::from(ArmouryError::Wmi(WmiError::NotSupported { dev_id: 1 })),
            fdo::Error::NotSupported(_)
        ));
        assert!(matches!(
            fdo::Error::from(ArmouryError::FirmwareRejected { name: "boot_sound".into(), result: 0 }),
            fdo::Error::IOError(_)
        ));
        assert!(matches!(
            fdo::Error::from(ArmouryError::Blocked("busy".into())),
            fdo::Error::Failed(_)
        ));
    }

    #[test]
    fn error_message_is_kept() {
        let err = fdo::Error::from(ArmouryError::OutOfRange { value: 151, min: 5, max: 150 });
        let fdo::Error::InvalidArgs(msg) = err else {
            panic!("unexpected variant");
        };
        assert_eq!(msg, "value 151 out of range 5..=150");
    }
}
