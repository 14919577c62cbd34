/* Armoury actor: serializes every firmware call.
 *
 * The probed `Armoury` (and with it the WMI backend) is moved into a
 * single `tokio::spawn`ed task. DBus interface objects talk to it through
 * an `mpsc` channel, so two writes can never interleave their
 * check-then-set sequences on the firmware. */

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use crate::armoury::{Armoury, ArmouryError, ArmouryEvent};
use crate::attributes::Attribute;

/* Commands that DBus interface objects can send to the actor. */
#[derive(Debug)]
pub enum ActorMessage {
    /* Snapshot of the probed attributes. */
    List {
        reply: oneshot::Sender<Vec<Attribute>>,
    },
    /* Read the current value of one attribute. */
    Read {
        name: String,
        reply: oneshot::Sender<Result<u32, ArmouryError>>,
    },
    /* Store a value given as text, parsed like a sysfs store. */
    Store {
        name: String,
        text: String,
        reply: oneshot::Sender<Result<u32, ArmouryError>>,
    },
    /* Store an already numeric value. */
    Write {
        name: String,
        value: u32,
        reply: oneshot::Sender<Result<(), ArmouryError>>,
    },
    PendingReboot {
        reply: oneshot::Sender<bool>,
    },
    /* Stop the actor; pending messages are dropped. */
    Shutdown,
}

/* Handle used by DBus objects to send commands to the actor. */
#[derive(Clone)]
pub struct ActorHandle {
    tx: mpsc::Sender<ActorMessage>,
    events: broadcast::Sender<ArmouryEvent>,
}

impl ActorHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ArmouryEvent> {
        self.events.subscribe()
    }

    /* Request the actor to shut down gracefully. */
    pub async fn shutdown(&self) {
        let _ = self.tx.send(ActorMessage::Shutdown).await;
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ActorMessage,
    ) -> Result<T, ArmouryError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| ArmouryError::Unavailable)?;
        reply_rx.await.map_err(|_| ArmouryError::Unavailable)
    }

    pub async fn list(&self) -> Result<Vec<Attribute>, ArmouryError> {
        self.request(|reply| ActorMessage::List { reply }).await
    }

    pub async fn read(&self, name: &str) -> Result<u32, ArmouryError> {
        let name = name.to_string();
        self.request(|reply| ActorMessage::Read { name, reply })
            .await?
    }

    pub async fn store(&self, name: &str, text: &str) -> Result<u32, ArmouryError> {
        let (name, text) = (name.to_string(), text.to_string());
        self.request(|reply| ActorMessage::Store { name, text, reply })
            .await?
    }

    pub async fn write(&self, name: &str, value: u32) -> Result<(), ArmouryError> {
        let name = name.to_string();
        self.request(|reply| ActorMessage::Write { name, value, reply })
            .await?
    }

    pub async fn pending_reboot(&self) -> Result<bool, ArmouryError> {
        self.request(|reply| ActorMessage::PendingReboot { reply })
            .await
    }
}

struct ArmouryActor {
    armoury: Armoury,
    rx: mpsc::Receiver<ActorMessage>,
}

impl ArmouryActor {
    /* Main actor loop: process messages until shutdown or channel close. */
    async fn run(mut self) {
        info!(
            "Armoury actor started ({} attributes)",
            self.armoury.attributes().len()
        );

        while let Some(msg) = self.rx.recv().await {
            match msg {
                ActorMessage::List { reply } => {
                    let _ = reply.send(self.armoury.attributes().to_vec());
                }
                ActorMessage::Read { name, reply } => {
                    let _ = reply.send(self.armoury.read(&name).await);
                }
                ActorMessage::Store { name, text, reply } => {
                    let _ = reply.send(self.armoury.write(&name, &text).await);
                }
                ActorMessage::Write { name, value, reply } => {
                    let _ = reply.send(self.armoury.write_value(&name, value).await);
                }
                ActorMessage::PendingReboot { reply } => {
                    let _ = reply.send(self.armoury.pending_reboot());
                }
                ActorMessage::Shutdown => {
                    info!("Armoury actor shutting down");
                    break;
                }
            }
        }

        debug!("Armoury actor loop exited");
    }
}

/* Spawn the actor that owns the probed `Armoury` and return a handle for
 * DBus objects. */
pub fn spawn_armoury_actor(armoury: Armoury) -> ActorHandle {
    let (tx, rx) = mpsc::channel(16);
    let events = armoury.event_sender();

    let actor = ArmouryActor { armoury, rx };
    tokio::spawn(async move {
        actor.run().await;
    });

    ActorHandle { tx, events }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::armoury::Quirks;
    use crate::tunables::RogTunables;
    use crate::wmi::simulated::SimulatedWmi;
    use crate::wmi::{DEVID_BOOT_SOUND, DEVID_PANEL_HD};

    async fn spawn(wmi: &SimulatedWmi) -> ActorHandle {
        let armoury =
            Armoury::probe(Box::new(wmi.clone()), RogTunables::default(), Quirks::default()).await;
        spawn_armoury_actor(armoury)
    }

    #[tokio::test]
    async fn list_read_and_write_through_actor() {
        let wmi = SimulatedWmi::new().with_device(DEVID_BOOT_SOUND, 0);
        let handle = spawn(&wmi).await;

        let attrs = handle.list().await.unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].name(), "boot_sound");
        assert_eq!(attrs[0].dev_id, DEVID_BOOT_SOUND);

        handle.write("boot_sound", 1).await.unwrap();
        assert_eq!(handle.read("boot_sound").await.unwrap(), 1);
        assert_eq!(handle.store("boot_sound", "0\n").await.unwrap(), 0);
        assert_eq!(wmi.value(DEVID_BOOT_SOUND), Some(0));
    }

    #[tokio::test]
    async fn errors_cross_the_channel() {
        let wmi = SimulatedWmi::new().with_device(DEVID_BOOT_SOUND, 0);
        let handle = spawn(&wmi).await;

        assert!(matches!(
            handle.store("boot_sound", "2").await,
            Err(ArmouryError::OutOfRange { .. })
        ));
        assert!(matches!(
            handle.read("nope").await,
            Err(ArmouryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn events_reach_subscribers() {
        let wmi = SimulatedWmi::new().with_device(DEVID_PANEL_HD, 0);
        let handle = spawn(&wmi).await;
        let mut rx = handle.subscribe();

        handle.write("panel_hd_mode", 1).await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), ArmouryEvent::Changed { value: 1, .. }));
        assert_eq!(rx.recv().await.unwrap(), ArmouryEvent::PendingReboot);
        assert!(handle.pending_reboot().await.unwrap());
    }

    #[tokio::test]
    async fn requests_after_shutdown_are_unavailable() {
        let wmi = SimulatedWmi::new();
        let handle = spawn(&wmi).await;

        handle.shutdown().await;
        /* queued behind the shutdown, so the reply sender is dropped */
        assert!(matches!(
            handle.pending_reboot().await,
            Err(ArmouryError::Unavailable)
        ));
    }
}
