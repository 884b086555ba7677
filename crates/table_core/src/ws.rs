use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::Entity,
    protocol::{ClientFrame, ServerFrame},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::service::{PushChannel, Subscription};

type Listener = (u64, mpsc::UnboundedSender<Value>);

/// Listeners per room. A room is joined for its first listener and left when
/// its last one goes away.
#[derive(Default)]
struct RoomRegistry {
    next_listener: u64,
    rooms: HashMap<String, Vec<Listener>>,
}

impl RoomRegistry {
    /// Returns the listener id and whether the room was empty before.
    fn add(&mut self, room: &str, sender: mpsc::UnboundedSender<Value>) -> (u64, bool) {
        self.next_listener += 1;
        let listeners = self.rooms.entry(room.to_string()).or_default();
        let first = listeners.is_empty();
        listeners.push((self.next_listener, sender));
        (self.next_listener, first)
    }

    /// Returns whether the room is now empty.
    fn remove(&mut self, room: &str, listener: u64) -> bool {
        let Some(listeners) = self.rooms.get_mut(room) else {
            return false;
        };
        listeners.retain(|(id, _)| *id != listener);
        if listeners.is_empty() {
            self.rooms.remove(room);
            true
        } else {
            false
        }
    }

    fn deliver(&mut self, room: &str, entity: Value) {
        let Some(listeners) = self.rooms.get_mut(room) else {
            debug!(room, "push: snapshot for a room nobody listens to");
            return;
        };
        listeners.retain(|(_, sender)| sender.send(entity.clone()).is_ok());
    }
}

/// One websocket shared by every table of a client; each table joins its own
/// room through [`PushChannel::subscribe`].
pub struct WsPushConnection {
    commands: mpsc::UnboundedSender<ClientFrame>,
    rooms: Arc<StdMutex<RoomRegistry>>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

pub fn push_url(server_url: &str) -> Result<Url> {
    let mut url =
        Url::parse(server_url).with_context(|| format!("invalid server url: {server_url}"))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(anyhow!("unsupported server url scheme: {other}")),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot switch {server_url} to {scheme}"))?;
    let path = format!("{}/ws", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url)
}

impl WsPushConnection {
    pub async fn connect(server_url: &str) -> Result<Self> {
        let ws_url = push_url(server_url)?;
        let (ws_stream, _) = connect_async(ws_url.as_str())
            .await
            .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        info!(%ws_url, "push: connected");

        let (commands, mut command_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let writer_task = tokio::spawn(async move {
            while let Some(frame) = command_rx.recv().await {
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "push: failed to encode client frame");
                        continue;
                    }
                };
                if let Err(err) = ws_writer.send(Message::Text(text)).await {
                    warn!(error = %err, "push: websocket send failed");
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        let rooms = Arc::new(StdMutex::new(RoomRegistry::default()));
        let reader_rooms = Arc::clone(&rooms);
        let reader_task = tokio::spawn(async move {
            while let Some(message) = ws_reader.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(ServerFrame::EntityChanged { room, entity }) => {
                            if let Ok(mut registry) = reader_rooms.lock() {
                                registry.deliver(&room, entity);
                            }
                        }
                        Ok(ServerFrame::Error(error)) => {
                            warn!(code = ?error.code, message = %error.message, "push: error");
                        }
                        Err(err) => warn!(error = %err, "push: invalid server frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "push: websocket receive failed");
                        break;
                    }
                }
            }
            // Dropping every sender ends all open subscriptions.
            if let Ok(mut registry) = reader_rooms.lock() {
                registry.rooms.clear();
            }
            info!("push: connection closed");
        });

        Ok(Self {
            commands,
            rooms,
            reader_task,
            writer_task,
        })
    }
}

fn release_listener(
    rooms: &StdMutex<RoomRegistry>,
    commands: &mpsc::UnboundedSender<ClientFrame>,
    room: &str,
    listener: u64,
) {
    let now_empty = rooms
        .lock()
        .map(|mut registry| registry.remove(room, listener))
        .unwrap_or(false);
    if now_empty {
        let _ = commands.send(ClientFrame::LeaveRoom {
            room: room.to_string(),
        });
    }
}

#[async_trait]
impl<T> PushChannel<T> for WsPushConnection
where
    T: Entity + DeserializeOwned,
{
    async fn subscribe(&self, topic: &str) -> Result<Subscription<T>> {
        let (value_tx, mut value_rx) = mpsc::unbounded_channel::<Value>();
        let (listener, first) = self
            .rooms
            .lock()
            .map_err(|_| anyhow!("push room registry poisoned"))?
            .add(topic, value_tx);
        if first {
            let join = ClientFrame::JoinRoom {
                room: topic.to_string(),
            };
            if self.commands.send(join).is_err() {
                release_listener(&self.rooms, &self.commands, topic, listener);
                return Err(anyhow!("push connection is closed"));
            }
        }

        let (entity_tx, entity_rx) = mpsc::unbounded_channel::<T>();
        let room = topic.to_string();
        tokio::spawn(async move {
            while let Some(value) = value_rx.recv().await {
                match serde_json::from_value::<T>(value) {
                    Ok(entity) => {
                        if entity_tx.send(entity).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(%room, error = %err, "push: undecodable snapshot"),
                }
            }
        });

        let rooms = Arc::clone(&self.rooms);
        let commands = self.commands.clone();
        Ok(Subscription::new(topic, entity_rx, move |topic: &str| {
            release_listener(&rooms, &commands, topic, listener);
        }))
    }
}

impl Drop for WsPushConnection {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

#[cfg(test)]
#[path = "tests/ws_tests.rs"]
mod tests;
