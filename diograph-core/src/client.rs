//! The diory client: a diosphere of rooms, one open room, one focused diory.
//!
//! Each room keeps its own diograph document. Entering a room writes the
//! previous room's diograph, opens the next, then closes the previous.

use crate::graph::{props, GraphError};
use crate::kinds::{Diory, DioryKind, Room, RoomKind};
use crate::persist::{sanitize_segment, DocumentStore, PersistError, PersistentGraph};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Id of the root room and of each room's root diory.
pub const ROOT_ID: &str = "/";

const DEFAULT_DIOSPHERE_DOCUMENT: &str = "diosphere.json";
const DEFAULT_DIOGRAPH_DOCUMENT: &str = "diograph.json";
const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 1000;

/// Errors from client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("No room entered")]
    NoRoom,
}

/// Configuration for a [`DioryClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Quiet window before a mutation is written.
    pub save_debounce: Duration,

    /// Document holding the diosphere.
    pub diosphere_document: String,

    /// File name of each room's diograph document.
    pub diograph_document: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            save_debounce: Duration::from_millis(DEFAULT_SAVE_DEBOUNCE_MS),
            diosphere_document: DEFAULT_DIOSPHERE_DOCUMENT.to_string(),
            diograph_document: DEFAULT_DIOGRAPH_DOCUMENT.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from `DIOGRAPH_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(ms) = get("DIOGRAPH_SAVE_DEBOUNCE_MS") {
            match ms.trim().parse::<u64>() {
                Ok(ms) => config.save_debounce = Duration::from_millis(ms),
                Err(e) => warn!(value = %ms, error = %e, "ignoring DIOGRAPH_SAVE_DEBOUNCE_MS"),
            }
        }
        if let Some(name) = get("DIOGRAPH_DIOSPHERE_DOCUMENT").filter(|n| !n.is_empty()) {
            config.diosphere_document = name;
        }
        if let Some(name) = get("DIOGRAPH_DIOGRAPH_DOCUMENT").filter(|n| !n.is_empty()) {
            config.diograph_document = name;
        }

        config
    }

    pub fn with_save_debounce(mut self, quiet: Duration) -> Self {
        self.save_debounce = quiet;
        self
    }

    pub fn with_diosphere_document(mut self, name: impl Into<String>) -> Self {
        self.diosphere_document = name.into();
        self
    }

    pub fn with_diograph_document(mut self, name: impl Into<String>) -> Self {
        self.diograph_document = name.into();
        self
    }
}

/// Name of the diograph document of `room_id`.
///
/// The root room uses the bare name; other rooms live under `rooms/`.
pub fn room_document_name(room_id: &str, document: &str) -> String {
    if room_id == ROOT_ID {
        document.to_string()
    } else {
        format!("rooms/{}/{}", sanitize_segment(room_id), document)
    }
}

/// Orchestrates the diosphere and the diograph of the current room.
pub struct DioryClient {
    config: ClientConfig,
    store: Arc<dyn DocumentStore>,
    diosphere: PersistentGraph<RoomKind>,
    diograph: Option<PersistentGraph<DioryKind>>,
    room: Option<String>,
    focused: Option<String>,
}

impl DioryClient {
    /// Open the diosphere, then enter the root room and focus its root
    /// diory. Both roots are created when missing.
    pub async fn initialise(
        store: Arc<dyn DocumentStore>,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let diosphere = PersistentGraph::open(
            Arc::clone(&store),
            config.diosphere_document.clone(),
            config.save_debounce,
        )
        .await?;

        {
            let mut rooms = diosphere.lock().await;
            if !rooms.contains_key(ROOT_ID) {
                rooms.add_entity(props(json!({ "id": ROOT_ID })), None)?;
            }
        }

        let mut client = Self {
            config,
            store,
            diosphere,
            diograph: None,
            room: None,
            focused: None,
        };

        client.enter_room(ROOT_ID).await?;
        client.focus_diory(ROOT_ID).await?;
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn diosphere(&self) -> &PersistentGraph<RoomKind> {
        &self.diosphere
    }

    /// The current room's diograph.
    pub fn diograph(&self) -> Result<&PersistentGraph<DioryKind>, ClientError> {
        self.diograph.as_ref().ok_or(ClientError::NoRoom)
    }

    /// Id of the current room.
    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    /// Id of the focused diory.
    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    /// Enter a room (aliases allowed) and open its diograph.
    ///
    /// The previous room's diograph is written first and stays open until
    /// the next one is ready, so a failed enter keeps the current room,
    /// its focus and its changes; calling again writes them again. Focus is
    /// cleared on success.
    pub async fn enter_room(&mut self, id: &str) -> Result<Room, ClientError> {
        let room = self.diosphere.lock().await.get_entity(id)?.clone();

        if let Some(previous) = &self.diograph {
            previous.save_now().await?;
        }

        let name = room_document_name(room.id(), &self.config.diograph_document);
        let diograph =
            PersistentGraph::open(Arc::clone(&self.store), name, self.config.save_debounce).await?;

        {
            let mut diories = diograph.lock().await;
            if !diories.contains_key(ROOT_ID) {
                diories.add_entity(props(json!({ "id": ROOT_ID, "text": "Root" })), None)?;
            }
        }

        info!(room = %room.id(), document = %diograph.name(), "entered room");
        let previous = self.diograph.replace(diograph);
        self.room = Some(room.id().to_string());
        self.focused = None;

        if let Some(previous) = previous {
            let document = previous.name().to_string();
            if let Err(e) = previous.close().await {
                warn!(%document, error = %e, "closing previous room failed");
            }
        }
        Ok(room)
    }

    /// Focus a diory of the current room (aliases allowed).
    pub async fn focus_diory(&mut self, id: &str) -> Result<Diory, ClientError> {
        let diory = self.diograph()?.lock().await.get_entity(id)?.clone();
        self.focused = Some(diory.id().to_string());
        Ok(diory)
    }

    /// Write every pending save now.
    pub async fn flush(&self) -> Result<(), ClientError> {
        self.diosphere.flush().await?;
        if let Some(diograph) = &self.diograph {
            diograph.flush().await?;
        }
        Ok(())
    }

    /// Write every pending save and stop saving.
    pub async fn close(mut self) -> Result<(), ClientError> {
        if let Some(diograph) = self.diograph.take() {
            diograph.close().await?;
        }
        self.diosphere.close().await?;
        Ok(())
    }
}

impl std::fmt::Debug for DioryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DioryClient")
            .field("config", &self.config)
            .field("room", &self.room)
            .field("focused", &self.focused)
            .finish()
    }
}
