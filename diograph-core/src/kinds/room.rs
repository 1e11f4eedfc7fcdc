//! Rooms and the diosphere.

use crate::graph::{EdgeRef, Entity, EntityKind, Graph};
use crate::schema::FieldSchema;

/// Fields a room recognises besides id, doors and timestamps.
#[derive(Debug, Clone, Default, PartialEq, FieldSchema)]
pub struct RoomFields {
    pub text: Option<String>,
}

/// Marker for the room kind. Doors carry no path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoomKind;

impl EntityKind for RoomKind {
    type Fields = RoomFields;
    const NAME: &'static str = "room";
    const EDGE_FIELD: &'static str = "doors";
    const EDGE_PATHS: bool = false;
}

pub type Room = Entity<RoomKind>;

/// The graph of rooms connected by doors.
pub type Diosphere = Graph<RoomKind>;

impl Entity<RoomKind> {
    pub fn text(&self) -> Option<&str> {
        self.fields().text.as_deref()
    }

    pub fn doors(&self) -> Option<&[EdgeRef]> {
        self.edges()
    }
}
