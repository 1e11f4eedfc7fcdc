//! The two entity kinds: diories (linked content nodes) and rooms (the
//! containers diories live in, connected by doors).

mod diory;
mod room;

pub use diory::{DataObject, Diograph, Diory, DioryFields, DioryKind};
pub use room::{Diosphere, Room, RoomFields, RoomKind};
