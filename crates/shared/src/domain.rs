use serde::{Deserialize, Serialize};

macro_rules! wire_newtype {
    ($name:ident, $repr:ty) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub $repr);
    };
}

wire_newtype!(CanvasId, u8);
wire_newtype!(ChunkId, u16);
wire_newtype!(Color, u8);

/// A point on the unbounded canvas plane. Palette semantics of the colors
/// placed here belong to the service; this side only moves indices around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldPoint {
    pub x: i32,
    pub y: i32,
}

impl WorldPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Address of one 256x256 tile of the plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub i: i32,
    pub j: i32,
}

impl ChunkCoord {
    pub const fn new(i: i32, j: i32) -> Self {
        Self { i, j }
    }
}
