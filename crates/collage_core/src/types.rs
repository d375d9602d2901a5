use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::media::MediaHandle;

// ---------------------------------------------------------------------------
// ItemId
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "video-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Point / Size / Rect
// ---------------------------------------------------------------------------

/// A position in canvas-local coordinates.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Measured extent of the editing canvas.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl CanvasSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// A canvas only counts as measured once both axes are positive.
    pub fn is_measured(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    /// Multiply every component by the per-axis scale.
    pub fn scaled(&self, sx: f64, sy: f64) -> Rect {
        Rect {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
        }
    }
}

// ---------------------------------------------------------------------------
// ResizeHandle
// ---------------------------------------------------------------------------

/// Corner grip used to resize an item. The opposite corner is the anchor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResizeHandle {
    Nw,
    Ne,
    Sw,
    Se,
}

impl ResizeHandle {
    pub const ALL: [ResizeHandle; 4] = [Self::Nw, Self::Ne, Self::Sw, Self::Se];

    /// True when dragging this corner moves the item's left edge.
    pub fn moves_left_edge(self) -> bool {
        matches!(self, Self::Nw | Self::Sw)
    }

    /// True when dragging this corner moves the item's top edge.
    pub fn moves_top_edge(self) -> bool {
        matches!(self, Self::Nw | Self::Ne)
    }
}

impl fmt::Display for ResizeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Nw => "nw",
            Self::Ne => "ne",
            Self::Sw => "sw",
            Self::Se => "se",
        };
        f.write_str(s)
    }
}

impl FromStr for ResizeHandle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "nw" => Ok(Self::Nw),
            "ne" => Ok(Self::Ne),
            "sw" => Ok(Self::Sw),
            "se" => Ok(Self::Se),
            other => Err(format!("unknown resize handle: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// One placed video clip. Only the scene store constructs or mutates items.
#[derive(Debug)]
pub struct Item {
    pub(crate) id: ItemId,
    pub(crate) media: MediaHandle,
    pub(crate) display_name: String,
    pub(crate) rect: Rect,
    pub(crate) z_order: i64,
}

impl Item {
    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn x(&self) -> f64 {
        self.rect.x
    }

    pub fn y(&self) -> f64 {
        self.rect.y
    }

    pub fn width(&self) -> f64 {
        self.rect.width
    }

    pub fn height(&self) -> f64 {
        self.rect.height
    }

    pub fn z_order(&self) -> i64 {
        self.z_order
    }

    pub fn media(&self) -> &MediaHandle {
        &self.media
    }

    /// Plain geometry view of the item, safe to hand to UI layers.
    pub fn geometry(&self) -> ItemGeometry {
        ItemGeometry {
            id: self.id,
            display_name: self.display_name.clone(),
            rect: self.rect,
            z_order: self.z_order,
        }
    }
}

/// Serializable geometry of one item, without its media handle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemGeometry {
    pub id: ItemId,
    pub display_name: String,
    pub rect: Rect,
    pub z_order: i64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
