use crate::error::Result;
use crate::geometry::{clamp_position, resize_from_corner};
use crate::scene::SceneStore;
use crate::types::*;

/// What the pointer went down on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerTarget {
    /// The body of an item.
    Item(ItemId),
    /// One of the four corner grips of an item.
    Handle(ItemId, ResizeHandle),
    /// Empty canvas area.
    Canvas,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragStart {
    pub origin: Point,
    pub pointer: Point,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeStart {
    pub rect: Rect,
    pub pointer: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging { id: ItemId, start: DragStart },
    Resizing { id: ItemId, handle: ResizeHandle, start: ResizeStart },
}

/// Pointer-driven drag and resize state machine.
///
/// Owns all in-flight gesture state. Every pointer event becomes at most one
/// scene mutation, applied immediately and in arrival order.
#[derive(Debug, Default)]
pub struct InteractionController {
    state: DragState,
}

impl InteractionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    /// True while a gesture holds the pointer capture.
    pub fn is_capturing(&self) -> bool {
        !matches!(self.state, DragState::Idle)
    }

    /// Start a gesture. Pointer-down on an item selects it; on empty canvas
    /// nothing happens here (see [`Self::click_canvas`]).
    pub fn pointer_down(&mut self, scene: &mut SceneStore, target: PointerTarget, pointer: Point) {
        match target {
            PointerTarget::Item(id) => {
                let Some(item) = scene.get(id) else {
                    return;
                };
                let origin = Point::new(item.x(), item.y());
                scene.select(Some(id));
                self.state = DragState::Dragging {
                    id,
                    start: DragStart { origin, pointer },
                };
                tracing::debug!(%id, "drag started");
            }
            PointerTarget::Handle(id, handle) => {
                let Some(item) = scene.get(id) else {
                    return;
                };
                let rect = item.rect();
                scene.select(Some(id));
                self.state = DragState::Resizing {
                    id,
                    handle,
                    start: ResizeStart { rect, pointer },
                };
                tracing::debug!(%id, %handle, "resize started");
            }
            PointerTarget::Canvas => {}
        }
    }

    /// Apply the in-flight gesture for the current pointer position.
    ///
    /// Ignored while idle or when the canvas has not been measured.
    pub fn pointer_move(&mut self, scene: &mut SceneStore, pointer: Point) -> Result<()> {
        let Some(canvas) = scene.canvas() else {
            return Ok(());
        };

        match self.state {
            DragState::Idle => Ok(()),
            DragState::Dragging { id, start } => {
                let Some(item) = scene.get(id) else {
                    return Ok(());
                };
                let target = Point::new(
                    start.origin.x + (pointer.x - start.pointer.x),
                    start.origin.y + (pointer.y - start.pointer.y),
                );
                let pos = clamp_position(target, item.width(), item.height(), canvas);
                scene.move_item(id, pos.x, pos.y)
            }
            DragState::Resizing { id, handle, start } => {
                let dx = pointer.x - start.pointer.x;
                let dy = pointer.y - start.pointer.y;
                let min_size = scene.config().min_size;
                let r = resize_from_corner(start.rect, handle, dx, dy, min_size);
                scene.resize_item(id, r.width, r.height, r.x, r.y)
            }
        }
    }

    /// End any gesture and release the pointer capture. Safe to call when idle,
    /// including for a pointer-up that happened outside the canvas.
    pub fn pointer_up(&mut self) {
        if let DragState::Dragging { id, .. } | DragState::Resizing { id, .. } = self.state {
            tracing::debug!(%id, "gesture finished");
        }
        self.state = DragState::Idle;
    }

    /// A click that landed on the canvas itself, not on any item.
    pub fn click_canvas(&mut self, scene: &mut SceneStore) {
        scene.select(None);
    }
}
