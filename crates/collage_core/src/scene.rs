use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::arrange::arrange;
use crate::config::CollageConfig;
use crate::error::{CoreError, Result};
use crate::geometry::{centered_on, clamp_position};
use crate::media::{MediaHandle, SourceRef};
use crate::types::*;

/// Why an export request did not start.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SkipReason {
    NoItems,
    CanvasUnknown,
    AlreadyExporting,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::NoItems => "no items on the canvas",
            SkipReason::CanvasUnknown => "canvas has not been measured",
            SkipReason::AlreadyExporting => "an export is already running",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// SceneLock
// ---------------------------------------------------------------------------

/// Held for the lifetime of an export snapshot. While it exists every
/// mutating scene operation fails with [`CoreError::SceneLocked`].
#[derive(Debug)]
pub struct SceneLock {
    flag: Arc<AtomicBool>,
}

impl SceneLock {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for SceneLock {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// SceneSnapshot
// ---------------------------------------------------------------------------

/// Frozen geometry of one item plus its live source. The source stays
/// unreleased for as long as the snapshot holds it.
#[derive(Clone)]
pub struct SnapshotItem {
    pub id: ItemId,
    pub display_name: String,
    pub rect: Rect,
    pub z_order: i64,
    pub source: SourceRef,
}

impl fmt::Debug for SnapshotItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotItem")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("rect", &self.rect)
            .field("z_order", &self.z_order)
            .finish_non_exhaustive()
    }
}

/// Immutable copy of the scene taken at export start. Items are already in
/// paint order (ascending `z_order`).
#[derive(Debug)]
pub struct SceneSnapshot {
    pub canvas: CanvasSize,
    pub items: Vec<SnapshotItem>,
    _lock: SceneLock,
}

// ---------------------------------------------------------------------------
// SceneStore
// ---------------------------------------------------------------------------

/// Authoritative, ordered collection of items on the canvas.
#[derive(Debug)]
pub struct SceneStore {
    config: CollageConfig,
    items: Vec<Item>,
    selected: Option<ItemId>,
    canvas: Option<CanvasSize>,
    export_lock: Arc<AtomicBool>,
}

impl Default for SceneStore {
    fn default() -> Self {
        Self::new(CollageConfig::default())
    }
}

impl SceneStore {
    pub fn new(config: CollageConfig) -> Self {
        Self {
            config,
            items: Vec::new(),
            selected: None,
            canvas: None,
            export_lock: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &CollageConfig {
        &self.config
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn canvas(&self) -> Option<CanvasSize> {
        self.canvas
    }

    /// Record the measured canvas extent. Unmeasured (zero) sizes count as unknown.
    pub fn set_canvas_size(&mut self, size: Option<CanvasSize>) {
        self.canvas = size.filter(CanvasSize::is_measured);
    }

    pub fn selected(&self) -> Option<ItemId> {
        self.selected
    }

    /// Select an item, or clear the selection. Unknown ids clear it.
    pub fn select(&mut self, id: Option<ItemId>) {
        self.selected = id.filter(|id| self.get(*id).is_some());
    }

    pub fn is_locked(&self) -> bool {
        self.export_lock.load(Ordering::Acquire)
    }

    /// Items sorted by ascending `z_order`; ties keep store order. The live
    /// view and the export both paint in this order.
    pub fn paint_order(&self) -> Vec<&Item> {
        let mut ordered: Vec<&Item> = self.items.iter().collect();
        ordered.sort_by_key(|item| item.z_order);
        ordered
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.is_locked() {
            return Err(CoreError::SceneLocked);
        }
        Ok(())
    }

    fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    /// Place a new item on top of every existing one and select it.
    ///
    /// With a drop point the item is centered under it; otherwise it lands
    /// at a random position inside the canvas.
    pub fn add_item(
        &mut self,
        media: MediaHandle,
        display_name: impl Into<String>,
        drop_point: Option<Point>,
    ) -> Result<ItemId> {
        self.ensure_unlocked()?;

        let width = self.config.default_item_width;
        let height = self.config.default_item_height;
        let canvas = self.canvas.unwrap_or(self.config.fallback_canvas);

        let position = match drop_point {
            Some(point) => centered_on(point, width, height, canvas),
            None => {
                let mut rng = rand::thread_rng();
                let max_x = (canvas.width - width).max(0.0);
                let max_y = (canvas.height - height).max(0.0);
                Point::new(rng.gen::<f64>() * max_x, rng.gen::<f64>() * max_y)
            }
        };

        let z_order = self.items.iter().map(|i| i.z_order + 1).max().unwrap_or(0);
        let id = ItemId::new();
        let display_name = display_name.into();

        tracing::info!(%id, name = %display_name, x = position.x, y = position.y, "item added");

        self.items.push(Item {
            id,
            media,
            display_name,
            rect: Rect::new(position.x, position.y, width, height),
            z_order,
        });
        self.selected = Some(id);
        Ok(id)
    }

    /// Move an item, clamped into the canvas. Unknown ids and an unmeasured
    /// canvas make this a no-op.
    pub fn move_item(&mut self, id: ItemId, x: f64, y: f64) -> Result<()> {
        self.ensure_unlocked()?;
        let Some(canvas) = self.canvas else {
            tracing::debug!(%id, "move ignored: canvas not measured");
            return Ok(());
        };
        if let Some(item) = self.item_mut(id) {
            let pos = clamp_position(Point::new(x, y), item.rect.width, item.rect.height, canvas);
            item.rect.x = pos.x;
            item.rect.y = pos.y;
        }
        Ok(())
    }

    /// Set size and position together. The caller computes the anchored
    /// position; sizes are floored at the configured minimum.
    pub fn resize_item(&mut self, id: ItemId, width: f64, height: f64, x: f64, y: f64) -> Result<()> {
        self.ensure_unlocked()?;
        let min_size = self.config.min_size;
        if let Some(item) = self.item_mut(id) {
            item.rect = Rect::new(x, y, width.max(min_size), height.max(min_size));
        }
        Ok(())
    }

    /// Remove an item and release its media. Returns whether anything was removed.
    pub fn delete_item(&mut self, id: ItemId) -> Result<bool> {
        self.ensure_unlocked()?;
        let Some(pos) = self.items.iter().position(|i| i.id == id) else {
            return Ok(false);
        };
        let item = self.items.remove(pos);
        if self.selected == Some(id) {
            self.selected = None;
        }
        tracing::info!(%id, name = %item.display_name, "item removed");
        drop(item);
        Ok(true)
    }

    /// Remove every item, releasing all media handles.
    pub fn clear_all(&mut self) -> Result<()> {
        self.ensure_unlocked()?;
        let count = self.items.len();
        self.items.clear();
        self.selected = None;
        tracing::info!(count, "all items cleared");
        Ok(())
    }

    pub fn bring_to_front(&mut self, id: ItemId) -> Result<()> {
        self.ensure_unlocked()?;
        if self.get(id).is_none() {
            return Ok(());
        }
        let top = self.items.iter().map(|i| i.z_order).max().unwrap_or(0);
        if let Some(item) = self.item_mut(id) {
            item.z_order = top + 1;
        }
        Ok(())
    }

    pub fn send_to_back(&mut self, id: ItemId) -> Result<()> {
        self.ensure_unlocked()?;
        if self.get(id).is_none() {
            return Ok(());
        }
        let bottom = self.items.iter().map(|i| i.z_order).min().unwrap_or(0);
        if let Some(item) = self.item_mut(id) {
            item.z_order = bottom - 1;
        }
        Ok(())
    }

    /// Lay every item out on a grid, in store order. Returns whether a
    /// layout was applied.
    pub fn auto_arrange(&mut self) -> Result<bool> {
        self.ensure_unlocked()?;
        let Some(canvas) = self.canvas else {
            return Ok(false);
        };
        if self.items.is_empty() {
            return Ok(false);
        }

        let rects = arrange(self.items.len(), canvas, self.config.padding);
        let min_size = self.config.min_size;
        for (item, rect) in self.items.iter_mut().zip(rects) {
            item.rect = Rect::new(rect.x, rect.y, rect.width.max(min_size), rect.height.max(min_size));
        }
        tracing::info!(count = self.items.len(), "items arranged in grid");
        Ok(true)
    }

    /// Freeze the scene for export and lock it against mutation until the
    /// returned snapshot is dropped.
    pub fn snapshot_for_export(&self) -> std::result::Result<SceneSnapshot, SkipReason> {
        if self.items.is_empty() {
            return Err(SkipReason::NoItems);
        }
        let canvas = self.canvas.ok_or(SkipReason::CanvasUnknown)?;
        let lock = SceneLock::acquire(&self.export_lock).ok_or(SkipReason::AlreadyExporting)?;

        let items = self
            .paint_order()
            .into_iter()
            .map(|item| SnapshotItem {
                id: item.id,
                display_name: item.display_name.clone(),
                rect: item.rect,
                z_order: item.z_order,
                source: item.media.source(),
            })
            .collect();

        Ok(SceneSnapshot {
            canvas,
            items,
            _lock: lock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::tests::counting_handle;
    use proptest::prelude::*;
    use std::sync::atomic::Ordering;

    fn store_with_canvas(w: f64, h: f64) -> SceneStore {
        let mut store = SceneStore::default();
        store.set_canvas_size(Some(CanvasSize::new(w, h)));
        store
    }

    fn add(store: &mut SceneStore, name: &str, drop: Option<Point>) -> ItemId {
        let (handle, _) = counting_handle();
        store.add_item(handle, name, drop).unwrap()
    }

    #[test]
    fn add_with_drop_point_centers_and_clamps() {
        let mut store = store_with_canvas(800.0, 450.0);
        let id = add(&mut store, "clip.mp4", Some(Point::new(500.0, 300.0)));
        let item = store.get(id).unwrap();
        assert_eq!(item.rect(), Rect::new(350.0, 200.0, 300.0, 200.0));
        assert_eq!(item.display_name(), "clip.mp4");
        assert_eq!(store.selected(), Some(id));
    }

    #[test]
    fn add_without_canvas_uses_fallback_extent() {
        let mut store = SceneStore::default();
        for _ in 0..20 {
            let id = add(&mut store, "a.mp4", None);
            let r = store.get(id).unwrap().rect();
            assert!(r.x >= 0.0 && r.x <= 500.0);
            assert!(r.y >= 0.0 && r.y <= 250.0);
        }
    }

    #[test]
    fn new_items_paint_on_top() {
        let mut store = store_with_canvas(800.0, 450.0);
        let a = add(&mut store, "a", None);
        let b = add(&mut store, "b", None);
        store.send_to_back(a).unwrap();
        store.send_to_back(b).unwrap();
        let c = add(&mut store, "c", None);
        let top = store.get(c).unwrap().z_order();
        assert!(store.items().iter().filter(|i| i.id() != c).all(|i| i.z_order() < top));
    }

    #[test]
    fn move_clamps_to_canvas() {
        let mut store = store_with_canvas(800.0, 450.0);
        let id = add(&mut store, "a", Some(Point::new(400.0, 225.0)));
        store.move_item(id, 10_000.0, -50.0).unwrap();
        let r = store.get(id).unwrap().rect();
        assert_eq!((r.x, r.y), (500.0, 0.0));
    }

    #[test]
    fn move_unknown_id_is_noop() {
        let mut store = store_with_canvas(800.0, 450.0);
        add(&mut store, "a", None);
        assert!(store.move_item(ItemId::new(), 1.0, 1.0).is_ok());
    }

    #[test]
    fn move_without_canvas_is_ignored() {
        let mut store = SceneStore::default();
        let id = add(&mut store, "a", Some(Point::new(400.0, 225.0)));
        let before = store.get(id).unwrap().rect();
        store.move_item(id, 0.0, 0.0).unwrap();
        assert_eq!(store.get(id).unwrap().rect(), before);
    }

    #[test]
    fn resize_floors_size() {
        let mut store = store_with_canvas(800.0, 450.0);
        let id = add(&mut store, "a", None);
        store.resize_item(id, 20.0, 500.0, 5.0, 6.0).unwrap();
        assert_eq!(store.get(id).unwrap().rect(), Rect::new(5.0, 6.0, 100.0, 500.0));
    }

    #[test]
    fn delete_releases_handle_and_clears_selection() {
        let mut store = store_with_canvas(800.0, 450.0);
        let (handle, source) = counting_handle();
        let id = store.add_item(handle, "a", None).unwrap();
        assert_eq!(store.selected(), Some(id));

        assert!(store.delete_item(id).unwrap());
        assert_eq!(source.releases.load(Ordering::SeqCst), 1);
        assert_eq!(store.selected(), None);

        assert!(!store.delete_item(id).unwrap());
        assert_eq!(source.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delete_keeps_other_selection() {
        let mut store = store_with_canvas(800.0, 450.0);
        let a = add(&mut store, "a", None);
        let b = add(&mut store, "b", None);
        store.select(Some(a));
        store.delete_item(b).unwrap();
        assert_eq!(store.selected(), Some(a));
    }

    #[test]
    fn clear_all_releases_every_handle_once() {
        let mut store = store_with_canvas(800.0, 450.0);
        let sources: Vec<_> = (0..3)
            .map(|i| {
                let (handle, source) = counting_handle();
                store.add_item(handle, format!("clip{i}"), None).unwrap();
                source
            })
            .collect();

        store.clear_all().unwrap();
        assert!(store.is_empty());
        assert_eq!(store.selected(), None);
        for source in &sources {
            assert_eq!(source.releases.load(Ordering::SeqCst), 1);
        }

        drop(store);
        for source in &sources {
            assert_eq!(source.releases.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn dropping_store_releases_handles() {
        let (handle, source) = counting_handle();
        {
            let mut store = SceneStore::default();
            store.add_item(handle, "a", None).unwrap();
        }
        assert_eq!(source.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bring_to_front_and_send_to_back() {
        let mut store = store_with_canvas(800.0, 450.0);
        let ids: Vec<_> = (0..4).map(|i| add(&mut store, &format!("{i}"), None)).collect();

        store.bring_to_front(ids[0]).unwrap();
        let z0 = store.get(ids[0]).unwrap().z_order();
        assert!(store.items().iter().filter(|i| i.id() != ids[0]).all(|i| i.z_order() < z0));

        store.send_to_back(ids[3]).unwrap();
        let z3 = store.get(ids[3]).unwrap().z_order();
        assert!(store.items().iter().filter(|i| i.id() != ids[3]).all(|i| i.z_order() > z3));

        let order: Vec<_> = store.paint_order().iter().map(|i| i.id()).collect();
        assert_eq!(order.first(), Some(&ids[3]));
        assert_eq!(order.last(), Some(&ids[0]));
    }

    #[test]
    fn select_unknown_clears() {
        let mut store = store_with_canvas(800.0, 450.0);
        add(&mut store, "a", None);
        store.select(Some(ItemId::new()));
        assert_eq!(store.selected(), None);
    }

    #[test]
    fn auto_arrange_scenario() {
        let mut store = store_with_canvas(900.0, 450.0);
        let ids: Vec<_> = (0..3).map(|i| add(&mut store, &format!("{i}"), None)).collect();
        assert!(store.auto_arrange().unwrap());
        assert_eq!(store.get(ids[0]).unwrap().rect(), Rect::new(8.0, 8.0, 434.0, 209.0));
        assert_eq!(store.get(ids[2]).unwrap().rect(), Rect::new(8.0, 233.0, 434.0, 209.0));

        let first: Vec<_> = store.items().iter().map(|i| i.rect()).collect();
        store.auto_arrange().unwrap();
        let second: Vec<_> = store.items().iter().map(|i| i.rect()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn auto_arrange_requires_canvas_and_items() {
        let mut store = SceneStore::default();
        assert!(!store.auto_arrange().unwrap());
        add(&mut store, "a", None);
        assert!(!store.auto_arrange().unwrap());
        store.set_canvas_size(Some(CanvasSize::new(0.0, 0.0)));
        assert!(!store.auto_arrange().unwrap());
    }

    #[test]
    fn snapshot_preconditions() {
        let mut store = SceneStore::default();
        assert_eq!(store.snapshot_for_export().unwrap_err(), SkipReason::NoItems);
        add(&mut store, "a", None);
        assert_eq!(store.snapshot_for_export().unwrap_err(), SkipReason::CanvasUnknown);
    }

    #[test]
    fn snapshot_locks_scene_until_dropped() {
        let mut store = store_with_canvas(800.0, 450.0);
        let a = add(&mut store, "a", None);
        let b = add(&mut store, "b", None);
        store.bring_to_front(a).unwrap();

        let snapshot = store.snapshot_for_export().unwrap();
        assert_eq!(snapshot.canvas, CanvasSize::new(800.0, 450.0));
        let order: Vec<_> = snapshot.items.iter().map(|i| i.id).collect();
        assert_eq!(order, vec![b, a]);

        assert!(store.is_locked());
        assert_eq!(
            store.snapshot_for_export().unwrap_err(),
            SkipReason::AlreadyExporting
        );
        assert!(matches!(store.move_item(a, 0.0, 0.0), Err(CoreError::SceneLocked)));
        assert!(matches!(store.delete_item(a), Err(CoreError::SceneLocked)));
        assert!(matches!(store.clear_all(), Err(CoreError::SceneLocked)));
        store.select(Some(b));
        assert_eq!(store.selected(), Some(b));

        drop(snapshot);
        assert!(!store.is_locked());
        assert!(store.delete_item(a).unwrap());
    }

    #[test]
    fn dropping_store_during_export_defers_release() {
        let mut store = store_with_canvas(800.0, 450.0);
        let (handle, source) = counting_handle();
        store.add_item(handle, "a", None).unwrap();

        let snapshot = store.snapshot_for_export().unwrap();
        drop(store);
        assert_eq!(source.releases.load(Ordering::SeqCst), 0);

        snapshot.items[0].source.restart().unwrap();
        assert_eq!(source.restarts.load(Ordering::SeqCst), 1);

        drop(snapshot);
        assert_eq!(source.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deleting_after_export_releases_once() {
        let mut store = store_with_canvas(800.0, 450.0);
        let (handle, source) = counting_handle();
        let id = store.add_item(handle, "a", None).unwrap();

        drop(store.snapshot_for_export().unwrap());
        assert!(store.delete_item(id).unwrap());
        assert_eq!(source.releases.load(Ordering::SeqCst), 1);
    }

    proptest! {
        #[test]
        fn moves_always_land_inside_canvas(x in -3_000.0f64..3_000.0, y in -3_000.0f64..3_000.0) {
            let mut store = store_with_canvas(800.0, 450.0);
            let id = add(&mut store, "a", None);
            store.move_item(id, x, y).unwrap();
            let r = store.get(id).unwrap().rect();
            prop_assert!(r.x >= 0.0 && r.right() <= 800.0);
            prop_assert!(r.y >= 0.0 && r.bottom() <= 450.0);
        }
    }
}
