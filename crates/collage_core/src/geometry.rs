use crate::types::*;

/// Clamp one axis so `[value, value + item_extent]` stays inside
/// `[0, canvas_extent]`. When the item is larger than the canvas the lower
/// bound wins and the result is 0.
pub fn clamp_axis(value: f64, canvas_extent: f64, item_extent: f64) -> f64 {
    value.min(canvas_extent - item_extent).max(0.0)
}

/// Clamp a top-left position for an item of `width` x `height`.
pub fn clamp_position(pos: Point, width: f64, height: f64, canvas: CanvasSize) -> Point {
    Point {
        x: clamp_axis(pos.x, canvas.width, width),
        y: clamp_axis(pos.y, canvas.height, height),
    }
}

/// Top-left position that centers an item under `drop`, kept inside the canvas.
pub fn centered_on(drop: Point, width: f64, height: f64, canvas: CanvasSize) -> Point {
    clamp_position(
        Point::new(drop.x - width / 2.0, drop.y - height / 2.0),
        width,
        height,
        canvas,
    )
}

/// Resize `start` by dragging `handle` by `(dx, dy)`.
///
/// Width and height never drop below `min_size`; the corner opposite to
/// `handle` stays where it was.
pub fn resize_from_corner(start: Rect, handle: ResizeHandle, dx: f64, dy: f64, min_size: f64) -> Rect {
    let width = if handle.moves_left_edge() {
        (start.width - dx).max(min_size)
    } else {
        (start.width + dx).max(min_size)
    };
    let height = if handle.moves_top_edge() {
        (start.height - dy).max(min_size)
    } else {
        (start.height + dy).max(min_size)
    };

    let x = if handle.moves_left_edge() {
        start.x + start.width - width
    } else {
        start.x
    };
    let y = if handle.moves_top_edge() {
        start.y + start.height - height
    } else {
        start.y
    };

    Rect {
        x,
        y,
        width,
        height,
    }
}

/// Offset for the `index`-th file of a multi-file drop.
pub fn drop_offset(drop: Point, index: usize, step: f64) -> Point {
    let offset = index as f64 * step;
    Point::new(drop.x + offset, drop.y + offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CANVAS: CanvasSize = CanvasSize::new(800.0, 450.0);

    #[test]
    fn clamp_axis_inside_range_is_identity() {
        assert_eq!(clamp_axis(120.0, 800.0, 300.0), 120.0);
    }

    #[test]
    fn clamp_axis_bounds() {
        assert_eq!(clamp_axis(-40.0, 800.0, 300.0), 0.0);
        assert_eq!(clamp_axis(900.0, 800.0, 300.0), 500.0);
    }

    #[test]
    fn clamp_axis_oversized_item_pins_to_zero() {
        assert_eq!(clamp_axis(50.0, 800.0, 1000.0), 0.0);
    }

    #[test]
    fn drop_point_scenario() {
        let p = centered_on(Point::new(500.0, 300.0), 300.0, 200.0, CANVAS);
        assert_eq!(p, Point::new(350.0, 200.0));
    }

    #[test]
    fn drop_near_corner_is_clamped() {
        let p = centered_on(Point::new(790.0, 10.0), 300.0, 200.0, CANVAS);
        assert_eq!(p, Point::new(500.0, 0.0));
    }

    #[test]
    fn se_grows_without_moving_origin() {
        let start = Rect::new(100.0, 100.0, 300.0, 200.0);
        let r = resize_from_corner(start, ResizeHandle::Se, 50.0, 30.0, 100.0);
        assert_eq!(r, Rect::new(100.0, 100.0, 350.0, 230.0));
    }

    #[test]
    fn sw_moves_left_edge_only() {
        let start = Rect::new(100.0, 100.0, 300.0, 200.0);
        let r = resize_from_corner(start, ResizeHandle::Sw, -20.0, 10.0, 100.0);
        assert_eq!(r, Rect::new(80.0, 100.0, 320.0, 210.0));
        assert_eq!(r.right(), start.right());
    }

    #[test]
    fn ne_moves_top_edge_only() {
        let start = Rect::new(100.0, 100.0, 300.0, 200.0);
        let r = resize_from_corner(start, ResizeHandle::Ne, 20.0, -10.0, 100.0);
        assert_eq!(r, Rect::new(100.0, 90.0, 320.0, 210.0));
        assert_eq!(r.bottom(), start.bottom());
    }

    #[test]
    fn nw_shrink_stops_at_min_size() {
        let start = Rect::new(100.0, 100.0, 300.0, 200.0);
        let r = resize_from_corner(start, ResizeHandle::Nw, 1000.0, 1000.0, 100.0);
        assert_eq!(r.width, 100.0);
        assert_eq!(r.height, 100.0);
        assert_eq!(r.right(), start.right());
        assert_eq!(r.bottom(), start.bottom());
    }

    #[test]
    fn drop_offsets_step_per_index() {
        let base = Point::new(10.0, 20.0);
        assert_eq!(drop_offset(base, 0, 20.0), base);
        assert_eq!(drop_offset(base, 3, 20.0), Point::new(70.0, 80.0));
    }

    proptest! {
        #[test]
        fn clamped_position_stays_in_canvas(
            x in -5_000.0f64..5_000.0,
            y in -5_000.0f64..5_000.0,
            w in 100.0f64..800.0,
            h in 100.0f64..450.0,
        ) {
            let p = clamp_position(Point::new(x, y), w, h, CANVAS);
            prop_assert!(p.x >= 0.0 && p.x <= CANVAS.width - w);
            prop_assert!(p.y >= 0.0 && p.y <= CANVAS.height - h);
        }

        #[test]
        fn resize_never_below_min_size(
            dx in -10_000.0f64..10_000.0,
            dy in -10_000.0f64..10_000.0,
            corner in 0usize..4,
        ) {
            let start = Rect::new(50.0, 50.0, 300.0, 200.0);
            let r = resize_from_corner(start, ResizeHandle::ALL[corner], dx, dy, 100.0);
            prop_assert!(r.width >= 100.0);
            prop_assert!(r.height >= 100.0);
        }

        #[test]
        fn resize_preserves_opposite_corner(
            dx in -1_000.0f64..1_000.0,
            dy in -1_000.0f64..1_000.0,
        ) {
            let start = Rect::new(200.0, 150.0, 300.0, 200.0);

            let se = resize_from_corner(start, ResizeHandle::Se, dx, dy, 100.0);
            prop_assert_eq!(se.x, start.x);
            prop_assert_eq!(se.y, start.y);

            let nw = resize_from_corner(start, ResizeHandle::Nw, dx, dy, 100.0);
            prop_assert!((nw.right() - start.right()).abs() < 1e-9);
            prop_assert!((nw.bottom() - start.bottom()).abs() < 1e-9);

            let ne = resize_from_corner(start, ResizeHandle::Ne, dx, dy, 100.0);
            prop_assert_eq!(ne.x, start.x);
            prop_assert!((ne.bottom() - start.bottom()).abs() < 1e-9);

            let sw = resize_from_corner(start, ResizeHandle::Sw, dx, dy, 100.0);
            prop_assert_eq!(sw.y, start.y);
            prop_assert!((sw.right() - start.right()).abs() < 1e-9);
        }
    }
}
