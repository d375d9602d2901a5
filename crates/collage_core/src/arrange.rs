use crate::types::{CanvasSize, Rect};

/// Columns and rows of the smallest near-square grid holding `count` cells.
pub fn grid_dimensions(count: usize) -> (usize, usize) {
    if count == 0 {
        return (0, 0);
    }
    let cols = (count as f64).sqrt().ceil() as usize;
    let rows = count.div_ceil(cols);
    (cols, rows)
}

/// Lay `count` items out on a full grid covering the canvas.
///
/// Output order matches input order: the i-th rect belongs to the i-th item.
pub fn arrange(count: usize, canvas: CanvasSize, padding: f64) -> Vec<Rect> {
    let (cols, rows) = grid_dimensions(count);
    if count == 0 {
        return Vec::new();
    }

    let cell_width = canvas.width / cols as f64;
    let cell_height = canvas.height / rows as f64;

    (0..count)
        .map(|i| {
            let col = i % cols;
            let row = i / cols;
            Rect {
                x: col as f64 * cell_width + padding,
                y: row as f64 * cell_height + padding,
                width: cell_width - padding * 2.0,
                height: cell_height - padding * 2.0,
            }
        })
        .collect()
}
