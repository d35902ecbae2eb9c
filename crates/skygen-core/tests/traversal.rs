//! Traversal properties: every cell exactly once, diagonal locality and
//! lane partitioning.

use std::collections::HashSet;

use proptest::prelude::*;
use skygen_core::{DiagonalCursor, GridShape, LaneWalker};

/// Distance-bin changes between consecutive offsets that fall in the same
/// block of `block` offsets.
fn in_block_changes(total: u64, block: u64, cell: impl Fn(u64) -> (u64, u32)) -> usize {
    (1..total)
        .filter(|&k| (k - 1) / block == k / block)
        .filter(|&k| cell(k - 1) != cell(k))
        .count()
}

fn row_major(shape: GridShape, k: u64) -> (u64, u32) {
    let cells = shape.cells();
    let within = k % cells;
    let im = (within % u64::from(shape.apparent)) as u32;
    let i_abs = (within / u64::from(shape.apparent)) as u32;
    (k / cells, im + i_abs)
}

fn diagonal(shape: GridShape, k: u64) -> (u64, u32) {
    let c = shape.decode(k);
    (c.pixel, c.diagonal())
}

#[test]
fn test_scenario_single_cell_pixels() {
    let shape = GridShape::new(1, 1);
    let cells: Vec<DiagonalCursor> = (0..4).map(|k| shape.decode(k)).collect();
    let expected: Vec<DiagonalCursor> = (0..4)
        .map(|pixel| DiagonalCursor {
            pixel,
            im: 0,
            i_abs: 0,
        })
        .collect();
    assert_eq!(cells, expected);

    let mut walked: Vec<DiagonalCursor> = (0..3)
        .flat_map(|lane| LaneWalker::new(shape, 4, 10, lane, 3).map(|(c, _)| c))
        .collect();
    walked.sort();
    assert_eq!(walked, expected);
}

#[test]
fn test_diagonal_walk_recomputes_less_than_row_major() {
    for (x, y) in [(2, 2), (2, 5), (3, 3), (4, 7), (9, 4), (12, 12)] {
        let shape = GridShape::new(x, y);
        let total = 3 * shape.cells();
        for block in [1, 4, 10, shape.cells()] {
            let diag = in_block_changes(total, block, |k| diagonal(shape, k));
            let rows = in_block_changes(total, block, |k| row_major(shape, k));
            assert!(diag <= rows, "{x}x{y} block {block}: {diag} > {rows}");
        }
        let whole = shape.cells();
        let diag = in_block_changes(total, whole, |k| diagonal(shape, k));
        let rows = in_block_changes(total, whole, |k| row_major(shape, k));
        if x >= 3 && y >= 3 {
            assert!(diag < rows, "{x}x{y}: {diag} >= {rows}");
        }
        // one change per diagonal boundary
        assert_eq!(diag as u64, 3 * u64::from(shape.diagonals() - 1));
    }
}

#[test]
fn test_walker_reports_moves_only_on_diagonal_changes() {
    let shape = GridShape::new(5, 3);
    let mut previous: Option<DiagonalCursor> = None;
    for (cursor, moved) in LaneWalker::new(shape, 2, shape.cells() as u32 * 2, 0, 1) {
        if let Some(prev) = previous {
            let changed = prev.pixel != cursor.pixel || prev.diagonal() != cursor.diagonal();
            assert_eq!(moved, changed);
        } else {
            assert!(moved);
        }
        previous = Some(cursor);
    }
}

proptest! {
    #[test]
    fn decode_is_a_bijection(npixels in 1u64..6, apparent in 1u32..24, absolute in 1u32..24) {
        let shape = GridShape::new(apparent, absolute);
        let total = npixels * shape.cells();
        let mut seen = HashSet::new();
        for k in 0..total {
            let c = shape.decode(k);
            prop_assert!(c.pixel < npixels && c.im < apparent && c.i_abs < absolute);
            prop_assert!(seen.insert(c));
            prop_assert_eq!(shape.encode(&c), k);
        }
        prop_assert_eq!(seen.len() as u64, total);
    }

    #[test]
    fn advance_follows_decode(apparent in 1u32..30, absolute in 1u32..30, start in 0u64..2000) {
        let shape = GridShape::new(apparent, absolute);
        let k = start % (2 * shape.cells());
        let mut c = shape.decode(k);
        shape.advance(&mut c);
        prop_assert_eq!(c, shape.decode(k + 1));
    }

    #[test]
    fn lanes_cover_every_cell_once(
        npixels in 1u64..5,
        apparent in 1u32..8,
        absolute in 1u32..8,
        block in 1u32..12,
        lanes in 1u64..9,
    ) {
        let shape = GridShape::new(apparent, absolute);
        let mut offsets: Vec<u64> = (0..lanes)
            .flat_map(|lane| LaneWalker::new(shape, npixels, block, lane, lanes).map(|(c, _)| shape.encode(&c)))
            .collect();
        offsets.sort_unstable();
        prop_assert_eq!(offsets, (0..npixels * shape.cells()).collect::<Vec<_>>());
    }
}
