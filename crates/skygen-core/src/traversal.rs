//! Diagonal traversal of the (pixel × apparent bin × absolute bin) space
//!
//! Each pixel carries an `nm × nM` grid of cells indexed by apparent
//! magnitude bin `im` and absolute magnitude bin `iM`. The distance modulus
//! of a cell is `m(im) − M(iM)`, and with absolute magnitudes running from
//! faint to bright that makes the distance bin the anti-diagonal
//! `d = im + iM`. Cells are enumerated along anti-diagonals, so only a wrap
//! to the next diagonal (or pixel) changes the distance:
//!
//! ```text
//!        iM →                      k order within one 3×4 pixel
//!   im  ┌────┬────┬────┬────┐
//!   ↓   │  0 │  1 │  3 │  6 │
//!       ├────┼────┼────┼────┤      d=0: 0
//!       │  2 │  4 │  7 │  9 │      d=1: 1 2
//!       ├────┼────┼────┼────┤      d=2: 3 4 5
//!       │  5 │  8 │ 10 │ 11 │      ...
//!       └────┴────┴────┴────┘
//! ```
//!
//! [`GridShape::decode`] maps a linear offset to its cell in constant time
//! and [`GridShape::advance`] steps to the next cell in that order.
//! [`LaneWalker`] partitions the offsets between lanes in blocks: lane `id`
//! of `N` visits blocks `id, id + N, id + 2N, …`.

use serde::{Deserialize, Serialize};

/// Per-pixel bin counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridShape {
    /// Apparent magnitude bins (`nm`)
    pub apparent: u32,
    /// Absolute magnitude bins (`nM`)
    pub absolute: u32,
}

/// One cell of the traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiagonalCursor {
    pub pixel: u64,
    /// Apparent magnitude bin
    pub im: u32,
    /// Absolute magnitude bin
    pub i_abs: u32,
}

impl DiagonalCursor {
    /// Anti-diagonal, i.e. the distance-modulus bin.
    pub fn diagonal(&self) -> u32 {
        self.im + self.i_abs
    }
}

impl GridShape {
    pub fn new(apparent: u32, absolute: u32) -> Self {
        Self { apparent, absolute }
    }

    /// Cells per pixel.
    pub fn cells(&self) -> u64 {
        u64::from(self.apparent) * u64::from(self.absolute)
    }

    pub fn diagonals(&self) -> u32 {
        (self.apparent + self.absolute).saturating_sub(1)
    }

    /// Cell at linear offset `k`.
    pub fn decode(&self, k: u64) -> DiagonalCursor {
        let cells = self.cells();
        if cells == 0 {
            return DiagonalCursor::default();
        }
        let pixel = k / cells;
        let k = k % cells;
        let x = u64::from(self.apparent);
        let y = u64::from(self.absolute);
        let l = x.min(y);
        let m = x.max(y);

        let (d, im) = if 2 * k < l * (l - 1) {
            // growing corner: diagonal d has d + 1 cells starting at im = 0
            let d = tri_root(k);
            (d, k - d * (d + 1) / 2)
        } else if 2 * k < l * (2 * m + 1 - l) {
            // band of full-length diagonals
            if x >= y {
                let ka = k - y * (y - 1) / 2;
                let d = ka / y + (y - 1);
                (d, ka % y + d - (y - 1))
            } else {
                let ka = k - x * (x - 1) / 2;
                (ka / x + (x - 1), ka % x)
            }
        } else {
            // shrinking corner, counted back from the last cell
            let ka = x * y - k - 1;
            let dd = tri_root(ka);
            let d = x + y - 2 - dd;
            (d, (x - 1) - (ka - dd * (dd + 1) / 2))
        };

        DiagonalCursor {
            pixel,
            im: im as u32,
            i_abs: (d - im) as u32,
        }
    }

    /// Linear offset of `cursor`; inverse of [`GridShape::decode`].
    pub fn encode(&self, cursor: &DiagonalCursor) -> u64 {
        let d = u64::from(cursor.diagonal());
        let before = |n: u64| n * (n + 1) / 2;
        let clipped = |n: i64| if n > 0 { before(n as u64) } else { 0 };
        let x = i64::from(self.apparent);
        let y = i64::from(self.absolute);
        let preceding = before(d) - clipped(d as i64 - x) - clipped(d as i64 - y);
        let start = (d as i64 - (y - 1)).max(0) as u64;
        cursor.pixel * self.cells() + preceding + (u64::from(cursor.im) - start)
    }

    /// Step `cursor` to the next cell. Returns true when the step left the
    /// current diagonal, i.e. the distance bin or the pixel changed.
    #[inline]
    pub fn advance(&self, cursor: &mut DiagonalCursor) -> bool {
        if cursor.im + 1 < self.apparent && cursor.i_abs >= 1 {
            cursor.im += 1;
            cursor.i_abs -= 1;
            return false;
        }
        let next = cursor.diagonal() + 1;
        if next + 2 <= self.apparent + self.absolute {
            cursor.im = next.saturating_sub(self.absolute - 1);
            cursor.i_abs = next - cursor.im;
        } else {
            cursor.pixel += 1;
            cursor.im = 0;
            cursor.i_abs = 0;
        }
        true
    }
}

/// Largest `r` with `r(r+1)/2 ≤ n`.
fn tri_root(n: u64) -> u64 {
    let mut r = (((8.0 * n as f64 + 1.0).sqrt() - 1.0) / 2.0) as u64;
    while r > 0 && r * (r + 1) / 2 > n {
        r -= 1;
    }
    while (r + 1) * (r + 2) / 2 <= n {
        r += 1;
    }
    r
}

/// Where a lane stands in its traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WalkPosition {
    pub cursor: DiagonalCursor,
    /// Offset of the first cell of the current block
    pub offset: i64,
    /// Steps left in the current block
    pub block_remaining: u32,
}

/// A single lane's block-strided walk over `npixels` pixels.
#[derive(Debug, Clone)]
pub struct LaneWalker {
    shape: GridShape,
    npixels: u64,
    block: u32,
    stride: i64,
    position: WalkPosition,
}

impl LaneWalker {
    /// Walker for lane `lane` of `lanes`, positioned before its first block.
    pub fn new(shape: GridShape, npixels: u64, block: u32, lane: u64, lanes: u64) -> Self {
        let block_len = i64::from(block.max(1));
        let position = WalkPosition {
            cursor: DiagonalCursor::default(),
            offset: block_len * (lane as i64 - lanes as i64),
            block_remaining: 0,
        };
        Self::resume(shape, npixels, block, lanes, position)
    }

    /// Walker continuing from a stored position.
    pub fn resume(shape: GridShape, npixels: u64, block: u32, lanes: u64, position: WalkPosition) -> Self {
        let block = block.max(1);
        Self {
            shape,
            npixels,
            block,
            stride: i64::from(block) * lanes as i64,
            position,
        }
    }

    pub fn position(&self) -> WalkPosition {
        self.position
    }

    pub fn cursor(&self) -> &DiagonalCursor {
        &self.position.cursor
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn is_finished(&self) -> bool {
        self.position.cursor.pixel >= self.npixels
    }

    /// Move to the lane's next cell. Returns `None` once the lane's range is
    /// exhausted, otherwise whether cached per-diagonal state went stale.
    pub fn step(&mut self) -> Option<bool> {
        if self.is_finished() {
            return None;
        }
        let pos = &mut self.position;
        let moved = if pos.block_remaining == 0 {
            pos.offset += self.stride;
            pos.block_remaining = self.block;
            let total = self.npixels * self.shape.cells();
            if pos.offset < 0 || pos.offset as u64 >= total {
                pos.cursor = DiagonalCursor {
                    pixel: self.npixels,
                    ..DiagonalCursor::default()
                };
                return None;
            }
            pos.cursor = self.shape.decode(pos.offset as u64);
            true
        } else {
            self.shape.advance(&mut pos.cursor)
        };
        if pos.cursor.pixel >= self.npixels {
            return None;
        }
        pos.block_remaining -= 1;
        Some(moved)
    }
}

impl Iterator for LaneWalker {
    type Item = (DiagonalCursor, bool);

    fn next(&mut self) -> Option<Self::Item> {
        self.step().map(|moved| (self.position.cursor, moved))
    }
}

// ============================================================================
// Tests
// ============================================================================
