//! Array extents and pitched row layout

/// Row pitch alignment in bytes for arrays with more than one row.
pub const PITCH_ALIGN: usize = 256;

/// Logical 1D, 2D or 3D extent in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl Extent {
    pub const fn d1(width: usize) -> Self {
        Self {
            width,
            height: 1,
            depth: 1,
        }
    }

    pub const fn d2(width: usize, height: usize) -> Self {
        Self { width, height, depth: 1 }
    }

    pub const fn d3(width: usize, height: usize, depth: usize) -> Self {
        Self { width, height, depth }
    }

    /// Number of logical elements.
    pub const fn elements(&self) -> usize {
        self.width * self.height * self.depth
    }

    pub const fn rows(&self) -> usize {
        self.height * self.depth
    }
}

/// How an [`Extent`] of `T` is laid out in memory.
///
/// Multi-row arrays pad each row to [`PITCH_ALIGN`] bytes. Single-row arrays
/// are stored densely so their storage can be handed out as a plain slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub extent: Extent,
    pub element_size: usize,
    pub pitch_elements: usize,
}

impl Layout {
    pub fn new<T>(extent: Extent) -> Self {
        let element_size = std::mem::size_of::<T>().max(1);
        let pitch_elements = if extent.rows() > 1 {
            let align = (PITCH_ALIGN / element_size).max(1);
            extent.width.div_ceil(align) * align
        } else {
            extent.width
        };
        Self {
            extent,
            element_size,
            pitch_elements,
        }
    }

    /// Padded row width in bytes.
    pub const fn pitch(&self) -> usize {
        self.pitch_elements * self.element_size
    }

    /// Storage length in elements, padding included.
    pub const fn len(&self) -> usize {
        self.pitch_elements * self.extent.rows()
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes moved by one host/device copy.
    pub const fn memsize(&self) -> usize {
        self.pitch() * self.extent.rows()
    }

    /// Storage index of element `(x, y, z)`.
    pub const fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.extent.height + y) * self.pitch_elements + x
    }

    /// Copy dense `src` (x fastest) into pitched `dst`.
    pub fn scatter<T: Copy>(&self, src: &[T], dst: &mut [T]) {
        let width = self.extent.width;
        for (row, chunk) in src.chunks(width.max(1)).take(self.extent.rows()).enumerate() {
            let start = row * self.pitch_elements;
            dst[start..start + chunk.len()].copy_from_slice(chunk);
        }
    }

    /// Copy pitched `src` into a dense vector.
    pub fn gather<T: Copy>(&self, src: &[T]) -> Vec<T> {
        let width = self.extent.width;
        let mut out = Vec::with_capacity(self.extent.elements());
        for row in 0..self.extent.rows() {
            let start = row * self.pitch_elements;
            out.extend_from_slice(&src[start..start + width]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_dimensional_arrays_are_dense() {
        let layout = Layout::new::<u64>(Extent::d1(1000));
        assert_eq!(layout.pitch_elements, 1000);
        assert_eq!(layout.memsize(), 8000);
    }

    #[test]
    fn rows_are_padded_to_alignment() {
        let layout = Layout::new::<f32>(Extent::d3(10, 3, 2));
        assert_eq!(layout.pitch_elements, 64);
        assert_eq!(layout.pitch(), 256);
        assert_eq!(layout.len(), 64 * 6);
        assert_eq!(layout.index(2, 1, 1), (3 + 1) * 64 + 2);
    }

    #[test]
    fn scatter_then_gather_preserves_elements() {
        let layout = Layout::new::<f32>(Extent::d2(3, 2));
        let dense = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut pitched = vec![0.0f32; layout.len()];
        layout.scatter(&dense, &mut pitched);
        assert_eq!(pitched[layout.index(0, 1, 0)], 4.0);
        assert_eq!(layout.gather(&pitched), dense.to_vec());
    }
}
