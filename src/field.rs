//! Raw numeric buffers backing all geometry data
//!
//! A [`Field`] is a dense `rows x cols` table stored row-major, so a vertex
//! field with three columns uploads straight into a vertex buffer.
//! Out-of-range access never panics: reads return the element type's
//! sentinel and writes are ignored.

use bytemuck::Pod;
use std::fmt;

/// Element type storable in a [`Field`].
pub trait FieldElement: Pod + Default + PartialEq + fmt::Debug {
    /// Value returned for out-of-range reads.
    const SENTINEL: Self;
}

impl FieldElement for f32 {
    const SENTINEL: Self = -1.0;
}

impl FieldElement for i32 {
    const SENTINEL: Self = -1;
}

impl FieldElement for u32 {
    const SENTINEL: Self = 0;
}

/// Dense two-dimensional numeric buffer.
#[derive(Clone, PartialEq)]
pub struct Field<T: FieldElement> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

/// Floating point field (positions, normals, texture coordinates, colors).
pub type FloatField = Field<f32>;
/// Signed integer field.
pub type IntField = Field<i32>;
/// Unsigned integer field (triangle and line indices).
pub type UIntField = Field<u32>;

impl<T: FieldElement> Field<T> {
    /// Create a zero-filled field.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::default(); rows * cols],
        }
    }

    /// Create an empty field with a fixed column count, to be grown with
    /// [`Field::push_row`].
    pub fn with_cols(cols: usize) -> Self {
        Self::new(0, cols)
    }

    /// Wrap existing row-major data. Returns `None` if the length does not
    /// match `rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Option<Self> {
        (data.len() == rows * cols).then_some(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn index(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.rows && col < self.cols).then(|| row * self.cols + col)
    }

    /// Read one element, or [`FieldElement::SENTINEL`] when out of range.
    pub fn get(&self, row: usize, col: usize) -> T {
        self.index(row, col)
            .map(|i| self.data[i])
            .unwrap_or(T::SENTINEL)
    }

    /// Write one element. Returns `false` and leaves the field untouched
    /// when out of range.
    pub fn set(&mut self, row: usize, col: usize, value: T) -> bool {
        match self.index(row, col) {
            Some(i) => {
                self.data[i] = value;
                true
            }
            None => false,
        }
    }

    /// Read by flat row-major index.
    pub fn at(&self, index: usize) -> T {
        self.data.get(index).copied().unwrap_or(T::SENTINEL)
    }

    pub fn row(&self, row: usize) -> Option<&[T]> {
        (row < self.rows).then(|| &self.data[row * self.cols..(row + 1) * self.cols])
    }

    /// Overwrite a full row. The slice must have exactly `cols` elements.
    pub fn set_row(&mut self, row: usize, values: &[T]) -> bool {
        if row >= self.rows || values.len() != self.cols {
            return false;
        }
        let start = row * self.cols;
        self.data[start..start + self.cols].copy_from_slice(values);
        true
    }

    /// Append a row. The slice must have exactly `cols` elements.
    pub fn push_row(&mut self, values: &[T]) -> bool {
        if values.len() != self.cols {
            return false;
        }
        self.data.extend_from_slice(values);
        self.rows += 1;
        true
    }

    /// Change the row count, zero-filling new rows.
    pub fn resize(&mut self, rows: usize) {
        self.rows = rows;
        self.data.resize(rows * self.cols, T::default());
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn zero(&mut self) {
        self.fill(T::default());
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[T]> {
        // chunks_exact panics on zero, and a zero-column field has no rows anyway
        self.data.chunks_exact(self.cols.max(1))
    }

    /// Raw bytes for GPU upload
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    pub fn byte_size(&self) -> u64 {
        std::mem::size_of_val(self.data.as_slice()) as u64
    }
}

impl<T: FieldElement> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}

impl FloatField {
    /// Interpret a three-column row as a vector.
    pub fn vec3(&self, row: usize) -> Option<glam::Vec3> {
        match self.row(row)? {
            [x, y, z] => Some(glam::Vec3::new(*x, *y, *z)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_field_is_zeroed() {
        let field = FloatField::new(4, 3);
        assert_eq!(field.rows(), 4);
        assert_eq!(field.cols(), 3);
        assert_eq!(field.size(), 12);
        assert!(field.data().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_out_of_range_sentinels() {
        let floats = FloatField::new(2, 3);
        let ints = IntField::new(2, 3);
        let uints = UIntField::new(2, 3);

        assert_eq!(floats.get(2, 0), -1.0);
        assert_eq!(floats.get(0, 3), -1.0);
        assert_eq!(ints.get(5, 5), -1);
        assert_eq!(uints.get(5, 5), 0);
        assert_eq!(floats.at(6), -1.0);
        assert!(floats.row(2).is_none());
    }

    #[test]
    fn test_out_of_range_set_is_ignored() {
        let mut field = IntField::new(1, 2);
        assert!(!field.set(1, 0, 7));
        assert!(!field.set(0, 2, 7));
        assert_eq!(field.data(), &[0, 0]);

        assert!(field.set(0, 1, 7));
        assert_eq!(field.get(0, 1), 7);
    }

    #[test]
    fn test_push_row_requires_matching_width() {
        let mut field = UIntField::with_cols(3);
        assert!(field.push_row(&[0, 1, 2]));
        assert!(!field.push_row(&[3, 4]));
        assert_eq!(field.rows(), 1);
        assert_eq!(field.row(0), Some(&[0u32, 1, 2][..]));
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(FloatField::from_vec(2, 2, vec![1.0; 3]).is_none());
        let field = FloatField::from_vec(1, 3, vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(field.vec3(0), Some(glam::Vec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_resize_and_bytes() {
        let mut field = FloatField::new(1, 3);
        field.fill(2.0);
        field.resize(2);
        assert_eq!(field.row(1), Some(&[0.0f32, 0.0, 0.0][..]));
        assert_eq!(field.byte_size(), 24);
        assert_eq!(field.as_bytes().len(), 24);
        assert_eq!(field.iter_rows().count(), 2);
    }
}
