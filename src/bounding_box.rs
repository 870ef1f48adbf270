//! Axis-aligned bounding box accumulator

use glam::{Mat4, Vec3};

/// Axis-aligned box grown point by point.
///
/// A box that never received a point is *empty*, which is distinct from a
/// degenerate box around a single point (zero size, but not empty).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    bounds: Option<(Vec3, Vec3)>,
}

impl BoundingBox {
    pub fn new() -> Self {
        Self { bounds: None }
    }

    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            bounds: Some((min.min(max), min.max(max))),
        }
    }

    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Self {
        let mut bbox = Self::new();
        for point in points {
            bbox.add_point(point);
        }
        bbox
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }

    pub fn clear(&mut self) {
        self.bounds = None;
    }

    pub fn add_point(&mut self, point: Vec3) {
        self.bounds = Some(match self.bounds {
            Some((min, max)) => (min.min(point), max.max(point)),
            None => (point, point),
        });
    }

    /// Merge another box. Merging an empty box changes nothing.
    pub fn add_box(&mut self, other: &BoundingBox) {
        if let Some((min, max)) = other.bounds {
            self.add_point(min);
            self.add_point(max);
        }
    }

    pub fn min(&self) -> Option<Vec3> {
        self.bounds.map(|(min, _)| min)
    }

    pub fn max(&self) -> Option<Vec3> {
        self.bounds.map(|(_, max)| max)
    }

    pub fn size(&self) -> Vec3 {
        self.bounds.map(|(min, max)| max - min).unwrap_or(Vec3::ZERO)
    }

    pub fn center(&self) -> Option<Vec3> {
        self.bounds.map(|(min, max)| (min + max) * 0.5)
    }

    /// Largest side length, handy for fitting a camera to the scene.
    pub fn max_size(&self) -> f32 {
        self.size().max_element()
    }

    pub fn contains(&self, point: Vec3) -> bool {
        self.bounds
            .map(|(min, max)| point.cmpge(min).all() && point.cmple(max).all())
            .unwrap_or(false)
    }

    /// The eight corners, or `None` for an empty box.
    pub fn corners(&self) -> Option<[Vec3; 8]> {
        let (min, max) = self.bounds?;
        Some([
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(min.x, max.y, max.z),
            Vec3::new(max.x, max.y, max.z),
        ])
    }

    /// Transform all eight corners and re-fit an axis-aligned box.
    pub fn transformed(&self, matrix: &Mat4) -> BoundingBox {
        match self.corners() {
            Some(corners) => {
                BoundingBox::from_points(corners.iter().map(|c| matrix.transform_point3(*c)))
            }
            None => BoundingBox::new(),
        }
    }
}
