//! Procedural geometry sources

use super::{GeometrySource, MeshVertex};
use glam::{Vec2, Vec3};
use std::f32::consts::{PI, TAU};

/// Two triangles for the quad `current, current + 1, next, next + 1` of a
/// grid with rows of `stride` vertices
fn grid_quad(current: u32, stride: u32) -> [[u32; 3]; 2] {
    let next = current + stride;
    [[current, next, current + 1], [current + 1, next, next + 1]]
}

/// Axis aligned cube centered on the origin, four vertices per face
#[derive(Debug, Clone, Copy)]
pub struct CubeGeometry {
    pub size: f32,
}

impl CubeGeometry {
    pub fn new(size: f32) -> Self {
        Self { size }
    }
}

impl Default for CubeGeometry {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Face normal and the in-plane axes spanning it (u right, v up)
const CUBE_FACES: [(Vec3, Vec3, Vec3); 6] = [
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    (Vec3::X, Vec3::NEG_Z, Vec3::Y),
    (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    (Vec3::Y, Vec3::X, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
];

const QUAD_CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

impl GeometrySource for CubeGeometry {
    fn vertices(&self) -> Box<dyn Iterator<Item = MeshVertex> + '_> {
        let half = self.size * 0.5;
        Box::new(CUBE_FACES.iter().flat_map(move |&(normal, u, v)| {
            QUAD_CORNERS.iter().map(move |&(su, sv)| {
                let position = (normal + u * su + v * sv) * half;
                let uv = Vec2::new((su + 1.0) * 0.5, (1.0 - sv) * 0.5);
                MeshVertex::new(position, normal, uv)
            })
        }))
    }

    fn triangles(&self) -> Box<dyn Iterator<Item = [u32; 3]> + '_> {
        Box::new((0..6u32).flat_map(|face| {
            let base = face * 4;
            [[base, base + 1, base + 2], [base, base + 2, base + 3]]
        }))
    }
}

/// UV sphere centered on the origin
#[derive(Debug, Clone, Copy)]
pub struct SphereGeometry {
    pub radius: f32,
    pub segments: u32,
    pub rings: u32,
}

impl SphereGeometry {
    pub fn new(radius: f32, segments: u32, rings: u32) -> Self {
        Self {
            radius,
            segments: segments.max(3),
            rings: rings.max(2),
        }
    }
}

impl Default for SphereGeometry {
    fn default() -> Self {
        Self::new(0.5, 32, 16)
    }
}

impl GeometrySource for SphereGeometry {
    fn vertices(&self) -> Box<dyn Iterator<Item = MeshVertex> + '_> {
        let (segments, rings, radius) = (self.segments, self.rings, self.radius);
        Box::new((0..=rings).flat_map(move |ring| {
            let phi = ring as f32 * PI / rings as f32;
            (0..=segments).map(move |segment| {
                let theta = segment as f32 * TAU / segments as f32;
                let normal = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
                let uv = Vec2::new(segment as f32 / segments as f32, ring as f32 / rings as f32);
                MeshVertex::new(normal * radius, normal, uv)
            })
        }))
    }

    fn triangles(&self) -> Box<dyn Iterator<Item = [u32; 3]> + '_> {
        let (segments, rings) = (self.segments, self.rings);
        Box::new(
            (0..rings)
                .flat_map(move |ring| (0..segments).map(move |segment| ring * (segments + 1) + segment))
                .flat_map(move |current| grid_quad(current, segments + 1)),
        )
    }
}

/// Subdivided plane on XZ facing +Y
#[derive(Debug, Clone, Copy)]
pub struct PlaneGeometry {
    pub width: f32,
    pub depth: f32,
    pub subdivisions: u32,
}

impl PlaneGeometry {
    pub fn new(width: f32, depth: f32, subdivisions: u32) -> Self {
        Self {
            width,
            depth,
            subdivisions: subdivisions.max(1),
        }
    }
}

impl Default for PlaneGeometry {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1)
    }
}

impl GeometrySource for PlaneGeometry {
    fn vertices(&self) -> Box<dyn Iterator<Item = MeshVertex> + '_> {
        let n = self.subdivisions;
        let (width, depth) = (self.width, self.depth);
        Box::new((0..=n).flat_map(move |z| {
            (0..=n).map(move |x| {
                let uv = Vec2::new(x as f32 / n as f32, z as f32 / n as f32);
                let position = Vec3::new((uv.x - 0.5) * width, 0.0, (uv.y - 0.5) * depth);
                MeshVertex::new(position, Vec3::Y, uv)
            })
        }))
    }

    fn triangles(&self) -> Box<dyn Iterator<Item = [u32; 3]> + '_> {
        let n = self.subdivisions;
        Box::new(
            (0..n)
                .flat_map(move |z| (0..n).map(move |x| z * (n + 1) + x))
                .flat_map(move |current| grid_quad(current, n + 1)),
        )
    }
}

/// Capped cylinder along Y centered on the origin
#[derive(Debug, Clone, Copy)]
pub struct CylinderGeometry {
    pub radius: f32,
    pub height: f32,
    pub segments: u32,
}

impl CylinderGeometry {
    pub fn new(radius: f32, height: f32, segments: u32) -> Self {
        Self {
            radius,
            height,
            segments: segments.max(3),
        }
    }

    fn side_vertex_count(&self) -> u32 {
        (self.segments + 1) * 2
    }
}

impl Default for CylinderGeometry {
    fn default() -> Self {
        Self::new(0.5, 1.0, 32)
    }
}

impl GeometrySource for CylinderGeometry {
    /// Side ring pairs (bottom, top), then the two cap centers, then cap
    /// ring pairs (top, bottom)
    fn vertices(&self) -> Box<dyn Iterator<Item = MeshVertex> + '_> {
        let (radius, half, segments) = (self.radius, self.height * 0.5, self.segments);
        let angle = move |i: u32| i as f32 * TAU / segments as f32;

        let side = (0..=segments).flat_map(move |i| {
            let (sin, cos) = angle(i).sin_cos();
            let normal = Vec3::new(cos, 0.0, sin);
            let u = i as f32 / segments as f32;
            [
                MeshVertex::new(Vec3::new(cos * radius, -half, sin * radius), normal, Vec2::new(u, 1.0)),
                MeshVertex::new(Vec3::new(cos * radius, half, sin * radius), normal, Vec2::new(u, 0.0)),
            ]
        });
        let centers = [
            MeshVertex::new(Vec3::new(0.0, half, 0.0), Vec3::Y, Vec2::splat(0.5)),
            MeshVertex::new(Vec3::new(0.0, -half, 0.0), Vec3::NEG_Y, Vec2::splat(0.5)),
        ];
        let caps = (0..=segments).flat_map(move |i| {
            let (sin, cos) = angle(i).sin_cos();
            let uv = Vec2::new(0.5 + cos * 0.5, 0.5 + sin * 0.5);
            [
                MeshVertex::new(Vec3::new(cos * radius, half, sin * radius), Vec3::Y, uv),
                MeshVertex::new(Vec3::new(cos * radius, -half, sin * radius), Vec3::NEG_Y, uv),
            ]
        });
        Box::new(side.chain(centers).chain(caps))
    }

    fn triangles(&self) -> Box<dyn Iterator<Item = [u32; 3]> + '_> {
        let segments = self.segments;
        let top_center = self.side_vertex_count();
        let bottom_center = top_center + 1;
        let cap_start = top_center + 2;

        let side = (0..segments).flat_map(|i| {
            let base = i * 2;
            [[base, base + 2, base + 1], [base + 1, base + 2, base + 3]]
        });
        let caps = (1..=segments).flat_map(move |i| {
            let top = cap_start + i * 2;
            let bottom = top + 1;
            [[top_center, top - 2, top], [bottom_center, bottom, bottom - 2]]
        });
        Box::new(side.chain(caps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_indices(source: &dyn GeometrySource) -> (usize, usize) {
        let vertices = source.vertices().count();
        let triangles: Vec<[u32; 3]> = source.triangles().collect();
        assert!(triangles.iter().flatten().all(|&i| (i as usize) < vertices));
        (vertices, triangles.len())
    }

    #[test]
    fn test_cube_counts() {
        assert_eq!(check_indices(&CubeGeometry::default()), (24, 12));
        let max = CubeGeometry::new(2.0)
            .vertices()
            .map(|v| v.position)
            .fold(Vec3::splat(f32::MIN), Vec3::max);
        assert_eq!(max, Vec3::ONE);
    }

    #[test]
    fn test_cube_normals_point_outward() {
        for vertex in CubeGeometry::default().vertices() {
            assert!(vertex.position.dot(vertex.normal) > 0.0);
        }
    }

    #[test]
    fn test_sphere_counts() {
        let sphere = SphereGeometry::new(1.0, 8, 4);
        assert_eq!(check_indices(&sphere), (9 * 5, 8 * 4 * 2));
        assert!(sphere.vertices().all(|v| (v.position.length() - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_plane_counts() {
        assert_eq!(check_indices(&PlaneGeometry::new(2.0, 2.0, 2)), (9, 8));
    }

    #[test]
    fn test_cylinder_counts() {
        let segments = 6;
        let (vertices, triangles) = check_indices(&CylinderGeometry::new(0.5, 1.0, segments));
        assert_eq!(vertices, ((segments + 1) * 4 + 2) as usize);
        assert_eq!(triangles, (segments * 4) as usize);
    }
}
