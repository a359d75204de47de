//! Triangle meshes and Wavefront OBJ loading.

use std::path::Path;

use glam::Vec3;
use thiserror::Error;

/// Errors that can occur while loading a mesh.
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Failed to read mesh file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed OBJ at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Mesh has no triangles")]
    Empty,
}

/// Indexed triangle mesh.
///
/// Every face index is checked on construction, so the geometry can be
/// indexed without bounds failures.
#[derive(Debug, Clone)]
pub struct Mesh {
    positions: Vec<Vec3>,
    faces: Vec<[u32; 3]>,
}

impl Mesh {
    /// Build a mesh, checking every face index.
    pub fn new(positions: Vec<Vec3>, faces: Vec<[u32; 3]>) -> Result<Self, MeshError> {
        if faces.is_empty() {
            return Err(MeshError::Empty);
        }
        let count = positions.len();
        if let Some(face) = faces.iter().find(|f| f.iter().any(|&i| i as usize >= count)) {
            return Err(MeshError::Parse {
                line: 0,
                message: format!("face {:?} references a vertex past {}", face, count),
            });
        }
        Ok(Self { positions, faces })
    }

    /// Vertex positions in world space.
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Triangles as indices into [`Mesh::positions`].
    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    /// Load a mesh from an OBJ file.
    pub fn load(path: &Path) -> Result<Self, MeshError> {
        let contents = std::fs::read_to_string(path)?;
        let mesh = Self::parse_obj(&contents)?;
        log::debug!(
            "Loaded {} vertices, {} triangles from {}",
            mesh.positions.len(),
            mesh.faces.len(),
            path.display()
        );
        Ok(mesh)
    }

    /// Parse OBJ text. Only `v` and `f` records are used; polygons are fan-triangulated.
    pub fn parse_obj(contents: &str) -> Result<Self, MeshError> {
        let mut positions = Vec::new();
        let mut faces = Vec::new();

        for (number, line) in contents.lines().enumerate() {
            let line_no = number + 1;
            let mut tokens = line.split_whitespace();
            match tokens.next() {
                Some("v") => {
                    let mut coords = [0.0f32; 3];
                    for coord in coords.iter_mut() {
                        let token = tokens
                            .next()
                            .ok_or_else(|| parse_error(line_no, "vertex needs 3 coordinates"))?;
                        *coord = token.parse().map_err(|_| {
                            parse_error(line_no, &format!("bad coordinate '{}'", token))
                        })?;
                    }
                    positions.push(Vec3::from_array(coords));
                }
                Some("f") => {
                    let corners = tokens
                        .map(|token| resolve_index(token, positions.len(), line_no))
                        .collect::<Result<Vec<_>, _>>()?;
                    if corners.len() < 3 {
                        return Err(parse_error(line_no, "face needs at least 3 vertices"));
                    }
                    for i in 1..corners.len() - 1 {
                        faces.push([corners[0], corners[i], corners[i + 1]]);
                    }
                }
                _ => {}
            }
        }

        Self::new(positions, faces)
    }

    /// Area-weighted per-vertex normals.
    pub fn vertex_normals(&self) -> Vec<Vec3> {
        let mut normals = vec![Vec3::ZERO; self.positions.len()];
        for face in &self.faces {
            let [a, b, c] = *face;
            let (a, b, c) = (
                self.positions[a as usize],
                self.positions[b as usize],
                self.positions[c as usize],
            );
            // Unnormalized cross product is proportional to triangle area.
            let n = (b - a).cross(c - a);
            for &i in face {
                normals[i as usize] += n;
            }
        }
        normals.iter().map(|n| n.normalize_or_zero()).collect()
    }
}

fn parse_error(line: usize, message: &str) -> MeshError {
    MeshError::Parse {
        line,
        message: message.to_string(),
    }
}

/// Resolve a face corner like `7`, `7/1/3`, `7//3` or `-1` to a zero-based index.
fn resolve_index(token: &str, vertex_count: usize, line: usize) -> Result<u32, MeshError> {
    let raw = token.split('/').next().unwrap_or(token);
    let index: i64 = raw
        .parse()
        .map_err(|_| parse_error(line, &format!("bad face index '{}'", token)))?;

    let resolved = if index > 0 {
        index - 1
    } else if index < 0 {
        vertex_count as i64 + index
    } else {
        return Err(parse_error(line, "face index 0 is invalid"));
    };

    if resolved < 0 || resolved >= vertex_count as i64 {
        return Err(parse_error(line, &format!("face index {} out of range", index)));
    }
    Ok(resolved as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "\
# unit quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vn 0 0 1
f 1//1 2//1 3//1 4//1
";

    #[test]
    fn parses_and_triangulates_quad() {
        let mesh = Mesh::parse_obj(QUAD).unwrap();
        assert_eq!(mesh.positions().len(), 4);
        assert_eq!(mesh.faces(), &[[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn negative_indices_are_relative() {
        let mesh = Mesh::parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n").unwrap();
        assert_eq!(mesh.faces(), &[[0, 1, 2]]);
    }

    #[test]
    fn rejects_out_of_range_face() {
        let err = Mesh::parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 4\n").unwrap_err();
        assert!(matches!(err, MeshError::Parse { line: 4, .. }));
    }

    #[test]
    fn new_rejects_face_past_vertices() {
        let err = Mesh::new(vec![Vec3::ZERO], vec![[0, 1, 2]]).unwrap_err();
        assert!(matches!(err, MeshError::Parse { line: 0, .. }));

        let err = Mesh::new(vec![Vec3::ZERO; 3], Vec::new()).unwrap_err();
        assert!(matches!(err, MeshError::Empty));
    }

    #[test]
    fn rejects_bad_coordinate() {
        let err = Mesh::parse_obj("v 0 zero 0\n").unwrap_err();
        assert!(matches!(err, MeshError::Parse { line: 1, .. }));
    }

    #[test]
    fn rejects_mesh_without_faces() {
        let err = Mesh::parse_obj("v 0 0 0\n").unwrap_err();
        assert!(matches!(err, MeshError::Empty));
    }

    #[test]
    fn normals_face_along_winding() {
        let mesh = Mesh::parse_obj(QUAD).unwrap();
        for n in mesh.vertex_normals() {
            assert!((n - Vec3::Z).length() < 1e-6);
        }
    }
}
