use std::{collections::HashMap, path::Path};

use crate::{
    device::{GraphicsDevice, MeshId, PRIMITIVE_RESTART, Vertex},
    error::{Error, Result},
    render::{Frame, RenderState, Renderable},
    resources::{
        Handle, Material, Registry, Resource, ResourceKind, description_lines, float_at,
        load_string,
    },
};

/// A polygon of three or four vertex indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Face {
    indices: [u32; 4],
    len: usize,
}

impl Face {
    pub fn triangle(a: u32, b: u32, c: u32) -> Self {
        Self {
            indices: [a, b, c, 0],
            len: 3,
        }
    }

    pub fn quad(a: u32, b: u32, c: u32, d: u32) -> Self {
        Self {
            indices: [a, b, c, d],
            len: 4,
        }
    }

    pub fn vertices(&self) -> &[u32] {
        &self.indices[..self.len]
    }
}

/// Rebuilds independent faces into triangle strips joined by
/// [`PRIMITIVE_RESTART`].
///
/// Greedy: the first unused face opens a strip, which is then extended with
/// any unused face sharing its trailing edge in the orientation the strip
/// expects at that point. Winding alternates with every triangle, so the edge
/// is reversed after an odd number of triangles.
pub fn build_strips(faces: &[Face]) -> Vec<u32> {
    let mut used = vec![false; faces.len()];
    let mut indices = Vec::with_capacity(faces.len() * 4);
    let mut first_unused = 0;

    while let Some(start) = (first_unused..faces.len()).find(|&i| !used[i]) {
        first_unused = start + 1;
        if !indices.is_empty() {
            indices.push(PRIMITIVE_RESTART);
        }

        used[start] = true;
        let v = faces[start].vertices();
        indices.extend_from_slice(&v[..2]);
        if v.len() == 4 {
            indices.push(v[3]);
        }
        indices.push(v[2]);
        let mut triangles = v.len() - 2;

        loop {
            let n = indices.len();
            let (mut last, mut prev) = (indices[n - 1], indices[n - 2]);
            if triangles % 2 == 1 {
                std::mem::swap(&mut last, &mut prev);
            }

            let next = faces
                .iter()
                .enumerate()
                .filter(|(i, _)| !used[*i])
                .find_map(|(i, face)| {
                    let v = face.vertices();
                    let at = v.iter().position(|&x| x == prev)?;
                    (v[(at + 1) % v.len()] == last).then_some((i, at))
                });
            let Some((next, at)) = next else { break };

            used[next] = true;
            let v = faces[next].vertices();
            let count = v.len();
            if count == 4 && triangles % 2 == 0 {
                indices.push(v[(at + 3) % count]);
            }
            indices.push(v[(at + 2) % count]);
            if count == 4 && triangles % 2 == 1 {
                indices.push(v[(at + 3) % count]);
            }
            triangles += count - 2;
        }
    }
    indices
}

/// Geometry parsed from an `.obj` file, before upload.
#[derive(Debug, Default)]
pub struct ObjData {
    pub vertices: Vec<Vertex>,
    pub faces: Vec<Face>,
    pub material: Option<Handle<Material>>,
}

/// `position[/texcoord[/normal]]`, zero-based, resolved against the lists
/// read so far.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct VertexRef {
    position: usize,
    tex_coords: Option<usize>,
    normal: Option<usize>,
}

fn resolve_index(word: &str, count: usize) -> Option<usize> {
    let index: i64 = word.parse().ok()?;
    let resolved = if index < 0 {
        count as i64 + index
    } else {
        index - 1
    };
    (0..count as i64)
        .contains(&resolved)
        .then_some(resolved as usize)
}

/// Parses the supported `.obj` subset: `v`, `vt`, `vn`, `f` and `usemtl`.
///
/// Vertices are shared between faces when they reference the same
/// position/texcoord/normal triple. Texture coordinates are flipped
/// vertically so that v = 0 addresses the first row of image data.
pub fn parse_obj(text: &str, registry: &Registry) -> Result<ObjData, String> {
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut uvs: Vec<[f32; 2]> = Vec::new();
    let mut normals: Vec<[f32; 3]> = Vec::new();
    let mut shared: HashMap<VertexRef, u32> = HashMap::new();
    let mut data = ObjData::default();

    for words in description_lines(text) {
        match words[0] {
            "v" => positions.push([
                float_at(&words, 1),
                float_at(&words, 2),
                float_at(&words, 3),
            ]),
            "vt" => uvs.push([float_at(&words, 1), 1.0 - float_at(&words, 2)]),
            "vn" => normals.push([
                float_at(&words, 1),
                float_at(&words, 2),
                float_at(&words, 3),
            ]),
            "f" => {
                let mut face = Face {
                    indices: [0; 4],
                    len: 0,
                };
                for word in words[1..].iter().take(4) {
                    let key = parse_vertex_ref(word, positions.len(), uvs.len(), normals.len())
                        .ok_or_else(|| format!("bad vertex reference {word}"))?;
                    let index = *shared.entry(key).or_insert_with(|| {
                        data.vertices.push(Vertex {
                            position: positions[key.position],
                            normal: key.normal.map_or([0.0; 3], |n| normals[n]),
                            tex_coords: key.tex_coords.map_or([0.0; 2], |t| uvs[t]),
                        });
                        (data.vertices.len() - 1) as u32
                    });
                    face.indices[face.len] = index;
                    face.len += 1;
                }
                if face.len < 3 {
                    log::warn!("skipping face with {} vertices", face.len);
                    continue;
                }
                data.faces.push(face);
            }
            "usemtl" => {
                let name = words.get(1).copied().unwrap_or_default();
                data.material = Some(
                    registry
                        .get(&format!("{name}.mat"))
                        .map_err(|e| e.to_string())?,
                );
            }
            _ => {}
        }
    }
    Ok(data)
}

fn parse_vertex_ref(word: &str, positions: usize, uvs: usize, normals: usize) -> Option<VertexRef> {
    let mut parts = word.split('/');
    let position = resolve_index(parts.next()?, positions)?;
    let tex_coords = match parts.next() {
        Some("") | None => None,
        Some(t) => Some(resolve_index(t, uvs)?),
    };
    let normal = match parts.next() {
        Some("") | None => None,
        Some(n) => Some(resolve_index(n, normals)?),
    };
    Some(VertexRef {
        position,
        tex_coords,
        normal,
    })
}

/// A drawable mesh: uploaded triangle strips plus the material they are
/// drawn with.
#[derive(Debug)]
pub struct Mesh {
    id: MeshId,
    material: Option<Handle<Material>>,
    index_count: usize,
}

impl Mesh {
    /// Uploads `vertices` and `indices` (triangle strips joined by
    /// [`PRIMITIVE_RESTART`]).
    pub fn new(
        device: &mut dyn GraphicsDevice,
        label: &str,
        vertices: &[Vertex],
        indices: &[u32],
        material: Option<Handle<Material>>,
    ) -> Result<Self> {
        let id = device.create_mesh(label, vertices, indices)?;
        Ok(Self {
            id,
            material,
            index_count: indices.len(),
        })
    }

    pub fn from_obj(device: &mut dyn GraphicsDevice, label: &str, data: &ObjData) -> Result<Self> {
        let indices = build_strips(&data.faces);
        Self::new(device, label, &data.vertices, &indices, data.material)
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn material(&self) -> Option<Handle<Material>> {
        self.material
    }

    pub fn set_material(&mut self, material: Option<Handle<Material>>) {
        self.material = material;
    }

    pub fn index_count(&self) -> usize {
        self.index_count
    }
}

impl Renderable for Mesh {
    fn render(&self, frame: &mut Frame<'_>, state: &RenderState) {
        let registry = frame.registry;
        let Some(material) = self.material.and_then(|m| registry.resolve(m)) else {
            return;
        };
        let device = frame.device();
        let Some(shader) = material.apply(device, registry) else {
            return;
        };

        shader.set_uniform(device, "modelview", state.modelview);
        shader.set_uniform(device, "projection", state.projection);
        shader.set_uniform(device, "light_direction", state.light_direction);
        shader.set_uniform(device, "light_intensity", state.light_intensity);
        shader.set_uniform(device, "ambient_intensity", state.ambient_intensity);
        shader.set_uniform(device, "sky_direction", state.sky_direction);
        device.draw(self.id);
    }
}

impl Resource for Mesh {
    const KIND: ResourceKind = ResourceKind::Mesh;

    fn load(path: &Path, registry: &Registry, device: &mut dyn GraphicsDevice) -> Result<Self> {
        let text = load_string(path)?;
        let data = parse_obj(&text, registry).map_err(|reason| Error::load(path, reason))?;
        Self::from_obj(device, &path.display().to_string(), &data)
    }

    fn release(&self, device: &mut dyn GraphicsDevice) {
        device.delete_mesh(self.id);
    }

    fn pool(registry: &Registry) -> &Vec<Self> {
        &registry.meshes
    }

    fn pool_mut(registry: &mut Registry) -> &mut Vec<Self> {
        &mut registry.meshes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_edge_continues_the_strip() {
        let faces = [Face::triangle(0, 1, 2), Face::triangle(2, 1, 3)];
        assert_eq!(build_strips(&faces), vec![0, 1, 2, 3]);
    }

    #[test]
    fn quad_becomes_two_triangles() {
        assert_eq!(build_strips(&[Face::quad(0, 1, 2, 3)]), vec![0, 1, 3, 2]);
    }

    #[test]
    fn disjoint_faces_are_separated_by_restart() {
        let faces = [Face::triangle(0, 1, 2), Face::triangle(3, 4, 5)];
        assert_eq!(
            build_strips(&faces),
            vec![0, 1, 2, PRIMITIVE_RESTART, 3, 4, 5]
        );
    }

    #[test]
    fn wrong_orientation_does_not_continue() {
        // shares edge 1-2 but in the same direction as the first face
        let faces = [Face::triangle(0, 1, 2), Face::triangle(1, 2, 3)];
        assert_eq!(
            build_strips(&faces),
            vec![0, 1, 2, PRIMITIVE_RESTART, 1, 2, 3]
        );
    }

    #[test]
    fn strip_of_three_triangles() {
        let faces = [
            Face::triangle(0, 1, 2),
            Face::triangle(2, 1, 3),
            Face::triangle(2, 3, 4),
        ];
        assert_eq!(build_strips(&faces), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn obj_vertices_are_shared() {
        let registry = Registry::new();
        let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvt 0 0\nf 1/1 2/1 3/1\nf 1/1 3/1 4/1\n";
        let data = parse_obj(obj, &registry).unwrap();
        assert_eq!(data.vertices.len(), 4);
        assert_eq!(data.faces.len(), 2);
        assert_eq!(data.vertices[0].tex_coords, [0.0, 1.0]);
    }

    #[test]
    fn obj_index_out_of_range_fails() {
        let registry = Registry::new();
        assert!(parse_obj("v 0 0 0\nf 1 2 3\n", &registry).is_err());
    }

    #[test]
    fn obj_missing_material_fails() {
        let registry = Registry::new();
        let err = parse_obj("usemtl wood\n", &registry).unwrap_err();
        assert!(err.contains("wood.mat"));
    }
}
