//! glTF 2.0 meshes (`.gltf` with embedded buffers, or `.glb`).
//!
//! Every triangle primitive becomes one de-indexed [`StaticModel`]. A mesh
//! with a single primitive keeps the mesh name; further primitives are
//! suffixed `.1`, `.2` and so on. Materials and the node hierarchy are
//! ignored, so all meshes come back in their own model space.

use anyhow::{anyhow, bail, Context, Result};
use glam::Vec3;
use gltf::mesh::Mode;

use crate::model::StaticModel;

pub fn is_gltf_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".gltf") || lower.ends_with(".glb")
}

/// Parses a glTF document held in memory. `name` labels unnamed meshes.
pub fn load_gltf_from_slice(name: &str, data: &[u8]) -> Result<Vec<StaticModel>> {
    let (document, buffers, _images) =
        gltf::import_slice(data).with_context(|| format!("invalid glTF document `{name}`"))?;

    let mut models = Vec::new();
    for mesh in document.meshes() {
        let mesh_name = match mesh.name() {
            Some(mesh_name) => mesh_name.to_string(),
            None => format!("{name}.mesh{}", mesh.index()),
        };
        for primitive in mesh.primitives() {
            if primitive.mode() != Mode::Triangles {
                bail!(
                    "mesh `{mesh_name}` uses {:?} primitives, only triangles are supported",
                    primitive.mode()
                );
            }
            let model_name = match primitive.index() {
                0 => mesh_name.clone(),
                n => format!("{mesh_name}.{n}"),
            };
            let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

            let positions: Vec<[f32; 3]> = reader
                .read_positions()
                .ok_or_else(|| anyhow!("mesh `{model_name}` has no POSITION attribute"))?
                .collect();
            let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(Iterator::collect);
            let uvs: Option<Vec<[f32; 2]>> = reader
                .read_tex_coords(0)
                .map(|coords| coords.into_f32().collect());
            let indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };

            models.push(
                de_index(&model_name, &positions, normals.as_deref(), uvs.as_deref(), &indices)
                    .with_context(|| format!("failed to read mesh `{model_name}`"))?,
            );
        }
    }

    if models.is_empty() {
        bail!("`{name}` contains no meshes");
    }
    Ok(models)
}

fn de_index(
    name: &str,
    positions: &[[f32; 3]],
    normals: Option<&[[f32; 3]]>,
    uvs: Option<&[[f32; 2]]>,
    indices: &[u32],
) -> Result<StaticModel> {
    if indices.len() % 3 != 0 {
        bail!("{} indices do not form whole triangles", indices.len());
    }
    let mut position = Vec::with_capacity(indices.len() * 3);
    let mut normal = Vec::with_capacity(indices.len() * 3);
    let mut uv = Vec::with_capacity(indices.len() * 2);

    for triangle in indices.chunks_exact(3) {
        let mut corners = [Vec3::ZERO; 3];
        for (corner, &index) in corners.iter_mut().zip(triangle) {
            let p = positions
                .get(index as usize)
                .ok_or_else(|| anyhow!("vertex index {index} out of range"))?;
            *corner = Vec3::from_array(*p);
        }
        let face_normal = (corners[1] - corners[0])
            .cross(corners[2] - corners[0])
            .normalize_or_zero();

        for (corner, &index) in corners.iter().zip(triangle) {
            let slot = index as usize;
            let n = normals
                .and_then(|normals| normals.get(slot))
                .map_or(face_normal, |n| Vec3::from_array(*n));
            let t = uvs.and_then(|uvs| uvs.get(slot)).copied().unwrap_or([0.0, 0.0]);
            position.extend_from_slice(&corner.to_array());
            normal.extend_from_slice(&n.to_array());
            uv.extend_from_slice(&t);
        }
    }

    Ok(StaticModel::new(name, position, normal, uv)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two single-triangle meshes sharing one embedded buffer: `Hull` is
    /// indexed, `Turret` is not. Neither carries normals.
    pub(crate) const TWO_MESHES: &str = concat!(
        r#"{
  "asset": { "version": "2.0" },
  "buffers": [{
    "byteLength": 80,
    "uri": "data:application/octet-stream;base64,"#,
        "AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIAAAAAAAAAAAAAAAAA",
        "AAAAAAAAAAAAAAAAgD8AAIA/AAAAAAAAAAA=",
        r#""
  }],
  "bufferViews": [
    { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
    { "buffer": 0, "byteOffset": 36, "byteLength": 6 },
    { "buffer": 0, "byteOffset": 44, "byteLength": 36 }
  ],
  "accessors": [
    { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
      "min": [0, 0, 0], "max": [1, 1, 0] },
    { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" },
    { "bufferView": 2, "componentType": 5126, "count": 3, "type": "VEC3",
      "min": [0, 0, 0], "max": [1, 0, 1] }
  ],
  "meshes": [
    { "name": "Hull", "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1 }] },
    { "name": "Turret", "primitives": [{ "attributes": { "POSITION": 2 } }] }
  ]
}"#
    );

    #[test]
    fn every_mesh_becomes_a_model() {
        let models = load_gltf_from_slice("tank.gltf", TWO_MESHES.as_bytes()).unwrap();
        let names: Vec<&str> = models.iter().map(StaticModel::name).collect();
        assert_eq!(names, ["Hull", "Turret"]);

        let hull = &models[0];
        assert_eq!(hull.vertex_count(), 3);
        assert_eq!(hull.position(), &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(hull.uv(), &[0.0; 6]);
        for n in hull.normal().chunks_exact(3) {
            assert_eq!(n, &[0.0, 0.0, 1.0]);
        }
        for n in models[1].normal().chunks_exact(3) {
            assert_eq!(n, &[0.0, 1.0, 0.0]);
        }
    }

    #[test]
    fn documents_without_meshes_are_rejected() {
        let empty = br#"{ "asset": { "version": "2.0" } }"#;
        let err = load_gltf_from_slice("empty.gltf", empty).unwrap_err();
        assert!(err.to_string().contains("no meshes"));
        assert!(load_gltf_from_slice("junk.glb", b"not gltf").is_err());
    }

    #[test]
    fn out_of_range_indices_are_errors() {
        let err = de_index("bad", &[[0.0; 3]], None, None, &[0, 1, 2]).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn extension_check_ignores_case() {
        assert!(is_gltf_path("models/Tank.GLB"));
        assert!(is_gltf_path("tank.gltf"));
        assert!(!is_gltf_path("tank.obj"));
    }
}
