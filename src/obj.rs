use anyhow::{anyhow, bail, Context, Result};
use glam::{Vec2, Vec3};

use crate::model::StaticModel;

/// Parses a Wavefront OBJ document into one de-indexed mesh per `o`/`g` group.
///
/// Geometry before the first group is named `name`. Polygons are fan
/// triangulated; vertices without a normal get their face normal and
/// vertices without texture coordinates get `(0, 0)`.
pub fn load_obj_from_str(name: &str, data: &str) -> Result<Vec<StaticModel>> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    let mut groups = vec![Group::new(name)];

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        let line_no = line_no + 1;
        match tag {
            "v" => positions.push(
                parse_vec3(parts).with_context(|| format!("invalid vertex on line {line_no}"))?,
            ),
            "vn" => normals.push(
                parse_vec3(parts).with_context(|| format!("invalid normal on line {line_no}"))?,
            ),
            "vt" => uvs.push(
                parse_vec2(parts)
                    .with_context(|| format!("invalid texture coordinate on line {line_no}"))?,
            ),
            "f" => {
                let polygon =
                    parse_face(parts).with_context(|| format!("invalid face on line {line_no}"))?;
                let group = groups.last_mut().ok_or_else(|| anyhow!("no active group"))?;
                triangulate_face(&polygon, line_no, &mut group.triangles);
            }
            "o" | "g" => {
                let label = parts.collect::<Vec<_>>().join(" ");
                let label = if label.is_empty() { name } else { label.as_str() };
                groups.push(Group::new(label));
            }
            _ => {}
        }
    }

    let attributes = Attributes {
        positions: &positions,
        normals: &normals,
        uvs: &uvs,
    };
    let meshes = groups
        .into_iter()
        .filter(|group| !group.triangles.is_empty())
        .map(|group| build_mesh(group, &attributes))
        .collect::<Result<Vec<_>>>()?;
    if meshes.is_empty() {
        bail!("OBJ file does not define any faces");
    }
    Ok(meshes)
}

struct Group {
    name: String,
    triangles: Vec<Triangle>,
}

impl Group {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            triangles: Vec::new(),
        }
    }
}

struct Triangle {
    corners: [FaceIndex; 3],
    line: usize,
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    v: i32,
    vt: i32,
    vn: i32,
}

struct Attributes<'a> {
    positions: &'a [Vec3],
    normals: &'a [Vec3],
    uvs: &'a [Vec2],
}

fn next_component<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Result<f32> {
    let text = parts
        .next()
        .ok_or_else(|| anyhow!("missing vector component"))?;
    text.parse::<f32>()
        .with_context(|| format!("`{text}` is not a number"))
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let x = next_component(&mut parts)?;
    let y = next_component(&mut parts)?;
    let z = next_component(&mut parts)?;
    Ok(Vec3::new(x, y, z))
}

// A third `w` component is allowed and ignored.
fn parse_vec2<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec2> {
    let u = next_component(&mut parts)?;
    let v = next_component(&mut parts)?;
    Ok(Vec2::new(u, v))
}

fn parse_index(segment: Option<&str>) -> Result<i32> {
    match segment {
        None | Some("") => Ok(0),
        Some(text) => text
            .parse::<i32>()
            .with_context(|| format!("`{text}` is not an index")),
    }
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<FaceIndex>> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = parse_index(segments.next())?;
        if v == 0 {
            bail!("missing vertex index in `{part}`");
        }
        let vt = parse_index(segments.next())?;
        let vn = parse_index(segments.next())?;
        indices.push(FaceIndex { v, vt, vn });
    }
    if indices.len() < 3 {
        bail!("faces must reference at least 3 vertices");
    }
    Ok(indices)
}

fn triangulate_face(polygon: &[FaceIndex], line: usize, triangles: &mut Vec<Triangle>) {
    for i in 1..(polygon.len() - 1) {
        triangles.push(Triangle {
            corners: [polygon[0], polygon[i], polygon[i + 1]],
            line,
        });
    }
}

fn build_mesh(group: Group, attributes: &Attributes<'_>) -> Result<StaticModel> {
    let vertex_count = group.triangles.len() * 3;
    let mut position = Vec::with_capacity(vertex_count * 3);
    let mut normal = Vec::with_capacity(vertex_count * 3);
    let mut uv = Vec::with_capacity(vertex_count * 2);

    for triangle in &group.triangles {
        let line = triangle.line;
        let mut corners = [Vec3::ZERO; 3];
        for (corner, index) in corners.iter_mut().zip(&triangle.corners) {
            let slot = fix_index(index.v, attributes.positions.len())
                .ok_or_else(|| anyhow!("vertex index {} out of range on line {line}", index.v))?;
            *corner = attributes.positions[slot];
        }
        let face_normal = (corners[1] - corners[0])
            .cross(corners[2] - corners[0])
            .normalize_or_zero();

        for (corner, index) in corners.iter().zip(&triangle.corners) {
            let n = match index.vn {
                0 => face_normal,
                vn => {
                    let slot = fix_index(vn, attributes.normals.len()).ok_or_else(|| {
                        anyhow!("normal index {vn} out of range on line {line}")
                    })?;
                    attributes.normals[slot]
                }
            };
            let t = match index.vt {
                0 => Vec2::ZERO,
                vt => {
                    let slot = fix_index(vt, attributes.uvs.len()).ok_or_else(|| {
                        anyhow!("texture index {vt} out of range on line {line}")
                    })?;
                    attributes.uvs[slot]
                }
            };
            position.extend_from_slice(&corner.to_array());
            normal.extend_from_slice(&n.to_array());
            uv.extend_from_slice(&t.to_array());
        }
    }

    StaticModel::new(group.name, position, normal, uv).context("OBJ produced an invalid mesh")
}

/// Resolves a 1-based (or negative, relative) OBJ index into a slice offset.
fn fix_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let back = index.unsigned_abs() as usize;
        (back <= len).then(|| len - back)
    } else {
        None
    }
}
