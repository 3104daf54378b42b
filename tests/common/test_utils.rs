//! Builds small GLB files in memory so the importer can be tested without assets.

const GLB_MAGIC: u32 = 0x4654_6C67;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

/// A triangle in the XY plane.
pub const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

/// Packs `json` and `bin` into a GLB container, padding both chunks to four bytes.
/// An empty `bin` leaves out the binary chunk.
pub fn glb(json: &str, bin: &[u8]) -> Vec<u8> {
    let mut json = json.as_bytes().to_vec();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let mut bin = bin.to_vec();
    while bin.len() % 4 != 0 {
        bin.push(0);
    }

    let bin_chunk = if bin.is_empty() { 0 } else { 8 + bin.len() };
    let total = 12 + 8 + json.len() + bin_chunk;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json);
    if !bin.is_empty() {
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        out.extend_from_slice(&bin);
    }
    out
}

/// A `car` root translated to y = 1 with a `wheel` child that is turned a
/// quarter about +Y and scaled by two. The wheel's mesh has one indexed and
/// one non-indexed triangle.
pub fn car_glb(indices: [u16; 3]) -> Vec<u8> {
    let mut bin = Vec::new();
    for position in TRIANGLE {
        for component in position {
            bin.extend_from_slice(&component.to_le_bytes());
        }
    }
    let positions_len = bin.len();
    for index in indices {
        bin.extend_from_slice(&index.to_le_bytes());
    }
    let indices_len = bin.len() - positions_len;

    let json = format!(
        r#"{{
  "asset": {{ "version": "2.0" }},
  "scene": 0,
  "scenes": [{{ "nodes": [0] }}],
  "nodes": [
    {{ "name": "car", "translation": [0.0, 1.0, 0.0], "children": [1] }},
    {{
      "name": "wheel",
      "mesh": 0,
      "rotation": [0.0, 0.70710677, 0.0, 0.70710677],
      "scale": [2.0, 2.0, 2.0]
    }}
  ],
  "meshes": [{{
    "name": "wheel",
    "primitives": [
      {{ "attributes": {{ "POSITION": 0 }}, "indices": 1 }},
      {{ "attributes": {{ "POSITION": 0 }} }}
    ]
  }}],
  "accessors": [
    {{
      "bufferView": 0,
      "componentType": 5126,
      "count": 3,
      "type": "VEC3",
      "min": [0.0, 0.0, 0.0],
      "max": [1.0, 1.0, 0.0]
    }},
    {{ "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }}
  ],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": {positions_len} }},
    {{ "buffer": 0, "byteOffset": {positions_len}, "byteLength": {indices_len} }}
  ],
  "buffers": [{{ "byteLength": {total} }}]
}}"#,
        total = bin.len(),
    );
    glb(&json, &bin)
}
