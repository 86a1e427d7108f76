//! WGSL declarations of the packed records
//!
//! Shaders that read the record buffers should include these declarations
//! verbatim. [`verify_record_layout`] parses them with naga and checks that
//! the Rust structs still produce the same bytes shaders expect.

use naga::TypeInner;

use crate::residency::PackedRecord;

pub const MATERIAL_RECORD_WGSL: &str = r#"
struct MaterialRecord {
    ambient: vec4<f32>,
    diffuse: vec4<f32>,
    specular: vec4<f32>,
    emissive: vec4<f32>,
    // colour, normal, specular, emissive layers; -1 = none
    textures: vec4<i32>,
    shininess: f32,
}
"#;

pub const SHADOW_MAP_RECORD_WGSL: &str = r#"
struct ShadowMapRecord {
    view_proj: mat4x4<f32>,
    // x = depth bias, y = normal bias, z = array layer, w = 1 when live
    params: vec4<f32>,
}
"#;

/// Layout mismatch between a Rust record and its WGSL declaration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("WGSL parse error: {0}")]
    Parse(String),
    #[error("struct {0} is not declared")]
    MissingStruct(&'static str),
    #[error("struct {name} is {wgsl} bytes in WGSL, {rust} in Rust")]
    Size { name: &'static str, wgsl: u32, rust: u32 },
    #[error("{name}.{member} is at {wgsl} in WGSL, {rust} in Rust")]
    Offset {
        name: &'static str,
        member: String,
        wgsl: u32,
        rust: u32,
    },
    #[error("{name} members differ: WGSL has {wgsl:?}")]
    Members { name: &'static str, wgsl: Vec<String> },
}

/// Check struct size and member offsets of `R` against its WGSL declaration.
pub fn verify_record_layout<R: PackedRecord>() -> Result<(), LayoutError> {
    let module = naga::front::wgsl::parse_str(R::wgsl())
        .map_err(|e| LayoutError::Parse(e.emit_to_string(R::wgsl())))?;

    let (members, span) = module
        .types
        .iter()
        .find_map(|(_, ty)| match &ty.inner {
            TypeInner::Struct { members, span } if ty.name.as_deref() == Some(R::WGSL_NAME) => {
                Some((members.clone(), *span))
            }
            _ => None,
        })
        .ok_or(LayoutError::MissingStruct(R::WGSL_NAME))?;

    let rust_size = R::size() as u32;
    if span != rust_size {
        return Err(LayoutError::Size {
            name: R::WGSL_NAME,
            wgsl: span,
            rust: rust_size,
        });
    }

    let names: Vec<String> = members
        .iter()
        .map(|m| m.name.clone().unwrap_or_default())
        .collect();
    let renamed = names
        .iter()
        .zip(R::MEMBERS)
        .any(|(wgsl, (rust, _))| wgsl != rust);
    if names.len() != R::MEMBERS.len() || renamed {
        return Err(LayoutError::Members {
            name: R::WGSL_NAME,
            wgsl: names,
        });
    }

    for (member, (name, offset)) in members.iter().zip(R::MEMBERS) {
        if member.offset != *offset as u32 {
            return Err(LayoutError::Offset {
                name: R::WGSL_NAME,
                member: name.to_string(),
                wgsl: member.offset,
                rust: *offset as u32,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::residency::record::tests::TestRecord;
    use crate::resources::{MaterialRecord, ShadowMapRecord};

    #[test]
    fn test_material_layout_matches() {
        assert_eq!(verify_record_layout::<MaterialRecord>(), Ok(()));
    }

    #[test]
    fn test_shadow_map_layout_matches() {
        assert_eq!(verify_record_layout::<ShadowMapRecord>(), Ok(()));
    }

    #[test]
    fn test_vec3_record_layout_matches() {
        assert_eq!(verify_record_layout::<TestRecord>(), Ok(()));
    }
}
