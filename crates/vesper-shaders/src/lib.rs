//! Shader compilation for the Vesper renderer.
//!
//! This crate contains GLSL shaders and their compiled SPIR-V bytecode.
//! Shaders are compiled at build time using shaderc.

use std::sync::OnceLock;

/// Embedded SPIR-V shader bytecode (raw bytes, may not be aligned).
mod spirv_bytes {
    /// Simple lit vertex shader.
    pub static SIMPLE_SHADER_VERT: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/simple_shader_vert.spv"));

    /// Simple lit fragment shader.
    pub static SIMPLE_SHADER_FRAG: &[u8] =
        include_bytes!(concat!(env!("OUT_DIR"), "/simple_shader_frag.spv"));
}

/// Convert byte slice to aligned u32 Vec (SPIR-V requires 4-byte alignment).
fn bytes_to_spirv(bytes: &[u8]) -> Vec<u32> {
    assert!(
        bytes.len() % 4 == 0,
        "SPIR-V bytecode must be a whole number of words"
    );
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

static SIMPLE_VERT_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();
static SIMPLE_FRAG_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();

/// Vertex stage of the simple shader.
///
/// Inputs match `vesper_render::Vertex`; reads the global uniform block at
/// set 0, binding 0 and a model + normal matrix push constant block.
pub fn simple_vertex_shader() -> &'static [u32] {
    SIMPLE_VERT_SPIRV.get_or_init(|| bytes_to_spirv(spirv_bytes::SIMPLE_SHADER_VERT))
}

/// Fragment stage of the simple shader: ambient plus one point light.
pub fn simple_fragment_shader() -> &'static [u32] {
    SIMPLE_FRAG_SPIRV.get_or_init(|| bytes_to_spirv(spirv_bytes::SIMPLE_SHADER_FRAG))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_shaders_load() {
        for shader in [simple_vertex_shader(), simple_fragment_shader()] {
            assert_eq!(shader[0], 0x0723_0203, "Invalid SPIR-V magic number");
            assert!(shader.len() > 20, "Shader too small");
        }
    }

    #[test]
    fn words_are_little_endian() {
        assert_eq!(
            bytes_to_spirv(&[0x03, 0x02, 0x23, 0x07, 1, 0, 0, 0]),
            vec![0x0723_0203, 1]
        );
    }

    #[test]
    #[should_panic(expected = "whole number of words")]
    fn ragged_bytecode_rejected() {
        bytes_to_spirv(&[1, 2, 3]);
    }
}
