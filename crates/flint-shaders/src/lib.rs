//! SPIR-V shader loading for the Flint renderer.
//!
//! Shader blobs are compiled ahead of time (see `shaders/README.md` at the
//! workspace root) and read at startup from a directory relative to the
//! working directory. Blobs are treated as opaque beyond the checks needed to
//! hand them to `vkCreateShaderModule`.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory searched when none is configured.
pub const DEFAULT_SHADER_DIR: &str = "shaders";
/// Vertex shader pulling vertices through a buffer device address.
pub const QUAD_VERT: &str = "quad.vert.spv";
/// Flat-coloured fragment shader.
pub const QUAD_FRAG: &str = "quad.frag.spv";
/// Fragment shader sampling the texture at set 0, binding 1.
pub const QUAD_TEXTURED_FRAG: &str = "quad_textured.frag.spv";

/// SPIR-V magic number, first word of every module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("Failed to read shader {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("SPIR-V bytecode must be 4-byte aligned, got {0} bytes")]
    Misaligned(usize),
    #[error("SPIR-V bytecode is empty")]
    Empty,
    #[error("Invalid SPIR-V magic number {0:#010x}")]
    BadMagic(u32),
}

pub type Result<T> = std::result::Result<T, ShaderError>;

/// Convert a byte slice to aligned u32 words (SPIR-V requires 4-byte alignment).
pub fn bytes_to_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.is_empty() {
        return Err(ShaderError::Empty);
    }
    if bytes.len() % 4 != 0 {
        return Err(ShaderError::Misaligned(bytes.len()));
    }
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    if words[0] != SPIRV_MAGIC {
        return Err(ShaderError::BadMagic(words[0]));
    }
    Ok(words)
}

/// Read and check a SPIR-V file.
pub fn load_spirv(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|source| ShaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let words = bytes_to_spirv(&bytes)?;
    tracing::debug!(path = %path.display(), words = words.len(), "Loaded shader");
    Ok(words)
}

/// Vertex and fragment bytecode for the mesh pipeline.
#[derive(Clone, Debug)]
pub struct ShaderSet {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl ShaderSet {
    /// Load the quad shaders from `dir`, picking the textured fragment shader if asked.
    pub fn load(dir: &Path, textured: bool) -> Result<Self> {
        let fragment = if textured {
            QUAD_TEXTURED_FRAG
        } else {
            QUAD_FRAG
        };
        Ok(Self {
            vertex: load_spirv(&dir.join(QUAD_VERT))?,
            fragment: load_spirv(&dir.join(fragment))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_bytes(extra_words: &[u32]) -> Vec<u8> {
        std::iter::once(SPIRV_MAGIC)
            .chain(extra_words.iter().copied())
            .flat_map(u32::to_le_bytes)
            .collect()
    }

    #[test]
    fn parses_little_endian_words() {
        let words = bytes_to_spirv(&module_bytes(&[0x0001_0600, 7])).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0600, 7]);
    }

    #[test]
    fn rejects_misaligned_and_empty() {
        let mut bytes = module_bytes(&[1]);
        bytes.pop();
        assert!(matches!(bytes_to_spirv(&bytes), Err(ShaderError::Misaligned(7))));
        assert!(matches!(bytes_to_spirv(&[]), Err(ShaderError::Empty)));
    }

    #[test]
    fn rejects_wrong_magic() {
        let bytes = 0xDEAD_BEEF_u32.to_le_bytes();
        assert!(matches!(
            bytes_to_spirv(&bytes),
            Err(ShaderError::BadMagic(0xDEAD_BEEF))
        ));
    }

    #[test]
    fn loads_shader_set_from_directory() {
        let dir = std::env::temp_dir().join(format!("flint-shaders-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(QUAD_VERT), module_bytes(&[1])).unwrap();
        std::fs::write(dir.join(QUAD_FRAG), module_bytes(&[2])).unwrap();

        let set = ShaderSet::load(&dir, false).unwrap();
        assert_eq!(set.vertex, vec![SPIRV_MAGIC, 1]);
        assert_eq!(set.fragment, vec![SPIRV_MAGIC, 2]);

        // Textured variant was never written
        let err = ShaderSet::load(&dir, true).unwrap_err();
        assert!(matches!(err, ShaderError::Io { .. }));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
