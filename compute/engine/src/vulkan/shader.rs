//! Compute kernel loading

use super::{handle::Owned, Gpu};
use crate::{Error, Result, ShaderFileError};
use ash::vk;
#[allow(unused_imports)]
use log::{debug, error, info, log, trace, warn};
use std::{fs, path::Path, sync::Arc};

/// Read a SPIR-V binary from disk
pub fn load_spirv(path: &Path) -> Result<Vec<u32>> {
    let wrap = |source: ShaderFileError| Error::ShaderFile {
        path: path.to_owned(),
        source,
    };
    let bytes = fs::read(path).map_err(|e| wrap(e.into()))?;
    let words = spirv_words(&bytes).map_err(wrap)?;
    debug!("Loaded {} bytes of SPIR-V from {}", bytes.len(), path.display());
    Ok(words)
}

/// Reinterpret a SPIR-V binary as a sequence of 32-bit words
fn spirv_words(bytes: &[u8]) -> std::result::Result<Vec<u32>, ShaderFileError> {
    if bytes.is_empty() {
        return Err(ShaderFileError::Empty);
    }
    if bytes.len() % 4 != 0 {
        return Err(ShaderFileError::Misaligned(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|word| u32::from_ne_bytes([word[0], word[1], word[2], word[3]]))
        .collect())
}

/// Build a shader module from SPIR-V code
pub(crate) fn create_module(gpu: &Arc<Gpu>, code: &[u32]) -> Result<Owned<vk::ShaderModule>> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
    // SAFETY: Code was checked to be made of whole words, the driver
    //         validates the rest
    unsafe {
        let module = gpu
            .raw
            .create_shader_module(&create_info, None)
            .map_err(Error::resource("vkCreateShaderModule"))?;
        Ok(Owned::new(gpu, module))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs::File, io::Write, path::PathBuf};

    fn temp_file(name: &str, contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{name}-{}.spv", std::process::id()));
        File::create(&path).unwrap().write_all(contents).unwrap();
        path
    }

    #[test]
    fn missing_file() {
        let path = Path::new("/nonexistent/kernel.spv");
        let Err(Error::ShaderFile { path: reported, source }) = load_spirv(path) else {
            panic!("missing shader should be reported");
        };
        assert_eq!(reported, path);
        assert!(matches!(source, ShaderFileError::Io(_)));
    }

    #[test]
    fn empty_file() {
        let path = temp_file("empty", &[]);
        let result = load_spirv(&path);
        fs::remove_file(&path).unwrap();
        assert!(matches!(
            result,
            Err(Error::ShaderFile {
                source: ShaderFileError::Empty,
                ..
            })
        ));
    }

    #[test]
    fn misaligned_file() {
        let path = temp_file("misaligned", &[0x03, 0x02, 0x23, 0x07, 0x00]);
        let result = load_spirv(&path);
        fs::remove_file(&path).unwrap();
        assert!(matches!(
            result,
            Err(Error::ShaderFile {
                source: ShaderFileError::Misaligned(5),
                ..
            })
        ));
    }

    #[test]
    fn words_keep_native_order() {
        let magic = 0x0723_0203u32;
        let mut bytes = magic.to_ne_bytes().to_vec();
        bytes.extend_from_slice(&1u32.to_ne_bytes());
        let path = temp_file("words", &bytes);
        let result = load_spirv(&path);
        fs::remove_file(&path).unwrap();
        assert_eq!(result.unwrap(), vec![magic, 1]);
    }
}
