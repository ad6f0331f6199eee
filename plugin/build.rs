//! Compile the bundled compute kernels to SPIR-V
//!
//! Every `shaders/<name>.comp` file ends up in `$OUT_DIR/shaders/<name>.spv`,
//! which is the layout expected by `resources::shader_path()`.

use shaderc::{CompileOptions, Compiler, EnvVersion, OptimizationLevel, ShaderKind, TargetEnv};
use std::{env, fs, path::PathBuf};

fn main() {
    let source_dir = PathBuf::from("shaders");
    let output_dir = PathBuf::from(env::var_os("OUT_DIR").expect("Cargo should set OUT_DIR"))
        .join("shaders");
    fs::create_dir_all(&output_dir).expect("Failed to create shader output directory");
    println!("cargo:rerun-if-changed={}", source_dir.display());

    let compiler = Compiler::new().expect("Failed to set up shader compiler");
    let mut options = CompileOptions::new().expect("Failed to set up shader compiler options");
    options.set_target_env(TargetEnv::Vulkan, EnvVersion::Vulkan1_0 as u32);
    options.set_optimization_level(OptimizationLevel::Performance);

    for entry in fs::read_dir(&source_dir).expect("Failed to list shader sources") {
        let path = entry.expect("Failed to list shader sources").path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("comp") {
            continue;
        }
        println!("cargo:rerun-if-changed={}", path.display());

        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .expect("Shader file names should be valid UTF-8");
        let source = fs::read_to_string(&path).expect("Failed to read shader source");
        let binary = compiler
            .compile_into_spirv(&source, ShaderKind::Compute, name, "main", Some(&options))
            .unwrap_or_else(|e| panic!("Failed to compile {}: {e}", path.display()));
        if binary.get_num_warnings() > 0 {
            println!(
                "cargo:warning={name}: {}",
                binary.get_warning_messages().replace('\n', " ")
            );
        }
        fs::write(output_dir.join(format!("{name}.spv")), binary.as_binary_u8())
            .expect("Failed to write SPIR-V binary");
    }
}
