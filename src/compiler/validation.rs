//! GLSL validation of emitted programs using the naga library.

use anyhow::{Result, anyhow};

use crate::dsl::ShaderStage;

/// naga's GLSL frontend only accepts desktop versions, so any existing
/// `#version` line is replaced before parsing.
const VALIDATION_VERSION: &str = "#version 450 core";

fn with_validation_version(source: &str) -> String {
    let body: Vec<&str> = source
        .lines()
        .filter(|line| !line.trim_start().starts_with("#version"))
        .collect();
    format!("{VALIDATION_VERSION}\n{}\n", body.join("\n"))
}

/// Parse and validate one emitted program.
///
/// # Returns
/// The naga module on success, or an error naming the stage and what failed.
pub fn validate_glsl(source: &str, stage: ShaderStage) -> Result<naga::Module> {
    let shader_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };

    let mut parser = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options {
        stage: shader_stage,
        defines: Default::default(),
    };

    let module = parser
        .parse(&options, &with_validation_version(source))
        .map_err(|e| anyhow!("{stage} GLSL parse failed: {e:?}"))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| anyhow!("{stage} GLSL validation failed: {e:?}"))?;

    Ok(module)
}
