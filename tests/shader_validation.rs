//! Offline validation of the generated WGSL through naga, so shader breakage
//! shows up in `cargo test` instead of at device creation.

use cinder::{render_shader_source, step_shader_source};

/// Validates WGSL code using naga.
fn validate_wgsl(code: &str) -> Result<(), String> {
    let module =
        naga::front::wgsl::parse_str(code).map_err(|e| format!("WGSL parse error: {:?}", e))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| format!("WGSL validation error: {:?}", e))?;

    Ok(())
}

#[test]
fn step_shader_validates() {
    let src = step_shader_source();
    validate_wgsl(&src).unwrap_or_else(|e| panic!("{}\n\n{}", e, src));
}

#[test]
fn step_shader_entry_point() {
    let module = naga::front::wgsl::parse_str(&step_shader_source()).unwrap();
    assert!(module.entry_points.iter().any(|ep| ep.name == "step"));
}

#[test]
fn render_shader_validates() {
    let src = render_shader_source();
    validate_wgsl(&src).unwrap_or_else(|e| panic!("{}\n\n{}", e, src));
}

#[test]
fn render_shader_entry_points() {
    let module = naga::front::wgsl::parse_str(&render_shader_source()).unwrap();
    for entry in ["vs_pool", "vs_quads", "fs_main"] {
        assert!(
            module.entry_points.iter().any(|ep| ep.name == entry),
            "missing entry point {}",
            entry
        );
    }
}
