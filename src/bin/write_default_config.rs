use std::env;
use std::path::PathBuf;
use xr_gles_bootstrap::BootstrapConfig;

fn main() {
    if let Err(err) = run() {
        eprintln!("[config] error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let output_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("xr_bootstrap.json"));

    let config = BootstrapConfig::default();
    config.validate()?;
    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&output_path, config.to_json_pretty()?)?;
    println!(
        "[config] wrote {} extensions for {} to {}",
        config.required_extensions().len(),
        config.application_name,
        output_path.display()
    );
    Ok(())
}
