use anyhow::Result;
use stencil_config::ConfigManager;

pub fn handle_config_command(manager: &ConfigManager) -> Result<()> {
    match manager.config_path() {
        Some(path) => println!("# Loaded from {}", path.display()),
        None => println!("# Built-in defaults"),
    }
    print!("{}", manager.to_toml_string()?);
    Ok(())
}
