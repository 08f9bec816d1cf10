//! TOML config file loading and creation.

mod env;
mod loader;
mod paths;
mod template;


pub use env::{apply_env_overrides, apply_overrides_from};
pub use loader::{load_default, load_from_path};
pub use paths::{create_default_config, default_config_path};
