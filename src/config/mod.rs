// Re-export all items from the submodules
mod default_configs;
mod env_vars;
mod items_config;

// Re-export presets
pub use default_configs::Preset;

// Re-export the item list document
pub use items_config::{load_items_config, ItemsConfig};

// Re-export environment variable functions
pub use env_vars::{expand_env_vars, parse_unix_env_vars, parse_windows_env_vars};
