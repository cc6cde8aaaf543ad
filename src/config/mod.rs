pub mod component;
pub mod schema;

pub use component::ComponentConfig;
pub use schema::{resolve_config_dir, Config, CONFIG_DIR_ENV};
