mod scope;
mod stalegate;
mod validation;

pub use scope::CacheKeyScope;
pub use stalegate::{StalegateConfig, CONFIG_FILE_ENV, DEFAULT_CONFIG_FILE};
pub use validation::{validate, ConfigReport};
