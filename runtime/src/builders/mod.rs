//! Recipe engines and the builder catalog.

pub mod card;
pub mod catalog;
pub mod json_api;

pub use card::{CardRecipe, FieldRule};
pub use json_api::JsonApiRecipe;

use crate::error::ConfigError;
use crate::recipe::Registry;

/// Registry holding every catalog recipe.
pub fn registry() -> Result<Registry, ConfigError> {
    let mut builder = Registry::builder();
    catalog::register_all(&mut builder)?;
    Ok(builder.build())
}
