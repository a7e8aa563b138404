//! Immutable recipe registry keyed by (community, builder, kind).

use super::{Collect, Descriptor, Recipe};
use crate::error::ConfigError;
use crate::listing::Kind;
use std::collections::BTreeMap;
use std::sync::Arc;

type Key = (String, String, Kind);

/// Collects registrations, rejecting duplicate triples.
#[derive(Default)]
pub struct RegistryBuilder {
    recipes: BTreeMap<Key, Recipe>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        descriptor: Descriptor,
        collector: impl Collect + 'static,
    ) -> Result<&mut Self, ConfigError> {
        self.add(Recipe::new(descriptor, collector))
    }

    pub fn add(&mut self, recipe: Recipe) -> Result<&mut Self, ConfigError> {
        let key = recipe.descriptor.key();
        if self.recipes.contains_key(&key) {
            let d = &recipe.descriptor;
            return Err(ConfigError::DuplicateRecipe {
                community: d.community.clone(),
                builder: d.builder.clone(),
                kind: d.kind.to_string(),
            });
        }
        self.recipes.insert(key, recipe);
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            recipes: Arc::new(self.recipes.into_values().collect()),
        }
    }
}

/// Read-only set of registered recipes, cheap to clone.
#[derive(Clone, Default)]
pub struct Registry {
    recipes: Arc<Vec<Recipe>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    pub fn all(&self) -> Selection<'_> {
        Selection {
            registry: self,
            kinds: Vec::new(),
            communities: Vec::new(),
            builders: Vec::new(),
        }
    }

    pub fn by_kind(&self, kind: Kind) -> Selection<'_> {
        self.all().kind(kind)
    }

    pub fn by_community(&self, community: &str) -> Selection<'_> {
        self.all().community(community)
    }

    pub fn by_builder(&self, builder: &str) -> Selection<'_> {
        self.all().builder(builder)
    }

    /// Exact lookup, case-insensitive on names.
    pub fn get(&self, community: &str, builder: &str, kind: Kind) -> Result<&Recipe, ConfigError> {
        let key = (community.to_lowercase(), builder.to_lowercase(), kind);
        self.recipes
            .iter()
            .find(|r| r.descriptor.key() == key)
            .ok_or_else(|| ConfigError::UnknownRecipe {
                community: community.to_string(),
                builder: builder.to_string(),
                kind: kind.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.iter()
    }
}

/// Composable filter over a registry. Values within one dimension are
/// alternatives; dimensions are combined with AND.
#[derive(Clone)]
pub struct Selection<'a> {
    registry: &'a Registry,
    kinds: Vec<Kind>,
    communities: Vec<String>,
    builders: Vec<String>,
}

impl<'a> Selection<'a> {
    pub fn kind(mut self, kind: Kind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn community(mut self, community: &str) -> Self {
        self.communities.push(community.to_lowercase());
        self
    }

    pub fn builder(mut self, builder: &str) -> Self {
        self.builders.push(builder.to_lowercase());
        self
    }

    fn matches(&self, recipe: &Recipe) -> bool {
        let d = &recipe.descriptor;
        (self.kinds.is_empty() || self.kinds.contains(&d.kind))
            && (self.communities.is_empty()
                || self.communities.contains(&d.community.to_lowercase()))
            && (self.builders.is_empty() || self.builders.contains(&d.builder.to_lowercase()))
    }

    /// Matching recipes in registry order.
    pub fn recipes(&self) -> Vec<Recipe> {
        self.registry
            .iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect()
    }

    /// Like [`recipes`](Self::recipes), but an empty result is an error.
    pub fn require(&self) -> Result<Vec<Recipe>, ConfigError> {
        let recipes = self.recipes();
        if recipes.is_empty() {
            Err(ConfigError::EmptySelection)
        } else {
            Ok(recipes)
        }
    }
}
