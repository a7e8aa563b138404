//! Registered builder recipes.
//!
//! Selectors and URLs here track live sites and will need updating when
//! a builder redesigns its pages.

use super::card::{CardRecipe, FieldRule};
use super::json_api::JsonApiRecipe;
use crate::acquisition::{Readiness, RenderPlan, ScrollPlan};
use crate::error::ConfigError;
use crate::listing::Kind;
use crate::recipe::{Descriptor, RegistryBuilder};
use std::time::Duration;

pub fn register_all(registry: &mut RegistryBuilder) -> Result<(), ConfigError> {
    highland_homes(registry)?;
    perry_homes(registry)?;
    toll_brothers(registry)?;
    trophy_signature(registry)?;
    Ok(())
}

fn register_cards(
    registry: &mut RegistryBuilder,
    descriptor: Descriptor,
    recipe: CardRecipe,
) -> Result<(), ConfigError> {
    recipe.validate()?;
    registry.register(descriptor, recipe)?;
    Ok(())
}

fn highland_homes(registry: &mut RegistryBuilder) -> Result<(), ConfigError> {
    const BASE: &str = "https://www.highlandhomes.com/dfw/celina/cambridge-crossing";

    register_cards(
        registry,
        Descriptor::new("Highland Homes", "Cambridge", Kind::Now)
            .target(&format!("{BASE}/homes?page={{page}}"))
            .retry_on_status(&[429, 503]),
        CardRecipe::new("div.home-list", "a.home-card")
            .field(FieldRule::text("address", ".home-address"))
            .field(FieldRule::text("plan_name", ".home-plan").capture(r"(?i)plan\s+(.+)"))
            .field(FieldRule::text("price", ".home-price"))
            .field(FieldRule::text("sqft", ".home-sqft"))
            .field(FieldRule::text("beds", ".home-beds"))
            .field(FieldRule::text("baths", ".home-baths"))
            .field(FieldRule::text("stories", ".home-stories"))
            .field(FieldRule::text("garage", ".home-garage"))
            .field(FieldRule::text("status", ".home-status"))
            .field(FieldRule::link("url", "a.home-card, .home-link", "href"))
            .field(FieldRule::link("image_url", "img", "src"))
            .max_pages(5),
    )?;

    register_cards(
        registry,
        Descriptor::new("Highland Homes", "Cambridge", Kind::Plan)
            .target(&format!("{BASE}/plans"))
            .retry_on_status(&[429, 503]),
        CardRecipe::new("div.plan-list", "a.plan-card")
            .field(FieldRule::text("plan_name", ".plan-name"))
            .field(FieldRule::text("price", ".plan-price"))
            .field(FieldRule::text("sqft", ".plan-sqft"))
            .field(FieldRule::text("beds", ".plan-beds"))
            .field(FieldRule::text("baths", ".plan-baths"))
            .field(FieldRule::text("stories", ".plan-stories"))
            .field(FieldRule::text("garage", ".plan-garage"))
            .field(FieldRule::attr("series", "[data-series]", "data-series")),
    )
}

fn perry_homes(registry: &mut RegistryBuilder) -> Result<(), ConfigError> {
    const API: &str = "https://www.perryhomes.com/api/community/cambridge";

    registry.register(
        Descriptor::new("Perry Homes", "Cambridge", Kind::Now)
            .sub_community("Cambridge 50'")
            .target(&format!("{API}/homes"))
            .retry_on_status(&[429]),
        JsonApiRecipe::new("/homes")
            .field("address", "/address")
            .field("plan_name", "/planName")
            .field("price", "/price")
            .field("original_price", "/originalPrice")
            .field("sqft", "/squareFeet")
            .field("beds", "/bedrooms")
            .field("baths", "/bathrooms")
            .field("stories", "/stories")
            .field("garage", "/garages")
            .field("status", "/availability")
            .field("mls", "/mlsNumber")
            .field("url", "/url")
            .field("image_url", "/elevationImage")
            .url_prefix("https://www.perryhomes.com"),
    )?;

    registry.register(
        Descriptor::new("Perry Homes", "Cambridge", Kind::Plan)
            .sub_community("Cambridge 50'")
            .target(&format!("{API}/plans")),
        JsonApiRecipe::new("/plans")
            .field("plan_name", "/name")
            .field("price", "/basePrice")
            .field("sqft", "/squareFeet")
            .field("beds", "/bedrooms")
            .field("baths", "/bathrooms")
            .field("stories", "/stories")
            .field("garage", "/garages")
            .field("url", "/url")
            .url_prefix("https://www.perryhomes.com"),
    )?;
    Ok(())
}

fn toll_brothers(registry: &mut RegistryBuilder) -> Result<(), ConfigError> {
    let plan = RenderPlan::new(Readiness::SelectorCount {
        selector: "div.model-card".into(),
        min: 1,
    })
    .with_scroll(ScrollPlan::default());

    register_cards(
        registry,
        Descriptor::new("Toll Brothers", "Elevon", Kind::Plan)
            .target("https://www.tollbrothers.com/luxury-homes-for-sale/Texas/Elevon")
            .rendered(plan)
            .timeout(Duration::from_secs(240)),
        CardRecipe::new("section.models", "div.model-card")
            .field(FieldRule::text("plan_name", ".model-name"))
            .field(FieldRule::text("price", ".model-price"))
            .field(FieldRule::card_text("sqft").capture(r"([\d,]+(?:\s*-\s*[\d,]+)?)\s*Sq"))
            .field(FieldRule::card_text("beds").capture(r"([\d\s\-–]+)\s*Bed"))
            .field(FieldRule::card_text("baths").capture(r"([\d.½\s\-–/]+)\s*Bath"))
            .field(FieldRule::link("url", "a", "href")),
    )
}

fn trophy_signature(registry: &mut RegistryBuilder) -> Result<(), ConfigError> {
    register_cards(
        registry,
        Descriptor::new("Trophy Signature Homes", "Elevon", Kind::Now)
            .target("https://trophysignaturehomes.com/communities/dallas-ft-worth/lavon/elevon")
            .rendered(RenderPlan::new(Readiness::ElementId {
                id: "quick-move-ins".into(),
            })),
        CardRecipe::new("#quick-move-ins", ".qmi-card")
            .field(FieldRule::text("address", ".qmi-address"))
            .field(FieldRule::text("plan_name", ".qmi-plan"))
            .field(FieldRule::text("price", ".qmi-price"))
            .field(FieldRule::text("price_cut", ".qmi-savings"))
            .field(FieldRule::text("original_price", ".qmi-was"))
            .field(FieldRule::text("sqft", ".qmi-sqft"))
            .field(FieldRule::text("beds", ".qmi-beds"))
            .field(FieldRule::text("baths", ".qmi-baths"))
            .field(FieldRule::text("status", ".qmi-status"))
            .field(FieldRule::link("url", "a.qmi-link", "href")),
    )
}
