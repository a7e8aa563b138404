//! JSON endpoint engine: an item array addressed by JSON pointer.

use crate::acquisition::{FetchRequest, Fetcher};
use crate::audit::RecipeLog;
use crate::error::RecipeError;
use crate::recipe::{page_url, Collect, Descriptor, RawRecord};
use async_trait::async_trait;
use serde_json::Value;

const LINK_FIELDS: [&str; 2] = ["url", "image_url"];

#[derive(Debug, Clone)]
pub struct JsonApiRecipe {
    /// Pointer to the item array; `""` is the document root.
    pub items: String,
    /// (field, pointer relative to an item).
    pub fields: Vec<(String, String)>,
    pub constants: Vec<(String, Value)>,
    /// Prefix for relative `url`/`image_url` values.
    pub url_prefix: Option<String>,
    pub max_pages: u32,
}

impl JsonApiRecipe {
    pub fn new(items: &str) -> Self {
        Self {
            items: items.to_string(),
            fields: Vec::new(),
            constants: Vec::new(),
            url_prefix: None,
            max_pages: 10,
        }
    }

    pub fn field(mut self, field: &str, pointer: &str) -> Self {
        self.fields.push((field.to_string(), pointer.to_string()));
        self
    }

    pub fn constant(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.constants.push((field.to_string(), value.into()));
        self
    }

    pub fn url_prefix(mut self, prefix: &str) -> Self {
        self.url_prefix = Some(prefix.to_string());
        self
    }

    fn record(&self, item: &Value) -> RawRecord {
        let mut raw = RawRecord::new();
        for (field, value) in &self.constants {
            raw.set(field, value.clone());
        }
        for (field, pointer) in &self.fields {
            let Some(value) = item.pointer(pointer) else {
                continue;
            };
            match value {
                Value::String(s) if LINK_FIELDS.contains(&field.as_str()) => {
                    raw.set(field, self.absolute(s));
                }
                Value::String(_) | Value::Number(_) | Value::Bool(_) => raw.set(field, value.clone()),
                Value::Object(_) | Value::Array(_) => raw.set_extra(field, value.clone()),
                Value::Null => {}
            }
        }
        raw
    }

    fn absolute(&self, link: &str) -> String {
        match &self.url_prefix {
            Some(prefix) if !link.starts_with("http://") && !link.starts_with("https://") => {
                format!(
                    "{}/{}",
                    prefix.trim_end_matches('/'),
                    link.trim_start_matches('/')
                )
            }
            _ => link.to_string(),
        }
    }

    fn has_items(&self, document: &Value) -> bool {
        document.pointer(&self.items).is_some_and(Value::is_array)
    }

    fn extract(&self, document: &Value, url: &str, log: &RecipeLog) -> Result<Vec<RawRecord>, RecipeError> {
        let items = document
            .pointer(&self.items)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                RecipeError::parse(format!("no item array at `{}` in {url}", self.items))
            })?;

        let mut records = Vec::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            if !item.is_object() {
                log.warn(format!("item {position} in {url} is not an object"));
                continue;
            }
            records.push(self.record(item));
        }
        Ok(records)
    }
}

#[async_trait]
impl Collect for JsonApiRecipe {
    async fn collect(
        &self,
        descriptor: &Descriptor,
        fetcher: &dyn Fetcher,
        log: &RecipeLog,
    ) -> Result<Vec<RawRecord>, RecipeError> {
        let mut records = Vec::new();

        for target in &descriptor.targets {
            let last_page = if target.contains("{page}") {
                self.max_pages
            } else {
                1
            };
            let mut previous: Option<Vec<RawRecord>> = None;

            for page in 1..=last_page {
                let url = page_url(target, page);
                let request = FetchRequest::new(url.as_str()).header("Accept", "application/json");
                let response = fetcher.get(request).await?;
                if !response.is_success() && page > 1 {
                    log.info(format!("page {page} returned HTTP {}, stopping", response.status));
                    break;
                }
                let response = response.ensure_success()?;

                // Past the first page, anything but an item array ends the listing.
                let document: Value = match response.json() {
                    Ok(document) => document,
                    Err(_) if page > 1 => {
                        log.debug(format!("page {page} is not JSON, stopping"));
                        break;
                    }
                    Err(e) => return Err(e),
                };
                if page > 1 && !self.has_items(&document) {
                    log.debug(format!("no item array on page {page}, stopping"));
                    break;
                }

                let items = self.extract(&document, &url, log)?;
                if items.is_empty() {
                    break;
                }
                if previous.as_ref() == Some(&items) {
                    log.debug(format!("page {page} repeats page {}, stopping", page - 1));
                    break;
                }
                log.debug(format!("{} items from {url}", items.len()));
                records.extend(items.iter().cloned());
                previous = Some(items);
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::FetchResponse;
    use crate::error::FetchError;
    use crate::listing::Kind;
    use serde_json::json;
    use std::collections::HashMap;

    /// Serves JSON documents by URL; anything else is a 404.
    struct Endpoints(HashMap<String, Value>);

    #[async_trait]
    impl Fetcher for Endpoints {
        async fn get(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
            let (status, body) = match self.0.get(&request.url) {
                Some(doc) => (200, doc.to_string()),
                None => (404, String::new()),
            };
            Ok(FetchResponse {
                status,
                final_url: request.url,
                bytes: body.as_bytes().to_vec(),
                body,
            })
        }
    }

    fn recipe() -> JsonApiRecipe {
        JsonApiRecipe::new("/data/homes")
            .field("address", "/address/street")
            .field("plan_name", "/plan/name")
            .field("price", "/pricing/current")
            .field("original_price", "/pricing/was")
            .field("sqft", "/sqft")
            .field("url", "/detailUrl")
            .field("features", "/features")
            .url_prefix("https://www.perryhomes.com/")
            .constant("status", "Available")
    }

    fn home(street: &str) -> Value {
        json!({"address": {"street": street}, "pricing": {"current": 420000}})
    }

    fn paged() -> Descriptor {
        Descriptor::new("Perry Homes", "Cambridge", Kind::Now)
            .target("https://api.test/homes?page={page}")
    }

    #[test]
    fn test_extracts_items() {
        let doc = json!({"data": {"homes": [
            {"address": {"street": "1 A St"}, "plan": {"name": "2450W"},
             "pricing": {"current": 420000, "was": "$500,000"}, "sqft": 2450,
             "detailUrl": "/new-homes/1-a-st", "features": ["pool"]},
            "junk",
            {"address": {"street": "2 B St"}, "pricing": {"current": null}}
        ]}});
        let log = RecipeLog::new("Perry Homes", "Cambridge", "now");
        let records = recipe().extract(&doc, "https://api.test", &log).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("price"), Some(&json!(420000)));
        assert_eq!(
            records[0].text("url").as_deref(),
            Some("https://www.perryhomes.com/new-homes/1-a-st")
        );
        assert_eq!(records[0].get("extra"), Some(&json!({"features": ["pool"]})));
        assert!(!records[1].contains("price"));
        assert_eq!(log.warning_count(), 1);
    }

    #[test]
    fn test_missing_array_is_parse_error() {
        let log = RecipeLog::new("Perry Homes", "Cambridge", "now");
        let err = recipe()
            .extract(&json!({"error": "maintenance"}), "https://api.test", &log)
            .unwrap_err();
        assert!(matches!(err, RecipeError::Parse(_)));
    }

    #[test]
    fn test_absolute_links_untouched() {
        assert_eq!(
            recipe().absolute("https://cdn.test/a.jpg"),
            "https://cdn.test/a.jpg"
        );
        assert_eq!(JsonApiRecipe::new("").absolute("/x"), "/x");
    }

    #[tokio::test]
    async fn test_missing_later_page_ends_listing() {
        let fetcher = Endpoints(HashMap::from([(
            "https://api.test/homes?page=1".to_string(),
            json!({"data": {"homes": [home("1 A St")]}}),
        )]));
        let descriptor = paged();
        let records = recipe()
            .collect(&descriptor, &fetcher, &descriptor.log())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text("address").as_deref(), Some("1 A St"));
    }

    #[tokio::test]
    async fn test_later_page_without_array_ends_listing() {
        let fetcher = Endpoints(HashMap::from([
            (
                "https://api.test/homes?page=1".to_string(),
                json!({"data": {"homes": [home("1 A St"), home("2 B St")]}}),
            ),
            (
                "https://api.test/homes?page=2".to_string(),
                json!({"error": "page out of range"}),
            ),
        ]));
        let descriptor = paged();
        let records = recipe()
            .collect(&descriptor, &fetcher, &descriptor.log())
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_page_stops_paging() {
        let doc = json!({"data": {"homes": [home("1 A St")]}});
        let fetcher = Endpoints(
            (1..=10)
                .map(|page| (format!("https://api.test/homes?page={page}"), doc.clone()))
                .collect(),
        );
        let descriptor = paged();
        let records = recipe()
            .collect(&descriptor, &fetcher, &descriptor.log())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_first_page_failure_fails_recipe() {
        let fetcher = Endpoints(HashMap::new());
        let descriptor = paged();
        let err = recipe()
            .collect(&descriptor, &fetcher, &descriptor.log())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecipeError::Fetch(FetchError::Status { status: 404, .. })
        ));
    }
}
