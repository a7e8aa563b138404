//! HTML card engine: a container of repeated cards, one record per card.

use crate::acquisition::{FetchRequest, Fetcher};
use crate::audit::RecipeLog;
use crate::error::{ConfigError, RecipeError};
use crate::recipe::{page_url, Collect, Descriptor, RawRecord};
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

/// How one field is read from a card.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: String,
    /// Element inside the card; the card itself when `None`.
    pub selector: Option<String>,
    /// Read this attribute instead of the element text.
    pub attr: Option<String>,
    /// Keep only the first capture group (or the whole match).
    pub pattern: Option<String>,
    /// Resolve the value against the page URL.
    pub link: bool,
}

impl FieldRule {
    pub fn text(field: &str, selector: &str) -> Self {
        Self {
            field: field.to_string(),
            selector: Some(selector.to_string()),
            attr: None,
            pattern: None,
            link: false,
        }
    }

    /// Text of the whole card, usually narrowed with [`capture`](Self::capture).
    pub fn card_text(field: &str) -> Self {
        Self {
            field: field.to_string(),
            selector: None,
            attr: None,
            pattern: None,
            link: false,
        }
    }

    pub fn attr(field: &str, selector: &str, attr: &str) -> Self {
        Self {
            attr: Some(attr.to_string()),
            ..Self::text(field, selector)
        }
    }

    /// `href`/`src` style attribute resolved to an absolute URL.
    pub fn link(field: &str, selector: &str, attr: &str) -> Self {
        Self {
            link: true,
            ..Self::attr(field, selector, attr)
        }
    }

    pub fn capture(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }
}

/// Recipe reading repeated listing cards out of server-rendered or
/// browser-rendered HTML.
#[derive(Debug, Clone)]
pub struct CardRecipe {
    pub container: String,
    pub card: String,
    pub fields: Vec<FieldRule>,
    pub constants: Vec<(String, Value)>,
    /// Upper bound for `{page}` targets.
    pub max_pages: u32,
}

struct Compiled {
    container: Selector,
    card: Selector,
    fields: Vec<(FieldRule, Option<Selector>, Option<Regex>)>,
}

impl CardRecipe {
    pub fn new(container: &str, card: &str) -> Self {
        Self {
            container: container.to_string(),
            card: card.to_string(),
            fields: Vec::new(),
            constants: Vec::new(),
            max_pages: 10,
        }
    }

    pub fn field(mut self, rule: FieldRule) -> Self {
        self.fields.push(rule);
        self
    }

    pub fn constant(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.constants.push((field.to_string(), value.into()));
        self
    }

    pub fn max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Check every selector and pattern up front.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.compile().map(|_| ()).map_err(|e| match e {
            RecipeError::Parse(message) => ConfigError::InvalidArgument(message),
            other => ConfigError::InvalidArgument(other.to_string()),
        })
    }

    fn compile(&self) -> Result<Compiled, RecipeError> {
        let fields = self
            .fields
            .iter()
            .map(|rule| {
                let selector = rule.selector.as_deref().map(selector).transpose()?;
                let pattern = rule
                    .pattern
                    .as_deref()
                    .map(|p| {
                        Regex::new(p).map_err(|e| {
                            RecipeError::parse(format!("bad pattern for `{}`: {e}", rule.field))
                        })
                    })
                    .transpose()?;
                Ok((rule.clone(), selector, pattern))
            })
            .collect::<Result<Vec<_>, RecipeError>>()?;

        Ok(Compiled {
            container: selector(&self.container)?,
            card: selector(&self.card)?,
            fields,
        })
    }

    /// Extract the cards of one page. `Ok(None)` means the container is
    /// absent on a page after the first, which ends pagination.
    fn extract_page(
        &self,
        html: &str,
        base: &Url,
        first_page: bool,
        log: &RecipeLog,
    ) -> Result<Option<Vec<RawRecord>>, RecipeError> {
        let compiled = self.compile()?;
        let document = Html::parse_document(html);

        let containers: Vec<ElementRef> = document.select(&compiled.container).collect();
        if containers.is_empty() {
            if first_page {
                return Err(RecipeError::parse(format!(
                    "container `{}` not found on {base}",
                    self.container
                )));
            }
            return Ok(None);
        }

        let mut records = Vec::new();
        for (position, card) in containers
            .iter()
            .flat_map(|c| c.select(&compiled.card))
            .enumerate()
        {
            let mut raw = RawRecord::new();
            for (field, value) in &self.constants {
                raw.set(field, value.clone());
            }
            for (rule, selector, pattern) in &compiled.fields {
                let element = match selector {
                    Some(sel) => card.select(sel).next(),
                    None => Some(card),
                };
                let Some(value) = element.and_then(|el| read_value(el, rule, pattern.as_ref()))
                else {
                    continue;
                };
                if rule.link {
                    match base.join(&value) {
                        Ok(url) => raw.set(&rule.field, url.to_string()),
                        Err(e) => log.debug(format!("card {position}: bad link `{value}`: {e}")),
                    }
                } else {
                    raw.set(&rule.field, value);
                }
            }

            if raw.len() == self.constants.len() {
                log.debug(format!("card {position} on {base} had no readable fields"));
                continue;
            }
            records.push(raw);
        }
        Ok(Some(records))
    }
}

fn selector(css: &str) -> Result<Selector, RecipeError> {
    Selector::parse(css).map_err(|e| RecipeError::parse(format!("bad selector `{css}`: {e}")))
}

fn read_value(element: ElementRef<'_>, rule: &FieldRule, pattern: Option<&Regex>) -> Option<String> {
    let value = match &rule.attr {
        Some(attr) => element.value().attr(attr)?.trim().to_string(),
        None => element
            .text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" "),
    };
    let value = match pattern {
        Some(re) => {
            let caps = re.captures(&value)?;
            caps.get(1).or_else(|| caps.get(0))?.as_str().trim().to_string()
        }
        None => value,
    };
    (!value.is_empty()).then_some(value)
}

#[async_trait]
impl Collect for CardRecipe {
    async fn collect(
        &self,
        descriptor: &Descriptor,
        fetcher: &dyn Fetcher,
        log: &RecipeLog,
    ) -> Result<Vec<RawRecord>, RecipeError> {
        let mut records = Vec::new();

        for target in &descriptor.targets {
            let paged = target.contains("{page}");
            let last_page = if paged { self.max_pages } else { 1 };
            let mut previous: Option<Vec<RawRecord>> = None;

            for page in 1..=last_page {
                let url = page_url(target, page);
                let response = fetcher.get(FetchRequest::new(url.as_str())).await?;
                if !response.is_success() && page > 1 {
                    log.info(format!("page {page} returned HTTP {}, stopping", response.status));
                    break;
                }
                let response = response.ensure_success()?;
                let base = Url::parse(&response.final_url)
                    .or_else(|_| Url::parse(&url))
                    .map_err(|e| RecipeError::parse(format!("unusable page URL {url}: {e}")))?;

                let Some(cards) = self.extract_page(&response.body, &base, page == 1, log)? else {
                    log.debug(format!("no container on page {page}, stopping"));
                    break;
                };
                if cards.is_empty() {
                    if page == 1 {
                        log.info(format!("no cards on {url}"));
                    }
                    break;
                }
                if previous.as_ref() == Some(&cards) {
                    log.debug(format!("page {page} repeats page {}, stopping", page - 1));
                    break;
                }
                log.debug(format!("{} cards on {url}", cards.len()));
                records.extend(cards.iter().cloned());
                previous = Some(cards);
            }
        }

        Ok(records)
    }
}
