//! End to end: registry → runner → fetch layer → normalizer → sinks,
//! against a local mock builder site and a scripted browser.

use std::fs::File;
use std::io::BufReader;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use assert_json_diff::assert_json_include;
use async_trait::async_trait;
use homescrape_runtime::acquisition::{Fetchers, HostLimiter, HttpSettings, Readiness, RenderPlan};
use homescrape_runtime::builders::{CardRecipe, FieldRule, JsonApiRecipe};
use homescrape_runtime::listing::{Kind, COLUMNS};
use homescrape_runtime::pool::PoolManager;
use homescrape_runtime::recipe::{Descriptor, Recipe, Registry};
use homescrape_runtime::renderer::{NavigationResult, RenderContext, Renderer};
use homescrape_runtime::runner::{RecipeStatus, RunOptions, RunReport, Runner};
use homescrape_runtime::sink::{read_jsonl, write_listings, write_report, OutputFormat};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE_1: &str = r#"<html><body>
  <section class="inventory">
    <div class="home-card">
      <h3 class="address">101 Bluebonnet Dr</h3>
      <span class="plan">Plan Ash</span>
      <span class="price">$400,000</span>
      <span class="specs">4 beds | 3 baths | 2,000 sq ft</span>
      <a href="/homes/101-bluebonnet">View home</a>
    </div>
    <div class="home-card">
      <h3 class="address">105 Bluebonnet Dr</h3>
      <span class="plan">Plan Cedar</span>
      <span class="price">Now $350,000</span>
      <span class="specs">3 beds | 2 baths | 1,750 sq ft</span>
      <a href="/homes/105-bluebonnet">View home</a>
    </div>
  </section>
</body></html>"#;

const PAGE_2: &str = r#"<html><body><section class="inventory"></section></body></html>"#;

const RENDERED: &str = r#"<html><body><div id="plans">
  <div class="plan-card"><h4>Kessler</h4><p>From $612,995</p><p>3,144 sq ft</p></div>
  <div class="plan-card"><h4>Marlowe</h4><p>From $689,995</p><p>3,562 sq ft</p></div>
</div></body></html>"#;

fn inventory_recipe() -> CardRecipe {
    CardRecipe::new("section.inventory", "div.home-card")
        .field(FieldRule::text("address", ".address"))
        .field(FieldRule::text("plan_name", ".plan").capture(r"Plan\s+(.+)"))
        .field(FieldRule::text("price", ".price"))
        .field(FieldRule::text("beds", ".specs").capture(r"(\d+)\s*beds"))
        .field(FieldRule::text("baths", ".specs").capture(r"(\d+)\s*baths"))
        .field(FieldRule::text("sqft", ".specs").capture(r"([\d,]+)\s*sq"))
        .field(FieldRule::link("url", "a", "href"))
        .constant("status", "Move-In Ready")
}

fn plans_recipe() -> JsonApiRecipe {
    JsonApiRecipe::new("/plans")
        .field("plan_name", "/name")
        .field("price", "/basePrice")
        .field("sqft", "/squareFeet")
        .field("stories", "/stories")
        .field("url", "/href")
}

fn rendered_recipe() -> CardRecipe {
    CardRecipe::new("#plans", ".plan-card")
        .field(FieldRule::text("plan_name", "h4"))
        .field(FieldRule::card_text("price").capture(r"From\s+(\$[\d,]+)"))
        .field(FieldRule::card_text("sqft").capture(r"([\d,]+)\s*sq"))
}

fn rendered_descriptor() -> Descriptor {
    Descriptor::new("Toll Brothers", "Elevon", Kind::Plan)
        .target("https://render.test/elevon")
        .rendered(RenderPlan::new(Readiness::ElementId { id: "plans".into() }))
}

async fn mock_builder_site() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/homes"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE_1))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/homes"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE_2))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/plans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"plans": [
            {"name": "Ash", "basePrice": 389990, "squareFeet": 2450, "stories": 2,
             "href": "https://perry.test/plans/ash"},
            {"name": "Birch", "basePrice": "$412,990", "squareFeet": "2,716"}
        ]})))
        .mount(&server)
        .await;
    server
}

fn static_registry(server: &MockServer) -> Registry {
    let mut registry = Registry::builder();
    registry
        .register(
            Descriptor::new("Highland Homes", "Cambridge", Kind::Now)
                .target(&format!("{}/homes?page={{page}}", server.uri())),
            inventory_recipe(),
        )
        .unwrap()
        .register(
            Descriptor::new("Perry Homes", "Cambridge", Kind::Plan)
                .target(&format!("{}/api/plans", server.uri())),
            plans_recipe(),
        )
        .unwrap();
    registry.build()
}

fn fetchers() -> Fetchers {
    Fetchers::new(HttpSettings::default(), Arc::new(HostLimiter::new(2, 0)))
}

async fn run(source: Fetchers, recipes: Vec<Recipe>) -> RunReport {
    let options = RunOptions {
        retries: 0,
        ..RunOptions::default()
    };
    Runner::new(Arc::new(source), options)
        .run(recipes, CancellationToken::new())
        .await
}

/// Serves one canned DOM for every page; counts sessions opened.
struct ScriptedBrowser {
    html: String,
    opened: Arc<AtomicUsize>,
}

#[async_trait]
impl Renderer for ScriptedBrowser {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedPage {
            html: self.html.clone(),
        }))
    }
}

struct ScriptedPage {
    html: String,
}

#[async_trait]
impl RenderContext for ScriptedPage {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        Ok(NavigationResult {
            final_url: url.to_string(),
            status: 200,
            load_time_ms: 12,
        })
    }

    async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
        Ok(json!(true))
    }

    async fn content(&self) -> Result<String> {
        Ok(self.html.clone())
    }

    async fn set_user_agent(&mut self, _user_agent: &str) -> Result<()> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// A browser that never starts.
struct DeadBrowser {
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl Renderer for DeadBrowser {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("chromium exited with status 127")
    }
}

#[tokio::test]
async fn static_recipes_produce_merged_table() {
    let server = mock_builder_site().await;
    let registry = static_registry(&server);

    let report = run(fetchers(), registry.all().require().unwrap()).await;

    assert_eq!(report.totals.succeeded, 2);
    assert_eq!(report.totals.listings, 4);
    assert!(!report.nothing_succeeded());

    let kinds: Vec<_> = report.listings.iter().map(|l| l.kind).collect();
    assert_eq!(kinds, vec![Kind::Now, Kind::Now, Kind::Plan, Kind::Plan]);

    let first = &report.listings[0];
    assert_eq!(first.builder, "Highland Homes");
    assert_eq!(first.address.as_deref(), Some("101 Bluebonnet Dr"));
    assert_eq!(first.plan_name, "Ash");
    assert_eq!(first.price, Some(400_000));
    assert_eq!(first.sqft, Some(2_000));
    assert_eq!(first.beds.as_deref(), Some("4"));
    assert_eq!(first.price_per_sqft, Some(200.0));
    assert_eq!(first.status.as_deref(), Some("Move-In Ready"));
    assert_eq!(
        first.url.as_deref(),
        Some(format!("{}/homes/101-bluebonnet", server.uri()).as_str())
    );

    let birch = report
        .listings
        .iter()
        .find(|l| l.plan_name == "Birch")
        .unwrap();
    assert_eq!(birch.price, Some(412_990));
    assert_eq!(birch.sqft, Some(2_716));
    assert_eq!(birch.stories, 1);
    assert!(birch.address.is_none());
}

#[tokio::test]
async fn sinks_round_trip_the_table() {
    let server = mock_builder_site().await;
    let report = run(fetchers(), static_registry(&server).all().recipes()).await;
    let dir = tempfile::tempdir().unwrap();

    let jsonl = dir.path().join("listings.jsonl");
    write_listings(OutputFormat::Jsonl, &report.listings, File::create(&jsonl).unwrap()).unwrap();
    let read_back = read_jsonl(BufReader::new(File::open(&jsonl).unwrap())).unwrap();
    assert_eq!(read_back, report.listings);

    let mut csv = Vec::new();
    write_listings(OutputFormat::Csv, &report.listings, &mut csv).unwrap();
    let csv = String::from_utf8(csv).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some(COLUMNS.join(",").as_str()));
    assert_eq!(lines.count(), report.listings.len());

    let report_path = dir.path().join("report.json");
    write_report(File::create(&report_path).unwrap(), &report).unwrap();
    let written: serde_json::Value =
        serde_json::from_reader(File::open(&report_path).unwrap()).unwrap();
    assert_json_include!(
        actual: written,
        expected: json!({
            "aborted": false,
            "recipes": [
                {"builder": "Highland Homes", "kind": "now", "status": "succeeded",
                 "attempts": 1, "attempted": 2, "emitted": 2, "strategy": "static"},
                {"builder": "Perry Homes", "kind": "plan", "status": "succeeded",
                 "attempted": 2, "emitted": 2}
            ],
            "totals": {"recipes": 2, "succeeded": 2, "listings": 4, "rejected": 0}
        })
    );
}

#[tokio::test]
async fn unreachable_page_fails_only_its_recipe() {
    let server = mock_builder_site().await;
    let mut registry = Registry::builder();
    registry
        .register(
            Descriptor::new("Perry Homes", "Cambridge", Kind::Plan)
                .target(&format!("{}/api/plans", server.uri())),
            plans_recipe(),
        )
        .unwrap()
        .register(
            Descriptor::new("Gone Homes", "Cambridge", Kind::Plan)
                .target(&format!("{}/missing", server.uri())),
            plans_recipe(),
        )
        .unwrap();

    let report = run(fetchers(), registry.build().all().recipes()).await;

    let gone = report
        .recipes
        .iter()
        .find(|r| r.builder == "Gone Homes")
        .unwrap();
    assert_eq!(gone.status, RecipeStatus::Failed);
    assert_eq!(gone.error_category.as_deref(), Some("fetch_status"));
    assert_eq!(report.totals.succeeded, 1);
    assert_eq!(report.totals.listings, 2);
}

#[tokio::test]
async fn rendered_recipe_runs_through_browser_pool() {
    let opened = Arc::new(AtomicUsize::new(0));
    let browser = ScriptedBrowser {
        html: RENDERED.to_string(),
        opened: Arc::clone(&opened),
    };
    let pool = Arc::new(PoolManager::new(Arc::new(browser), 1));
    let source = fetchers().with_pool(Arc::clone(&pool));

    let report = run(source, vec![Recipe::new(rendered_descriptor(), rendered_recipe())]).await;

    let r = &report.recipes[0];
    assert_eq!(r.status, RecipeStatus::Succeeded);
    assert_eq!(r.strategy, "rendered");
    assert_eq!(r.emitted, 2);
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(pool.active(), 0);

    let kessler = &report.listings[0];
    assert_eq!(kessler.plan_name, "Kessler");
    assert_eq!(kessler.price, Some(612_995));
    assert_eq!(kessler.sqft, Some(3_144));
}

#[tokio::test]
async fn static_recipes_never_start_the_browser() {
    let server = mock_builder_site().await;
    let attempts = Arc::new(AtomicUsize::new(0));
    let pool = Arc::new(PoolManager::new(
        Arc::new(DeadBrowser {
            attempts: Arc::clone(&attempts),
        }),
        2,
    ));

    let source = fetchers().with_pool(Arc::clone(&pool));
    let report = run(source, static_registry(&server).all().recipes()).await;
    assert_eq!(report.totals.succeeded, 2);
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
    assert_eq!(pool.acquired_total(), 0);

    let source = fetchers().with_pool(Arc::clone(&pool));
    let report = run(source, vec![Recipe::new(rendered_descriptor(), rendered_recipe())]).await;
    let r = &report.recipes[0];
    assert_eq!(r.status, RecipeStatus::Failed);
    assert_eq!(r.error_category.as_deref(), Some("browser_unavailable"));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
