//! Integration tests for the deep-scrape pipeline, driven through the
//! scripted page driver and the in-memory infrastructure doubles.

use chrono::Utc;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use uuid::Uuid;

use tracker_core::domains::website::Website;
use tracker_core::kernel::broker::{TestBroker, NOTIFY_SUBJECT};
use tracker_core::kernel::messages::{BrowserEngine, NotifyJob, ScrapeJob};
use tracker_core::kernel::scraper::{
    handle_scrape_message, run_scrape_pipeline, ScriptedPageDriver,
};
use tracker_core::kernel::storage::TestObjectStore;
use tracker_core::kernel::store::InMemoryWebsiteStore;

fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([shade, shade, shade]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn tracked_site(image_hash: Option<&str>) -> (Website, ScrapeJob) {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let website = Website {
        id,
        user_id: "user-1".to_string(),
        url: "https://example.com/feed".to_string(),
        s3_url: None,
        website_text: None,
        image_hash: image_hash.map(|value| value.to_string()),
        etags: Some("abc".to_string()),
        frequency: "daily".to_string(),
        created_at: now,
        updated_at: now,
    };
    let job = ScrapeJob {
        url: website.url.clone(),
        browser: BrowserEngine::Chromium,
        website_id: id,
        user_id: website.user_id.clone(),
    };
    (website, job)
}

fn store_with(website: Website) -> InMemoryWebsiteStore {
    let store = InMemoryWebsiteStore::new();
    store.insert_owner_email(&website.user_id, "a@b.com");
    store.insert(website);
    store
}

#[tokio::test]
async fn constant_height_page_captures_exactly_one_screenshot() {
    let (website, job) = tracked_site(None);
    let id = website.id;
    let store = store_with(website);
    let storage = TestObjectStore::new();
    let broker = TestBroker::new();

    let mut driver = ScriptedPageDriver::new(
        vec![1000, 1000, 1000, 1000],
        vec![vec!["hello".to_string(), "world".to_string()]],
        png(100, 50, 40),
    );

    run_scrape_pipeline(&job, &mut driver, &store, &storage, &broker)
        .await
        .unwrap();

    // One scroll position collected, exited via the stall rule
    let keys = storage.keys();
    let scroll_keys: Vec<_> = keys.iter().filter(|k| k.ends_with("/1.png")).collect();
    assert_eq!(scroll_keys.len(), 1);
    assert!(!keys.iter().any(|k| k.ends_with("/2.png")));
    assert!(keys.iter().any(|k| k.ends_with("/combined.png")));
    assert_eq!(driver.nudge_count, 2);

    // First-ever scrape has no stored hash, so a notification goes out
    assert_eq!(broker.messages_for_subject(NOTIFY_SUBJECT).len(), 1);
    assert!(store.get(id).unwrap().image_hash.is_some());
}

#[tokio::test]
async fn growing_page_collects_each_scroll_position() {
    let (website, job) = tracked_site(None);
    let store = store_with(website);
    let storage = TestObjectStore::new();
    let broker = TestBroker::new();

    let mut driver = ScriptedPageDriver::new(
        vec![500, 1000, 1500, 1500, 1500, 1500],
        vec![
            vec!["first".to_string()],
            vec!["first".to_string(), "second".to_string()],
            vec!["first".to_string(), "second".to_string(), "third".to_string()],
        ],
        png(120, 30, 90),
    );

    let sections = run_scrape_pipeline(&job, &mut driver, &store, &storage, &broker)
        .await
        .unwrap();

    let keys = storage.keys();
    assert!(keys.iter().any(|k| k.ends_with("/1.png")));
    assert!(keys.iter().any(|k| k.ends_with("/2.png")));
    assert!(keys.iter().any(|k| k.ends_with("/3.png")));

    // Composite is the vertical stack of the three captures
    let combined_key = keys.iter().find(|k| k.ends_with("/combined.png")).unwrap();
    let combined = image::load_from_memory(&storage.get(combined_key).unwrap()).unwrap();
    assert_eq!(combined.width(), 120);
    assert_eq!(combined.height(), 90);

    assert_eq!(sections.len(), 3);
}

#[tokio::test]
async fn identical_hash_publishes_nothing_and_leaves_state_untouched() {
    // First run to learn the hash this driver produces
    let (website, job) = tracked_site(None);
    let id = website.id;
    let store = store_with(website.clone());
    let storage = TestObjectStore::new();
    let broker = TestBroker::new();
    let mut driver = ScriptedPageDriver::new(
        vec![1000, 1000, 1000, 1000],
        vec![vec!["content".to_string()]],
        png(100, 50, 40),
    );
    run_scrape_pipeline(&job, &mut driver, &store, &storage, &broker)
        .await
        .unwrap();
    let learned_hash = store.get(id).unwrap().image_hash.unwrap();

    // Second run against a page already stored with that hash
    let mut unchanged = website;
    unchanged.image_hash = Some(learned_hash.clone());
    let store = store_with(unchanged);
    let broker = TestBroker::new();
    let mut driver = ScriptedPageDriver::new(
        vec![1000, 1000, 1000, 1000],
        vec![vec!["content".to_string()]],
        png(100, 50, 40),
    );
    run_scrape_pipeline(&job, &mut driver, &store, &storage, &broker)
        .await
        .unwrap();

    assert!(!broker.was_published_to(NOTIFY_SUBJECT));
    let after = store.get(id).unwrap();
    assert_eq!(after.image_hash.as_deref(), Some(learned_hash.as_str()));
    // No scrape result was persisted on the unchanged path
    assert_eq!(after.website_text, None);
}

#[tokio::test]
async fn changed_hash_publishes_notify_with_owner_email() {
    let (website, job) = tracked_site(Some("ffffffffffffffff"));
    let id = website.id;
    let store = store_with(website);
    let storage = TestObjectStore::new();
    let broker = TestBroker::new();

    let mut driver = ScriptedPageDriver::new(
        vec![1000, 1000, 1000, 1000],
        vec![vec!["updated content".to_string()]],
        png(100, 50, 200),
    );

    run_scrape_pipeline(&job, &mut driver, &store, &storage, &broker)
        .await
        .unwrap();

    let published = broker.messages_for_subject(NOTIFY_SUBJECT);
    assert_eq!(published.len(), 1);
    let notify = NotifyJob::from_bytes(&published[0].payload).unwrap();
    assert!(notify.has_changed);
    assert_eq!(notify.website_id, id);
    assert_eq!(notify.user_email, "a@b.com");
    assert_eq!(notify.url, "https://example.com/feed");

    let after = store.get(id).unwrap();
    assert_ne!(after.image_hash.as_deref(), Some("ffffffffffffffff"));
    assert!(after.website_text.unwrap().contains("updated content"));
    assert!(after.s3_url.unwrap().ends_with("/combined.png"));
}

#[tokio::test]
async fn repeated_scroll_content_is_deduplicated() {
    let (website, job) = tracked_site(None);
    let store = store_with(website);
    let storage = TestObjectStore::new();
    let broker = TestBroker::new();

    let mut driver = ScriptedPageDriver::new(
        vec![500, 1000, 1000, 1000, 1000],
        vec![vec!["same".to_string()], vec!["same".to_string()]],
        png(100, 50, 40),
    );

    let sections = run_scrape_pipeline(&job, &mut driver, &store, &storage, &broker)
        .await
        .unwrap();

    assert_eq!(sections, vec![vec!["same".to_string()]]);
}

#[tokio::test]
async fn malformed_scrape_message_fails_before_any_browser_launch() {
    let store = InMemoryWebsiteStore::new();
    let storage = TestObjectStore::new();
    let broker = TestBroker::new();

    let err = handle_scrape_message(b"{\"browser\":\"chromium\"}", &store, &storage, &broker)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Invalid scrape job payload"));
    assert!(storage.keys().is_empty());
    assert!(broker.published_messages().is_empty());
}
