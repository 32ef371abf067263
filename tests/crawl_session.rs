use crawl_engine::{
    ChangeType, CrawlConfig, CrawlEngine, CrawlError, CrawlEvent, MemorySink, SessionStatus,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><head><title>Test</title></head><body>{body}</body></html>"),
        "text/html; charset=utf-8",
    )
}

/// Responds with a fixed template and notes when each request arrived
#[derive(Clone)]
struct Timed {
    template: ResponseTemplate,
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl Respond for Timed {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        self.template.clone()
    }
}

/// Smallest gap between consecutive arrivals
fn min_spacing(arrivals: &Mutex<Vec<Instant>>) -> Duration {
    let mut arrivals = arrivals.lock().unwrap().clone();
    arrivals.sort();
    arrivals
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .min()
        .unwrap_or(Duration::MAX)
}

fn links(paths: &[&str]) -> String {
    paths
        .iter()
        .map(|p| format!(r#"<a href="{p}">{p}</a>"#))
        .collect::<Vec<_>>()
        .join("\n")
}

fn config_for(server: &MockServer, seed_path: &str) -> CrawlConfig {
    let mut config = CrawlConfig::new(&format!("{}{}", server.uri(), seed_path));
    config.delay = 0.0;
    config.concurrent = 1;
    config.request_timeout = 5.0;
    config.retry_base_delay_ms = 10;
    config
}

/// Paths requested from the server, in arrival order
async fn requested_paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect()
}

/// Start a session and collect its events up to and including the terminal one
async fn run_to_end(engine: &CrawlEngine, config: CrawlConfig) -> (Uuid, Vec<CrawlEvent>) {
    let mut rx = engine.subscribe();
    let id = engine.start_crawl(config).unwrap();
    let mut events = Vec::new();

    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let event = rx.recv().await.unwrap();
            if event.session_id() != id {
                continue;
            }
            let done = event.is_terminal();
            events.push(event);
            if done {
                break;
            }
        }
    })
    .await
    .expect("session did not finish");

    (id, events)
}

#[tokio::test]
async fn test_page_budget_takes_links_in_discovery_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&links(&["/p1", "/p2", "/p3", "/p4", "/p5"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/p\d$"))
        .respond_with(html("<p>leaf</p>"))
        .mount(&server)
        .await;

    let engine = CrawlEngine::new();
    let mut config = config_for(&server, "/");
    config.max_pages = 3;
    config.max_depth = 1;
    config.respect_robots = false;

    let (id, events) = run_to_end(&engine, config).await;

    assert_eq!(engine.status(id).unwrap(), SessionStatus::Completed);
    assert_eq!(requested_paths(&server).await, vec!["/", "/p1", "/p2"]);

    let stats = engine.stats(id).unwrap();
    assert_eq!(stats.pages_crawled, 3);
    assert_eq!(stats.pages_failed + stats.pages_skipped, 0);
    assert_eq!(stats.queue_size, 0);

    assert!(matches!(events.first(), Some(CrawlEvent::Started { .. })));
    match events.last() {
        Some(CrawlEvent::Completed { stats: final_stats, .. }) => assert_eq!(*final_stats, stats),
        other => panic!("expected completion, got {other:?}"),
    }

    // Progress totals only ever grow and each completed page is reported once
    let totals: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            CrawlEvent::Progress { stats, .. } => Some(stats.pages_crawled),
            _ => None,
        })
        .collect();
    assert_eq!(totals, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_depth_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&links(&["/a"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html(&links(&["/b"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html("deep"))
        .expect(0)
        .mount(&server)
        .await;

    let engine = CrawlEngine::new();
    let mut config = config_for(&server, "/");
    config.max_depth = 1;
    config.respect_robots = false;

    let (id, _) = run_to_end(&engine, config).await;
    assert_eq!(engine.stats(id).unwrap().pages_crawled, 2);
    assert_eq!(engine.stats(id).unwrap().urls_seen, 2);
}

async fn robots_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&links(&["/private/a", "/public"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/(private/a|public)$"))
        .respond_with(html("<p>page</p>"))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_robots_disallow_sends_no_request() {
    let server = robots_server().await;
    let engine = CrawlEngine::new();
    let (id, _) = run_to_end(&engine, config_for(&server, "/")).await;

    let paths = requested_paths(&server).await;
    assert!(!paths.iter().any(|p| p.starts_with("/private")), "{paths:?}");
    assert_eq!(paths.iter().filter(|p| *p == "/robots.txt").count(), 1);

    let stats = engine.stats(id).unwrap();
    assert_eq!(stats.pages_crawled, 2);
    assert_eq!(stats.pages_skipped, 1);
    assert_eq!(engine.status(id).unwrap(), SessionStatus::Completed);
}

#[tokio::test]
async fn test_ignoring_robots_only_lifts_that_restriction() {
    let server = robots_server().await;
    let engine = CrawlEngine::new();
    let mut config = config_for(&server, "/");
    config.respect_robots = false;
    let (id, _) = run_to_end(&engine, config).await;

    let paths = requested_paths(&server).await;
    assert!(paths.contains(&"/private/a".to_string()));
    assert!(!paths.contains(&"/robots.txt".to_string()));
    assert_eq!(engine.stats(id).unwrap().pages_crawled, 3);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(html("<p>recovered</p>"))
        .mount(&server)
        .await;

    let engine = CrawlEngine::new();
    let mut config = config_for(&server, "/flaky");
    config.respect_robots = false;
    let (id, _) = run_to_end(&engine, config).await;

    assert_eq!(requested_paths(&server).await, vec!["/flaky", "/flaky"]);
    let stats = engine.stats(id).unwrap();
    assert_eq!((stats.pages_crawled, stats.pages_failed), (1, 0));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&links(&["/missing", "/ok"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(html("fine"))
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let engine = CrawlEngine::new().with_sink(sink.clone());
    let mut config = config_for(&server, "/");
    config.respect_robots = false;
    let (id, _) = run_to_end(&engine, config).await;

    let stats = engine.stats(id).unwrap();
    assert_eq!((stats.pages_crawled, stats.pages_failed), (2, 1));
    assert_eq!(engine.status(id).unwrap(), SessionStatus::Completed);

    // One content record per page, failures included
    let records = sink.pages();
    assert_eq!(records.len(), 3);
    let missing = records.iter().find(|r| r.url.ends_with("/missing")).unwrap();
    assert_eq!(missing.error.as_deref(), Some("HTTP status 404"));
    assert_eq!(missing.http_status, Some(404));

    let root = records.iter().find(|r| r.url.ends_with('/')).unwrap();
    assert_eq!(root.title.as_deref(), Some("Test"));
    assert_eq!(root.http_status, Some(200));
    assert_eq!(root.content_type.as_deref(), Some("text/html; charset=utf-8"));
    assert_eq!((root.depth, root.discovered_from.as_deref()), (0, None));

    let ok = records.iter().find(|r| r.url.ends_with("/ok")).unwrap();
    assert_eq!(ok.depth, 1);
    assert_eq!(ok.discovered_from.as_deref(), Some(root.url.as_str()));
}

#[tokio::test]
async fn test_failed_seed_fails_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let engine = CrawlEngine::new();
    let mut config = config_for(&server, "/");
    config.respect_robots = false;
    config.max_retries = 2;
    let (id, events) = run_to_end(&engine, config).await;

    assert_eq!(engine.status(id).unwrap(), SessionStatus::Failed);
    // First attempt plus two retries
    assert_eq!(requested_paths(&server).await.len(), 3);
    match events.last() {
        Some(CrawlEvent::Failed { error, stats, .. }) => {
            assert!(error.contains("500"), "{error}");
            assert_eq!(stats.pages_failed, 1);
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stop_cancels_running_session() {
    let server = MockServer::start().await;
    let many: Vec<String> = (0..50).map(|i| format!("/page{i}")).collect();
    let many: Vec<&str> = many.iter().map(String::as_str).collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&links(&many)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/page\d+$"))
        .respond_with(html("slow").set_delay(Duration::from_millis(100)))
        .mount(&server)
        .await;

    let engine = CrawlEngine::new();
    let mut config = config_for(&server, "/");
    config.respect_robots = false;
    config.delay = 0.2;
    config.concurrent = 2;

    let mut rx = engine.subscribe();
    let id = engine.start_crawl(config).unwrap();

    // Let a few pages through, then stop
    tokio::time::timeout(Duration::from_secs(10), async {
        let mut progress = 0;
        while progress < 3 {
            if let CrawlEvent::Progress { .. } = rx.recv().await.unwrap() {
                progress += 1;
            }
        }
    })
    .await
    .expect("no progress before stop");
    engine.stop_crawl(id).unwrap();

    let status = tokio::time::timeout(Duration::from_secs(5), engine.wait(id))
        .await
        .expect("stop did not finish within the request timeout")
        .unwrap();
    assert_eq!(status, SessionStatus::Cancelled);

    let seen_at_stop = requested_paths(&server).await.len();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(requested_paths(&server).await.len(), seen_at_stop);
    assert!(seen_at_stop < 51);

    // The terminal event is the last one and stop is idempotent afterwards
    loop {
        let event = rx.recv().await.unwrap();
        if event.is_terminal() {
            assert!(matches!(event, CrawlEvent::Cancelled { .. }));
            break;
        }
    }
    assert_eq!(engine.stop_crawl(id).unwrap(), SessionStatus::Cancelled);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_revisit_detects_change() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/news"))
        .respond_with(html("<p>first headline</p><p>shared line</p>"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news"))
        .respond_with(html("<p>second headline</p><p>shared line</p>"))
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let engine = CrawlEngine::new().with_sink(sink.clone());
    let config = || {
        let mut config = config_for(&server, "/news");
        config.respect_robots = false;
        config
    };

    // First sight, then identical content: no change either time
    for _ in 0..2 {
        let (_, events) = run_to_end(&engine, config()).await;
        assert!(!events.iter().any(|e| matches!(e, CrawlEvent::ChangeDetected { .. })));
    }

    let (_, events) = run_to_end(&engine, config()).await;
    let change = events
        .iter()
        .find_map(|e| match e {
            CrawlEvent::ChangeDetected { change, .. } => Some(change.clone()),
            _ => None,
        })
        .expect("change event");

    assert_eq!(change.change_type, ChangeType::Modified);
    assert_eq!((change.added_lines, change.removed_lines), (1, 1));
    assert!(change.diff_lines.contains(&"+second headline".to_string()));
    assert_eq!(sink.changes(), vec![change.clone()]);

    let detector = engine.change_detector();
    let history = detector.history(&change.url).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, change.old_version_id);
    assert_eq!(history[1].id, change.new_version_id);
}

#[tokio::test]
async fn test_configuration_errors_are_returned() {
    let engine = CrawlEngine::new();

    let mut config = CrawlConfig::new("https://example.com");
    config.max_pages = 0;
    assert!(matches!(engine.start_crawl(config), Err(CrawlError::Config(_))));

    let config = CrawlConfig::new("mailto:someone@example.com");
    assert!(matches!(
        engine.start_crawl(config),
        Err(CrawlError::InvalidSeed { .. })
    ));
    assert!(engine.session_ids().is_empty());
}

#[tokio::test]
async fn test_configured_delay_spaces_same_host_requests() {
    let server = MockServer::start().await;
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(Timed {
            template: html(&links(&["/a", "/b"])),
            arrivals: Arc::clone(&arrivals),
        })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/(a|b)$"))
        .respond_with(Timed {
            template: html("<p>leaf</p>"),
            arrivals: Arc::clone(&arrivals),
        })
        .mount(&server)
        .await;

    let engine = CrawlEngine::new();
    let mut config = config_for(&server, "/");
    config.respect_robots = false;
    config.concurrent = 3;
    config.delay = 0.3;
    let (id, _) = run_to_end(&engine, config).await;

    assert_eq!(engine.stats(id).unwrap().pages_crawled, 3);
    assert_eq!(arrivals.lock().unwrap().len(), 3);
    let spacing = min_spacing(&arrivals);
    assert!(spacing >= Duration::from_millis(250), "{spacing:?}");
}

#[tokio::test]
async fn test_robots_crawl_delay_spaces_same_host_requests() {
    let server = MockServer::start().await;
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nCrawl-delay: 0.3\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(Timed {
            template: html(&links(&["/a", "/b"])),
            arrivals: Arc::clone(&arrivals),
        })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/(a|b)$"))
        .respond_with(Timed {
            template: html("<p>leaf</p>"),
            arrivals: Arc::clone(&arrivals),
        })
        .mount(&server)
        .await;

    let engine = CrawlEngine::new();
    let mut config = config_for(&server, "/");
    config.concurrent = 3;
    let (id, _) = run_to_end(&engine, config).await;

    assert_eq!(engine.stats(id).unwrap().pages_crawled, 3);
    let spacing = min_spacing(&arrivals);
    assert!(spacing >= Duration::from_millis(250), "{spacing:?}");
}

#[tokio::test]
async fn test_huge_robots_crawl_delay_does_not_stop_the_seed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nCrawl-delay: 1e30\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<p>seed only</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let engine = CrawlEngine::new();
    let (id, _) = run_to_end(&engine, config_for(&server, "/")).await;

    assert_eq!(engine.status(id).unwrap(), SessionStatus::Completed);
    assert_eq!(engine.stats(id).unwrap().pages_crawled, 1);
}

#[tokio::test]
async fn test_rate_limited_response_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(html("<p>served</p>"))
        .mount(&server)
        .await;

    let engine = CrawlEngine::new();
    let mut config = config_for(&server, "/busy");
    config.respect_robots = false;
    let (id, _) = run_to_end(&engine, config).await;

    assert_eq!(requested_paths(&server).await, vec!["/busy"; 3]);
    let stats = engine.stats(id).unwrap();
    assert_eq!((stats.pages_crawled, stats.pages_failed), (1, 0));
    assert_eq!(engine.status(id).unwrap(), SessionStatus::Completed);
}

#[tokio::test]
async fn test_sitemap_urls_are_seeded_at_depth_one() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(format!("User-agent: *\nSitemap: {base}/map.xml\n")),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/map.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<urlset><url><loc>{base}/s1</loc></url><url><loc>{base}/s2</loc></url>\
             <url><loc>https://elsewhere.test/x</loc></url></urlset>"
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<p>no links here</p>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/s\d$"))
        .respond_with(html(&links(&["/deeper"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/deeper"))
        .respond_with(html("too deep"))
        .expect(0)
        .mount(&server)
        .await;

    let sink = Arc::new(MemorySink::new());
    let engine = CrawlEngine::new().with_sink(sink.clone());
    let mut config = config_for(&server, "/");
    config.parse_sitemaps = true;
    config.max_depth = 1;
    let (id, _) = run_to_end(&engine, config).await;

    let stats = engine.stats(id).unwrap();
    assert_eq!(stats.pages_crawled, 3);

    let paths = requested_paths(&server).await;
    assert!(paths.contains(&"/map.xml".to_string()), "{paths:?}");
    let pages: Vec<&String> = paths.iter().filter(|p| !p.ends_with(".xml") && !p.ends_with(".txt")).collect();
    assert_eq!(pages, vec!["/", "/s1", "/s2"]);

    let records = sink.pages();
    let s1 = records.iter().find(|r| r.url.ends_with("/s1")).unwrap();
    assert_eq!((s1.depth, s1.discovered_from.as_deref()), (1, None));
}
