//! Mock procurement site and helpers shared by the integration tests
//!
//! The site has two centres. Khaga Mandi publishes three dates (details for
//! two of them); Bindki publishes one date with details.

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use procure_sync::config::Config;
use procure_sync::fetcher::Fetcher;
use procure_sync::logging::{LogSink, MemorySink};
use procure_sync::normalize::format_site_date;
use procure_sync::storage::SqliteStorage;
use procure_sync::sync::SyncEngine;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ENTRY_PATH: &str = "/Report/CentreList.aspx";
pub const SUMMARY_PATH: &str = "/Report/DateWise.aspx";
pub const DETAIL_PATH: &str = "/Report/Farmer.aspx";

pub const KHAGA: &str = "Khaga Mandi";
pub const BINDKI: &str = "Bindki";

pub struct MockSite {
    pub server: MockServer,
    pub today: NaiveDate,
}

impl MockSite {
    pub fn entry_url(&self) -> String {
        format!("{}{}?k=XyZ", self.server.uri(), ENTRY_PATH)
    }

    pub fn days_ago(&self, days: i64) -> NaiveDate {
        self.today - Duration::days(days)
    }

    /// Number of requests the server has seen so far
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    /// Number of requests the server has seen for `page_path`
    pub async fn requests_to(&self, page_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| {
                requests
                    .iter()
                    .filter(|request| request.url.path() == page_path)
                    .count()
            })
            .unwrap_or(0)
    }
}

fn html_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body)
}

pub fn centre_list_html() -> String {
    let row = |serial: u32, link: &str| {
        format!(
            "<tr><td>{}</td><td>{}</td><td>10</td><td>20</td><td>30</td><td>40</td></tr>",
            serial, link
        )
    };

    format!(
        r#"<html><body><table id="tblSample">
        <tr><td colspan="6">धान क्रय</td></tr>
        <tr><th>क्रम</th><th>क्रय केंद्र का नाम</th><th>a</th><th>b</th><th>c</th><th>d</th></tr>
        <tr><td>1</td><td>2</td><td>3</td><td>4</td><td>5</td><td>6</td></tr>
        {}{}
        <tr><td></td><td>कुल</td><td>20</td><td>40</td><td>60</td><td>80</td></tr>
        </table></body></html>"#,
        row(1, r#"<a href="DateWise.aspx?c=101">Khaga Mandi</a>"#),
        row(2, r#"<a href="/Report/DateWise.aspx?c=102">Bindki</a>"#),
    )
}

/// `(date, farmers, quantity, amount, details link)`
pub type SummaryFixture<'a> = (NaiveDate, u32, f64, f64, Option<&'a str>);

pub fn summary_html(centre: &str, district: &str, rows: &[SummaryFixture<'_>]) -> String {
    let body: String = rows
        .iter()
        .enumerate()
        .map(|(i, (date, farmers, quantity, amount, link))| {
            let date_cell = match link {
                Some(href) => format!(r#"<a href="{}">{}</a>"#, href, format_site_date(*date)),
                None => format_site_date(*date),
            };
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td><td>₹{:.2}</td></tr>",
                i + 1,
                date_cell,
                farmers,
                quantity,
                amount
            )
        })
        .collect();

    format!(
        r#"<html><body>
        <div id="ctl00_ContentPlaceHolder1_PnlHeader">
          <span>क्रय केंद्र का नाम : {}</span>
          <span>जनपद : {}</span>
        </div>
        <table id="tblSample">
          <tr><th>क्रम</th><th>तिथि</th><th>किसान</th><th>मात्रा</th><th>धनराशि</th></tr>
          <tr><td>1</td><td>2</td><td>3</td><td>4</td><td>5</td></tr>
          {}
          <tr><td></td><td>कुल</td><td>0</td><td>9999</td><td>9999</td></tr>
        </table></body></html>"#,
        centre, district, body
    )
}

/// `(farmer id, name, quantity, amount)`
pub type FarmerFixture<'a> = (&'a str, &'a str, f64, f64);

pub fn detail_html(date: NaiveDate, rows: &[FarmerFixture<'_>]) -> String {
    let body: String = rows
        .iter()
        .enumerate()
        .map(|(i, (id, name, quantity, amount))| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>खागा</td><td>{}</td><td>{}</td><td>{} 10:{:02}</td></tr>",
                i + 1,
                id,
                name,
                quantity,
                amount,
                format_site_date(date),
                i
            )
        })
        .collect();

    format!(
        r#"<html><body>
        <div id="ctl00_ContentPlaceHolder1_PnlHeader">क्रय दिनांक: {}</div>
        <table id="tblSample">
          <tr><th>क्रम</th><th>पंजीकरण</th><th>किसान का नाम</th><th>पता</th><th>मात्रा</th><th>धनराशि</th><th>समय</th></tr>
          <tr><td>1</td><td>2</td><td>3</td><td>4</td><td>5</td><td>6</td><td>7</td></tr>
          {}
          <tr><td></td><td></td><td>कुल</td><td></td><td>0</td><td>0</td><td></td></tr>
        </table></body></html>"#,
        format_site_date(date),
        body
    )
}

async fn mount_page(server: &MockServer, page_path: &str, query: (&str, &str), body: String) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .and(query_param(query.0, query.1))
        .respond_with(html_response(body))
        .mount(server)
        .await;
}

/// Starts the mock site; a broken Bindki answers its summary page with 500
pub async fn start_site_with(broken_bindki: bool) -> MockSite {
    let server = MockServer::start().await;
    let today = Utc::now().date_naive();
    let day = |n: i64| today - Duration::days(n);

    mount_page(&server, ENTRY_PATH, ("k", "XyZ"), centre_list_html()).await;

    mount_page(
        &server,
        SUMMARY_PATH,
        ("c", "101"),
        summary_html(
            KHAGA,
            "फतेहपुर",
            &[
                (day(30), 2, 35.5, 81_650.0, Some("Farmer.aspx?d=1")),
                (day(3), 1, 10.0, 23_000.0, Some("Farmer.aspx?d=2")),
                (day(0), 4, 60.0, 138_000.0, None),
            ],
        ),
    )
    .await;

    if broken_bindki {
        Mock::given(method("GET"))
            .and(path(SUMMARY_PATH))
            .and(query_param("c", "102"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
    } else {
        mount_page(
            &server,
            SUMMARY_PATH,
            ("c", "102"),
            summary_html(
                BINDKI,
                "फतेहपुर",
                &[(day(10), 3, 30.0, 69_000.0, Some("Farmer.aspx?d=3"))],
            ),
        )
        .await;
    }

    mount_page(
        &server,
        DETAIL_PATH,
        ("d", "1"),
        detail_html(
            day(30),
            &[("XXXX1001", "राम प्रसाद", 25.5, 58_650.0), ("XXXX1002", "सीता देवी", 10.0, 23_000.0)],
        ),
    )
    .await;
    mount_page(
        &server,
        DETAIL_PATH,
        ("d", "2"),
        detail_html(day(3), &[("XXXX2001", "मोहन लाल", 10.0, 23_000.0)]),
    )
    .await;
    mount_page(
        &server,
        DETAIL_PATH,
        ("d", "3"),
        detail_html(
            day(10),
            &[
                ("XXXX3001", "गीता", 10.0, 23_000.0),
                ("XXXX3002", "श्याम", 10.0, 23_000.0),
                ("XXXX3003", "कमला", 10.0, 23_000.0),
            ],
        ),
    )
    .await;

    MockSite { server, today }
}

pub async fn start_site() -> MockSite {
    start_site_with(false).await
}

/// Config pointing at `entry_url` with no bootstrap and no delay
pub fn test_config(entry_url: &str, db_path: &Path) -> Config {
    let mut config = Config::new(entry_url, db_path.to_string_lossy());
    config.source.bootstrap = false;
    config.fetcher.request_delay_ms = 0;
    config.sync.workers = 4;
    // The mock site dates its pages on the UTC calendar
    config.freshness.utc_offset_minutes = 0;
    config
}

pub async fn build_engine(config: Config, sink: Arc<MemorySink>) -> SyncEngine<SqliteStorage> {
    let storage = SqliteStorage::new(Path::new(&config.output.database_path)).unwrap();
    let fetcher = Fetcher::connect(&config, None).await.unwrap();
    let sink: Arc<dyn LogSink> = sink;
    SyncEngine::new(Arc::new(config), fetcher, storage, sink)
}
