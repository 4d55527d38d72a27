#![allow(dead_code)]

use ku_return_helper::{AgentConfig, Document, HostShell};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "tok-123";
pub const AJAX_PATH: &str = "/hz/mycd/ajax";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Records reloads and alerts instead of performing them
#[derive(Debug, Default)]
pub struct RecordingShell {
    pub reloads: Cell<usize>,
    pub alerts: RefCell<Vec<String>>,
}

impl HostShell for RecordingShell {
    fn reload(&self) {
        self.reloads.set(self.reloads.get() + 1);
    }

    fn alert(&self, message: &str) {
        self.alerts.borrow_mut().push(message.to_string());
    }
}

/// Short timings so confirm loops finish quickly
pub fn fast_config() -> AgentConfig {
    AgentConfig {
        first_confirm_delay_ms: 10,
        confirm_interval_ms: 5,
        max_confirm_retries: 3,
        ..AgentConfig::default()
    }
}

/// One row of the content list: (item id, selected, is a loan)
pub fn list_row(id: &str, selected: bool, loan: bool) -> String {
    let display = if selected { "inline" } else { "none" };
    let kind = if loan { "KULoan" } else { "Purchase" };
    format!(
        r#"<li class="myx-active">
             <i class="myx-icon icon-selected" style="display: {display}"></i>
             <div src="responsiveView" name="contentTabList_{id}"></div>
             <div ng-switch="content.type"><span ng-switch-when="{kind}">{id}</span></div>
           </li>"#
    )
}

pub fn list_items_html(rows: &[(&str, bool, bool)]) -> String {
    rows.iter().map(|(id, s, l)| list_row(id, *s, *l)).collect()
}

pub fn list_page_html(token: Option<&str>, rows: &[(&str, bool, bool)]) -> String {
    let script = token
        .map(|t| format!(r#"<script>var ue = 1; window.csrfToken = "{t}";</script>"#))
        .unwrap_or_default();
    let items = list_items_html(rows);
    format!(
        r##"<html><head>{script}</head><body><div id="a-page">
          <div class="myx-column myx-span10"><div class="myx-float-left">
            <div class="inline_myx button_myx">
              <div type="bulkAction" add-directive-dmyx="deliver-dmyx">
                <div type="button" action="action" deliver-dmyx="">
                  <div class="pointer_myx" id="contentAction_deliver_myx" bo-switch="action.type" bo-id="action.id">
                    <a class="myx-button myx-button-primary" href="#"><span bo-text="action.text">端末に配信</span> <span class="ng-binding" ng-hide="!selected">(0)</span></a>
                  </div>
                </div>
              </div>
            </div>
          </div></div>
          <div id="list-wrapper"><div class="contentTableList_myx"><ul class="nav">{items}</ul></div></div>
        </div></body></html>"##
    )
}

pub fn list_page(server: &MockServer, rows: &[(&str, bool, bool)]) -> Document {
    let url = Url::parse(&format!("{}/hz/mycd/myx", server.uri())).unwrap();
    Document::parse(url, &list_page_html(Some(TOKEN), rows))
}

pub fn detail_page(server: &MockServer, item_id: &str, with_content_link: bool) -> Document {
    let link = if with_content_link {
        r#"<a class="a-link-normal" href="/mn/dcw/myx.html#/home/content/booksAll">コンテンツと端末の管理</a>"#
    } else {
        ""
    };
    let html = format!(
        r#"<html><head><link rel="canonical" href="https://www.amazon.co.jp/Some-Title/dp/{item_id}"></head>
           <body><div id="a-page"><div class="a-box">
             <div id="ebooksInstantOrderUpdate">この本は読み放題で利用中です</div>
             {link}
           </div></div></body></html>"#
    );
    let url = Url::parse(&format!("{}/dp/{}", server.uri(), item_id)).unwrap();
    Document::parse(url, &html)
}

/// Serve the content list page that carries the token for detail pages
pub async fn mount_content_page(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/mn/dcw/myx.html"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(r#"<html><head><script>csrfToken = "{TOKEN}";</script></head></html>"#)),
        )
        .mount(server)
        .await;
}

/// `OwnershipData` response listing `item_id -> LEND-<item_id>`
pub fn ownership(item_ids: &[&str]) -> Value {
    let items: Vec<Value> = item_ids
        .iter()
        .map(|id| {
            json!({
                "asin": id,
                "lendingId": format!("LEND-{}", id),
                "title": format!("Title {}", id),
                "originType": "KU",
                "status": "Active",
            })
        })
        .collect();
    json!({ "OwnershipData": { "success": true, "items": items } })
}

/// Snapshot mock; `times` limits how often it answers before falling through
pub async fn mount_snapshot(server: &MockServer, item_ids: &[&str], times: Option<u64>) {
    let mock = Mock::given(method("POST"))
        .and(path(AJAX_PATH))
        .and(body_string_contains("OwnershipData"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ownership(item_ids)));
    match times {
        Some(n) => mock.up_to_n_times(n).mount(server).await,
        None => mock.mount(server).await,
    }
}

pub async fn mount_return(server: &MockServer, item_id: &str, success: bool) {
    Mock::given(method("POST"))
        .and(path(AJAX_PATH))
        .and(body_string_contains("ReturnKULoan"))
        .and(body_string_contains(format!("LEND-{}", item_id)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "ReturnKULoan": { "success": success } })),
        )
        .mount(server)
        .await;
}

/// Requests to the AJAX endpoint whose body contains `needle`
pub async fn count_requests(server: &MockServer, needle: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == AJAX_PATH)
        .filter(|r| String::from_utf8_lossy(&r.body).contains(needle))
        .count()
}
