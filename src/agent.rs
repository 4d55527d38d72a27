//! Top-level agent
//!
//! Owns the page context, the document and the injected controls. Host
//! re-renders arrive as mutation records and are delivered by [`Agent::pump`];
//! user clicks enter through [`Agent::click_bulk_return`] and
//! [`Agent::click_return_button`]. Both take `&mut self`, so at most one
//! return operation is ever in flight.

use crate::api::ApiClient;
use crate::augment::{ensure_controls, on_list_mutation, selected_item_ids, Controls, ListWatch};
use crate::config::AgentConfig;
use crate::dom::{Document, WatchFilter, WatcherId};
use crate::error::AgentError;
use crate::host::{install_style, HostShell, Overlay};
use crate::orchestrator::{ReturnOrchestrator, ReturnReport};
use crate::page::{classify, PageContext, PageSnapshot};

/// Upper bound on delivery rounds per pump, in case callbacks keep writing
const MAX_PUMP_ROUNDS: usize = 16;

pub struct Agent<H: HostShell> {
    config: AgentConfig,
    context: PageContext,
    document: Document,
    api: ApiClient,
    host: H,
    overlay: Option<Overlay>,
    controls: Controls,
    body_watcher: Option<WatcherId>,
    reloaded: bool,
}

impl<H: HostShell> Agent<H> {
    /// Classify the page and, when it is supported, augment it
    ///
    /// Unsupported pages are left untouched. A supported page without a
    /// CSRF token is logged once and also left untouched.
    pub async fn start(
        mut document: Document,
        config: AgentConfig,
        http: reqwest::Client,
        host: H,
    ) -> Result<Self, AgentError> {
        let snapshot = PageSnapshot::capture(&document);
        let context = classify(&snapshot, &http).await;
        tracing::debug!("Page context: {:?}", context);

        if !context.is_supported() {
            tracing::debug!("This page is not supported");
            return Err(AgentError::Unsupported);
        }
        let Some(token) = context.require_token() else {
            tracing::error!("CSRF token was not found");
            return Err(AgentError::TokenMissing);
        };

        let endpoint = document.url().join(&config.endpoint_path)?;
        let api = ApiClient::new(http, endpoint, token, config.batch_size);

        install_style(&mut document);
        let overlay = Overlay::install(&mut document);

        let mut agent = Self {
            config,
            context,
            document,
            api,
            host,
            overlay,
            controls: Controls::None,
            body_watcher: None,
            reloaded: false,
        };
        agent.update_page();
        agent.body_watcher = agent
            .document
            .body()
            .map(|body| agent.document.observe(body, WatchFilter::CHILD_LIST));

        Ok(agent)
    }

    pub fn context(&self) -> &PageContext {
        &self.context
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Mutable access for the host page's own re-renders
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn controls(&self) -> Controls {
        self.controls
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn is_reloaded(&self) -> bool {
        self.reloaded
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay.is_some_and(|o| o.is_visible(&self.document))
    }

    /// Deliver pending mutation records until the page is quiet
    ///
    /// The body watcher runs first, then the list watcher. Each one is
    /// disconnected while its callback writes so it never sees its own
    /// mutations.
    pub fn pump(&mut self) {
        if self.reloaded {
            return;
        }

        for _ in 0..MAX_PUMP_ROUNDS {
            let mut delivered = false;

            if let Some(watcher) = self.body_watcher {
                if self.document.take_records(watcher) > 0 {
                    delivered = true;
                    self.document.disconnect(watcher);
                    self.update_page();
                    self.document.reconnect(watcher);
                }
            }

            if let Controls::Bulk(control) = self.controls {
                if self.document.take_records(control.watcher) > 0 {
                    delivered = true;
                    if on_list_mutation(&mut self.document, &control) == ListWatch::Detached {
                        self.controls = Controls::None;
                    }
                }
            }

            if !delivered {
                return;
            }
        }

        tracing::warn!("Mutations still pending after {} rounds", MAX_PUMP_ROUNDS);
    }

    /// Bulk return of the selected loans on the content list
    ///
    /// Returns `None` when there is no enabled bulk control to click.
    pub async fn click_bulk_return(&mut self) -> Option<ReturnReport> {
        if self.reloaded {
            return None;
        }
        let Controls::Bulk(control) = self.controls else {
            return None;
        };
        if !control.is_enabled(&self.document) {
            return None;
        }

        self.document.disconnect(control.watcher);
        self.show_overlay();
        control.set_enabled(&mut self.document, false);

        let targets = selected_item_ids(&self.document, control.content_list);
        tracing::debug!("Selected items: {:?}", targets);

        let report = ReturnOrchestrator::new(&self.api, &self.config)
            .run(&targets)
            .await;

        if report.any_succeeded() {
            self.reload();
        } else {
            control.sync(&mut self.document);
            self.hide_overlay();
            self.document.reconnect(control.watcher);
        }

        Some(report)
    }

    /// Return the item shown on a loan detail page
    pub async fn click_return_button(&mut self) -> Option<ReturnReport> {
        if self.reloaded {
            return None;
        }
        let Controls::Detail(button) = self.controls else {
            return None;
        };
        if button.is_disabled(&self.document) {
            return None;
        }

        button.set_disabled(&mut self.document, true);
        self.show_overlay();

        let targets: Vec<String> = self.context.item_id.iter().cloned().collect();
        let report = ReturnOrchestrator::new(&self.api, &self.config)
            .run(&targets)
            .await;

        if report.any_succeeded() {
            self.reload();
        } else {
            button.set_disabled(&mut self.document, false);
            self.hide_overlay();
            tracing::error!("Failed to return item: item={:?}", self.context.item_id);
            self.host.alert(&self.config.failure_alert);
        }

        Some(report)
    }

    fn update_page(&mut self) {
        ensure_controls(
            &mut self.document,
            &self.context,
            &self.config,
            &mut self.controls,
        );
    }

    fn show_overlay(&mut self) {
        if let Some(overlay) = self.overlay {
            overlay.show(&mut self.document);
        }
    }

    fn hide_overlay(&mut self) {
        if let Some(overlay) = self.overlay {
            overlay.hide(&mut self.document);
        }
    }

    /// Terminal step: the next page load starts from scratch
    fn reload(&mut self) {
        if let Some(watcher) = self.body_watcher.take() {
            self.document.unobserve(watcher);
        }
        if let Controls::Bulk(control) = self.controls {
            self.document.unobserve(control.watcher);
        }
        self.reloaded = true;
        tracing::info!("Reloading page");
        self.host.reload();
    }
}
