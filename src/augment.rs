//! DOM augmentation
//!
//! On the content list the deliver control is cloned into a bulk "return"
//! control whose counter follows the live selection. On a loan detail page a
//! single return button is placed after the loan anchor. Every injection is
//! guarded by a marker lookup so repeated passes are no-ops.

use crate::config::{AgentConfig, SCRIPT_NAME};
use crate::dom::{Document, Matcher, NodeId, Path, WatchFilter, WatcherId};
use crate::page::{PageContext, PageKind, LOAN_ANCHOR_ID};

/// Id given to the pointer element of the injected bulk control
pub const BULK_CONTROL_ID: &str = "contentAction_return_ku_myx";

const DELIVER_CONTROL_IDS: [&str; 2] = ["contentAction_deliver_myx", "contentAction_dummy_dlr_myx"];
const DISABLED_CLASS: &str = "myx-button-disabled";

pub fn return_button_class() -> String {
    format!("{}-return-button", SCRIPT_NAME)
}

/// Injected bulk return control on the content list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkControl {
    pub container: NodeId,
    pub button: NodeId,
    pub counter: NodeId,
    pub content_list: NodeId,
    pub watcher: WatcherId,
}

/// Injected return button on a loan detail page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnButton {
    pub node: NodeId,
}

/// Whatever control is currently injected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Controls {
    #[default]
    None,
    Bulk(BulkControl),
    Detail(ReturnButton),
}

/// Outcome of a list watcher callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListWatch {
    Live,
    Detached,
}

/// `.contentTableList_myx > ul.nav`
pub fn find_content_list(doc: &Document) -> Option<NodeId> {
    let nav = Matcher::tag("ul").class("nav");
    doc.find_all(doc.root(), &Matcher::any().class("contentTableList_myx"))
        .into_iter()
        .find_map(|table| {
            doc.children(table)
                .iter()
                .copied()
                .find(|&child| nav.matches(doc, child))
        })
}

fn find_deliver_control(doc: &Document) -> Option<NodeId> {
    DELIVER_CONTROL_IDS
        .iter()
        .find_map(|id| doc.element_by_id(id))
        .or_else(|| doc.find_path(doc.root(), &deliver_toolbar_path()))
}

/// The first action of the first toolbar group in the list header
fn deliver_toolbar_path() -> Path<'static> {
    let button_group = || Matcher::any().class("inline_myx").class("button_myx");
    Path::new(Matcher::any().class("myx-column").class("myx-span10"))
        .descendant(Matcher::any().class("myx-float-left").first_child())
        .child(button_group().first_child())
        .child(button_group())
        .descendant(
            Matcher::any()
                .class("pointer_myx")
                .attr("bo-switch", "action.type")
                .attr("bo-id", "action.id"),
        )
}

/// Selected list items that are loans, read from the checked icons
pub fn selected_loans(doc: &Document, content_list: NodeId) -> Vec<NodeId> {
    let selected_icon = Matcher::tag("i").class("myx-icon").class("icon-selected");
    let row = Matcher::tag("li").class("myx-active");
    let loan_marker = Matcher::any().attr("ng-switch-when", "KULoan");

    let mut rows = Vec::new();
    for icon in doc.find_all(content_list, &selected_icon) {
        if doc.is_hidden(icon) {
            continue;
        }
        let Some(li) = doc.closest(icon, &row) else {
            continue;
        };
        if !rows.contains(&li) && doc.find(li, &loan_marker).is_some() {
            rows.push(li);
        }
    }
    rows
}

/// Item ids of the selected loans, from `name="contentTabList_<id>"`
pub fn selected_item_ids(doc: &Document, content_list: NodeId) -> Vec<String> {
    let view = Matcher::any().attr("src", "responsiveView").has_attr("name");
    selected_loans(doc, content_list)
        .into_iter()
        .filter_map(|li| {
            let node = doc.find(li, &view)?;
            let (_, id) = doc.attr(node, "name")?.split_once("contentTabList_")?;
            (!id.is_empty()).then(|| id.to_string())
        })
        .collect()
}

impl BulkControl {
    /// Update the counter and enabled state from the live selection
    pub fn sync(&self, doc: &mut Document) -> usize {
        let count = selected_loans(doc, self.content_list).len();
        if count == 0 {
            doc.add_class(self.button, DISABLED_CLASS);
            doc.set_display(self.counter, "none");
        } else {
            doc.remove_class(self.button, DISABLED_CLASS);
            doc.set_text(self.counter, &format!("({})", count));
            doc.set_display(self.counter, "inline");
        }
        count
    }

    pub fn set_enabled(&self, doc: &mut Document, enabled: bool) {
        if enabled {
            doc.remove_class(self.button, DISABLED_CLASS);
        } else {
            doc.add_class(self.button, DISABLED_CLASS);
        }
    }

    pub fn is_enabled(&self, doc: &Document) -> bool {
        !doc.has_class(self.button, DISABLED_CLASS)
    }

    /// Counter text, `None` while hidden
    pub fn counter_text(&self, doc: &Document) -> Option<String> {
        (!doc.is_hidden(self.counter)).then(|| doc.text_content(self.counter))
    }

    /// Both the list and the control are still part of the page
    pub fn is_live(&self, doc: &Document) -> bool {
        doc.is_attached(self.content_list) && doc.is_attached(self.container)
    }

    pub fn teardown(&self, doc: &mut Document) {
        doc.unobserve(self.watcher);
        doc.remove(self.container);
    }
}

impl ReturnButton {
    pub fn set_disabled(&self, doc: &mut Document, disabled: bool) {
        if disabled {
            doc.set_attr(self.node, "disabled", "");
        } else {
            doc.remove_attr(self.node, "disabled");
        }
    }

    pub fn is_disabled(&self, doc: &Document) -> bool {
        doc.attr(self.node, "disabled").is_some()
    }
}

/// Clone the deliver control into a bulk return control
pub fn inject_bulk_control(doc: &mut Document, config: &AgentConfig) -> Option<BulkControl> {
    if doc.element_by_id(BULK_CONTROL_ID).is_some() {
        return None;
    }
    let content_list = find_content_list(doc)?;
    let deliver = find_deliver_control(doc)?;
    let deliver_container = doc.closest(deliver, &Matcher::any().class("button_myx"))?;
    let parent = doc.parent(deliver_container)?;

    let container = doc.deep_clone(deliver_container);
    let bulk_action = doc.find(container, &Matcher::any().attr("type", "bulkAction"));
    let button_action = bulk_action.and_then(|n| {
        doc.find(n, &Matcher::any().attr("type", "button").attr("action", "action"))
    });
    let pointer = button_action.and_then(|n| doc.find(n, &Matcher::any().class("pointer_myx")));
    let action_text = pointer.and_then(|n| doc.find(n, &Matcher::any().attr("bo-text", "action.text")));
    let counter = action_text
        .and_then(|n| doc.parent(n))
        .and_then(|n| doc.find(n, &Matcher::any().class("ng-binding").has_attr("ng-hide")));
    let button = pointer.and_then(|n| {
        doc.find(n, &Matcher::tag("a").class("myx-button").class("myx-button-primary"))
    });

    let (Some(bulk_action), Some(button_action), Some(pointer), Some(action_text), Some(counter), Some(button)) =
        (bulk_action, button_action, pointer, action_text, counter, button)
    else {
        tracing::debug!("Deliver control layout not recognised");
        return None;
    };

    doc.set_attr(bulk_action, "add-directive-dmyx", "return-ku-dmyx");
    doc.remove_attr(button_action, "deliver-dmyx");
    doc.remove_attr(button_action, "dummy-deliver-dmyx");
    doc.set_attr(button_action, "return-ku-dmyx", "");
    doc.set_attr(pointer, "id", BULK_CONTROL_ID);
    doc.set_text(action_text, &config.bulk_return_label);
    doc.append_child(parent, container);

    let watcher = doc.observe(content_list, WatchFilter::ALL);
    doc.disconnect(watcher);
    let control = BulkControl {
        container,
        button,
        counter,
        content_list,
        watcher,
    };
    let count = control.sync(doc);
    doc.reconnect(watcher);
    tracing::debug!("Bulk return control injected: selected={}", count);
    Some(control)
}

/// Place a return button right after the loan anchor
pub fn inject_return_button(doc: &mut Document, config: &AgentConfig) -> Option<ReturnButton> {
    let class = return_button_class();
    if doc.find(doc.root(), &Matcher::tag("button").class(&class)).is_some() {
        return None;
    }
    let anchor = doc.element_by_id(LOAN_ANCHOR_ID)?;

    let node = doc.create_element("button");
    doc.set_attr(node, "class", &format!("{} a-text-center", class));
    doc.set_text(node, &config.return_label);
    doc.insert_after(anchor, node);
    tracing::debug!("Return button injected");
    Some(ReturnButton { node })
}

/// List watcher callback: paused while it writes, dropped once detached
pub fn on_list_mutation(doc: &mut Document, control: &BulkControl) -> ListWatch {
    doc.disconnect(control.watcher);
    let count = control.sync(doc);
    tracing::debug!("Selected loans: {}", count);

    if control.is_live(doc) {
        doc.reconnect(control.watcher);
        ListWatch::Live
    } else {
        control.teardown(doc);
        ListWatch::Detached
    }
}

/// Idempotent augmentation pass for the page kind
pub fn ensure_controls(
    doc: &mut Document,
    context: &PageContext,
    config: &AgentConfig,
    controls: &mut Controls,
) {
    match context.kind {
        PageKind::ContentList => {
            if let Controls::Bulk(control) = *controls {
                if control.is_live(doc) {
                    return;
                }
                tracing::debug!("Bulk return control went stale");
                control.teardown(doc);
                *controls = Controls::None;
            }
            if let Some(control) = inject_bulk_control(doc, config) {
                *controls = Controls::Bulk(control);
            }
        }
        PageKind::LoanDetail => {
            if let Controls::Detail(button) = *controls {
                if doc.is_attached(button.node) {
                    return;
                }
            }
            if let Some(button) = inject_return_button(doc, config) {
                *controls = Controls::Detail(button);
            }
        }
        PageKind::Unsupported => {}
    }
}
