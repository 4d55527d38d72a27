//! Host page collaborators: reload, alert, style block and spinner overlay

use crate::config::SCRIPT_NAME;
use crate::dom::{Document, Matcher, NodeId};

/// Browser-level side effects the agent cannot perform through the DOM
pub trait HostShell {
    /// Full navigation reload of the current document
    fn reload(&self);

    /// Blocking user-visible message
    fn alert(&self, message: &str);
}

fn style_class() -> String {
    format!("{}-css-rule", SCRIPT_NAME)
}

fn overlay_class() -> String {
    format!("{}-loading-mask", SCRIPT_NAME)
}

/// Insert the agent's style block into `<head>`, replacing a previous one
pub fn install_style(doc: &mut Document) {
    let class = style_class();
    if let Some(existing) = doc.find(doc.root(), &Matcher::tag("style").class(&class)) {
        doc.remove(existing);
    }
    let Some(head) = doc.head() else {
        tracing::warn!("No <head> to install styles into");
        return;
    };

    let mask = overlay_class();
    let css = format!(
        ".{mask} {{ position: fixed; top: 0; left: 0; z-index: 10000; width: 100%; height: 100%; background: black; opacity: 0.5; }}\n\
         .{mask} .loading {{ position: absolute; inset: 0; margin: auto; width: 100px; height: 100px; color: #F3A847; }}\n\
         .{mask} .loading svg {{ animation: {name}_now_loading 1.5s linear infinite; }}\n\
         @keyframes {name}_now_loading {{ 0% {{transform: rotate(0deg);}} 100% {{transform: rotate(360deg);}} }}",
        mask = mask,
        name = SCRIPT_NAME,
    );

    let style = doc.create_element("style");
    doc.set_attr(style, "class", &class);
    doc.set_text(style, &css);
    doc.append_child(head, style);
}

/// Full-page spinner shown while a return is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overlay {
    node: NodeId,
}

impl Overlay {
    /// Append a hidden overlay to `<body>`
    pub fn install(doc: &mut Document) -> Option<Self> {
        let body = doc.body()?;
        let node = doc.create_element("div");
        doc.set_attr(node, "class", &overlay_class());
        doc.set_display(node, "none");
        let spinner = doc.create_element("div");
        doc.set_attr(spinner, "class", "loading");
        doc.append_child(node, spinner);
        doc.append_child(body, node);
        Some(Self { node })
    }

    pub fn show(&self, doc: &mut Document) {
        doc.set_display(self.node, "block");
    }

    pub fn hide(&self, doc: &mut Document) {
        doc.set_display(self.node, "none");
    }

    pub fn is_visible(&self, doc: &Document) -> bool {
        !doc.is_hidden(self.node)
    }
}
