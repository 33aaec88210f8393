use crate::dom::{Document, Listener, ListenerAction, NodeId, Phase, Selector};

pub(crate) const HIJACKED_ATTR: &str = "data-mpv-hijacked";
pub(crate) const INJECTED_CLASS: &str = "jellyfin-mpv-new-button";
/// Set on a detail container while its PlaybackInfo lookup is in flight.
pub(crate) const CONTAINER_LOADING_ATTR: &str = "data-mpv-button-loading";
pub(crate) const ORIGINAL_HTML_ATTR: &str = "data-original-html";
pub(crate) const ORIGINAL_TITLE_ATTR: &str = "data-original-title";

pub(crate) const PLAY_LABEL: &str = "▷ Play with MPV";
pub(crate) const LOADING_LABEL: &str = "⌛";
pub(crate) const LOADING_TITLE: &str = "Resolving path…";
pub(crate) const SENT_LABEL: &str = "✔ Sent!";

const DEFAULT_TRIGGER_TITLE: &str = "Play/Resume";

/// Redirect a native play/resume button to the external player.
///
/// Returns `false` when `node` is not a button or was already taken over.
pub(crate) fn hijack_trigger(doc: &mut Document, node: NodeId) -> bool {
    if doc.tag(node) != "button" || doc.has_attr(node, HIJACKED_ATTR) {
        return false;
    }

    // The marker goes on first so a rescan racing this call cannot add a
    // second listener.
    doc.set_attr(node, HIJACKED_ATTR, "true");
    doc.add_listener(
        node,
        Listener {
            phase: Phase::Capture,
            action: ListenerAction::PlayExternally,
        },
    );

    let original = doc
        .non_empty_attr(node, "title")
        .unwrap_or(DEFAULT_TRIGGER_TITLE)
        .to_string();
    doc.set_attr(node, "title", &format!("Play with MPV (was: {original})"));
    true
}

pub(crate) fn has_injected_control(doc: &Document, container: NodeId) -> bool {
    doc.query(container, &Selector::compound().class(INJECTED_CLASS))
        .is_some()
}

/// Where a detail container's play control gets its server path from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DetailSource {
    Direct(String),
    Remote { item_id: String },
    Missing,
}

fn detail_page_selector() -> Selector {
    Selector::compound().id("itemDetailPage")
}

/// Elements of a detail page that carry the page item's own path.
fn detail_item_selector() -> Selector {
    Selector::any_of([
        Selector::compound()
            .class("itemDetailImage")
            .attr("data-id")
            .attr("data-path"),
        Selector::compound()
            .class("itemDetailImageContainer")
            .attr("data-id")
            .attr("data-path"),
        Selector::compound()
            .attr("data-id")
            .attr("data-path")
            .class("itemPage"),
        Selector::compound()
            .class("itemBackdrop")
            .attr("data-id")
            .attr("data-path"),
    ])
}

pub(crate) fn detail_path_source(doc: &Document, container: NodeId) -> DetailSource {
    let Some(page) = doc.closest(container, &detail_page_selector()) else {
        return doc
            .closest(container, &Selector::compound().attr("data-path"))
            .and_then(|node| doc.non_empty_attr(node, "data-path"))
            .map(|path| DetailSource::Direct(path.to_string()))
            .unwrap_or(DetailSource::Missing);
    };

    let embedded = doc
        .query(page, &detail_item_selector())
        .and_then(|node| doc.non_empty_attr(node, "data-path"))
        .or_else(|| doc.non_empty_attr(page, "data-path"));
    if let Some(path) = embedded {
        return DetailSource::Direct(path.to_string());
    }

    match doc.non_empty_attr(page, "data-id") {
        Some(item_id) => DetailSource::Remote {
            item_id: item_id.to_string(),
        },
        None => DetailSource::Missing,
    }
}

/// Detached play button that launches `local_path` directly.
pub(crate) fn build_play_button(doc: &mut Document, local_path: &str) -> NodeId {
    let button = doc.create_element("button");
    doc.set_attr(
        button,
        "class",
        &format!("button-flat itemExtraButton emby-button {INJECTED_CLASS}"),
    );
    doc.set_attr(button, "type", "button");
    doc.set_attr(button, "title", &format!("Play with MPV: {local_path}"));
    doc.set_text(button, PLAY_LABEL);
    doc.add_listener(
        button,
        Listener {
            phase: Phase::Bubble,
            action: ListenerAction::LaunchLocal(local_path.to_string()),
        },
    );
    button
}

/// Toggle the hourglass state of `control`.
///
/// Entering stashes the label and tooltip once; leaving puts back exactly
/// what was stashed, including the absence of a tooltip.
pub(crate) fn set_loading(doc: &mut Document, control: NodeId, loading: bool) {
    if loading {
        if !doc.has_attr(control, ORIGINAL_HTML_ATTR) {
            let label = doc.text(control).to_string();
            doc.set_attr(control, ORIGINAL_HTML_ATTR, &label);
            if let Some(title) = doc.attr(control, "title").map(str::to_string) {
                doc.set_attr(control, ORIGINAL_TITLE_ATTR, &title);
            }
        }
        doc.set_text(control, LOADING_LABEL);
        doc.set_attr(control, "title", LOADING_TITLE);
        doc.set_disabled(control, true);
        return;
    }

    if let Some(label) = doc.attr(control, ORIGINAL_HTML_ATTR).map(str::to_string) {
        doc.set_text(control, &label);
        match doc.attr(control, ORIGINAL_TITLE_ATTR).map(str::to_string) {
            Some(title) => doc.set_attr(control, "title", &title),
            None => doc.remove_attr(control, "title"),
        }
        doc.remove_attr(control, ORIGINAL_HTML_ATTR);
        doc.remove_attr(control, ORIGINAL_TITLE_ATTR);
    }
    doc.set_disabled(control, false);
}

#[cfg(test)]
pub(crate) fn is_loading(doc: &Document, control: NodeId) -> bool {
    doc.has_attr(control, ORIGINAL_HTML_ATTR)
}
