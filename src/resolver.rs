use tracing::warn;

use crate::credentials::{CredentialField, CredentialStore, Prompter};
use crate::dom::{Document, NodeId, Selector};
use crate::notice::{Notice, Notifier};
use crate::playback_info::PlaybackInfoRequest;

/// Where the server path of an element's item comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Lookup {
    /// Already in the markup.
    Direct(String),
    /// Needs a PlaybackInfo round trip.
    Remote(PlaybackInfoRequest),
    /// No path obtainable; any user-facing notice has been surfaced already.
    Unavailable,
}

pub(crate) fn item_selector() -> Selector {
    Selector::compound().attr("data-id")
}

/// Nearest inclusive ancestor carrying an item identifier.
pub(crate) fn item_container(doc: &Document, node: NodeId) -> Option<NodeId> {
    doc.closest(node, &item_selector())
}

/// `data-path` on the element itself or on its item container.
pub(crate) fn direct_path(doc: &Document, element: NodeId) -> Option<String> {
    doc.non_empty_attr(element, "data-path")
        .or_else(|| {
            item_container(doc, element).and_then(|item| doc.non_empty_attr(item, "data-path"))
        })
        .map(str::to_string)
}

/// Build the PlaybackInfo request for `item_id`, acquiring credentials first
/// if any are missing.
pub(crate) fn remote_request(
    item_id: &str,
    credentials: &mut CredentialStore,
    prompter: &mut dyn Prompter,
    notifier: &mut dyn Notifier,
) -> Option<PlaybackInfoRequest> {
    if !credentials.ensure(false, prompter, notifier) {
        return None;
    }
    let current = credentials.current();
    let value = |field: CredentialField| current.get(field).map(str::to_string);
    Some(PlaybackInfoRequest {
        server_address: value(CredentialField::ServerAddress)?,
        api_key: value(CredentialField::ApiKey)?,
        user_id: value(CredentialField::UserId)?,
        item_id: item_id.to_string(),
    })
}

pub(crate) fn resolve_remote_path(
    doc: &Document,
    element: NodeId,
    credentials: &mut CredentialStore,
    prompter: &mut dyn Prompter,
    notifier: &mut dyn Notifier,
) -> Lookup {
    if let Some(path) = direct_path(doc, element) {
        return Lookup::Direct(path);
    }

    let item_id = item_container(doc, element)
        .and_then(|item| doc.non_empty_attr(item, "data-id"))
        .map(str::to_string);
    let Some(item_id) = item_id else {
        warn!(element = %doc.describe(element), "no item id available for PlaybackInfo lookup");
        notifier.notify(Notice::ItemNotIdentified);
        return Lookup::Unavailable;
    };

    match remote_request(&item_id, credentials, prompter, notifier) {
        Some(request) => Lookup::Remote(request),
        None => Lookup::Unavailable,
    }
}
