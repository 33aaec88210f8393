
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::credentials::{CredentialStore, Prompter};
use crate::dom::{Document, ListenerAction, NodeId, Phase};
use crate::hijack::{
    self, CONTAINER_LOADING_ATTR, DetailSource, SENT_LABEL, build_play_button,
    has_injected_control, hijack_trigger, set_loading,
};
use crate::launcher::{Launcher, player_uri};
use crate::notice::{Notice, Notifier};
use crate::playback_info::{PlaybackInfoClient, PlaybackInfoRequest, ResolveError};
use crate::resolver::{self, Lookup};
use crate::scanner::{Scanner, Target};

pub(crate) const NAVIGATION_DEBOUNCE: Duration = Duration::from_millis(750);
pub(crate) const FEEDBACK_DURATION: Duration = Duration::from_millis(2500);

/// The user-facing collaborators the engine talks to.
pub(crate) struct Services {
    pub(crate) prompter: Box<dyn Prompter>,
    pub(crate) notifier: Box<dyn Notifier>,
    pub(crate) launcher: Box<dyn Launcher>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchMode {
    /// Run each PlaybackInfo request on its own thread.
    Worker,
    /// Run the request on the calling thread; the completion is still queued.
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Ticket(u64);

#[derive(Debug)]
pub(crate) struct Completion {
    pub(crate) ticket: Ticket,
    pub(crate) result: Result<Option<String>, ResolveError>,
}

/// Reports exactly one completion for its ticket; dropping it unsent reports
/// [`ResolveError::Aborted`].
struct CompletionSender {
    ticket: Ticket,
    tx: Option<Sender<Completion>>,
}

impl CompletionSender {
    fn send(mut self, result: Result<Option<String>, ResolveError>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Completion {
                ticket: self.ticket,
                result,
            });
        }
    }
}

impl Drop for CompletionSender {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Completion {
                ticket: self.ticket,
                result: Err(ResolveError::Aborted),
            });
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Activate { control: NodeId },
    Augment { container: NodeId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TimerKind {
    NavigationRescan,
    RestoreFeedback {
        control: NodeId,
        label: String,
        title: Option<String>,
    },
}

#[derive(Debug)]
struct Timer {
    due: Instant,
    kind: TimerKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClickOutcome {
    /// No listener of ours ran; the page's own handling proceeds.
    Default,
    /// A listener of ours consumed the click.
    Intercepted,
    /// The click landed on a disabled control.
    Ignored,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ScanReport {
    pub(crate) hijacked: usize,
    pub(crate) injected: usize,
}

/// Owns the page model and everything that reacts to it. All of its state is
/// touched from one thread; PlaybackInfo lookups come back as [`Completion`]s.
pub(crate) struct Engine {
    doc: Document,
    observed: Option<NodeId>,
    scanner: Rc<Scanner>,
    config: Config,
    credentials: CredentialStore,
    client: Arc<dyn PlaybackInfoClient>,
    services: Services,
    fetch_mode: FetchMode,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    next_ticket: u64,
    pending: BTreeMap<Ticket, Pending>,
    timers: Vec<Timer>,
    frame_scan: bool,
    report: ScanReport,
}

impl Engine {
    pub(crate) fn new(
        doc: Document,
        config: Config,
        credentials: CredentialStore,
        client: Arc<dyn PlaybackInfoClient>,
        services: Services,
        fetch_mode: FetchMode,
    ) -> Self {
        let (completion_tx, completion_rx) = unbounded();
        Self {
            doc,
            observed: None,
            scanner: Rc::new(Scanner::new()),
            config,
            credentials,
            client,
            services,
            fetch_mode,
            completion_tx,
            completion_rx,
            next_ticket: 0,
            pending: BTreeMap::new(),
            timers: Vec::new(),
            frame_scan: false,
            report: ScanReport::default(),
        }
    }

    pub(crate) fn document(&self) -> &Document {
        &self.doc
    }

    pub(crate) fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    #[cfg(test)]
    pub(crate) fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub(crate) fn report(&self) -> ScanReport {
        self.report
    }

    /// Ask for any missing API credentials up front so the first prompt does
    /// not land in the middle of a click.
    pub(crate) fn acquire_credentials(&mut self) -> bool {
        self.credentials.ensure(
            false,
            &mut *self.services.prompter,
            &mut *self.services.notifier,
        )
    }

    /// Start observing `root`. Mutations recorded before this call are
    /// discarded; a full scan runs on the next frame instead.
    pub(crate) fn watch(&mut self, root: NodeId) {
        self.doc.take_added();
        self.observed = Some(root);
        self.frame_scan = true;
        info!(root = %self.doc.describe(root), "observing page");
    }

    fn scan_root(&self) -> NodeId {
        self.observed.unwrap_or_else(|| self.doc.root())
    }

    pub(crate) fn scan_full(&mut self) -> bool {
        let root = self.scan_root();
        debug!("full page scan");
        self.scan(&[root])
    }

    /// Scan the nodes added under the observed root since the last flush.
    pub(crate) fn flush_mutations(&mut self) -> bool {
        let added = self.doc.take_added();
        let Some(observed) = self.observed else {
            return false;
        };
        let roots = added
            .into_iter()
            .filter(|node| self.doc.is_connected(*node) && self.doc.contains(observed, *node))
            .collect::<Vec<_>>();
        if roots.is_empty() {
            return false;
        }
        debug!(nodes = roots.len(), "scanning added nodes");
        self.scan(&roots)
    }

    fn scan(&mut self, roots: &[NodeId]) -> bool {
        let scanner = Rc::clone(&self.scanner);
        scanner.run_pass(roots, |root| {
            for target in scanner.targets_in(&self.doc, root) {
                self.apply(target)?;
            }
            Ok(())
        })
    }

    fn apply(&mut self, target: Target) -> Result<()> {
        match target {
            Target::Trigger(node) => {
                if hijack_trigger(&mut self.doc, node) {
                    debug!(button = %self.doc.describe(node), "hijacked play button");
                    self.report.hijacked += 1;
                }
                Ok(())
            }
            Target::DetailContainer(container) => self.augment_container(container),
        }
    }

    /// Host navigation: (re)start the debounce before a full rescan.
    pub(crate) fn navigate(&mut self, now: Instant) {
        self.timers
            .retain(|timer| timer.kind != TimerKind::NavigationRescan);
        self.timers.push(Timer {
            due: now + NAVIGATION_DEBOUNCE,
            kind: TimerKind::NavigationRescan,
        });
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|timer| timer.due).min()
    }

    pub(crate) fn fire_due_timers(&mut self, now: Instant) {
        let (mut due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.timers)
            .into_iter()
            .partition(|timer| timer.due <= now);
        self.timers = waiting;
        due.sort_by_key(|timer| timer.due);

        for timer in due {
            match timer.kind {
                TimerKind::NavigationRescan => self.frame_scan = true,
                TimerKind::RestoreFeedback {
                    control,
                    label,
                    title,
                } => self.restore_feedback(control, &label, title.as_deref()),
            }
        }
    }

    /// Run work deferred to the next render pass.
    pub(crate) fn run_frame(&mut self) {
        if std::mem::take(&mut self.frame_scan) {
            self.scan_full();
        }
    }

    /// Dispatch a click on `target` through capture then bubble listeners.
    pub(crate) fn click(&mut self, target: NodeId, now: Instant) -> ClickOutcome {
        let mut path = Vec::new();
        let mut current = Some(target);
        while let Some(node) = current {
            path.push(node);
            current = self.doc.parent(node);
        }

        if path
            .iter()
            .any(|node| self.doc.tag(*node) == "button" && self.doc.is_disabled(*node))
        {
            debug!(target = %self.doc.describe(target), "click on disabled control ignored");
            return ClickOutcome::Ignored;
        }

        let capture = path.iter().rev().map(|node| (*node, Phase::Capture));
        let bubble = path.iter().map(|node| (*node, Phase::Bubble));
        let handler = capture.chain(bubble).find_map(|(node, phase)| {
            self.doc
                .listeners(node)
                .iter()
                .find(|listener| listener.phase == phase)
                .map(|listener| (node, listener.action.clone()))
        });

        match handler {
            Some((node, ListenerAction::PlayExternally)) => {
                self.on_activate(node, now);
                ClickOutcome::Intercepted
            }
            Some((node, ListenerAction::LaunchLocal(local))) => {
                self.launch(&local, node, now);
                ClickOutcome::Intercepted
            }
            None => ClickOutcome::Default,
        }
    }

    fn on_activate(&mut self, control: NodeId, now: Instant) {
        info!(control = %self.doc.describe(control), "play intercepted");
        if resolver::item_container(&self.doc, control).is_none() {
            warn!(control = %self.doc.describe(control), "no [data-id] ancestor");
            self.services.notifier.notify(Notice::ItemNotIdentified);
            return;
        }

        let lookup = resolver::resolve_remote_path(
            &self.doc,
            control,
            &mut self.credentials,
            &mut *self.services.prompter,
            &mut *self.services.notifier,
        );
        match lookup {
            Lookup::Direct(server_path) => {
                debug!(%server_path, "using data-path from markup");
                self.launch_mapped(&server_path, control, now);
            }
            Lookup::Remote(request) => {
                set_loading(&mut self.doc, control, true);
                self.start_fetch(request, Pending::Activate { control });
            }
            Lookup::Unavailable => {}
        }
    }

    fn launch_mapped(&mut self, server_path: &str, control: NodeId, now: Instant) {
        match self.config.local_path_for(server_path) {
            Some(local) => self.launch(&local, control, now),
            None => self.services.notifier.notify(Notice::PathUnresolved),
        }
    }

    fn launch(&mut self, local_path: &str, control: NodeId, now: Instant) {
        let uri = player_uri(&self.config.uri_scheme, local_path);
        if let Err(err) = self.services.launcher.open(&uri) {
            error!("failed to launch external player: {err:#}");
            self.services.notifier.notify(Notice::LaunchFailed);
            return;
        }

        if !self.doc.is_connected(control) {
            return;
        }
        let label = self.doc.text(control).to_string();
        let title = self.doc.attr(control, "title").map(str::to_string);
        self.doc.set_text(control, SENT_LABEL);
        self.doc.set_disabled(control, true);
        self.timers.push(Timer {
            due: now + FEEDBACK_DURATION,
            kind: TimerKind::RestoreFeedback {
                control,
                label,
                title,
            },
        });
    }

    fn restore_feedback(&mut self, control: NodeId, label: &str, title: Option<&str>) {
        if !self.doc.is_connected(control) {
            return;
        }
        self.doc.set_text(control, label);
        match title {
            Some(title) => self.doc.set_attr(control, "title", title),
            None => self.doc.remove_attr(control, "title"),
        }
        self.doc.set_disabled(control, false);
    }

    fn augment_container(&mut self, container: NodeId) -> Result<()> {
        if has_injected_control(&self.doc, container)
            || self.doc.has_attr(container, CONTAINER_LOADING_ATTR)
        {
            return Ok(());
        }

        match hijack::detail_path_source(&self.doc, container) {
            DetailSource::Direct(server_path) => self.inject(container, &server_path),
            DetailSource::Remote { item_id } => {
                warn!(%item_id, "detail page has no data-path; asking the server");
                let request = resolver::remote_request(
                    &item_id,
                    &mut self.credentials,
                    &mut *self.services.prompter,
                    &mut *self.services.notifier,
                );
                if let Some(request) = request {
                    self.doc.set_attr(container, CONTAINER_LOADING_ATTR, "true");
                    self.start_fetch(request, Pending::Augment { container });
                }
                Ok(())
            }
            DetailSource::Missing => {
                warn!(container = %self.doc.describe(container), "no server path for detail page");
                Ok(())
            }
        }
    }

    fn inject(&mut self, container: NodeId, server_path: &str) -> Result<()> {
        if !self.config.prefer_local_path {
            debug!("local paths disabled; no detail button");
            return Ok(());
        }
        let Some(local) = self.config.local_path_for(server_path) else {
            return Ok(());
        };
        let button = build_play_button(&mut self.doc, &local);
        self.doc.prepend_child(container, button)?;
        self.report.injected += 1;
        debug!(%local, container = %self.doc.describe(container), "added play button");
        Ok(())
    }

    fn start_fetch(&mut self, request: PlaybackInfoRequest, pending: Pending) {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        self.pending.insert(ticket, pending);
        let sender = CompletionSender {
            ticket,
            tx: Some(self.completion_tx.clone()),
        };
        debug!(?ticket, item_id = %request.item_id, "requesting PlaybackInfo");

        match self.fetch_mode {
            FetchMode::Inline => sender.send(self.client.media_path(&request)),
            FetchMode::Worker => {
                let client = Arc::clone(&self.client);
                let spawned = thread::Builder::new()
                    .name("playback-info".to_string())
                    .spawn(move || sender.send(client.media_path(&request)));
                if let Err(err) = spawned {
                    error!("failed to start PlaybackInfo worker: {err}");
                }
            }
        }
    }

    pub(crate) fn completions(&self) -> &Receiver<Completion> {
        &self.completion_rx
    }

    pub(crate) fn drain_completions(&mut self, now: Instant) {
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.complete(completion, now);
        }
    }

    pub(crate) fn complete(&mut self, completion: Completion, now: Instant) {
        let Some(pending) = self.pending.remove(&completion.ticket) else {
            debug!(ticket = ?completion.ticket, "completion for unknown ticket");
            return;
        };

        match pending {
            Pending::Activate { control } => {
                set_loading(&mut self.doc, control, false);
                match completion.result {
                    Ok(Some(server_path)) => self.launch_mapped(&server_path, control, now),
                    Ok(None) => {
                        warn!("PlaybackInfo returned no media source");
                        self.services.notifier.notify(Notice::PathUnresolved);
                    }
                    Err(err) => {
                        self.report_failure(&err);
                        self.services.notifier.notify(Notice::PathUnresolved);
                    }
                }
            }
            Pending::Augment { container } => {
                self.doc.remove_attr(container, CONTAINER_LOADING_ATTR);
                let server_path = match completion.result {
                    Ok(path) => path,
                    Err(err) => {
                        self.report_failure(&err);
                        None
                    }
                };
                let Some(server_path) = server_path else {
                    warn!("could not determine server path for detail page button");
                    return;
                };
                if !self.doc.is_connected(container) || has_injected_control(&self.doc, container)
                {
                    return;
                }
                if let Err(err) = self.inject(container, &server_path) {
                    error!("failed to add detail play button: {err:#}");
                }
            }
        }
    }

    fn report_failure(&mut self, err: &ResolveError) {
        error!("PlaybackInfo lookup failed: {err}");
        if let Some(notice) = err.notice() {
            self.services.notifier.notify(notice);
        }
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Nothing left that would change the page without new host input.
    pub(crate) fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.timers.is_empty() && !self.frame_scan
    }
}
