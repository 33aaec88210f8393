use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, never, select, unbounded};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::dom::{Document, NodeId, NodeSpec, Selector};
use crate::engine::Engine;

/// How long to sleep when nothing is scheduled.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// One JSON line from the host page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum HostEvent {
    Append {
        parent: String,
        node: NodeSpec,
    },
    Remove {
        target: String,
    },
    SetAttribute {
        target: String,
        name: String,
        /// `null` removes the attribute.
        value: Option<String>,
    },
    Navigate,
    Click {
        target: String,
    },
}

pub(crate) fn parse_event(line: &str) -> Result<HostEvent> {
    serde_json::from_str(line).context("invalid host event")
}

/// First element matching `raw`, the body included.
fn find(doc: &Document, raw: &str) -> Result<NodeId> {
    let selector = Selector::parse(raw)?;
    let root = doc.root();
    if selector.matches(doc, root) {
        return Ok(root);
    }
    doc.query(root, &selector)
        .ok_or_else(|| anyhow!("no element matches `{raw}`"))
}

pub(crate) fn apply_event(engine: &mut Engine, event: HostEvent, now: Instant) -> Result<()> {
    match event {
        HostEvent::Append { parent, node } => {
            let doc = engine.document_mut();
            let parent = find(doc, &parent)?;
            let node = doc.build(&node);
            doc.append_child(parent, node)?;
        }
        HostEvent::Remove { target } => {
            let doc = engine.document_mut();
            let target = find(doc, &target)?;
            doc.detach(target);
        }
        HostEvent::SetAttribute {
            target,
            name,
            value,
        } => {
            let doc = engine.document_mut();
            let target = find(doc, &target)?;
            match value {
                Some(value) => doc.set_attr(target, &name, &value),
                None => doc.remove_attr(target, &name),
            }
        }
        HostEvent::Navigate => engine.navigate(now),
        HostEvent::Click { target } => {
            let node = find(engine.document(), &target)?;
            let outcome = engine.click(node, now);
            info!(selector = %target, ?outcome, "click dispatched");
        }
    }
    Ok(())
}

pub(crate) fn open_events(source: &str) -> Result<Box<dyn BufRead + Send>> {
    if source == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(source).with_context(|| format!("failed to open event file {source}"))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Parse events on a reader thread; the channel closes at end of input.
pub(crate) fn spawn_reader(input: Box<dyn BufRead + Send>) -> Result<Receiver<Result<HostEvent>>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("host-events".to_string())
        .spawn(move || {
            for (index, line) in input.lines().enumerate() {
                let event = match line {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => {
                        parse_event(&line).with_context(|| format!("event line {}", index + 1))
                    }
                    Err(err) => {
                        let _ = tx.send(Err(anyhow!(err).context("failed to read host events")));
                        return;
                    }
                };
                if tx.send(event).is_err() {
                    return;
                }
            }
        })
        .context("failed to start host event reader")?;
    Ok(rx)
}

/// Feed host events into `engine` until the host hangs up and nothing is
/// left in flight.
pub(crate) fn run_loop(engine: &mut Engine, events: Receiver<Result<HostEvent>>) {
    let completions = engine.completions().clone();
    let mut host = events;
    let mut host_open = true;
    let mut hung_up = false;

    loop {
        if !host_open && engine.is_idle() {
            break;
        }
        let timeout = engine
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_POLL);

        select! {
            recv(host) -> message => match message {
                Ok(Ok(event)) => {
                    debug!(?event, "host event");
                    if let Err(err) = apply_event(engine, event, Instant::now()) {
                        warn!("failed to apply host event: {err:#}");
                    }
                }
                Ok(Err(err)) => warn!("skipping host event: {err:#}"),
                Err(_) => hung_up = true,
            },
            recv(completions) -> completion => match completion {
                Ok(completion) => engine.complete(completion, Instant::now()),
                Err(err) => error!("completion channel closed: {err}"),
            },
            default(timeout) => {}
        }

        if std::mem::take(&mut hung_up) {
            info!("host event stream ended");
            host = never();
            host_open = false;
        }

        engine.flush_mutations();
        engine.fire_due_timers(Instant::now());
        engine.run_frame();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use crate::credentials::CredentialStore;
    use crate::engine::{FetchMode, Services};
    use crate::hijack::HIJACKED_ATTR;
    use crate::mapping::PathMapping;
    use crate::test_support::{
        MemoryStore, RecordingLauncher, RecordingNotifier, ScriptedPrompter, StubClient,
    };

    fn engine(launcher: Rc<RefCell<RecordingLauncher>>) -> Engine {
        let config = Config {
            path_mappings: vec![PathMapping {
                server_prefix: "/srv/".to_string(),
                local_prefix: "/mnt/media".to_string(),
            }],
            path_style: crate::mapping::PathStyle::Posix,
            ..Config::default()
        };
        let services = Services {
            prompter: Box::new(Rc::new(RefCell::new(ScriptedPrompter::default()))),
            notifier: Box::new(Rc::new(RefCell::new(RecordingNotifier::default()))),
            launcher: Box::new(launcher),
        };
        let credentials = CredentialStore::load(Box::new(MemoryStore::default()), None);
        let mut engine = Engine::new(
            Document::new(),
            config,
            credentials,
            Arc::new(StubClient::default()),
            services,
            FetchMode::Inline,
        );
        let root = engine.document().root();
        engine.watch(root);
        engine
    }

    #[test]
    fn parses_each_event_kind() {
        assert_eq!(parse_event(r#"{"type":"navigate"}"#).expect("navigate"), HostEvent::Navigate);
        assert_eq!(
            parse_event(r##"{"type":"click","target":"#play"}"##).expect("click"),
            HostEvent::Click {
                target: "#play".to_string()
            }
        );
        assert_eq!(
            parse_event(r#"{"type":"set_attribute","target":"div","name":"data-path","value":null}"#)
                .expect("set_attribute"),
            HostEvent::SetAttribute {
                target: "div".to_string(),
                name: "data-path".to_string(),
                value: None,
            }
        );
        let append = parse_event(
            r#"{"type":"append","parent":"body","node":{"tag":"div","attrs":{"data-id":"1"}}}"#,
        )
        .expect("append");
        assert!(matches!(append, HostEvent::Append { ref parent, .. } if parent == "body"));
        assert!(parse_event(r#"{"type":"scroll"}"#).is_err());
    }

    #[test]
    fn replays_a_session_until_the_stream_ends() {
        let launcher = Rc::new(RefCell::new(RecordingLauncher::default()));
        let mut engine = engine(Rc::clone(&launcher));
        let events = [
            r#"{"type":"append","parent":"body","node":{"tag":"div","attrs":{"id":"card","data-id":"7","data-path":"/srv/Show/e1.mkv"},"children":[{"tag":"button","attrs":{"id":"resume","is":"paper-icon-button-light","class":"cardOverlayButton","data-action":"resume"}}]}}"#,
            "",
            r##"{"type":"click","target":"#resume"}"##,
        ]
        .join("\n");
        let rx = spawn_reader(Box::new(Cursor::new(events))).expect("reader");

        run_loop(&mut engine, rx);

        assert_eq!(
            launcher.borrow().opened,
            vec!["mpv://%2Fmnt%2Fmedia%2FShow%2Fe1.mkv".to_string()]
        );
        let doc = engine.document();
        let button = find(doc, "#resume").expect("button");
        assert_eq!(doc.attr(button, HIJACKED_ATTR), Some("true"));
        assert!(!doc.is_disabled(button));
    }

    #[test]
    fn bad_targets_are_errors_not_panics() {
        let launcher = Rc::new(RefCell::new(RecordingLauncher::default()));
        let mut engine = engine(launcher);
        let err = apply_event(
            &mut engine,
            HostEvent::Remove {
                target: "#missing".to_string(),
            },
            Instant::now(),
        )
        .expect_err("nothing to remove");
        assert!(err.to_string().contains("#missing"));

        assert!(
            apply_event(
                &mut engine,
                HostEvent::Click {
                    target: "div > button".to_string()
                },
                Instant::now(),
            )
            .is_err()
        );
    }
}
