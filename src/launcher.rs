use std::env;
use std::ffi::OsString;
use std::process::{Command as ProcessCommand, Stdio};
use std::thread;

use anyhow::{Context, Result};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{info, warn};

/// Characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Hands a player URI to whatever is registered for its scheme.
pub(crate) trait Launcher {
    fn open(&mut self, uri: &str) -> Result<()>;
}

pub(crate) fn player_uri(scheme: &str, local_path: &str) -> String {
    format!("{scheme}://{}", utf8_percent_encode(local_path, URI_COMPONENT))
}

pub(crate) struct SystemLauncher {
    opener: Option<OsString>,
}

impl SystemLauncher {
    pub(crate) fn from_env() -> Self {
        Self {
            opener: resolve_opener_from_env(env::var_os("JELLYMPV_OPENER")),
        }
    }
}

pub(crate) fn resolve_opener_from_env(env_value: Option<OsString>) -> Option<OsString> {
    env_value.filter(|value| !value.is_empty())
}

fn platform_open_command(uri: &str) -> ProcessCommand {
    if cfg!(target_os = "windows") {
        let mut cmd = ProcessCommand::new("cmd");
        cmd.args(["/C", "start", ""]).arg(uri);
        cmd
    } else if cfg!(target_os = "macos") {
        let mut cmd = ProcessCommand::new("open");
        cmd.arg(uri);
        cmd
    } else {
        let mut cmd = ProcessCommand::new("xdg-open");
        cmd.arg(uri);
        cmd
    }
}

impl Launcher for SystemLauncher {
    fn open(&mut self, uri: &str) -> Result<()> {
        let mut cmd = match &self.opener {
            Some(opener) => {
                let mut cmd = ProcessCommand::new(opener);
                cmd.arg(uri);
                cmd
            }
            None => platform_open_command(uri),
        };
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        info!(uri, "handing video to external player");
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to run opener for {uri}"))?;

        // The handler may stay in the foreground for the whole playback; it is
        // reaped off the engine thread.
        let label = uri.to_string();
        thread::Builder::new()
            .name("opener-reaper".to_string())
            .spawn(move || match child.wait() {
                Ok(status) if status.success() => {}
                Ok(status) => warn!(uri = %label, %status, "opener exited unsuccessfully"),
                Err(err) => warn!(uri = %label, "failed waiting on opener: {err}"),
            })
            .context("failed to start opener reaper")?;
        Ok(())
    }
}
