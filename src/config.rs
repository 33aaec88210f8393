use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::mapping::{PathMapping, PathStyle};
use crate::playback_info::ClientIdentity;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct Config {
    /// Map server paths through `path_mappings`; when off, the server path is
    /// handed to the player unchanged.
    pub(crate) prefer_local_path: bool,
    pub(crate) path_style: PathStyle,
    pub(crate) uri_scheme: String,
    pub(crate) path_mappings: Vec<PathMapping>,
    pub(crate) client: ClientIdentity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefer_local_path: true,
            path_style: PathStyle::default(),
            uri_scheme: "mpv".to_string(),
            path_mappings: Vec::new(),
            client: ClientIdentity::default(),
        }
    }
}

impl Config {
    /// Defaults when the file does not exist; a file that exists must parse.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read config {}", path.display()));
            }
        };
        Self::parse(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub(crate) fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.uri_scheme.is_empty()
            || !self
                .uri_scheme
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
        {
            bail!("uri_scheme {:?} is not a valid URI scheme", self.uri_scheme);
        }
        for (index, mapping) in self.path_mappings.iter().enumerate() {
            if mapping.server_prefix.is_empty() {
                bail!("path_mappings[{index}].server_prefix must not be empty");
            }
        }
        Ok(())
    }

    pub(crate) fn local_path_for(&self, remote_path: &str) -> Option<String> {
        if self.prefer_local_path {
            crate::mapping::to_local_path(remote_path, &self.path_mappings, self.path_style)
        } else {
            Some(remote_path.to_string()).filter(|path| !path.is_empty())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load(&dir.path().join("config.toml")).expect("defaults");
        assert_eq!(config, Config::default());
        assert!(config.prefer_local_path);
        assert_eq!(config.uri_scheme, "mpv");
    }

    #[test]
    fn parses_ordered_mappings_and_client_identity() {
        let config = Config::parse(
            r#"
            path_style = "posix"

            [client]
            device = "htpc"

            [[path_mappings]]
            server_prefix = "/media/tv/"
            local_prefix = "/mnt/tv"

            [[path_mappings]]
            server_prefix = "/media/"
            local_prefix = "/mnt/media"
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.path_style, PathStyle::Posix);
        assert_eq!(config.client.device, "htpc");
        assert_eq!(config.client.name, "jellympv");
        let prefixes = config
            .path_mappings
            .iter()
            .map(|mapping| mapping.server_prefix.as_str())
            .collect::<Vec<_>>();
        assert_eq!(prefixes, vec!["/media/tv/", "/media/"]);
        assert_eq!(
            config.local_path_for("/media/tv/a.mkv").as_deref(),
            Some("/mnt/tv/a.mkv")
        );
    }

    #[test]
    fn malformed_file_is_an_error_naming_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "prefer_local_path = \"yes\"").expect("write config");

        let err = Config::load(&path).expect_err("wrong type should fail");
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn rejects_empty_server_prefix_and_bad_scheme() {
        let err = Config::parse("[[path_mappings]]\nserver_prefix = \"\"\nlocal_prefix = \"/x\"")
            .expect_err("empty prefix");
        assert!(err.to_string().contains("server_prefix"));

        assert!(Config::parse("uri_scheme = \"mpv://\"").is_err());
        assert!(Config::parse("uri_scheme = \"\"").is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::parse("prefer_local = true").is_err());
    }

    #[test]
    fn disabled_local_preference_passes_server_path_through() {
        let config = Config {
            prefer_local_path: false,
            ..Config::default()
        };
        assert_eq!(
            config.local_path_for("/server/x.mkv").as_deref(),
            Some("/server/x.mkv")
        );
        assert_eq!(config.local_path_for(""), None);
    }
}
