use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct PathMapping {
    pub(crate) server_prefix: String,
    pub(crate) local_prefix: String,
}

/// Separator convention of the machine running the player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum PathStyle {
    #[default]
    Windows,
    Posix,
}

impl PathStyle {
    pub(crate) fn separator(self) -> char {
        match self {
            Self::Windows => '\\',
            Self::Posix => '/',
        }
    }
}

fn is_separator(ch: char) -> bool {
    ch == '/' || ch == '\\'
}

/// Map a server-side path through the first mapping whose prefix it starts with.
///
/// The remainder after the prefix gets local separators and is joined to the
/// local prefix with exactly one separator.
pub(crate) fn to_local_path(
    remote_path: &str,
    mappings: &[PathMapping],
    style: PathStyle,
) -> Option<String> {
    if remote_path.is_empty() {
        return None;
    }

    let separator = style.separator();
    for mapping in mappings {
        let Some(rest) = remote_path.strip_prefix(mapping.server_prefix.as_str()) else {
            continue;
        };
        let rest = rest
            .chars()
            .map(|ch| if is_separator(ch) { separator } else { ch })
            .collect::<String>();
        let base = mapping.local_prefix.trim_end_matches(is_separator);
        let rest = rest.trim_start_matches(separator);
        return Some(format!("{base}{separator}{rest}"));
    }

    warn!(remote_path, "no path mapping matches server path");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(server_prefix: &str, local_prefix: &str) -> PathMapping {
        PathMapping {
            server_prefix: server_prefix.to_string(),
            local_prefix: local_prefix.to_string(),
        }
    }

    #[test]
    fn maps_server_path_to_windows_share() {
        let mappings = vec![mapping("/server/path/", r"\local\web\path\")];
        assert_eq!(
            to_local_path("/server/path/Show/ep1.mkv", &mappings, PathStyle::Windows).as_deref(),
            Some(r"\local\web\path\Show\ep1.mkv")
        );
    }

    #[test]
    fn joins_with_exactly_one_separator_whatever_the_operands_carry() {
        let expected = Some(r"D:\media\Movies\a.mkv".to_string());
        for (server_prefix, local_prefix) in [
            ("/data/", r"D:\media"),
            ("/data/", r"D:\media\"),
            ("/data", r"D:\media"),
            ("/data", r"D:\media\"),
            ("/data", "D:\\media\\\\"),
            ("/data", r"D:\media/"),
        ] {
            let mappings = vec![mapping(server_prefix, local_prefix)];
            assert_eq!(
                to_local_path("/data/Movies/a.mkv", &mappings, PathStyle::Windows),
                expected,
                "prefix pair ({server_prefix:?}, {local_prefix:?})"
            );
        }
    }

    #[test]
    fn first_matching_mapping_wins_even_if_a_later_one_is_longer() {
        let mappings = vec![
            mapping("/media/", r"\\nas\media"),
            mapping("/media/tv/", r"\\nas\tv"),
        ];
        assert_eq!(
            to_local_path("/media/tv/Show/e1.mkv", &mappings, PathStyle::Windows).as_deref(),
            Some(r"\\nas\media\tv\Show\e1.mkv")
        );
    }

    #[test]
    fn posix_style_normalizes_backslashes() {
        let mappings = vec![mapping(r"D:\Media\", "/mnt/media/")];
        assert_eq!(
            to_local_path(r"D:\Media\Show\e1.mkv", &mappings, PathStyle::Posix).as_deref(),
            Some("/mnt/media/Show/e1.mkv")
        );
    }

    #[test]
    fn returns_none_without_a_matching_prefix() {
        let mappings = vec![mapping("/server/path/", r"\local")];
        assert_eq!(
            to_local_path("/other/Show/e1.mkv", &mappings, PathStyle::Windows),
            None
        );
        assert_eq!(to_local_path("", &mappings, PathStyle::Windows), None);
        assert_eq!(to_local_path("/server/path/x", &[], PathStyle::Windows), None);
    }

    #[test]
    fn prefix_match_is_literal_and_case_sensitive() {
        let mappings = vec![mapping("/Server/", "/mnt")];
        assert_eq!(
            to_local_path("/server/a.mkv", &mappings, PathStyle::Posix),
            None
        );
    }
}
