use std::fmt;

use crate::credentials::CredentialField;

/// User-visible outcome of a failed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Notice {
    CredentialRequired(CredentialField),
    CredentialsNotSaved,
    Unauthorized,
    NetworkError,
    Timeout,
    ItemNotIdentified,
    PathUnresolved,
    LaunchFailed,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CredentialRequired(field) => {
                write!(f, "{} is required for API calls. Action cancelled.", field.label())
            }
            Self::CredentialsNotSaved => {
                f.write_str("Could not save API credentials. Action cancelled.")
            }
            Self::Unauthorized => f.write_str(
                "API request failed (Unauthorized/Forbidden). Please check your API key and user ID; you may need to re-enter them with `jellympv setup`.",
            ),
            Self::NetworkError => {
                f.write_str("Network error. Check the logs and make sure the server address is correct.")
            }
            Self::Timeout => f.write_str("API request timed out."),
            Self::ItemNotIdentified => f.write_str("Could not find item information for this button."),
            Self::PathUnresolved => f.write_str("Could not determine video path for MPV."),
            Self::LaunchFailed => f.write_str("Could not hand the video to the external player."),
        }
    }
}

pub(crate) trait Notifier {
    fn notify(&mut self, notice: Notice);
}
