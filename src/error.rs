// Errors that stop the bar from ever getting on screen.
// By: Curtis Jones <mail@curtisjones.ca>

use thiserror::Error;

/// Fatal startup failures. Anything that goes wrong after the window is mapped is either
/// skipped for one frame or ends the event loop, so it never shows up here.
#[derive(Debug, Error)]
pub enum BarError {
    #[error("could not load the {name} library: {reason}")]
    Library { name: &'static str, reason: String },

    #[error("cannot open display")]
    Display,

    #[error("font {0:?} not found as an XLFD or Xft name")]
    Font(String),

    #[error("could not allocate colour {0:?}")]
    Colour(String),

    #[error("{0:?} contains an interior nul byte")]
    Nul(String),
}
