#![allow(clippy::missing_safety_doc)]
// this file is basically just to weave together the seperate mod files.
// also the pub use statements bring objects over to our main file.
// By: Curtis Jones <mail@curtisjones.ca>
// Started on: September 07, 2020
//

/// Direct access to Xlib & Xft: the window, the font, the event loop.
pub mod bar;

/// Drawing primitives the segments are written against.
pub mod canvas;

/// Parsing the config file and adjusting based on command line args provided.
pub mod config;

/// Fatal startup errors.
pub mod error;

/// Redraw triggers and the one second schedule.
pub mod event;

/// The segments themselves and the fixed order they are drawn in.
pub mod segment;

/// Kernel counters behind the load, memory and process segments.
pub mod stats;

/// To be used by the binary crate.
pub use bar::Bar;
pub use config::{gen_config, Config};
pub use error::BarError;
