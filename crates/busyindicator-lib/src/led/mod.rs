//! LED control — cell colors and the buffered indicator.

mod color;
mod indicator;

pub use color::{Color, format_color, parse_color};
pub use indicator::{IndexError, Indicator};
