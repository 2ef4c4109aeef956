//! Presence → indicator pattern mapping.

use std::collections::HashMap;

use crate::led::{Color, parse_color};
use crate::presence::PresenceState;

/// Color assigned to each presence state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    pub available: Color,
    pub busy: Color,
    pub do_not_disturb: Color,
    pub away: Color,
    pub offline: Color,
    pub unknown: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Palette {
            available: Color::GREEN,
            busy: Color::RED,
            do_not_disturb: Color::RED,
            away: Color::rgb(0xFF, 0xBF, 0x00),
            offline: Color::rgb(0x20, 0x20, 0x20),
            unknown: Color::BLUE,
        }
    }
}

impl Palette {
    pub fn color_for(&self, state: PresenceState) -> Color {
        match state {
            PresenceState::Available => self.available,
            PresenceState::Busy => self.busy,
            PresenceState::DoNotDisturb => self.do_not_disturb,
            PresenceState::Away => self.away,
            PresenceState::Offline => self.offline,
            PresenceState::Unknown => self.unknown,
        }
    }

    fn slot_mut(&mut self, state: PresenceState) -> &mut Color {
        match state {
            PresenceState::Available => &mut self.available,
            PresenceState::Busy => &mut self.busy,
            PresenceState::DoNotDisturb => &mut self.do_not_disturb,
            PresenceState::Away => &mut self.away,
            PresenceState::Offline => &mut self.offline,
            PresenceState::Unknown => &mut self.unknown,
        }
    }

    /// Default palette with `[colors]` overrides applied.
    ///
    /// Keys are state keys (`"busy"`, `"do_not_disturb"`, ...).
    pub fn from_overrides(overrides: &HashMap<String, String>) -> crate::error::Result<Self> {
        let mut palette = Palette::default();
        for (key, value) in overrides {
            let state = PresenceState::from_key(key).ok_or_else(|| {
                crate::BusyIndicatorError::Config(format!("unknown presence state in [colors]: {key}"))
            })?;
            *palette.slot_mut(state) = parse_color(value)?;
        }
        Ok(palette)
    }
}

/// One frame's worth of cell colors, ascending by index, each cell once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorPattern {
    cells: Vec<(usize, Color)>,
}

impl IndicatorPattern {
    pub fn cells(&self) -> &[(usize, Color)] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn color_at(&self, index: usize) -> Option<Color> {
        self.cells.get(index).map(|&(_, c)| c)
    }
}

/// Map a presence state to a pattern covering `cell_count` cells.
///
/// Every state lights the whole strip in its palette color, except
/// `DoNotDisturb`, which blanks odd cells so it reads differently from
/// `Busy` even when both share a color.
pub fn map(state: PresenceState, cell_count: usize, palette: &Palette) -> IndicatorPattern {
    let color = palette.color_for(state);
    let cells = (0..cell_count)
        .map(|i| match state {
            PresenceState::DoNotDisturb if i % 2 == 1 => (i, Color::OFF),
            _ => (i, color),
        })
        .collect();
    IndicatorPattern { cells }
}
