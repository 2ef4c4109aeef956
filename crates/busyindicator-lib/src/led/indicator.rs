//! Buffered indicator — owns the cell array and pushes whole frames.

use std::fmt;

use crate::device::{self, LightStrip};
use crate::mapper::IndicatorPattern;

use super::color::Color;

/// A cell index outside `[0, len)`.
///
/// The cell count is fixed at startup, so this only happens through a
/// programming mistake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexError {
    pub index: usize,
    pub len: usize,
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cell index {} out of range (strip has {} cells)",
            self.index, self.len
        )
    }
}

impl std::error::Error for IndexError {}

/// Fixed-size cell buffer in front of a [`LightStrip`].
///
/// `set_cell` only touches the buffer; `render` sends the full buffer in one
/// transport write. A failed render leaves the buffer as it was, so the next
/// render retries the same frame.
pub struct Indicator<S: LightStrip> {
    strip: S,
    cells: Vec<Color>,
    brightness: u8,
}

impl<S: LightStrip> Indicator<S> {
    /// Create an indicator with `cell_count` cells, all off.
    pub fn new(strip: S, cell_count: usize) -> Self {
        Indicator {
            strip,
            cells: vec![Color::OFF; cell_count],
            brightness: u8::MAX,
        }
    }

    /// Set the global brightness applied at transmission time.
    pub fn with_brightness(mut self, brightness: u8) -> Self {
        self.brightness = brightness;
        self
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Buffered (unscaled) cell colors.
    pub fn cells(&self) -> &[Color] {
        &self.cells
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn strip(&self) -> &S {
        &self.strip
    }

    pub fn strip_mut(&mut self) -> &mut S {
        &mut self.strip
    }

    /// Buffer a color for one cell. Nothing is transmitted.
    pub fn set_cell(&mut self, index: usize, color: Color) -> Result<(), IndexError> {
        let len = self.cells.len();
        let cell = self.cells.get_mut(index).ok_or(IndexError { index, len })?;
        *cell = color;
        Ok(())
    }

    /// Transmit the whole buffer as one frame.
    pub fn render(&mut self) -> device::Result<()> {
        let frame: Vec<Color> = self
            .cells
            .iter()
            .map(|c| c.scaled(self.brightness))
            .collect();
        self.strip.write_frame(&frame)
    }

    /// Buffer every cell of `pattern`, then render once.
    ///
    /// All indices are checked before the buffer is touched.
    pub fn apply(&mut self, pattern: &IndicatorPattern) -> crate::error::Result<()> {
        let len = self.cells.len();
        if let Some(&(index, _)) = pattern.cells().iter().find(|(i, _)| *i >= len) {
            return Err(IndexError { index, len }.into());
        }
        for &(index, color) in pattern.cells() {
            self.cells[index] = color;
        }
        self.render()?;
        Ok(())
    }

    /// Turn every cell off and render.
    pub fn clear(&mut self) -> device::Result<()> {
        self.cells.fill(Color::OFF);
        self.render()
    }

    /// Startup self-test: cell 0 blue, cell 1 red, the rest off.
    pub fn self_test(&mut self) -> device::Result<()> {
        self.cells.fill(Color::OFF);
        for (cell, color) in self.cells.iter_mut().zip([Color::BLUE, Color::RED]) {
            *cell = color;
        }
        self.render()
    }
}
