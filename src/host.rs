//! The seam to the host typesetting system.
//!
//! Text inside a diagram is never parsed as math here. The grammar hands each
//! fragment to [`Host::create_text`] as it is recognized and keeps only the
//! returned handle; the interpreter asks [`Host::measure`] for the extent
//! when it needs a frame for the text.

use std::cell::RefCell;

/// Opaque reference to a text node owned by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextHandle(pub u32);

/// Measured size of a text node, in ems.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct TextExtent {
    pub width: f64,
    pub height: f64,
    pub depth: f64,
}

impl TextExtent {
    pub fn total_height(&self) -> f64 {
        self.height + self.depth
    }
}

pub trait Host {
    /// Called once per embedded text fragment, at parse time.
    fn create_text(&self, source: &str) -> TextHandle;

    /// Called when the interpreter needs the frame of a text object.
    fn measure(&self, handle: TextHandle) -> TextExtent;
}

/// A host with fixed per-character metrics, for tools and tests that have no
/// typesetter behind them.
#[derive(Debug)]
pub struct MonospaceHost {
    pub char_width: f64,
    pub height: f64,
    pub depth: f64,
    texts: RefCell<Vec<String>>,
}

impl Default for MonospaceHost {
    fn default() -> Self {
        Self {
            char_width: 0.5,
            height: 0.7,
            depth: 0.2,
            texts: RefCell::new(Vec::new()),
        }
    }
}

impl MonospaceHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source of a previously created text node.
    pub fn text(&self, handle: TextHandle) -> Option<String> {
        self.texts.borrow().get(handle.0 as usize).cloned()
    }

    /// Number of text nodes created so far.
    pub fn created(&self) -> usize {
        self.texts.borrow().len()
    }
}

impl Host for MonospaceHost {
    fn create_text(&self, source: &str) -> TextHandle {
        let mut texts = self.texts.borrow_mut();
        texts.push(source.to_string());
        TextHandle((texts.len() - 1) as u32)
    }

    fn measure(&self, handle: TextHandle) -> TextExtent {
        let chars = self
            .texts
            .borrow()
            .get(handle.0 as usize)
            .map_or(0, |s| s.trim().chars().count());
        if chars == 0 {
            return TextExtent::default();
        }
        TextExtent {
            width: chars as f64 * self.char_width,
            height: self.height,
            depth: self.depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_sequential_and_measured() {
        let host = MonospaceHost::new();
        let a = host.create_text("A");
        let b = host.create_text("f\\circ g");
        assert_eq!(a, TextHandle(0));
        assert_eq!(b, TextHandle(1));
        assert_eq!(host.measure(a).width, 0.5);
        assert_eq!(host.measure(b).width, 4.0);
        assert_eq!(host.text(b).as_deref(), Some("f\\circ g"));
        assert_eq!(host.created(), 2);
    }

    #[test]
    fn empty_text_has_no_extent() {
        let host = MonospaceHost::new();
        let h = host.create_text("  ");
        assert_eq!(host.measure(h), TextExtent::default());
    }
}
