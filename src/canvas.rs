// The drawing seam between the segments and Xft.
// By: Curtis Jones <mail@curtisjones.ca>

/// Extra pixels erased past a string's measured width so a previous, longer string does not
/// leave a tail behind.
pub const OVERDRAW: i32 = 8;

/// Pixels between the top of the bar and the top of the font's ascent.
pub const TOP_MARGIN: i32 = 1;

/// The two colours the bar knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ink {
    /// Text colour, and the fill of the active desktop cell.
    Light,
    /// Bar background.
    Dark,
}

impl Ink {
    /// The other one.
    pub fn inverse(self) -> Ink {
        match self {
            Ink::Light => Ink::Dark,
            Ink::Dark => Ink::Light,
        }
    }
}

/// Where a string sits relative to the x-value handed to draw_segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Align {
    /// Text starts at x. Erasing never goes past `limit` pixels from x.
    Left { limit: i32 },
    /// Text ends at x.
    Right,
}

/// Everything the segments need from a drawing surface. Methods take &self because every
/// real draw goes through raw Xft pointers.
pub trait Canvas {
    /// Ascent of the bar font.
    fn ascent(&self) -> i32;
    /// Horizontal advance of `text` in the bar font.
    fn text_width(&self, text: &str) -> i32;
    /// Fill a rectangle spanning the full bar height.
    fn fill(&self, x: i32, width: i32, ink: Ink);
    /// Draw `text` with its baseline at `baseline`.
    fn text(&self, x: i32, baseline: i32, text: &str, ink: Ink);
}

/// Erase the region a string is about to occupy and draw it there in light ink.
pub fn draw_segment<C: Canvas + ?Sized>(canvas: &C, text: &str, x: i32, align: Align) {
    let width = canvas.text_width(text);
    let baseline = TOP_MARGIN + canvas.ascent();
    match align {
        Align::Left { limit } => {
            canvas.fill(x, (width + OVERDRAW).min(limit), Ink::Dark);
            canvas.text(x, baseline, text, Ink::Light);
        }
        Align::Right => {
            let start = x - width;
            canvas.fill(start - OVERDRAW, width + OVERDRAW, Ink::Dark);
            canvas.text(start, baseline, text, Ink::Light);
        }
    }
}
