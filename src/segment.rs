// The six things the bar shows, and the order it shows them in.
// By: Curtis Jones <mail@curtisjones.ca>
//
// Each segment is a formatting function that knows nothing about X, plus a draw function that
// takes its numbers from a source and its pixels from a Canvas. A source that comes back
// Unavailable means the segment is left alone for this frame.

use super::{
    canvas::{draw_segment, Align, Canvas, Ink},
    config::Config,
    stats::{LoadAverage, Probe, SystemStats, Unavailable, VmTotals},
};
use chrono::{DateTime, Local, TimeZone};
use std::{
    fmt::Display,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

/// Width of one desktop cell.
pub const CELL_WIDTH: i32 = 14;

/// Longest first line of the status file that gets shown.
pub const STATUS_LINE_MAX: usize = 255;

/// Clock format with and without the blinking colon.
const CLOCK_ODD: &str = "%A %d.%m.%Y %H:%M";
const CLOCK_EVEN: &str = "%A %d.%m.%Y %H.%M";

/// Source of the window manager's desktop numbers.
pub trait Desktops {
    /// Zero based index of the desktop being shown.
    fn current_desktop(&self) -> Probe<u32>;
    /// How many desktops there are.
    fn desktop_count(&self) -> Probe<u32>;
}

/// Wall clock, so tests can hold time still.
pub trait Clock {
    fn now(&self) -> DateTime<Local>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Scale a count of 4K pages for display: past 255 pages it's shown in M, otherwise in K.
pub fn scale(pages: u64) -> (u64, &'static str) {
    if pages > 255 {
        (pages / 64, "M")
    } else {
        (pages * 4, "K")
    }
}

fn scaled(pages: u64) -> String {
    let (n, unit) = scale(pages);
    format!("{}{}", n, unit)
}

pub fn memory_text(vm: &VmTotals, cache: u64) -> String {
    format!(
        "Mem: {}/{} Free: {} Cache: {}",
        scaled(vm.active),
        scaled(vm.resident),
        scaled(vm.free),
        scaled(cache)
    )
}

pub fn load_text(load: &LoadAverage) -> String {
    let [one, five, fifteen] = load.values();
    format!("Load: {:.2} {:.2} {:.2}", one, five, fifteen)
}

pub fn procs_text(n: u64) -> String {
    format!("Procs: {}", n)
}

/// Day name, date and 24 hour time. The hour and minute are split by a colon on odd seconds
/// and a period on even ones, which is as close to blinking as the bar gets.
pub fn clock_text<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    let fmt = if time.timestamp() % 2 != 0 {
        CLOCK_ODD
    } else {
        CLOCK_EVEN
    };
    time.format(fmt).to_string()
}

/// First line of a file, stopping at a newline or STATUS_LINE_MAX characters, whichever comes
/// first. An empty file is an empty line; a missing one is Unavailable.
pub fn read_status_line(path: &Path) -> Probe<String> {
    let file = File::open(path).map_err(|source| Unavailable::Os {
        query: "status file",
        source,
    })?;
    // A char is at most four bytes, so this is always enough to fill the line.
    let mut buf = Vec::with_capacity(STATUS_LINE_MAX);
    file.take((STATUS_LINE_MAX * 4) as u64)
        .read_to_end(&mut buf)
        .map_err(|source| Unavailable::Os {
            query: "status file",
            source,
        })?;
    Ok(String::from_utf8_lossy(&buf)
        .chars()
        .take_while(|&c| c != '\n')
        .take(STATUS_LINE_MAX)
        .collect())
}

/// Where everything goes. Left aligned segments own the pixels from their x up to the next
/// segment's x, the clock owns whatever is right of the status file.
#[derive(Clone, Debug, PartialEq)]
pub struct Layout {
    pub desktops: i32,
    pub memory: i32,
    pub load: i32,
    pub procs: i32,
    pub file: i32,
    /// Right edge of the clock text.
    pub clock: i32,
    pub status_file: PathBuf,
}

impl Layout {
    pub fn from_config(conf: &Config) -> Layout {
        Layout {
            desktops: conf.desktops_x,
            memory: conf.memory_x,
            load: conf.load_x,
            procs: conf.procs_x,
            file: conf.file_x,
            clock: conf.width - conf.clock_margin,
            status_file: conf.status_file.clone(),
        }
    }

    /// The right end of the slot starting at `x`: the closest segment start past it, or the
    /// clock's right edge if nothing follows.
    fn slot_end(&self, x: i32) -> i32 {
        [self.desktops, self.memory, self.load, self.procs, self.file]
            .iter()
            .copied()
            .filter(|&start| start > x)
            .min()
            .unwrap_or(self.clock)
    }

    fn left(&self, x: i32) -> Align {
        Align::Left {
            limit: self.slot_end(x) - x,
        }
    }
}

/// Everything one redraw reads from.
pub struct Sources<'a> {
    pub stats: &'a dyn SystemStats,
    pub desktops: &'a dyn Desktops,
    pub clock: &'a dyn Clock,
}

fn skipped<T>(segment: &str, probe: Probe<T>) -> Option<T> {
    match probe {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::debug!("skipping {} segment: {}", segment, e);
            None
        }
    }
}

/// One cell per desktop, the current one drawn inverted. Nothing is drawn unless both
/// properties could be read.
pub fn desktops<C: Canvas + ?Sized>(canvas: &C, source: &dyn Desktops, layout: &Layout) {
    let current = match skipped("desktop", source.current_desktop()) {
        Some(c) => c,
        None => return,
    };
    let count = match skipped("desktop", source.desktop_count()) {
        Some(c) => c,
        None => return,
    };
    let start = layout.desktops;
    let fits = (layout.slot_end(start) - start).max(0) / CELL_WIDTH;
    let baseline = 2 + canvas.ascent();
    for i in 0..count.min(fits as u32) {
        let x = start + i as i32 * CELL_WIDTH;
        let fill = if i == current { Ink::Light } else { Ink::Dark };
        let label = (i + 1).to_string();
        canvas.fill(x, CELL_WIDTH, fill);
        canvas.text(
            x + (CELL_WIDTH - canvas.text_width(&label)) / 2,
            baseline,
            &label,
            fill.inverse(),
        );
    }
}

pub fn memory<C: Canvas + ?Sized>(canvas: &C, stats: &dyn SystemStats, layout: &Layout) {
    let vm = match skipped("memory", stats.vm_totals()) {
        Some(vm) => vm,
        None => return,
    };
    if let Some(cache) = skipped("memory", stats.cache_pages()) {
        draw_segment(
            canvas,
            &memory_text(&vm, cache),
            layout.memory,
            layout.left(layout.memory),
        );
    }
}

pub fn load_average<C: Canvas + ?Sized>(canvas: &C, stats: &dyn SystemStats, layout: &Layout) {
    if let Some(load) = skipped("load", stats.load_average()) {
        draw_segment(canvas, &load_text(&load), layout.load, layout.left(layout.load));
    }
}

pub fn procs<C: Canvas + ?Sized>(canvas: &C, stats: &dyn SystemStats, layout: &Layout) {
    if let Some(n) = skipped("procs", stats.process_count()) {
        draw_segment(canvas, &procs_text(n), layout.procs, layout.left(layout.procs));
    }
}

pub fn showfile<C: Canvas + ?Sized>(canvas: &C, layout: &Layout) {
    if let Some(line) = skipped("status file", read_status_line(&layout.status_file)) {
        draw_segment(canvas, &line, layout.file, layout.left(layout.file));
    }
}

pub fn datetime<C: Canvas + ?Sized>(canvas: &C, clock: &dyn Clock, layout: &Layout) {
    draw_segment(canvas, &clock_text(&clock.now()), layout.clock, Align::Right);
}

/// One full pass over every segment, always in the same order.
pub fn redraw<C: Canvas + ?Sized>(canvas: &C, sources: &Sources, layout: &Layout) {
    desktops(canvas, sources.desktops, layout);
    memory(canvas, sources.stats, layout);
    load_average(canvas, sources.stats, layout);
    procs(canvas, sources.stats, layout);
    showfile(canvas, layout);
    datetime(canvas, sources.clock, layout);
}
