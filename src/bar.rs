// Everything that talks to Xlib & Xft directly.
// By: Curtis Jones <mail@curtisjones.ca>
// Started on August 23, 2020

use super::{
    canvas::{Canvas, Ink},
    config::Config,
    error::BarError,
    event::{Pending, Schedule, Trigger, Wake},
    segment::{self, Desktops, Layout, Sources, SystemClock},
    stats::{KernelStats, Probe, Unavailable},
};
use std::{
    ffi::CString,
    io,
    mem::{self, MaybeUninit},
    os::raw::*,
    process, ptr,
    time::{Duration, Instant},
};
use x11_dl::{xft, xlib, xrender::XGlyphInfo};

const CURRENT_DESKTOP: &str = "_NET_CURRENT_DESKTOP";
const NUMBER_OF_DESKTOPS: &str = "_NET_NUMBER_OF_DESKTOPS";

/// Xlib's QueuedAlready mode for XEventsQueued, which x11-dl doesn't export.
const QUEUED_ALREADY: c_int = 0;

/// Decide whether what XGetWindowProperty handed back is a single 32 bit value.
///
/// # Arguments
/// * name:        -> property name, for the error.
/// * actual_type: -> type atom the server reported, 0 (None) if the property doesn't exist.
/// * format:      -> 8, 16 or 32, 0 if the property doesn't exist.
/// * nitems:      -> items returned.
/// * remaining:   -> bytes left on the server after what we asked for.
fn check_cardinal(
    name: &str,
    actual_type: xlib::Atom,
    format: c_int,
    nitems: c_ulong,
    remaining: c_ulong,
) -> Probe<()> {
    if actual_type == 0 || format == 0 {
        Err(Unavailable::Missing(format!("root window property {}", name)))
    } else if remaining != 0 {
        Err(Unavailable::Malformed(format!("{} (too big)", name)))
    } else if format != 32 || nitems != 1 {
        Err(Unavailable::Malformed(format!("{} (format {})", name, format)))
    } else {
        Ok(())
    }
}

fn cstring(s: &str) -> Result<CString, BarError> {
    CString::new(s).map_err(|_| BarError::Nul(s.to_owned()))
}

pub struct Bar {
    xlib: xlib::Xlib,
    xft: xft::Xft,
    display: *mut xlib::Display,
    screen: c_int,
    root: xlib::Window,
    visual: *mut xlib::Visual,
    cmap: xlib::Colormap,
    window_id: xlib::Window,
    draw: *mut xft::XftDraw,
    font: *mut xft::XftFont,
    /// Indexed by Ink: light then dark.
    palette: Vec<xft::XftColor>,
    current_desktop_atom: xlib::Atom,
    width: c_int,
    height: c_int,
    interval: Duration,
    layout: Layout,
    stats: KernelStats,
}

impl Bar {
    /// Connect to the display, load the font and colours, and put the bar on screen.
    /// Anything that fails here is fatal; whatever was already set up is released when the
    /// half built Bar is dropped.
    pub fn open(conf: &Config) -> Result<Bar, BarError> {
        let xlib = xlib::Xlib::open().map_err(|e| BarError::Library {
            name: "xlib",
            reason: e.to_string(),
        })?;
        let xft = xft::Xft::open().map_err(|e| BarError::Library {
            name: "xft",
            reason: e.to_string(),
        })?;
        unsafe {
            let display = (xlib.XOpenDisplay)(ptr::null());
            if display.is_null() {
                return Err(BarError::Display);
            }
            let screen = (xlib.XDefaultScreen)(display);
            let root = (xlib.XRootWindow)(display, screen);
            let visual = (xlib.XDefaultVisual)(display, screen);
            let cmap = (xlib.XDefaultColormap)(display, screen);

            let mut bar = Bar {
                xlib,
                xft,
                display,
                screen,
                root,
                visual,
                cmap,
                window_id: 0,
                draw: ptr::null_mut(),
                font: ptr::null_mut(),
                palette: Vec::with_capacity(2),
                current_desktop_atom: 0,
                width: conf.width,
                height: conf.height,
                interval: conf.interval(),
                layout: Layout::from_config(conf),
                stats: KernelStats::default(),
            };

            bar.font = bar.get_font(&conf.font)?;
            let light = bar.get_xft_colour(&conf.foreground)?;
            bar.palette.push(light);
            let dark = bar.get_xft_colour(&conf.background)?;
            bar.palette.push(dark);
            bar.current_desktop_atom = bar.get_atom(CURRENT_DESKTOP)?;
            bar.init(conf)?;
            Ok(bar)
        }
    }

    unsafe fn init(&mut self, conf: &Config) -> Result<(), BarError> {
        let mut attributes: xlib::XSetWindowAttributes = mem::zeroed();
        attributes.override_redirect = xlib::True;
        attributes.background_pixmap = xlib::ParentRelative as xlib::Pixmap;
        attributes.event_mask = xlib::ExposureMask | xlib::ButtonPressMask;

        let depth = (self.xlib.XDefaultDepth)(self.display, self.screen);
        self.window_id = (self.xlib.XCreateWindow)(
            self.display,                   // Display to use.
            self.root,                      // Parent window.
            conf.x,                         // X position (from top-left.
            conf.y,                         // Y position (from top-left.
            self.width as c_uint,           // Length of the bar in x direction.
            self.height as c_uint,          // Height of the bar in y direction.
            0,                              // Border-width.
            depth,                          // Window depth.
            xlib::CopyFromParent as c_uint, // Window class.
            self.visual,                    // Visual type to use.
            xlib::CWOverrideRedirect | xlib::CWBackPixmap | xlib::CWEventMask,
            &mut attributes,
        );

        self.set_atoms(&conf.name)?;

        self.draw =
            (self.xft.XftDrawCreate)(self.display, self.window_id, self.visual, self.cmap);

        (self.xlib.XSelectInput)(
            self.display,
            self.window_id,
            xlib::ExposureMask | xlib::ButtonPressMask,
        );
        (self.xlib.XSelectInput)(self.display, self.root, xlib::PropertyChangeMask);

        (self.xlib.XMapWindow)(self.display, self.window_id);
        (self.xlib.XFlush)(self.display);
        tracing::info!(
            "bar mapped at {},{} size {}x{}",
            conf.x,
            conf.y,
            self.width,
            self.height
        );
        Ok(())
    }

    /// Wait on the display connection and redraw on the timer, exposures, desktop switches and
    /// clicks. Returns once the connection breaks.
    pub fn event_loop(&self) {
        let mut schedule = Schedule::new(self.interval, Instant::now());
        let mut fds = [libc::pollfd {
            fd: unsafe { (self.xlib.XConnectionNumber)(self.display) },
            events: libc::POLLIN,
            revents: 0,
        }];

        loop {
            // Xlib may already hold events it read while waiting on a reply. poll won't see them.
            let queued =
                unsafe { (self.xlib.XEventsQueued)(self.display, QUEUED_ALREADY) } > 0;
            let timeout = if queued {
                0
            } else {
                schedule.timeout_ms(Instant::now())
            };

            fds[0].revents = 0;
            let nfds = unsafe { libc::poll(fds.as_mut_ptr(), 1, timeout) };
            let errno = if nfds < 0 {
                io::Error::last_os_error().raw_os_error()
            } else {
                None
            };

            let mut pending = Pending::default();
            match Wake::from_poll(nfds, fds[0].revents, errno) {
                Wake::Broken => {
                    tracing::warn!("lost the display connection, shutting down");
                    break;
                }
                Wake::Interrupted => continue,
                Wake::Timeout | Wake::Ready => unsafe { self.drain_events(&mut pending) },
            }
            if schedule.fire(Instant::now()) {
                pending.add(Trigger::Tick);
            }
            if pending.redraw {
                self.redraw(pending.clear);
            }
        }
    }

    /// One full frame. An exposure wipes the bar first.
    fn redraw(&self, clear: bool) {
        if clear {
            self.fill(0, self.width, Ink::Dark);
        }
        let sources = Sources {
            stats: &self.stats,
            desktops: self,
            clock: &SystemClock,
        };
        segment::redraw(self, &sources, &self.layout);
        unsafe {
            (self.xlib.XFlush)(self.display);
        }
    }

    unsafe fn drain_events(&self, pending: &mut Pending) {
        while (self.xlib.XPending)(self.display) > 0 {
            let mut event: xlib::XEvent = mem::zeroed();
            (self.xlib.XNextEvent)(self.display, &mut event);
            if let Some(trigger) = self.classify(&event) {
                pending.add(trigger);
            }
        }
    }

    unsafe fn classify(&self, event: &xlib::XEvent) -> Option<Trigger> {
        let kind = event.get_type();
        let (window, atom) = if kind == xlib::PropertyNotify {
            (event.property.window, event.property.atom)
        } else {
            (0, 0)
        };
        Trigger::from_event(kind, window, atom, self.root, self.current_desktop_atom)
    }

    fn colour(&self, ink: Ink) -> &xft::XftColor {
        &self.palette[ink as usize]
    }

    unsafe fn get_atom(&self, name: &str) -> Result<xlib::Atom, BarError> {
        let name = cstring(name)?;
        Ok((self.xlib.XInternAtom)(
            self.display,
            name.as_ptr(),
            xlib::False,
        ))
    }

    /// XLFD lookup first, then the Xft name syntax.
    unsafe fn get_font(&self, name: &str) -> Result<*mut xft::XftFont, BarError> {
        let cname = cstring(name)?;
        let mut font = (self.xft.XftFontOpenXlfd)(self.display, self.screen, cname.as_ptr());
        if font.is_null() {
            font = (self.xft.XftFontOpenName)(self.display, self.screen, cname.as_ptr());
        }
        if font.is_null() {
            Err(BarError::Font(name.to_owned()))
        } else {
            Ok(font)
        }
    }

    unsafe fn get_xft_colour(&self, name: &str) -> Result<xft::XftColor, BarError> {
        let cname = cstring(name)?;
        let mut tmp: MaybeUninit<xft::XftColor> = MaybeUninit::uninit();
        let ok = (self.xft.XftColorAllocName)(
            self.display,
            self.visual,
            self.cmap,
            cname.as_ptr(),
            tmp.as_mut_ptr(),
        );
        if ok == 0 {
            Err(BarError::Colour(name.to_owned()))
        } else {
            Ok(tmp.assume_init())
        }
    }

    /// Read a single CARDINAL off the root window. The atom is looked up without creating it,
    /// so a window manager that never set it gives Missing.
    unsafe fn cardinal_property(&self, name: &str) -> Probe<u32> {
        let cname = CString::new(name).map_err(|_| Unavailable::Malformed(name.to_owned()))?;
        let property = (self.xlib.XInternAtom)(self.display, cname.as_ptr(), xlib::True);
        if property == 0 {
            return Err(Unavailable::Missing(format!("atom {}", name)));
        }

        let mut actual_type: xlib::Atom = 0;
        let mut format: c_int = 0;
        let mut nitems: c_ulong = 0;
        let mut remaining: c_ulong = 0;
        let mut data: *mut c_uchar = ptr::null_mut();
        let status = (self.xlib.XGetWindowProperty)(
            self.display,
            self.root,
            property,
            0,
            1,
            xlib::False,
            xlib::AnyPropertyType as xlib::Atom,
            &mut actual_type,
            &mut format,
            &mut nitems,
            &mut remaining,
            &mut data,
        );
        if status != xlib::Success as c_int {
            return Err(Unavailable::Missing(format!(
                "{} (XGetWindowProperty failed)",
                name
            )));
        }

        let value = check_cardinal(name, actual_type, format, nitems, remaining).and_then(|_| {
            if data.is_null() {
                Err(Unavailable::Malformed(name.to_owned()))
            } else {
                // Format 32 data comes back as an array of longs.
                Ok(*(data as *const c_ulong) as u32)
            }
        });
        if !data.is_null() {
            (self.xlib.XFree)(data as *mut c_void);
        }
        value
    }

    /// Write 32 bit items to a property of the bar window.
    unsafe fn set_cardinals(
        &self,
        property: &str,
        kind: xlib::Atom,
        mode: c_int,
        data: &[c_ulong],
    ) -> Result<(), BarError> {
        let property = self.get_atom(property)?;
        (self.xlib.XChangeProperty)(
            self.display,
            self.window_id,
            property,
            kind,
            32,
            mode,
            data.as_ptr() as *const c_uchar,
            data.len() as c_int,
        );
        Ok(())
    }

    unsafe fn set_atoms(&self, name: &str) -> Result<(), BarError> {
        // Set the WM_NAME.
        let title = cstring(name)?;
        (self.xlib.XStoreName)(self.display, self.window_id, title.as_ptr());

        // Set WM_CLASS
        let class: *mut xlib::XClassHint = (self.xlib.XAllocClassHint)();
        if !class.is_null() {
            (*class).res_name = title.as_ptr() as *mut c_char;
            (*class).res_class = title.as_ptr() as *mut c_char;
            (self.xlib.XSetClassHint)(self.display, self.window_id, class);
            (self.xlib.XFree)(class as *mut c_void);
        }

        // Set _NET_WM_PID
        self.set_cardinals(
            "_NET_WM_PID",
            xlib::XA_CARDINAL,
            xlib::PropModeReplace,
            &[process::id() as c_ulong],
        )?;

        // Set the _NET_WM_WINDOW_TYPE atom
        let dock = self.get_atom("_NET_WM_WINDOW_TYPE_DOCK")?;
        self.set_cardinals(
            "_NET_WM_WINDOW_TYPE",
            xlib::XA_ATOM,
            xlib::PropModeReplace,
            &[dock],
        )?;

        // Change _NET_WM_STATE, above everything and on every desktop.
        let above = self.get_atom("_NET_WM_STATE_ABOVE")?;
        self.set_cardinals(
            "_NET_WM_STATE",
            xlib::XA_ATOM,
            xlib::PropModeReplace,
            &[above],
        )?;
        let sticky = self.get_atom("_NET_WM_STATE_STICKY")?;
        self.set_cardinals(
            "_NET_WM_STATE",
            xlib::XA_ATOM,
            xlib::PropModeAppend,
            &[sticky],
        )?;

        // Set _NET_WM_DESKTOP
        self.set_cardinals(
            "_NET_WM_DESKTOP",
            xlib::XA_CARDINAL,
            xlib::PropModeReplace,
            &[0xFFFF_FFFF],
        )
    }
}

impl Desktops for Bar {
    fn current_desktop(&self) -> Probe<u32> {
        unsafe { self.cardinal_property(CURRENT_DESKTOP) }
    }

    fn desktop_count(&self) -> Probe<u32> {
        unsafe { self.cardinal_property(NUMBER_OF_DESKTOPS) }
    }
}

impl Canvas for Bar {
    fn ascent(&self) -> i32 {
        unsafe { (*self.font).ascent }
    }

    fn text_width(&self, text: &str) -> i32 {
        let mut extents: MaybeUninit<XGlyphInfo> = MaybeUninit::uninit();
        unsafe {
            (self.xft.XftTextExtentsUtf8)(
                self.display,
                self.font,
                text.as_ptr(),
                text.len() as c_int,
                extents.as_mut_ptr(),
            );
            extents.assume_init().xOff as i32
        }
    }

    fn fill(&self, x: i32, width: i32, ink: Ink) {
        if width <= 0 {
            return;
        }
        unsafe {
            (self.xft.XftDrawRect)(
                self.draw,
                self.colour(ink),
                x,
                0,
                width as c_uint,
                self.height as c_uint,
            );
        }
    }

    fn text(&self, x: i32, baseline: i32, text: &str, ink: Ink) {
        unsafe {
            (self.xft.XftDrawStringUtf8)(
                self.draw,
                self.colour(ink),
                self.font,
                x,
                baseline,
                text.as_ptr(),
                text.len() as c_int,
            );
        }
    }
}

impl Drop for Bar {
    /// Font, colours, drawing surface, window, then the connection itself. Each is only
    /// released if open() got far enough to create it.
    fn drop(&mut self) {
        tracing::info!("shutting down");
        unsafe {
            if !self.font.is_null() {
                (self.xft.XftFontClose)(self.display, self.font);
            }
            for mut col in self.palette.drain(..) {
                (self.xft.XftColorFree)(self.display, self.visual, self.cmap, &mut col);
            }
            if !self.draw.is_null() {
                (self.xft.XftDrawDestroy)(self.draw);
            }
            if self.window_id != 0 {
                (self.xlib.XDestroyWindow)(self.display, self.window_id);
            }
            (self.xlib.XCloseDisplay)(self.display);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARDINAL: xlib::Atom = xlib::XA_CARDINAL;

    #[test]
    fn single_cardinal_passes() {
        assert!(check_cardinal(CURRENT_DESKTOP, CARDINAL, 32, 1, 0).is_ok());
    }

    #[test]
    fn absent_property_is_missing() {
        assert!(matches!(
            check_cardinal(CURRENT_DESKTOP, 0, 0, 0, 0),
            Err(Unavailable::Missing(_))
        ));
    }

    #[test]
    fn trailing_data_is_malformed() {
        assert!(matches!(
            check_cardinal(NUMBER_OF_DESKTOPS, CARDINAL, 32, 1, 4),
            Err(Unavailable::Malformed(_))
        ));
    }

    #[test]
    fn wrong_format_is_malformed() {
        for &format in &[8, 16] {
            assert!(matches!(
                check_cardinal(NUMBER_OF_DESKTOPS, CARDINAL, format, 1, 0),
                Err(Unavailable::Malformed(_))
            ));
        }
        assert!(check_cardinal(NUMBER_OF_DESKTOPS, CARDINAL, 32, 0, 0).is_err());
    }

    #[test]
    fn names_with_nul_are_rejected() {
        assert!(matches!(cstring("bad\0name"), Err(BarError::Nul(_))));
        assert!(cstring("status").is_ok());
    }
}
