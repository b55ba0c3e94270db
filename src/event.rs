// What wakes the bar up, and when the next timed redraw is due.
// By: Curtis Jones <mail@curtisjones.ca>

use std::{
    os::raw::{c_int, c_short},
    time::{Duration, Instant},
};
use x11_dl::xlib;

/// Reasons to redraw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// The periodic deadline passed.
    Tick,
    /// Part of the bar was uncovered. The whole bar gets cleared first.
    Exposed,
    /// The window manager switched desktops.
    DesktopChanged,
    /// Someone clicked the bar.
    Clicked,
}

impl Trigger {
    /// Decide whether an X event is worth a redraw. Property changes only count when they are
    /// the current desktop property of the root window; `window` and `atom` are ignored for
    /// every other kind of event.
    ///
    /// # Arguments
    /// * kind:                 -> event type, as from XEvent::get_type.
    /// * window:               -> window of a PropertyNotify.
    /// * atom:                 -> property of a PropertyNotify.
    /// * root:                 -> root window of the bar's screen.
    /// * current_desktop_atom: -> atom of _NET_CURRENT_DESKTOP.
    pub fn from_event(
        kind: c_int,
        window: xlib::Window,
        atom: xlib::Atom,
        root: xlib::Window,
        current_desktop_atom: xlib::Atom,
    ) -> Option<Trigger> {
        match kind {
            xlib::Expose => Some(Trigger::Exposed),
            xlib::ButtonPress => Some(Trigger::Clicked),
            xlib::PropertyNotify if window == root && atom == current_desktop_atom => {
                Some(Trigger::DesktopChanged)
            }
            _ => None,
        }
    }
}

/// What a batch of triggers turns into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pending {
    pub redraw: bool,
    pub clear: bool,
}

impl Pending {
    pub fn add(&mut self, trigger: Trigger) {
        self.redraw = true;
        if trigger == Trigger::Exposed {
            self.clear = true;
        }
    }
}

/// Result of one wait on the display connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    /// Nothing arrived before the deadline.
    Timeout,
    /// Events are waiting to be read.
    Ready,
    /// Interrupted by a signal, just wait again.
    Interrupted,
    /// The connection is gone, time to shut down.
    Broken,
}

impl Wake {
    /// Sort out the return value of poll(2) and the revents of the single descriptor.
    pub fn from_poll(nfds: c_int, revents: c_short, errno: Option<c_int>) -> Wake {
        if nfds < 0 {
            return match errno {
                Some(libc::EINTR) => Wake::Interrupted,
                _ => Wake::Broken,
            };
        }
        if revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            Wake::Broken
        } else if nfds == 0 {
            Wake::Timeout
        } else {
            Wake::Ready
        }
    }
}

/// Fixed period timer that the poll timeout is derived from, so a steady stream of events
/// never pushes the next tick back.
pub struct Schedule {
    period: Duration,
    next: Instant,
}

impl Schedule {
    /// First tick is one period after `now`.
    pub fn new(period: Duration, now: Instant) -> Schedule {
        Schedule {
            period,
            next: now + period,
        }
    }

    /// Milliseconds to hand to poll(2), rounded up so we never wake just short of the deadline.
    pub fn timeout_ms(&self, now: Instant) -> c_int {
        let left = self.next.saturating_duration_since(now);
        let ms = (left.as_micros() + 999) / 1000;
        ms.min(c_int::MAX as u128) as c_int
    }

    /// True once per deadline. Missed deadlines are not made up for: the next one is a full
    /// period from `now`.
    pub fn fire(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next = now + self.period;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn schedule_counts_down_to_the_deadline() {
        let start = Instant::now();
        let sched = Schedule::new(SEC, start);
        assert_eq!(sched.timeout_ms(start), 1000);
        assert_eq!(sched.timeout_ms(start + Duration::from_millis(400)), 600);
        assert_eq!(sched.timeout_ms(start + Duration::from_secs(3)), 0);
    }

    #[test]
    fn schedule_rounds_partial_milliseconds_up() {
        let start = Instant::now();
        let sched = Schedule::new(SEC, start);
        assert_eq!(sched.timeout_ms(start + Duration::from_micros(999_500)), 1);
    }

    #[test]
    fn schedule_fires_once_per_period() {
        let start = Instant::now();
        let mut sched = Schedule::new(SEC, start);
        assert!(!sched.fire(start + Duration::from_millis(999)));
        assert!(sched.fire(start + SEC));
        assert!(!sched.fire(start + SEC));
        assert!(sched.fire(start + Duration::from_millis(2500)));
        assert_eq!(sched.timeout_ms(start + Duration::from_millis(2500)), 1000);
    }

    #[test]
    fn events_do_not_delay_the_tick() {
        let start = Instant::now();
        let mut sched = Schedule::new(SEC, start);
        // An event at 300ms is handled without touching the schedule.
        let after_event = start + Duration::from_millis(300);
        assert!(!sched.fire(after_event));
        assert_eq!(sched.timeout_ms(after_event), 700);
    }

    #[test]
    fn only_exposure_clears() {
        for &t in &[Trigger::Tick, Trigger::DesktopChanged, Trigger::Clicked] {
            let mut p = Pending::default();
            p.add(t);
            assert_eq!(
                p,
                Pending {
                    redraw: true,
                    clear: false
                }
            );
        }
        let mut p = Pending::default();
        p.add(Trigger::Clicked);
        p.add(Trigger::Exposed);
        p.add(Trigger::Tick);
        assert!(p.redraw && p.clear);
    }

    const ROOT: xlib::Window = 0x1e3;
    const BAR: xlib::Window = 0x2400001;
    const CURRENT: xlib::Atom = 311;
    const OTHER: xlib::Atom = 312;

    #[test]
    fn exposure_and_clicks_trigger() {
        assert_eq!(
            Trigger::from_event(xlib::Expose, BAR, 0, ROOT, CURRENT),
            Some(Trigger::Exposed)
        );
        assert_eq!(
            Trigger::from_event(xlib::ButtonPress, BAR, 0, ROOT, CURRENT),
            Some(Trigger::Clicked)
        );
    }

    #[test]
    fn desktop_switch_on_the_root_window_triggers() {
        assert_eq!(
            Trigger::from_event(xlib::PropertyNotify, ROOT, CURRENT, ROOT, CURRENT),
            Some(Trigger::DesktopChanged)
        );
    }

    #[test]
    fn other_property_changes_are_ignored() {
        // Some other root window property.
        assert_eq!(
            Trigger::from_event(xlib::PropertyNotify, ROOT, OTHER, ROOT, CURRENT),
            None
        );
        // The right atom, but on some other window.
        assert_eq!(
            Trigger::from_event(xlib::PropertyNotify, BAR, CURRENT, ROOT, CURRENT),
            None
        );
    }

    #[test]
    fn unrelated_events_are_ignored() {
        for &kind in &[
            xlib::ButtonRelease,
            xlib::KeyPress,
            xlib::MapNotify,
            xlib::ConfigureNotify,
        ] {
            assert_eq!(Trigger::from_event(kind, ROOT, CURRENT, ROOT, CURRENT), None);
        }
    }

    #[test]
    fn poll_results() {
        assert_eq!(Wake::from_poll(0, 0, None), Wake::Timeout);
        assert_eq!(Wake::from_poll(1, libc::POLLIN, None), Wake::Ready);
        assert_eq!(Wake::from_poll(1, libc::POLLIN | libc::POLLHUP, None), Wake::Broken);
        assert_eq!(Wake::from_poll(1, libc::POLLNVAL, None), Wake::Broken);
        assert_eq!(Wake::from_poll(-1, 0, Some(libc::EINTR)), Wake::Interrupted);
        assert_eq!(Wake::from_poll(-1, 0, Some(libc::EBADF)), Wake::Broken);
    }
}
