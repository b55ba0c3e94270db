// Struct to load config from file and cli args.
// By: Curtis Jones <mail@curtisjones.ca>
//
// Defaults are the values the bar has always been built with, so running with no config file
// gives the exact same bar.

use clap::clap_app;
use dirs::config_dir;
use std::{fs::read_to_string, os::raw::c_int, path::PathBuf, time::Duration};

/// Keys accepted in the config file.
const OPTIONS: [&str; 16] = [
    "font",
    "x",
    "y",
    "width",
    "height",
    "foreground",
    "background",
    "status_file",
    "desktops_x",
    "memory_x",
    "load_x",
    "procs_x",
    "file_x",
    "clock_margin",
    "interval_ms",
    "name",
];

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// WM_NAME and WM_CLASS of the bar window.
    pub name: String,
    /// XLFD or Xft pattern, tried in that order.
    pub font: String,
    pub x: c_int,
    pub y: c_int,
    pub width: c_int,
    pub height: c_int,
    /// Colour names as understood by XftColorAllocName.
    pub foreground: String,
    pub background: String,
    /// File whose first line gets shown on the bar.
    pub status_file: PathBuf,
    pub desktops_x: c_int,
    pub memory_x: c_int,
    pub load_x: c_int,
    pub procs_x: c_int,
    pub file_x: c_int,
    /// Gap between the end of the clock and the right edge of the bar.
    pub clock_margin: c_int,
    pub interval_ms: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            name: String::from("status"),
            font: String::from("XFT#Bitstream Vera Sans:size=9#1"),
            x: 0,
            y: 1006,
            width: 1280,
            height: 18,
            foreground: String::from("white"),
            background: String::from("black"),
            status_file: PathBuf::from("/tmp/status.txt"),
            desktops_x: 5,
            memory_x: 90,
            load_x: 400,
            procs_x: 550,
            file_x: 700,
            clock_margin: 5,
            interval_ms: 1000,
        }
    }
}

impl Config {
    /// Load a `key = value` config file on top of the defaults. A missing file is the same as
    /// an empty one, and bad lines are skipped.
    pub fn from_file(file: &str) -> Config {
        let mut tmp = Config::default();
        let conf_file = match read_to_string(file) {
            Ok(s) => s,
            Err(_) => return tmp,
        };
        for line in conf_file.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let mut option = line.splitn(2, '=');
            let key = match option.next() {
                Some(k) => {
                    let k = k.trim();
                    if OPTIONS.contains(&k) {
                        k
                    } else {
                        continue;
                    }
                }
                None => continue,
            };
            let val = match option.next() {
                Some(v) => v.trim(),
                None => continue,
            };
            if !tmp.change_option(key, val) {
                tracing::warn!("ignoring bad value {:?} for {} in {}", val, key, file);
            }
        }
        tmp
    }

    /// Set a single option by name. Returns false if the key is unknown or the value doesn't
    /// parse, leaving the config as it was.
    pub fn change_option(&mut self, key: &str, val: &str) -> bool {
        let int = |v: &str| v.parse::<c_int>().ok();
        match key {
            "name" => self.name = val.to_string(),
            "font" => self.font = val.to_string(),
            "foreground" => self.foreground = val.to_string(),
            "background" => self.background = val.to_string(),
            "status_file" => self.status_file = PathBuf::from(val),
            "interval_ms" => match val.parse::<u64>() {
                Ok(ms) if ms > 0 => self.interval_ms = ms,
                _ => return false,
            },
            _ => {
                let slot = match key {
                    "x" => &mut self.x,
                    "y" => &mut self.y,
                    "width" => &mut self.width,
                    "height" => &mut self.height,
                    "desktops_x" => &mut self.desktops_x,
                    "memory_x" => &mut self.memory_x,
                    "load_x" => &mut self.load_x,
                    "procs_x" => &mut self.procs_x,
                    "file_x" => &mut self.file_x,
                    "clock_margin" => &mut self.clock_margin,
                    _ => return false,
                };
                match int(val) {
                    Some(v) => *slot = v,
                    None => return false,
                }
            }
        }
        true
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Making a full Config by parsing the CLI arguments, parsing the config file, and mashing
/// them together.
pub fn gen_config() -> Config {
    let matches = clap_app!(statbar =>
        (version: env!("CARGO_PKG_VERSION"))
        (author: "Curtis Jones <mail@curtisjones.ca>")
        (about: "Fixed layout Xorg status bar!")
        (@arg NO_CONFIG: -C --noconfig              "Skip loading a config file.")
        (@arg CONFIG:    -c --config   +takes_value "Sets a custom config file")
        (@arg FONT:      -f --font     +takes_value "overrides config file font option")
        (@arg STATUS:    -s --status   +takes_value "overrides config file status_file option")
        )
        .setting(clap::AppSettings::ColoredHelp)
        .get_matches();

    // XDG_CONFIG_HOME or $HOME/.config, with a statbar folder holding statbar.conf.
    let default_conf = match config_dir() {
        Some(mut d) => {
            d.push("statbar/statbar.conf");
            d.to_string_lossy().into_owned()
        }
        None => String::new(),
    };
    let conf_opt = matches.value_of("CONFIG").unwrap_or(&default_conf);

    let mut tmp = if matches.is_present("NO_CONFIG") {
        Config::default()
    } else {
        Config::from_file(conf_opt)
    };

    for (arg, key) in &[("FONT", "font"), ("STATUS", "status_file")] {
        if let Some(s) = matches.value_of(arg) {
            tmp.change_option(key, s);
        }
    }
    tmp
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_classic_bar() {
        let c = Config::default();
        assert_eq!((c.x, c.y, c.width, c.height), (0, 1006, 1280, 18));
        assert_eq!(
            (c.desktops_x, c.memory_x, c.load_x, c.procs_x, c.file_x),
            (5, 90, 400, 550, 700)
        );
        assert_eq!(c.interval(), Duration::from_secs(1));
        assert_eq!(c.status_file, PathBuf::from("/tmp/status.txt"));
    }

    #[test]
    fn missing_file_gives_defaults() {
        assert_eq!(
            Config::from_file("/definitely/not/here.conf"),
            Config::default()
        );
    }

    #[test]
    fn file_overrides_known_keys_and_skips_junk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            "# comment\nfont = monospace:size=10\nheight=20\nwidth = wide\nbogus = 1\n\
             status_file = /run/user/status\nno equals sign\ninterval_ms = 0"
        )
        .unwrap();
        let c = Config::from_file(f.path().to_str().unwrap());
        assert_eq!(c.font, "monospace:size=10");
        assert_eq!(c.height, 20);
        assert_eq!(c.width, 1280);
        assert_eq!(c.status_file, PathBuf::from("/run/user/status"));
        assert_eq!(c.interval_ms, 1000);
    }

    #[test]
    fn values_may_contain_equals() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "font = Sans:size=9:style=Bold").unwrap();
        let c = Config::from_file(f.path().to_str().unwrap());
        assert_eq!(c.font, "Sans:size=9:style=Bold");
    }

    #[test]
    fn change_option_rejects_unknown_keys() {
        let mut c = Config::default();
        assert!(!c.change_option("position", "top"));
        assert!(c.change_option("file_x", "720"));
        assert_eq!(c.file_x, 720);
    }
}
