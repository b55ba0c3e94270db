// Kernel counters shown on the bar.
// By: Curtis Jones <mail@curtisjones.ca>
//
// Every query hands back either a complete value or an Unavailable, never anything partial.
// The bar skips a segment for one frame on Unavailable and tries again on the next tick.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Size of the pages every count in this module is expressed in.
pub const PAGE_SIZE: u64 = 4096;

/// Reason a query could not produce a value this frame.
#[derive(Debug, Error)]
pub enum Unavailable {
    #[error("{query} failed: {source}")]
    Os {
        query: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{0} is missing")]
    Missing(String),
    #[error("{0} has an unexpected size or format")]
    Malformed(String),
    #[error("not supported on this platform")]
    Unsupported,
}

/// Result of a single query.
pub type Probe<T> = Result<T, Unavailable>;

/// Load averages as the kernel keeps them: fixed point integers and the scale to divide by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadAverage {
    pub loads: [u64; 3],
    pub scale: u64,
}

impl LoadAverage {
    /// 1, 5 and 15 minute averages as floats.
    pub fn values(&self) -> [f64; 3] {
        let scale = self.scale as f64;
        [
            self.loads[0] as f64 / scale,
            self.loads[1] as f64 / scale,
            self.loads[2] as f64 / scale,
        ]
    }
}

/// Aggregate virtual memory totals, in 4K pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmTotals {
    pub active: u64,
    pub resident: u64,
    pub free: u64,
}

/// Source of the numbers behind the load, memory and process segments.
pub trait SystemStats {
    fn load_average(&self) -> Probe<LoadAverage>;
    fn vm_totals(&self) -> Probe<VmTotals>;
    fn cache_pages(&self) -> Probe<u64>;
    fn process_count(&self) -> Probe<u64>;
}

/// The real thing. Reads sysinfo(2) and the proc filesystem mounted at `root`.
pub struct KernelStats {
    root: PathBuf,
}

impl Default for KernelStats {
    fn default() -> Self {
        KernelStats::with_root("/proc")
    }
}

impl KernelStats {
    pub fn with_root<P: Into<PathBuf>>(root: P) -> KernelStats {
        KernelStats { root: root.into() }
    }

    fn meminfo(&self) -> Probe<HashMap<String, u64>> {
        let path = self.root.join("meminfo");
        let text = fs::read_to_string(&path).map_err(|source| Unavailable::Os {
            query: "meminfo",
            source,
        })?;
        Ok(parse_meminfo(&text))
    }
}

impl SystemStats for KernelStats {
    fn load_average(&self) -> Probe<LoadAverage> {
        let info = sysinfo()?;
        Ok(LoadAverage {
            loads: info.loads,
            scale: info.load_scale,
        })
    }

    fn vm_totals(&self) -> Probe<VmTotals> {
        let info = sysinfo()?;
        let active = meminfo_pages(&self.meminfo()?, "Active")?;
        let total = info.total_bytes / PAGE_SIZE;
        let free = info.free_bytes / PAGE_SIZE;
        Ok(VmTotals {
            active,
            resident: total.saturating_sub(free),
            free,
        })
    }

    fn cache_pages(&self) -> Probe<u64> {
        let meminfo = self.meminfo()?;
        Ok(meminfo_pages(&meminfo, "Buffers")? + meminfo_pages(&meminfo, "Cached")?)
    }

    fn process_count(&self) -> Probe<u64> {
        count_processes(&self.root)
    }
}

/// Only the pieces of sysinfo(2) the bar looks at, already multiplied out by mem_unit.
struct SysInfo {
    loads: [u64; 3],
    load_scale: u64,
    total_bytes: u64,
    free_bytes: u64,
}

#[cfg(target_os = "linux")]
fn sysinfo() -> Probe<SysInfo> {
    let mut info: libc::sysinfo = unsafe { std::mem::zeroed() };
    if unsafe { libc::sysinfo(&mut info) } < 0 {
        return Err(Unavailable::Os {
            query: "sysinfo",
            source: io::Error::last_os_error(),
        });
    }
    // mem_unit is 0 on very old kernels, which meant bytes.
    let unit = u64::from(info.mem_unit.max(1));
    Ok(SysInfo {
        loads: [
            info.loads[0] as u64,
            info.loads[1] as u64,
            info.loads[2] as u64,
        ],
        // SI_LOAD_SHIFT from linux/kernel.h.
        load_scale: 1 << 16,
        total_bytes: info.totalram as u64 * unit,
        free_bytes: info.freeram as u64 * unit,
    })
}

#[cfg(not(target_os = "linux"))]
fn sysinfo() -> Probe<SysInfo> {
    Err(Unavailable::Unsupported)
}

/// Parse `/proc/meminfo` into a map of field name to kilobytes.
/// Lines that don't look like `Name:   1234 kB` are ignored.
pub fn parse_meminfo(text: &str) -> HashMap<String, u64> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.splitn(2, ':');
            let key = parts.next()?.trim();
            let value = parts.next()?.split_whitespace().next()?.parse().ok()?;
            Some((key.to_owned(), value))
        })
        .collect()
}

fn meminfo_pages(meminfo: &HashMap<String, u64>, field: &str) -> Probe<u64> {
    meminfo
        .get(field)
        .map(|kb| kb * 1024 / PAGE_SIZE)
        .ok_or_else(|| Unavailable::Missing(format!("meminfo field {}", field)))
}

/// Number of numeric directories under the proc root, one per process.
fn count_processes(root: &Path) -> Probe<u64> {
    let entries = fs::read_dir(root).map_err(|source| Unavailable::Os {
        query: "proc listing",
        source,
    })?;
    let count = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
        })
        .count();
    if count == 0 {
        return Err(Unavailable::Missing(format!(
            "process entries under {}",
            root.display()
        )));
    }
    Ok(count as u64)
}
