//! Process memory pressure probe
//!
//! Workers check memory before every receive. When resident memory crosses
//! 90% of the configured limit, the context runs its cache-clear hooks.

/// Fraction of the limit at which memory is considered short
const CRITICAL_PERCENT: u64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStatus {
    pub resident_bytes: u64,
    pub limit_bytes: u64,
}

impl MemoryStatus {
    pub fn is_critical(&self) -> bool {
        self.limit_bytes > 0
            && self.resident_bytes.saturating_mul(100) >= self.limit_bytes.saturating_mul(CRITICAL_PERCENT)
    }
}

/// Reads resident memory and compares it against a byte limit
#[derive(Debug, Clone)]
pub struct MemoryMonitor {
    limit_bytes: u64,
}

impl MemoryMonitor {
    /// A limit of 0 disables the probe
    pub fn new(limit_bytes: u64) -> Self {
        Self { limit_bytes }
    }

    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }

    pub fn status(&self) -> Option<MemoryStatus> {
        if self.limit_bytes == 0 {
            return None;
        }
        resident_bytes().map(|resident_bytes| MemoryStatus {
            resident_bytes,
            limit_bytes: self.limit_bytes,
        })
    }

    /// The current status when it is critical, `None` otherwise
    pub fn short_status(&self) -> Option<MemoryStatus> {
        self.status().filter(MemoryStatus::is_critical)
    }
}

#[cfg(target_os = "linux")]
fn resident_bytes() -> Option<u64> {
    // statm: size resident shared text lib data dt (in pages)
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return None;
    }
    Some(resident_pages * page_size as u64)
}

#[cfg(not(target_os = "linux"))]
fn resident_bytes() -> Option<u64> {
    None
}
