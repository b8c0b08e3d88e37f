//! CPU affinity bitmasks.

use std::fmt;
use thiserror::Error;

/// Number of logical CPUs an [`AffinityMask`] can address.
pub const MAX_CPUS: u32 = u32::BITS;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AffinityError {
    #[error("CPU index '{0}' is not a number")]
    InvalidIndex(String),

    #[error("CPU index {0} does not fit a {max}-bit mask", max = MAX_CPUS)]
    IndexOutOfRange(u32),
}

/// Bit `i` set means the process may run on logical CPU `i`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AffinityMask(u32);

impl AffinityMask {
    pub const EMPTY: AffinityMask = AffinityMask(0);

    pub fn bits(self) -> u32 {
        self.0
    }

    /// Return a copy with `cpu` added, failing when it does not fit the mask.
    pub fn with_cpu(self, cpu: u32) -> Result<Self, AffinityError> {
        1u32.checked_shl(cpu)
            .map(|bit| AffinityMask(self.0 | bit))
            .ok_or(AffinityError::IndexOutOfRange(cpu))
    }

    pub fn contains(self, cpu: u32) -> bool {
        cpu < MAX_CPUS && self.0 & (1 << cpu) != 0
    }

    /// Set CPU indices in ascending order.
    pub fn cpus(self) -> impl Iterator<Item = u32> {
        (0..MAX_CPUS).filter(move |cpu| self.contains(*cpu))
    }

    /// Lowercase hexadecimal without a `0x` prefix.
    pub fn to_hex(self) -> String {
        format!("{self:x}")
    }
}

impl From<AffinityMask> for u32 {
    fn from(mask: AffinityMask) -> Self {
        mask.0
    }
}

impl fmt::Display for AffinityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::LowerHex for AffinityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Build a mask from a comma-separated CPU list such as `"0,2,3"`.
///
/// An empty list yields an empty mask and trailing commas are ignored
/// (`"0,"` selects CPU 0). Any other malformed entry fails the whole list
/// rather than producing a partial mask.
pub fn mask_from_list(cpu_list: &str) -> Result<AffinityMask, AffinityError> {
    let cpu_list = cpu_list.trim().trim_end_matches(',');
    if cpu_list.is_empty() {
        return Ok(AffinityMask::EMPTY);
    }

    cpu_list.split(',').try_fold(AffinityMask::EMPTY, |mask, entry| {
        let entry = entry.trim();
        let cpu = entry
            .parse::<u32>()
            .map_err(|_| AffinityError::InvalidIndex(entry.to_string()))?;
        mask.with_cpu(cpu)
    })
}

/// Same as [`mask_from_list`], rendered as lowercase hex.
pub fn mask_as_hex(cpu_list: &str) -> Result<String, AffinityError> {
    mask_from_list(cpu_list).map(AffinityMask::to_hex)
}

/// Build a mask from per-CPU flags, where `flags[i]` selects CPU `i`.
pub fn mask_from_flags(flags: &[bool]) -> Result<AffinityMask, AffinityError> {
    flags
        .iter()
        .enumerate()
        .filter(|(_, enabled)| **enabled)
        .try_fold(AffinityMask::EMPTY, |mask, (cpu, _)| {
            mask.with_cpu(u32::try_from(cpu).unwrap_or(u32::MAX))
        })
}

/// Build a mask selecting every CPU in the half-open range `[from, to)`.
pub fn mask_from_range(from: u32, to: u32) -> Result<AffinityMask, AffinityError> {
    (from..to).try_fold(AffinityMask::EMPTY, AffinityMask::with_cpu)
}
