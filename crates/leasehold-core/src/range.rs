//! Address-range algebra
//!
//! [`AddressRange`] is an inclusive IPv4 interval; [`AddressRangeSet`] keeps a
//! sorted, non-overlapping collection of them and describes the pool of
//! allocatable addresses. All comparisons use the unsigned 32-bit value of the
//! address.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An inclusive IPv4 interval
///
/// Validated construction rejects inverted and degenerate bounds; degenerate
/// single-address ranges can still arise internally as subtraction survivors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRange {
    start: Ipv4Addr,
    end: Ipv4Addr,
}

impl AddressRange {
    /// Build a range, rejecting `start >= end`
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self> {
        if start >= end {
            return Err(Error::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parse both endpoints from their string form
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start: Ipv4Addr = start
            .parse()
            .map_err(|_| Error::InvalidAddress(start.to_string()))?;
        let end: Ipv4Addr = end
            .parse()
            .map_err(|_| Error::InvalidAddress(end.to_string()))?;
        Self::new(start, end)
    }

    /// Unchecked constructor for internally computed bounds
    pub(crate) fn raw(start: u32, end: u32) -> Self {
        Self {
            start: Ipv4Addr::from(start),
            end: Ipv4Addr::from(end),
        }
    }

    pub fn start(&self) -> Ipv4Addr {
        self.start
    }

    pub fn end(&self) -> Ipv4Addr {
        self.end
    }

    fn start_u32(&self) -> u32 {
        u32::from(self.start)
    }

    fn end_u32(&self) -> u32 {
        u32::from(self.end)
    }

    /// Whether `ip` lies inside the range, bounds included
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let ip = u32::from(ip);
        self.start_u32() <= ip && ip <= self.end_u32()
    }

    /// Number of addresses covered; zero when the bounds are inverted
    pub fn len(&self) -> u64 {
        let (start, end) = (u64::from(self.start_u32()), u64::from(self.end_u32()));
        if start > end { 0 } else { end - start + 1 }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The i-th address counting from `start`, or `None` past the end
    pub fn by_index(&self, index: u64) -> Option<Ipv4Addr> {
        if index >= self.len() {
            return None;
        }
        Some(Ipv4Addr::from(self.start_u32() + index as u32))
    }

    /// Iterate every address in the range, in order
    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> + use<> {
        (self.start_u32()..=self.end_u32()).map(Ipv4Addr::from)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A normalized collection of address ranges
///
/// After every mutation the set is sorted by start and holds no overlapping
/// entries. Two ranges merge when the earlier one's end is greater than or
/// equal to the later one's start: touching ranges collapse into one, ranges
/// separated by a one-address gap stay separate. The gap behavior is
/// load-bearing for pool arithmetic and must not change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRangeSet {
    ranges: Vec<AddressRange>,
}

impl AddressRangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from arbitrary ranges, normalizing as they are added
    pub fn from_ranges(ranges: impl IntoIterator<Item = AddressRange>) -> Self {
        let mut set = Self {
            ranges: ranges.into_iter().collect(),
        };
        set.normalize();
        set
    }

    /// Add a range to the set, merging where it overlaps or touches
    pub fn insert(&mut self, range: AddressRange) {
        self.ranges.push(range);
        self.normalize();
    }

    /// Remove a sub-interval from the set
    ///
    /// Ranges overlapping `remove` are split into their surviving parts;
    /// zero-length survivors are dropped. Ranges past the removed interval
    /// pass through untouched.
    pub fn subtract(&mut self, remove: &AddressRange) {
        let (remove_start, remove_end) = (remove.start_u32(), remove.end_u32());
        let ranges = std::mem::take(&mut self.ranges);
        let mut result = Vec::with_capacity(ranges.len() + 1);
        let mut iter = ranges.into_iter();
        while let Some(range) = iter.next() {
            let (start, end) = (range.start_u32(), range.end_u32());
            if start > remove_end {
                // sorted set, nothing further overlaps
                result.push(range);
                result.extend(iter);
                break;
            }
            if end < remove_start {
                result.push(range);
                continue;
            }
            if start < remove_start {
                result.push(AddressRange::raw(start, remove_start - 1));
            }
            if end > remove_end {
                result.push(AddressRange::raw(remove_end + 1, end));
            }
        }
        self.ranges = result;
    }

    /// Whether any range in the set contains `ip`
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.ranges.iter().any(|range| range.contains(ip))
    }

    /// The normalized ranges, sorted by start
    pub fn ranges(&self) -> &[AddressRange] {
        &self.ranges
    }

    /// Total number of addresses covered by the set
    pub fn num_addresses(&self) -> u64 {
        self.ranges.iter().map(AddressRange::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Iterate every address in the set, range order then address order
    pub fn addresses(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.ranges.iter().flat_map(AddressRange::iter)
    }

    // Sort by start, then sweep left to right; a candidate folds into the
    // stack top when top.end >= candidate.start.
    fn normalize(&mut self) {
        self.ranges.sort_by_key(AddressRange::start_u32);
        let ranges = std::mem::take(&mut self.ranges);
        let mut merged: Vec<AddressRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(top) if top.end_u32() >= range.start_u32() => {
                    if range.end_u32() > top.end_u32() {
                        top.end = range.end;
                    }
                }
                _ => merged.push(range),
            }
        }
        self.ranges = merged;
    }
}

impl fmt::Display for AddressRangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for range in &self.ranges {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{range}")?;
            first = false;
        }
        Ok(())
    }
}
