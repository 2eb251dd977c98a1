use alloc::vec::Vec;

use super::MulticastError;
use crate::wire::Ipv4Address;

/// A source address with the number of state-change reports it still has to appear in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SourceEntry {
    pub addr: Ipv4Address,
    pub retransmit: u8,
}

/// A bounded, order-preserving set of IPv4 source addresses.
///
/// Insertion order is kept so that reports list sources in the order the
/// application or the querier named them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceList {
    entries: Vec<SourceEntry>,
    capacity: usize,
}

impl SourceList {
    /// An empty list that cannot hold any source.
    pub const EMPTY: SourceList = SourceList {
        entries: Vec::new(),
        capacity: 0,
    };

    /// Create an empty list holding at most `capacity` sources.
    pub const fn new(capacity: usize) -> SourceList {
        SourceList {
            entries: Vec::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate the addresses in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Ipv4Address> + '_ {
        self.entries.iter().map(|entry| entry.addr)
    }

    /// Iterate the entries, with their retransmission counters.
    pub fn entries(&self) -> &[SourceEntry] {
        &self.entries
    }

    pub fn contains(&self, addr: Ipv4Address) -> bool {
        self.entries.iter().any(|entry| entry.addr == addr)
    }

    /// Add a source, or refresh its retransmission counter if it is already present.
    pub fn add(&mut self, addr: Ipv4Address, retransmit: u8) -> Result<(), MulticastError> {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.addr == addr) {
            entry.retransmit = retransmit;
            return Ok(());
        }
        if self.entries.len() >= self.capacity {
            return Err(MulticastError::SourceListFull);
        }
        self.entries.push(SourceEntry { addr, retransmit });
        Ok(())
    }

    /// Remove a source. Returns whether it was present.
    pub fn remove(&mut self, addr: Ipv4Address) -> bool {
        let len = self.entries.len();
        self.entries.retain(|entry| entry.addr != addr);
        self.entries.len() != len
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Compare the address sets, ignoring order and counters.
    pub fn same_set(&self, other: &SourceList) -> bool {
        self.len() == other.len() && self.iter().all(|addr| other.contains(addr))
    }

    /// Count one more transmission for every entry and drop those that are done.
    pub(crate) fn decrement_and_prune(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.retransmit = entry.retransmit.saturating_sub(1);
        }
        self.entries.retain(|entry| entry.retransmit > 0);
    }

    /// Build a list from `addrs`, dropping duplicates.
    pub(crate) fn from_addrs(
        addrs: &[Ipv4Address],
        capacity: usize,
    ) -> Result<SourceList, MulticastError> {
        let mut list = SourceList::new(capacity);
        for &addr in addrs {
            list.add(addr, 0)?;
        }
        Ok(list)
    }
}
