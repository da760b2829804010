//! # Summary
//!
//! Static ring layout. Members are ordered by identity and each one's
//! successor is the next larger identity, wrapping from the largest back to
//! the smallest, so `next` always forms a single cycle over every member.

use crate::error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ring {
    /// Sorted, de-duplicated member identities
    members: Vec<usize>,
}

impl Ring {
    /// Ring over identities `0..count`.
    pub fn new(count: usize) -> Result<Self, error::Topology> {
        Self::from_members(0..count)
    }

    /// Ring over an arbitrary set of identities.
    pub fn from_members<I>(members: I) -> Result<Self, error::Topology>
        where I: IntoIterator<Item = usize>
    {
        let mut members = members.into_iter().collect::<Vec<_>>();
        members.sort_unstable();
        members.dedup();
        if members.is_empty() {
            return Err(error::Topology::Empty)
        }
        Ok(Ring { members })
    }

    /// Successor of `id` in ring order.
    pub fn next(&self, id: usize) -> Result<usize, error::Topology> {
        let index = self.position(id)?;
        Ok(self.members[(index + 1) % self.members.len()])
    }

    pub fn contains(&self, id: usize) -> bool {
        self.members.binary_search(&id).is_ok()
    }

    /// Lowest identity, which injects the token unless configured otherwise.
    pub fn first(&self) -> usize {
        self.members[0]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn members(&self) -> impl Iterator<Item = usize> + '_ {
        self.members.iter().copied()
    }

    fn position(&self, id: usize) -> Result<usize, error::Topology> {
        self.members
            .binary_search(&id)
            .map_err(|_| error::Topology::Unknown(id))
    }
}
