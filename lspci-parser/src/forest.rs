//! Containment forest over inclusive address ranges.
//!
//! A range becomes a child of the smallest range already in the forest that contains
//! its start. Ranges are expected to be inserted outermost first (see
//! [`RangeForest::build`]); a range that starts inside another one but runs past its
//! end is rejected.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use crate::ast::{AddressRange, AddressSpace, Device};
use crate::errors::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeNode {
    pub start: u64,
    /// Inclusive.
    pub end: u64,
    /// Everything that claims exactly this range.
    pub labels: BTreeSet<String>,
    /// Sorted by start ascending, then end descending.
    pub children: Vec<RangeNode>,
}

impl RangeNode {
    fn new(start: u64, end: u64, label: String) -> Self {
        Self {
            start,
            end,
            labels: BTreeSet::from([label]),
            children: Vec::new(),
        }
    }

    fn order(&self) -> (u64, Reverse<u64>) {
        (self.start, Reverse(self.end))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RangeForest {
    roots: Vec<RangeNode>,
}

impl RangeForest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roots(&self) -> &[RangeNode] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Insert the inclusive range `start..=end` under `label`.
    pub fn insert(&mut self, start: u64, end: u64, label: impl Into<String>) -> Result<(), Error> {
        if end < start {
            return Err(Error::InvertedRange { start, end });
        }

        let label = label.into();
        let mut level = &mut self.roots;
        let mut depth = 0;

        loop {
            if let Some(node) = level.iter_mut().find(|n| n.start == start && n.end == end) {
                tracing::trace!(start, end, depth, %label, "labelled existing range");
                node.labels.insert(label);
                return Ok(());
            }

            let Some(i) = level.iter().position(|n| n.start <= start && start < n.end) else {
                let node = RangeNode::new(start, end, label);
                let at = level.partition_point(|n| n.order() < node.order());
                tracing::trace!(start, end, depth, "inserted range");
                level.insert(at, node);
                return Ok(());
            };

            let outer = &mut level[i];
            if end > outer.end {
                return Err(Error::RangeViolation {
                    start,
                    end,
                    outer_start: outer.start,
                    outer_end: outer.end,
                });
            }

            level = &mut outer.children;
            depth += 1;
        }
    }

    /// Build a forest from ranges in any order.
    ///
    /// Ranges are inserted by start ascending, end descending and then label, so
    /// enclosing ranges always go in before the ranges they contain.
    pub fn build(ranges: impl IntoIterator<Item = AddressRange>) -> Result<Self, Error> {
        let mut ranges: Vec<_> = ranges.into_iter().collect();
        ranges.sort_by(|a, b| {
            (a.start, Reverse(a.end), &a.label).cmp(&(b.start, Reverse(b.end), &b.label))
        });

        let mut forest = Self::new();
        for range in ranges {
            forest.insert(range.start, range.end, range.label)?;
        }

        Ok(forest)
    }

    /// Build the forest of every range the devices claim in `space`.
    pub fn collect(devices: &[Device], space: AddressSpace) -> Result<Self, Error> {
        Self::build(
            devices
                .iter()
                .flat_map(Device::ranges)
                .filter(|range| range.space == space),
        )
    }

    /// Depth-first walk over the forest, yielding each node with its depth.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: self.roots.iter().rev().map(|node| (0, node)).collect(),
        }
    }
}

/// Iterator returned by [`RangeForest::walk`].
pub struct Walk<'a> {
    stack: Vec<(usize, &'a RangeNode)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (usize, &'a RangeNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        self.stack
            .extend(node.children.iter().rev().map(|child| (depth + 1, child)));
        Some((depth, node))
    }
}
