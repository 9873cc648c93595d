//! Static cut-through switching tables.
//!
//! A populated entry lets a packet bypass fragmentation and the routing
//! table entirely: the dispatcher bumps the hop count, enforces the hop
//! budget and transmits straight out of the mapped interface, rewriting
//! the label on the label-switched variant.

use std::collections::HashMap;

use simnet_core::{InterfaceId, Label};

/// Plain incoming→outgoing interface cut-through table.
#[derive(Debug, Default)]
#[must_use]
pub struct SwitchTable {
    entries: HashMap<InterfaceId, InterfaceId>,
}

impl SwitchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map packets arriving on `incoming` to go straight out `outgoing`.
    pub fn connect(&mut self, incoming: InterfaceId, outgoing: InterfaceId) {
        self.entries.insert(incoming, outgoing);
    }

    /// Remove the mapping for `incoming`, if any.
    pub fn disconnect(&mut self, incoming: InterfaceId) -> Option<InterfaceId> {
        self.entries.remove(&incoming)
    }

    #[must_use]
    pub fn get(&self, incoming: InterfaceId) -> Option<InterfaceId> {
        self.entries.get(&incoming).copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Label-switched cut-through table:
/// `(incoming interface, incoming label)` → `(outgoing interface, outgoing label)`.
#[derive(Debug, Default)]
#[must_use]
pub struct LabelSwitchTable {
    entries: HashMap<(InterfaceId, Label), (InterfaceId, Label)>,
}

impl LabelSwitchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(
        &mut self,
        incoming: InterfaceId,
        in_label: Label,
        outgoing: InterfaceId,
        out_label: Label,
    ) {
        self.entries.insert((incoming, in_label), (outgoing, out_label));
    }

    pub fn disconnect(&mut self, incoming: InterfaceId, in_label: Label) -> Option<(InterfaceId, Label)> {
        self.entries.remove(&(incoming, in_label))
    }

    #[must_use]
    pub fn get(&self, incoming: InterfaceId, in_label: Label) -> Option<(InterfaceId, Label)> {
        self.entries.get(&(incoming, in_label)).copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_table() {
        let mut table = SwitchTable::new();
        assert!(table.get(InterfaceId(0)).is_none());

        table.connect(InterfaceId(0), InterfaceId(2));
        assert_eq!(table.get(InterfaceId(0)), Some(InterfaceId(2)));
        assert!(table.get(InterfaceId(1)).is_none());

        assert_eq!(table.disconnect(InterfaceId(0)), Some(InterfaceId(2)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_label_switch_table() {
        let mut table = LabelSwitchTable::new();
        table.connect(InterfaceId(0), Label(10), InterfaceId(1), Label(20));

        assert_eq!(
            table.get(InterfaceId(0), Label(10)),
            Some((InterfaceId(1), Label(20)))
        );
        // Same interface, different label: no entry.
        assert!(table.get(InterfaceId(0), Label(11)).is_none());

        table.disconnect(InterfaceId(0), Label(10));
        assert!(table.is_empty());
    }
}
