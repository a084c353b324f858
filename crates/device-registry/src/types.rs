use ev3_transport::{Descriptor, DeviceType, Port, DESC_LIMIT};

/// Maps logical slots (slot 0 = the primary device of a program) to the
/// sequence number of the descriptor matched for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceTable {
    slots: [Option<usize>; DESC_LIMIT],
}

impl Default for SequenceTable {
    fn default() -> Self {
        Self {
            slots: [None; DESC_LIMIT],
        }
    }
}

impl SequenceTable {
    /// Mark every slot as not found.
    pub fn reset(&mut self) {
        self.slots = [None; DESC_LIMIT];
    }

    /// Sequence number recorded for `slot`, `None` while not found.
    pub fn get(&self, slot: usize) -> Option<usize> {
        self.slots.get(slot).copied().flatten()
    }

    pub fn is_found(&self, slot: usize) -> bool {
        self.get(slot).is_some()
    }

    /// Record a match. A slot is written at most once per pass; later
    /// matches are refused and `false` is returned.
    pub(crate) fn record(&mut self, slot: usize, sn: usize) -> bool {
        match self.slots.get_mut(slot) {
            Some(entry) if entry.is_none() => {
                *entry = Some(sn);
                true
            }
            _ => false,
        }
    }

    /// `(slot, sequence number)` pairs of the recorded slots.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, sn)| sn.map(|sn| (slot, sn)))
    }
}

/// Bitmask of the slots found during one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenceFlags(u64);

impl PresenceFlags {
    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn set(&mut self, slot: usize) {
        self.0 |= Self::bit(slot);
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.0 & Self::bit(slot) != 0
    }

    /// Mask with the slot of every wanted device set.
    pub fn expected(wanted: &[Wanted]) -> Self {
        let mut flags = Self::default();
        for w in wanted {
            flags.set(w.slot);
        }
        flags
    }

    /// Bits of `expected` not present in `self`.
    pub fn missing(&self, expected: PresenceFlags) -> PresenceFlags {
        PresenceFlags(expected.0 & !self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    fn bit(slot: usize) -> u64 {
        debug_assert!(slot < DESC_LIMIT);
        1u64.checked_shl(slot as u32).unwrap_or(0)
    }
}

/// A device a program needs: what to look for and how to configure it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wanted {
    /// Logical slot in the sequence table
    pub slot: usize,
    pub kind: DeviceType,
    /// Required port; any port when `None`
    pub port: Option<Port>,
    /// Sensor mode to set once found
    pub mode: Option<String>,
    /// Name used in logs and errors
    pub label: String,
}

impl Wanted {
    pub fn new(slot: usize, kind: DeviceType) -> Self {
        Self {
            slot,
            kind,
            port: None,
            mode: None,
            label: kind.to_string(),
        }
    }

    pub fn on_port(mut self, port: Port) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn matches(&self, desc: &Descriptor) -> bool {
        !desc.is_empty()
            && desc.kind == self.kind
            && self.port.map_or(true, |port| desc.port == Some(port))
    }
}
