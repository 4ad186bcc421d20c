use super::record::ProcessRecord;

/// Fixed-capacity arena of process records with stable slot indices.
///
/// A slot is reused only after its previous record has been dropped, which also
/// unregisters that record's pipes.
#[derive(Debug)]
pub(crate) struct ProcessTable {
    slots: Vec<Option<ProcessRecord>>,
}

impl ProcessTable {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    pub(crate) fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    pub(crate) fn insert(&mut self, record: ProcessRecord) {
        if let Some(slot) = self.slots.get_mut(record.slot) {
            *slot = Some(record);
        }
    }

    pub(crate) fn remove(&mut self, slot: usize) -> Option<ProcessRecord> {
        self.slots.get_mut(slot).and_then(Option::take)
    }

    pub(crate) fn get_mut(&mut self, slot: usize) -> Option<&mut ProcessRecord> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.slots.iter().flatten()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut ProcessRecord> {
        self.slots.iter_mut().flatten()
    }

    /// Records the exit of `pid`. Returns false if no entry owns that process.
    pub(crate) fn complete(&mut self, pid: u32, code: i32) -> bool {
        match self.iter_mut().find(|record| record.pid == pid) {
            Some(record) => {
                record.exited(code);
                true
            }
            None => false,
        }
    }

    /// Drops every finished record and returns the freed slots.
    pub(crate) fn release_finished(&mut self) -> Vec<usize> {
        let mut freed = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.as_ref().is_some_and(ProcessRecord::is_finished) {
                *slot = None;
                freed.push(index);
            }
        }
        freed
    }

    pub(crate) fn len(&self) -> usize {
        self.iter().count()
    }
}
