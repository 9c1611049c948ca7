use crate::record::ExtractedRecord;

/// Records extracted during the current run, in extraction order.
///
/// Append-only; the only way to remove records is [`Session::clear`].
#[derive(Debug, Clone, Default)]
pub struct Session {
    records: Vec<ExtractedRecord>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: ExtractedRecord) {
        self.records.push(record);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Read-only view for display and export.
    pub fn snapshot(&self) -> &[ExtractedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
