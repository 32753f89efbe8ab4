//! Cost record store for one module-editing session
//!
//! Amounts are kept exactly as typed. Numeric coercion only happens when a
//! total is derived or a prompt is built, so a half-typed number is never
//! rejected mid-keystroke.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub type ModuleId = u32;

/// A single draft cost entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub id: Uuid,
    pub module_id: ModuleId,
    pub name: String,
    /// Raw amount text; see [`coerce_amount`]
    pub amount: String,
    pub created_at: DateTime<Utc>,
}

impl CostRecord {
    /// A blank record with a fresh id
    pub fn new(module_id: ModuleId) -> Self {
        Self {
            id: Uuid::new_v4(),
            module_id,
            name: String::new(),
            amount: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = amount.into();
        self
    }

    /// Numeric value of the amount, zero when it doesn't parse
    pub fn amount_value(&self) -> f64 {
        coerce_amount(&self.amount)
    }

    /// Both name and amount filled in; only complete records are sent for analysis
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.amount.trim().is_empty()
    }
}

/// Which field of a record an edit targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    Name,
    Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("At least one cost record must remain")]
    LastRecord,
    #[error("No cost record with id {0}")]
    NotFound(Uuid),
}

/// Immutable copy of the store taken when a phase starts
#[derive(Debug, Clone, PartialEq)]
pub struct CostSnapshot {
    pub module_id: ModuleId,
    pub records: Vec<CostRecord>,
    pub total: f64,
}

impl CostSnapshot {
    pub fn complete_records(&self) -> impl Iterator<Item = &CostRecord> {
        self.records.iter().filter(|r| r.is_complete())
    }

    pub fn has_complete_records(&self) -> bool {
        self.complete_records().next().is_some()
    }
}

/// Ordered, never-empty collection of draft cost records
#[derive(Debug, Clone)]
pub struct CostRecordStore {
    module_id: ModuleId,
    records: Vec<CostRecord>,
}

impl CostRecordStore {
    /// A store holding a single blank record
    pub fn new(module_id: ModuleId) -> Self {
        Self {
            module_id,
            records: vec![CostRecord::new(module_id)],
        }
    }

    /// Seed from previously saved records. A blank record is added when the
    /// seed is empty so the store is never empty.
    pub fn from_records(module_id: ModuleId, records: Vec<CostRecord>) -> Self {
        if records.is_empty() {
            return Self::new(module_id);
        }
        Self { module_id, records }
    }

    pub fn module_id(&self) -> ModuleId {
        self.module_id
    }

    pub fn records(&self) -> &[CostRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&CostRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Append a blank record and return a copy of it
    pub fn add(&mut self) -> CostRecord {
        let record = CostRecord::new(self.module_id);
        self.records.push(record.clone());
        record
    }

    /// Remove a record. Removing the last remaining record is rejected and
    /// leaves the store unchanged.
    pub fn remove(&mut self, id: Uuid) -> Result<CostRecord, StoreError> {
        let idx = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;
        if self.records.len() <= 1 {
            return Err(StoreError::LastRecord);
        }
        Ok(self.records.remove(idx))
    }

    /// Overwrite one field with the raw input value
    pub fn update(
        &mut self,
        id: Uuid,
        field: RecordField,
        raw_value: &str,
    ) -> Result<&CostRecord, StoreError> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;
        match field {
            RecordField::Name => record.name = raw_value.to_string(),
            RecordField::Amount => record.amount = raw_value.to_string(),
        }
        Ok(record)
    }

    /// Sum of all amounts that coerce to a number
    pub fn total(&self) -> f64 {
        self.records.iter().map(CostRecord::amount_value).sum()
    }

    pub fn snapshot(&self) -> CostSnapshot {
        CostSnapshot {
            module_id: self.module_id,
            records: self.records.clone(),
            total: self.total(),
        }
    }
}

/// Lenient number parsing for amounts typed by hand.
///
/// Leading whitespace is skipped and the longest numeric prefix is used, so
/// `"12abc"` is 12 and `"1e3"` is 1000. Anything without a numeric prefix is 0.
pub fn coerce_amount(raw: &str) -> f64 {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut mantissa_digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        mantissa_digits += frac_end - frac_start;
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return 0.0;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }

    match s[..end].parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}
