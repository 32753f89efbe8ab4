//! Module session: the Learn → Simulate → Results flow for one module
//!
//! Owns the cost record store and both analysis workflows. Record edits are
//! written through to the repository as they happen; `save_records` does a
//! full reconcile for anything that was never persisted.

use crate::analysis::gate::{present, Clearance, GateError, GatePrompt};
use crate::analysis::types::{StrategicAnalysisResult, ValidationResult};
use crate::analysis::workflow::{AnalysisOutcome, StrategyWorkflow, ValidationWorkflow};
use crate::analysis::Oracle;
use crate::business::{
    BusinessContext, BusinessDirectory, BusinessId, FinancialRecordRepository, ModuleCatalog,
    ModuleContent, RecordPatch,
};
use crate::records::{CostRecord, CostRecordStore, ModuleId, RecordField, StoreError};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Module {0} not found")]
    ModuleNotFound(ModuleId),
    #[error("The {0:?} section is not available yet")]
    SectionLocked(Section),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Gate(#[from] GateError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Learn,
    Simulate,
    Results,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleProgress {
    pub video_completed: bool,
    pub simulation_completed: bool,
    pub results_viewed: bool,
}

impl Default for ModuleProgress {
    fn default() -> Self {
        // The learning video is never a hard prerequisite.
        Self {
            video_completed: true,
            simulation_completed: false,
            results_viewed: false,
        }
    }
}

/// Result of a back/next step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Moved(Section),
    /// Stepped out of the module, back to the learning path
    ExitModule,
    /// The next section is still locked
    Blocked,
}

pub struct ModuleSession {
    module: ModuleContent,
    business_id: BusinessId,
    context: BusinessContext,
    store: CostRecordStore,
    repository: Arc<dyn FinancialRecordRepository>,
    persisted: HashSet<Uuid>,
    validation: ValidationWorkflow,
    strategy: StrategyWorkflow,
    section: Section,
    progress: ModuleProgress,
}

impl ModuleSession {
    /// Load the module, its saved records and the business the prompts are
    /// written for. A missing business falls back to placeholder context.
    pub async fn load(
        module_id: ModuleId,
        business_id: BusinessId,
        catalog: &dyn ModuleCatalog,
        directory: &dyn BusinessDirectory,
        repository: Arc<dyn FinancialRecordRepository>,
    ) -> Result<Self, SessionError> {
        let module = catalog
            .get_module_content(module_id)
            .await
            .ok_or(SessionError::ModuleNotFound(module_id))?;

        let context = match directory.get_business_by_id(business_id).await {
            Some(business) => business.context(),
            None => {
                tracing::warn!(business_id, "business not found; using placeholder context");
                BusinessContext::unspecified()
            }
        };

        let saved = repository.get_all_financial_records(module_id).await;
        let persisted = saved.iter().map(|r| r.id).collect();
        tracing::debug!(module_id, records = saved.len(), "module session loaded");

        Ok(Self {
            module,
            business_id,
            context,
            store: CostRecordStore::from_records(module_id, saved),
            repository,
            persisted,
            validation: ValidationWorkflow::new(),
            strategy: StrategyWorkflow::new(),
            section: Section::Learn,
            progress: ModuleProgress::default(),
        })
    }

    pub fn module(&self) -> &ModuleContent {
        &self.module
    }

    pub fn business_id(&self) -> BusinessId {
        self.business_id
    }

    pub fn context(&self) -> &BusinessContext {
        &self.context
    }

    pub fn store(&self) -> &CostRecordStore {
        &self.store
    }

    pub fn validation(&self) -> &ValidationWorkflow {
        &self.validation
    }

    pub fn strategy(&self) -> &StrategyWorkflow {
        &self.strategy
    }

    pub fn progress(&self) -> ModuleProgress {
        self.progress
    }

    // ── Navigation ────────────────────────────────────────────────────────

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn is_enabled(&self, section: Section) -> bool {
        match section {
            Section::Learn => true,
            Section::Simulate => self.progress.video_completed,
            Section::Results => self.progress.simulation_completed,
        }
    }

    pub fn go_to(&mut self, section: Section) -> Result<(), SessionError> {
        if section != self.section && !self.is_enabled(section) {
            return Err(SessionError::SectionLocked(section));
        }
        self.section = section;
        if section == Section::Results {
            self.progress.results_viewed = true;
        }
        Ok(())
    }

    pub fn mark_video_completed(&mut self) {
        self.progress.video_completed = true;
    }

    /// Step back one section. Leaving Results discards both analyses so the
    /// next visit starts from a fresh validation.
    pub fn back(&mut self) -> Navigation {
        match self.section {
            Section::Learn => Navigation::ExitModule,
            Section::Simulate => {
                self.section = Section::Learn;
                Navigation::Moved(Section::Learn)
            }
            Section::Results => {
                self.validation.reset();
                self.strategy.reset();
                self.section = Section::Simulate;
                Navigation::Moved(Section::Simulate)
            }
        }
    }

    pub fn next(&mut self) -> Navigation {
        match self.section {
            Section::Learn if self.progress.video_completed => {
                self.section = Section::Simulate;
                Navigation::Moved(Section::Simulate)
            }
            Section::Simulate if self.progress.simulation_completed => {
                self.section = Section::Results;
                self.progress.results_viewed = true;
                Navigation::Moved(Section::Results)
            }
            Section::Results if self.progress.results_viewed => Navigation::ExitModule,
            _ => Navigation::Blocked,
        }
    }

    // ── Record editing ────────────────────────────────────────────────────

    pub async fn add_record(&mut self) -> CostRecord {
        let record = self.store.add();
        self.repository.add_financial_record(record.clone()).await;
        self.persisted.insert(record.id);
        record
    }

    pub async fn remove_record(&mut self, id: Uuid) -> Result<CostRecord, SessionError> {
        let removed = self.store.remove(id)?;
        if self.persisted.remove(&id) && !self.repository.delete_financial_record(id).await {
            tracing::debug!(%id, "record already absent from repository");
        }
        Ok(removed)
    }

    pub async fn update_record(
        &mut self,
        id: Uuid,
        field: RecordField,
        raw_value: &str,
    ) -> Result<(), SessionError> {
        let record = self.store.update(id, field, raw_value)?.clone();
        self.persist(record).await;
        Ok(())
    }

    async fn persist(&mut self, record: CostRecord) {
        if self.persisted.contains(&record.id) {
            let patch = RecordPatch {
                name: Some(record.name.clone()),
                amount: Some(record.amount.clone()),
            };
            if self
                .repository
                .update_financial_record(record.id, patch)
                .await
                .is_some()
            {
                return;
            }
            tracing::debug!(id = %record.id, "record vanished from repository; re-adding");
        }
        self.persisted.insert(record.id);
        self.repository.add_financial_record(record).await;
    }

    /// Make the repository match the store: update or add every record,
    /// delete persisted records that are no longer in the store.
    pub async fn save_records(&mut self) {
        let records = self.store.records().to_vec();
        let current: HashSet<Uuid> = records.iter().map(|r| r.id).collect();

        let stale: Vec<Uuid> = self.persisted.difference(&current).copied().collect();
        for id in stale {
            self.repository.delete_financial_record(id).await;
            self.persisted.remove(&id);
        }
        for record in records {
            self.persist(record).await;
        }
        tracing::debug!(records = self.persisted.len(), "records saved");
    }

    // ── Analysis ──────────────────────────────────────────────────────────

    /// Validate the records as they are right now
    pub async fn validate<O: Oracle + ?Sized>(
        &mut self,
        oracle: &O,
    ) -> &AnalysisOutcome<ValidationResult> {
        self.validation
            .run(self.store.snapshot(), self.context.clone(), oracle)
            .await
    }

    pub fn gate(&self) -> GatePrompt<'_> {
        present(&self.validation)
    }

    /// Run the strategic analysis the user confirmed. Completes the
    /// simulation step and moves to Results.
    ///
    /// The clearance must come from the current validation run and that run
    /// must still allow the analysis; otherwise nothing changes.
    pub async fn analyze<O: Oracle + ?Sized>(
        &mut self,
        clearance: Clearance,
        oracle: &O,
    ) -> Result<&AnalysisOutcome<StrategicAnalysisResult>, SessionError> {
        clearance.check(&self.validation)?;
        self.progress.simulation_completed = true;
        self.section = Section::Results;
        self.progress.results_viewed = true;
        Ok(self.strategy.run(clearance, &self.validation, oracle).await?)
    }
}
