//! Business and module collaborators
//!
//! The pipeline only needs a handful of accessors from the surrounding
//! application, so they are expressed as capability traits. The in-memory
//! implementations here back the CLI and the tests; anything networked or
//! file-backed that satisfies the same traits can be swapped in.

use crate::records::{CostRecord, ModuleId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

pub type BusinessId = u32;

/// Location used in prompts when the business has none on file
pub const UNSPECIFIED_LOCATION: &str = "Ubicación no especificada";
/// Business type used in prompts when the business has none on file
pub const UNSPECIFIED_BUSINESS_TYPE: &str = "Tipo de negocio no especificado";

/// Business size bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SizeCategory {
    #[default]
    Small,
    Medium,
    Large,
}

impl SizeCategory {
    /// Map the stored size id; unknown ids fall back to `Small`
    pub fn from_id(id: u32) -> Self {
        match id {
            2 => SizeCategory::Medium,
            3 => SizeCategory::Large,
            _ => SizeCategory::Small,
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            SizeCategory::Small => 1,
            SizeCategory::Medium => 2,
            SizeCategory::Large => 3,
        }
    }

    /// Label embedded in the oracle prompts
    pub fn label(&self) -> &'static str {
        match self {
            SizeCategory::Small => "Pequeño",
            SizeCategory::Medium => "Mediano",
            SizeCategory::Large => "Grande",
        }
    }
}

/// A business as stored by the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Business {
    pub id: BusinessId,
    pub user_id: u32,
    pub name: String,
    pub business_type: String,
    pub location: String,
    pub size_id: u32,
    pub created_at: DateTime<Utc>,
}

impl Business {
    pub fn context(&self) -> BusinessContext {
        BusinessContext {
            location: non_blank_or(&self.location, UNSPECIFIED_LOCATION),
            business_type: non_blank_or(&self.business_type, UNSPECIFIED_BUSINESS_TYPE),
            size: SizeCategory::from_id(self.size_id),
        }
    }
}

/// Fields needed to register a business
#[derive(Debug, Clone, Default)]
pub struct NewBusiness {
    pub user_id: u32,
    pub name: String,
    pub business_type: String,
    pub location: String,
    pub size_id: u32,
}

/// Read-only view of the business that the prompts are written for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessContext {
    pub location: String,
    pub business_type: String,
    pub size: SizeCategory,
}

impl BusinessContext {
    pub fn new(
        location: impl Into<String>,
        business_type: impl Into<String>,
        size: SizeCategory,
    ) -> Self {
        Self {
            location: non_blank_or(&location.into(), UNSPECIFIED_LOCATION),
            business_type: non_blank_or(&business_type.into(), UNSPECIFIED_BUSINESS_TYPE),
            size,
        }
    }

    /// Placeholder context used when no business could be loaded
    pub fn unspecified() -> Self {
        Self {
            location: UNSPECIFIED_LOCATION.to_string(),
            business_type: UNSPECIFIED_BUSINESS_TYPE.to_string(),
            size: SizeCategory::Small,
        }
    }
}

impl Default for BusinessContext {
    fn default() -> Self {
        Self::unspecified()
    }
}

fn non_blank_or(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Learning content attached to a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleContent {
    pub id: ModuleId,
    pub title: String,
    pub concept: String,
    pub resource_url: Option<String>,
}

/// Partial update for a stored record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub name: Option<String>,
    pub amount: Option<String>,
}

#[async_trait]
pub trait BusinessDirectory: Send + Sync {
    async fn get_business_by_id(&self, id: BusinessId) -> Option<Business>;
}

#[async_trait]
pub trait ModuleCatalog: Send + Sync {
    async fn get_module_content(&self, module_id: ModuleId) -> Option<ModuleContent>;
}

#[async_trait]
pub trait FinancialRecordRepository: Send + Sync {
    async fn get_all_financial_records(&self, module_id: ModuleId) -> Vec<CostRecord>;
    /// Store a record; ids are generated client-side and kept as given
    async fn add_financial_record(&self, record: CostRecord) -> CostRecord;
    async fn update_financial_record(&self, id: Uuid, patch: RecordPatch) -> Option<CostRecord>;
    async fn delete_financial_record(&self, id: Uuid) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("No business ids left to assign")]
    IdsExhausted,
}

/// Id for the business registered after `count` others
fn next_business_id(count: usize) -> Result<BusinessId, DirectoryError> {
    count
        .checked_add(1)
        .and_then(|next| BusinessId::try_from(next).ok())
        .ok_or(DirectoryError::IdsExhausted)
}

/// Process-memory business directory
#[derive(Debug, Default)]
pub struct InMemoryBusinessDirectory {
    businesses: Mutex<Vec<Business>>,
}

impl InMemoryBusinessDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a business; ids are assigned sequentially from 1
    pub fn create_business(&self, data: NewBusiness) -> Result<Business, DirectoryError> {
        let mut guard = self.businesses.lock().unwrap_or_else(|e| e.into_inner());
        let business = Business {
            id: next_business_id(guard.len())?,
            user_id: data.user_id,
            name: data.name,
            business_type: data.business_type,
            location: data.location,
            size_id: data.size_id,
            created_at: Utc::now(),
        };
        guard.push(business.clone());
        Ok(business)
    }

    pub fn all(&self) -> Vec<Business> {
        self.businesses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl BusinessDirectory for InMemoryBusinessDirectory {
    async fn get_business_by_id(&self, id: BusinessId) -> Option<Business> {
        let guard = self.businesses.lock().unwrap_or_else(|e| e.into_inner());
        guard.iter().find(|b| b.id == id).cloned()
    }
}

/// Process-memory module content and financial records
#[derive(Debug, Default)]
pub struct InMemoryModuleService {
    modules: Vec<ModuleContent>,
    records: Mutex<Vec<CostRecord>>,
}

impl InMemoryModuleService {
    pub fn new(modules: Vec<ModuleContent>) -> Self {
        Self {
            modules,
            records: Mutex::new(Vec::new()),
        }
    }

    /// The fixed-costs module with no saved records
    pub fn with_default_modules() -> Self {
        Self::new(vec![ModuleContent {
            id: 1,
            title: "Costos Fijos".to_string(),
            concept: "Aprende los conceptos básicos de costos empresariales".to_string(),
            resource_url: Some(
                "https://www.youtube.com/embed/_ZQe_6JV4Ys?si=PkPXOObKR2CC7KXa".to_string(),
            ),
        }])
    }
}

#[async_trait]
impl ModuleCatalog for InMemoryModuleService {
    async fn get_module_content(&self, module_id: ModuleId) -> Option<ModuleContent> {
        self.modules.iter().find(|m| m.id == module_id).cloned()
    }
}

#[async_trait]
impl FinancialRecordRepository for InMemoryModuleService {
    async fn get_all_financial_records(&self, module_id: ModuleId) -> Vec<CostRecord> {
        let guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .iter()
            .filter(|r| r.module_id == module_id)
            .cloned()
            .collect()
    }

    async fn add_financial_record(&self, record: CostRecord) -> CostRecord {
        let mut guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        guard.retain(|r| r.id != record.id);
        guard.push(record.clone());
        record
    }

    async fn update_financial_record(&self, id: Uuid, patch: RecordPatch) -> Option<CostRecord> {
        let mut guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let record = guard.iter_mut().find(|r| r.id == id)?;
        if let Some(name) = patch.name {
            record.name = name;
        }
        if let Some(amount) = patch.amount {
            record.amount = amount;
        }
        Some(record.clone())
    }

    async fn delete_financial_record(&self, id: Uuid) -> bool {
        let mut guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let before = guard.len();
        guard.retain(|r| r.id != id);
        guard.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_category_mapping() {
        assert_eq!(SizeCategory::from_id(1), SizeCategory::Small);
        assert_eq!(SizeCategory::from_id(2), SizeCategory::Medium);
        assert_eq!(SizeCategory::from_id(3), SizeCategory::Large);
        assert_eq!(SizeCategory::from_id(0), SizeCategory::Small);
        assert_eq!(SizeCategory::from_id(42), SizeCategory::Small);
        assert_eq!(SizeCategory::Large.label(), "Grande");
        assert_eq!(SizeCategory::from_id(SizeCategory::Medium.id()), SizeCategory::Medium);
    }

    #[test]
    fn test_context_falls_back_on_blank_fields() {
        let ctx = BusinessContext::new("  ", "", SizeCategory::Medium);
        assert_eq!(ctx.location, UNSPECIFIED_LOCATION);
        assert_eq!(ctx.business_type, UNSPECIFIED_BUSINESS_TYPE);
        assert_eq!(ctx.size, SizeCategory::Medium);
    }

    #[tokio::test]
    async fn test_directory_lookup() {
        let directory = InMemoryBusinessDirectory::new();
        let created = directory.create_business(NewBusiness {
            user_id: 1,
            name: "Café Central".to_string(),
            business_type: "Cafetería".to_string(),
            location: "Quito".to_string(),
            size_id: 2,
        })
        .unwrap();
        assert_eq!(created.id, 1);

        let found = directory.get_business_by_id(1).await.unwrap();
        let ctx = found.context();
        assert_eq!(ctx.location, "Quito");
        assert_eq!(ctx.size, SizeCategory::Medium);
        assert!(directory.get_business_by_id(2).await.is_none());
    }

    #[test]
    fn test_business_ids_never_wrap() {
        assert_eq!(next_business_id(0), Ok(1));
        assert_eq!(
            next_business_id(BusinessId::MAX as usize - 1),
            Ok(BusinessId::MAX)
        );
        assert_eq!(
            next_business_id(BusinessId::MAX as usize),
            Err(DirectoryError::IdsExhausted)
        );
        assert_eq!(next_business_id(usize::MAX), Err(DirectoryError::IdsExhausted));
    }

    #[tokio::test]
    async fn test_record_repository_crud() {
        let service = InMemoryModuleService::with_default_modules();
        let record = CostRecord::new(1).with_name("Alquiler").with_amount("900");
        let other_module = CostRecord::new(2).with_name("Internet").with_amount("40");
        service.add_financial_record(record.clone()).await;
        service.add_financial_record(other_module).await;

        let listed = service.get_all_financial_records(1).await;
        assert_eq!(listed, vec![record.clone()]);

        let patched = service
            .update_financial_record(
                record.id,
                RecordPatch {
                    amount: Some("950".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(patched.amount, "950");
        assert_eq!(patched.name, "Alquiler");

        assert!(service
            .update_financial_record(Uuid::new_v4(), RecordPatch::default())
            .await
            .is_none());
        assert!(service.delete_financial_record(record.id).await);
        assert!(!service.delete_financial_record(record.id).await);
        assert!(service.get_all_financial_records(1).await.is_empty());
    }

    #[tokio::test]
    async fn test_module_catalog() {
        let service = InMemoryModuleService::with_default_modules();
        let module = service.get_module_content(1).await.unwrap();
        assert_eq!(module.title, "Costos Fijos");
        assert!(service.get_module_content(9).await.is_none());
    }
}
