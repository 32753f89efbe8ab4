//! Payload shapes returned by the analysis oracle
//!
//! Field names on the wire follow the Spanish schema the prompts ask for.
//! Deserialization is strict about structure (required keys, types) and
//! lenient about content: enum values outside the documented vocabulary and
//! numbers sent where text was expected are kept, then reported as
//! [`ShapeDrift`] instead of failing the whole analysis.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// Number of recommendations the analysis prompt asks for
pub const EXPECTED_ACTION_PLAN_LEN: usize = 3;

// ═══════════════════════════════════════════════════════════════════════════
//  PHASE 1: VALIDATION
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    #[serde(rename = "validacion_de_costos", default)]
    pub findings: Vec<CostFinding>,
    #[serde(rename = "costos_obligatorios_faltantes", default)]
    pub missing_mandatory: Vec<MissingMandatoryCost>,
    #[serde(rename = "costos_recomendados_faltantes", default)]
    pub missing_recommended: Vec<MissingRecommendedCost>,
    #[serde(rename = "resumen_validacion")]
    pub summary: ValidationSummary,
}

impl ValidationResult {
    /// The single authoritative continue/block signal
    pub fn may_proceed(&self) -> bool {
        self.summary.may_proceed
    }

    pub fn invalid_findings(&self) -> impl Iterator<Item = &CostFinding> {
        self.findings.iter().filter(|f| !f.is_valid)
    }
}

/// Audit verdict for one submitted cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostFinding {
    #[serde(rename = "costo_recibido", deserialize_with = "text_or_number")]
    pub name: String,
    #[serde(
        rename = "valor_recibido",
        default,
        deserialize_with = "text_or_number"
    )]
    pub received_value: String,
    #[serde(rename = "es_valido")]
    pub is_valid: bool,
    #[serde(rename = "justificacion", default)]
    pub justification: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingMandatoryCost {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default)]
    pub description: String,
    #[serde(rename = "motivo_critico", default)]
    pub critical_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingRecommendedCost {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default)]
    pub description: String,
    #[serde(rename = "beneficio", default)]
    pub benefit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    #[serde(rename = "mensaje_general", default)]
    pub message: String,
    #[serde(rename = "puede_proseguir_analisis")]
    pub may_proceed: bool,
}

// ═══════════════════════════════════════════════════════════════════════════
//  PHASE 2: STRATEGIC ANALYSIS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategicAnalysisResult {
    /// Per-cost market comparison, in the order the oracle listed them
    #[serde(rename = "analisis_costos_recibidos", with = "ordered_map")]
    pub cost_evaluations: Vec<(String, CostEvaluation)>,
    #[serde(rename = "analisis_riesgos_operativos", default)]
    pub risks: Vec<OperationalRisk>,
    #[serde(rename = "plan_de_accion_recomendado")]
    pub action_plan: Vec<ActionItem>,
}

impl StrategicAnalysisResult {
    pub fn evaluation_for(&self, cost_name: &str) -> Option<&CostEvaluation> {
        self.cost_evaluations
            .iter()
            .find(|(name, _)| name == cost_name)
            .map(|(_, eval)| eval)
    }

    pub fn out_of_range(&self) -> impl Iterator<Item = &(String, CostEvaluation)> {
        self.cost_evaluations
            .iter()
            .filter(|(_, eval)| eval.evaluation == RangeEvaluation::OutOfRange)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEvaluation {
    #[serde(
        rename = "valor_recibido",
        default,
        deserialize_with = "text_or_number"
    )]
    pub received_value: String,
    #[serde(rename = "evaluacion")]
    pub evaluation: RangeEvaluation,
    #[serde(rename = "comentario_evaluacion", default)]
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalRisk {
    #[serde(rename = "riesgo")]
    pub risk: String,
    #[serde(rename = "causa", default)]
    pub cause: String,
    #[serde(rename = "impacto_potencial", default)]
    pub potential_impact: String,
    #[serde(rename = "probabilidad")]
    pub probability: Probability,
    #[serde(
        rename = "consecuencias_economicas",
        default,
        deserialize_with = "text_or_number"
    )]
    pub estimated_economic_consequence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "descripcion", default)]
    pub description: String,
    #[serde(rename = "prioridad")]
    pub priority: ActionPriority,
    #[serde(rename = "impacto_estimado", default)]
    pub estimated_impact: String,
    #[serde(
        rename = "inversion_requerida",
        default,
        deserialize_with = "text_or_number"
    )]
    pub required_investment: String,
    #[serde(rename = "plazo_implementacion", default)]
    pub implementation_timeframe: String,
}

// ═══════════════════════════════════════════════════════════════════════════
//  VOCABULARY
// ═══════════════════════════════════════════════════════════════════════════

/// Market-range verdict for one cost
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RangeEvaluation {
    WithinRange,
    OutOfRange,
    /// Anything outside the documented vocabulary, kept verbatim
    Other(String),
}

impl From<String> for RangeEvaluation {
    fn from(raw: String) -> Self {
        match fold(&raw).as_str() {
            "dentro del rango" => RangeEvaluation::WithinRange,
            "fuera del rango" => RangeEvaluation::OutOfRange,
            _ => RangeEvaluation::Other(raw),
        }
    }
}

impl From<RangeEvaluation> for String {
    fn from(value: RangeEvaluation) -> Self {
        match value {
            RangeEvaluation::WithinRange => "Dentro del rango".to_string(),
            RangeEvaluation::OutOfRange => "Fuera del rango".to_string(),
            RangeEvaluation::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Probability {
    High,
    Medium,
    Low,
    Other(String),
}

impl From<String> for Probability {
    fn from(raw: String) -> Self {
        match fold(&raw).as_str() {
            "alta" => Probability::High,
            "media" => Probability::Medium,
            "baja" => Probability::Low,
            _ => Probability::Other(raw),
        }
    }
}

impl From<Probability> for String {
    fn from(value: Probability) -> Self {
        match value {
            Probability::High => "Alta".to_string(),
            Probability::Medium => "Media".to_string(),
            Probability::Low => "Baja".to_string(),
            Probability::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionPriority {
    Critical,
    High,
    Medium,
    Other(String),
}

impl From<String> for ActionPriority {
    fn from(raw: String) -> Self {
        match fold(&raw).as_str() {
            "critica" => ActionPriority::Critical,
            "alta" => ActionPriority::High,
            "media" => ActionPriority::Medium,
            _ => ActionPriority::Other(raw),
        }
    }
}

impl From<ActionPriority> for String {
    fn from(value: ActionPriority) -> Self {
        match value {
            ActionPriority::Critical => "Crítica".to_string(),
            ActionPriority::High => "Alta".to_string(),
            ActionPriority::Medium => "Media".to_string(),
            ActionPriority::Other(raw) => raw,
        }
    }
}

/// Lowercase, trim and drop Spanish accents for vocabulary matching
fn fold(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            'á' | 'Á' => 'a',
            'é' | 'É' => 'e',
            'í' | 'Í' => 'i',
            'ó' | 'Ó' => 'o',
            'ú' | 'Ú' => 'u',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════
//  SHAPE DRIFT
// ═══════════════════════════════════════════════════════════════════════════

/// A structurally valid payload that breaks a documented invariant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeDrift {
    ActionPlanLength { found: usize },
    NonNumericValue { cost: String, value: String },
    UnknownVocabulary { field: &'static str, value: String },
}

impl fmt::Display for ShapeDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeDrift::ActionPlanLength { found } => write!(
                f,
                "action plan has {} entries (expected {})",
                found, EXPECTED_ACTION_PLAN_LEN
            ),
            ShapeDrift::NonNumericValue { cost, value } => {
                write!(f, "received value '{}' for '{}' is not numeric", value, cost)
            }
            ShapeDrift::UnknownVocabulary { field, value } => {
                write!(f, "unexpected {} value '{}'", field, value)
            }
        }
    }
}

/// Payloads that can report invariant violations after a successful parse
pub trait Inspect {
    fn shape_drift(&self) -> Vec<ShapeDrift>;
}

impl Inspect for ValidationResult {
    fn shape_drift(&self) -> Vec<ShapeDrift> {
        self.findings
            .iter()
            .filter(|f| !looks_numeric(&f.received_value))
            .map(|f| ShapeDrift::NonNumericValue {
                cost: f.name.clone(),
                value: f.received_value.clone(),
            })
            .collect()
    }
}

impl Inspect for StrategicAnalysisResult {
    fn shape_drift(&self) -> Vec<ShapeDrift> {
        let mut drift = Vec::new();
        if self.action_plan.len() != EXPECTED_ACTION_PLAN_LEN {
            drift.push(ShapeDrift::ActionPlanLength {
                found: self.action_plan.len(),
            });
        }
        for (name, eval) in &self.cost_evaluations {
            if !looks_numeric(&eval.received_value) {
                drift.push(ShapeDrift::NonNumericValue {
                    cost: name.clone(),
                    value: eval.received_value.clone(),
                });
            }
            if let RangeEvaluation::Other(value) = &eval.evaluation {
                drift.push(ShapeDrift::UnknownVocabulary {
                    field: "evaluacion",
                    value: value.clone(),
                });
            }
        }
        for risk in &self.risks {
            if let Probability::Other(value) = &risk.probability {
                drift.push(ShapeDrift::UnknownVocabulary {
                    field: "probabilidad",
                    value: value.clone(),
                });
            }
        }
        for item in &self.action_plan {
            if let ActionPriority::Other(value) = &item.priority {
                drift.push(ShapeDrift::UnknownVocabulary {
                    field: "prioridad",
                    value: value.clone(),
                });
            }
        }
        drift
    }
}

/// Currency-formatted amounts such as `$1,200.50` count as numeric
fn looks_numeric(value: &str) -> bool {
    let cleaned: String = value
        .trim()
        .trim_start_matches('$')
        .trim_end_matches("USD")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    !cleaned.is_empty() && cleaned.parse::<f64>().is_ok()
}

// ═══════════════════════════════════════════════════════════════════════════
//  SERDE HELPERS
// ═══════════════════════════════════════════════════════════════════════════

/// Accept a string, or a bare number/bool where the schema asked for text
fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!(
            "expected text, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
        _ => "a scalar",
    }
}

/// JSON object <-> `Vec<(String, V)>`, keeping key order
mod ordered_map {
    use super::*;

    pub fn serialize<S, V>(entries: &[(String, V)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        struct EntriesVisitor<V>(PhantomData<V>);

        impl<'de, V> Visitor<'de> for EntriesVisitor<V>
        where
            V: Deserialize<'de>,
        {
            type Value = Vec<(String, V)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object keyed by cost name")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    entries.push((key, value));
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALIDATION_JSON: &str = r#"{
        "validacion_de_costos": [
            {"costo_recibido": "Alquiler", "valor_recibido": "$500", "es_valido": true, "justificacion": "Válido."},
            {"costo_recibido": "Insumos", "valor_recibido": 300, "es_valido": false, "justificacion": "Costo variable."}
        ],
        "costos_recomendados_faltantes": [
            {"nombre": "Seguro", "descripcion": "Póliza contra incendios", "beneficio": "Protección"}
        ],
        "resumen_validacion": {
            "mensaje_general": "Corrige los costos inválidos.",
            "puede_proseguir_analisis": false
        }
    }"#;

    fn analysis_json(plan_len: usize) -> String {
        let item = r#"{"titulo": "Renegociar alquiler", "descripcion": "Hablar con el arrendador", "prioridad": "Crítica", "impacto_estimado": "Ahorro de $100", "inversion_requerida": "Sin inversión adicional", "plazo_implementacion": "1-3 meses"}"#;
        let plan = vec![item; plan_len].join(",");
        format!(
            r#"{{
                "analisis_costos_recibidos": {{
                    "Luz": {{"valor_recibido": "$80", "evaluacion": "Dentro del rango", "comentario_evaluacion": "Normal."}},
                    "Alquiler": {{"valor_recibido": "$900", "evaluacion": "Fuera del rango", "comentario_evaluacion": "Alto."}}
                }},
                "analisis_riesgos_operativos": [
                    {{"riesgo": "Alquiler elevado", "causa": "Alquiler", "impacto_potencial": "Menor margen", "probabilidad": "Alta", "consecuencias_economicas": 1200}}
                ],
                "plan_de_accion_recomendado": [{}]
            }}"#,
            plan
        )
    }

    #[test]
    fn test_validation_result_parses_spanish_schema() {
        let parsed: ValidationResult = serde_json::from_str(VALIDATION_JSON).unwrap();
        assert!(!parsed.may_proceed());
        assert_eq!(parsed.findings.len(), 2);
        assert_eq!(parsed.findings[1].received_value, "300");
        assert!(parsed.missing_mandatory.is_empty());
        assert_eq!(parsed.missing_recommended[0].benefit, "Protección");
        let invalid: Vec<&str> = parsed.invalid_findings().map(|f| f.name.as_str()).collect();
        assert_eq!(invalid, vec!["Insumos"]);
        assert!(parsed.shape_drift().is_empty());
    }

    #[test]
    fn test_validation_requires_gate_field() {
        let json = r#"{"resumen_validacion": {"mensaje_general": "ok"}}"#;
        assert!(serde_json::from_str::<ValidationResult>(json).is_err());
        assert!(serde_json::from_str::<ValidationResult>(r#"{"a": 1}"#).is_err());
    }

    #[test]
    fn test_analysis_keeps_oracle_key_order() {
        let parsed: StrategicAnalysisResult = serde_json::from_str(&analysis_json(3)).unwrap();
        let names: Vec<&str> = parsed
            .cost_evaluations
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names, vec!["Luz", "Alquiler"]);
        assert_eq!(
            parsed.evaluation_for("Alquiler").unwrap().evaluation,
            RangeEvaluation::OutOfRange
        );
        assert_eq!(parsed.out_of_range().count(), 1);
        assert_eq!(parsed.risks[0].probability, Probability::High);
        assert_eq!(parsed.risks[0].estimated_economic_consequence, "1200");
        assert_eq!(parsed.action_plan[0].priority, ActionPriority::Critical);
        assert!(parsed.shape_drift().is_empty());
    }

    #[test]
    fn test_short_action_plan_is_tolerated_as_drift() {
        let parsed: StrategicAnalysisResult = serde_json::from_str(&analysis_json(2)).unwrap();
        assert_eq!(parsed.action_plan.len(), 2);
        assert_eq!(
            parsed.shape_drift(),
            vec![ShapeDrift::ActionPlanLength { found: 2 }]
        );
    }

    #[test]
    fn test_unknown_vocabulary_is_kept_verbatim() {
        let json = r#"{
            "analisis_costos_recibidos": {
                "Agua": {"valor_recibido": "veinte", "evaluacion": "Aceptable", "comentario_evaluacion": ""}
            },
            "plan_de_accion_recomendado": []
        }"#;
        let parsed: StrategicAnalysisResult = serde_json::from_str(json).unwrap();
        let eval = parsed.evaluation_for("Agua").unwrap();
        assert_eq!(eval.evaluation, RangeEvaluation::Other("Aceptable".to_string()));

        let drift = parsed.shape_drift();
        assert!(drift.contains(&ShapeDrift::ActionPlanLength { found: 0 }));
        assert!(drift.contains(&ShapeDrift::NonNumericValue {
            cost: "Agua".to_string(),
            value: "veinte".to_string(),
        }));
        assert!(drift.contains(&ShapeDrift::UnknownVocabulary {
            field: "evaluacion",
            value: "Aceptable".to_string(),
        }));
    }

    #[test]
    fn test_vocabulary_ignores_case_and_accents() {
        assert_eq!(
            RangeEvaluation::from("  fuera DEL rango ".to_string()),
            RangeEvaluation::OutOfRange
        );
        assert_eq!(
            ActionPriority::from("Critica".to_string()),
            ActionPriority::Critical
        );
        assert_eq!(String::from(Probability::Low), "Baja");
    }

    #[test]
    fn test_serialize_round_trips_wire_names() {
        let parsed: StrategicAnalysisResult = serde_json::from_str(&analysis_json(3)).unwrap();
        let value = serde_json::to_value(&parsed).unwrap();
        assert_eq!(
            value["analisis_costos_recibidos"]["Alquiler"]["evaluacion"],
            "Fuera del rango"
        );
        assert_eq!(value["plan_de_accion_recomendado"][0]["prioridad"], "Crítica");
    }

    #[test]
    fn test_looks_numeric() {
        assert!(looks_numeric("$1,200.50"));
        assert!(looks_numeric("500"));
        assert!(looks_numeric("80 USD"));
        assert!(!looks_numeric("abc"));
        assert!(!looks_numeric(""));
    }
}
