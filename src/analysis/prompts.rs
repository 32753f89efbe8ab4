//! Prompt templates for the two analysis phases
//!
//! The templates are written in Spanish and name the JSON keys the payload
//! types in [`super::types`] deserialize, so the wording of the schema
//! sections is part of the wire contract.

use crate::business::BusinessContext;
use crate::records::CostRecord;

const LOCATION: &str = "{ubicacion}";
const BUSINESS_TYPE: &str = "{tipo_negocio}";
const SIZE: &str = "{tamano}";
const COST_LIST: &str = "{lista_costos}";

/// One prompt, ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub prompt: String,
}

/// `"<name>: <amount>"` lines for every complete record, or `None` when no
/// record has both fields filled in
pub fn cost_list(records: &[CostRecord]) -> Option<String> {
    let lines: Vec<String> = records
        .iter()
        .filter(|r| r.is_complete())
        .map(|r| format!("{}: {}", r.name.trim(), r.amount.trim()))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Phase 1: data-quality audit of the submitted cost list
pub fn build_validation_prompt(
    records: &[CostRecord],
    context: &BusinessContext,
) -> Option<AnalysisRequest> {
    render(VALIDATION_TEMPLATE, records, context)
}

/// Phase 2: market comparison, risks and a three-step action plan
pub fn build_analysis_prompt(
    records: &[CostRecord],
    context: &BusinessContext,
) -> Option<AnalysisRequest> {
    render(ANALYSIS_TEMPLATE, records, context)
}

fn render(
    template: &str,
    records: &[CostRecord],
    context: &BusinessContext,
) -> Option<AnalysisRequest> {
    let costs = cost_list(records)?;
    // Cost list goes in last so user-typed text is never re-scanned for tokens.
    let prompt = template
        .replace(LOCATION, &context.location)
        .replace(BUSINESS_TYPE, &context.business_type)
        .replace(SIZE, context.size.label())
        .replace(COST_LIST, &costs);
    Some(AnalysisRequest { prompt })
}

const VALIDATION_TEMPLATE: &str = r#"Rol: Actúa como un auditor de datos financieros y analista de riesgos. Tu especialización es asegurar la calidad y precisión de la información financiera de entrada para emprendimientos en Ecuador, {ubicacion}, antes de que sea utilizada en un análisis estratégico.

Contexto: Soy un emprendedor con un negocio {tamano} de tipo {tipo_negocio} ubicado en {ubicacion} y necesito tu ayuda para depurar mi lista de costos mensuales antes de que tu colega, el asesor financiero de élite, realice el diagnóstico completo. Tu misión es auditar mi lista y darme el visto bueno para proceder, o indicarme exactamente qué debo corregir.

Reglas de Validación:
1. **Exclusividad de Costos Fijos:** La lista solo debe contener costos fijos, es decir, aquellos que no varían significativamente con el volumen de ventas mes a mes. Costos como 'materia prima', 'compra de inventario', 'insumos' o 'packaging' son costos variables y deben ser marcados como inválidos.
2. **Costos Desagregados:** Cada ítem debe representar un único costo. No se aceptan costos agrupados como 'Servicios básicos e internet' o 'Marketing y permisos'.
3. **Especificidad:** No se aceptan costos ambiguos o genéricos como 'Varios', 'Otros gastos' o 'Gastos administrativos'.
4. **Exclusión de Costos de Personal:** Cualquier costo relacionado con compensación humana (sueldos, salarios, honorarios, nómina, beneficios sociales, aportes patronales, bonificaciones, capacitación, uniformes) y con contabilidad debe ser omitido y NO debe incluirse en los costos obligatorios, incluso si es esencial.
5. **Costos Obligatorios Faltantes:** Basado en el tipo de negocio {tipo_negocio}, infiere los costos fijos críticos omitidos. Si existen, no se podrá proseguir con el análisis, por lo que debes ser cauteloso: si la lista es aceptable deja esta sección vacía y usa la sección de recomendados.
6. **Costos Recomendados Faltantes:** Infiere los costos fijos que mejoran la eficiencia o rentabilidad sin ser críticos. Son informativos y no impiden proseguir.
7. **Costos Realistas:** Marca como inválido cualquier valor ilógico (extremadamente alto o bajo).

Información a Validar:
Tipo de Negocio: {tipo_negocio}
Ubicacion: {ubicacion}
Lista de Costos Proporcionada:
{lista_costos}

Tarea:
Analiza cada costo según las reglas de validación, determina si faltan costos obligatorios y genera un veredicto que indique si puedo proceder con el análisis principal. Tu respuesta debe ser únicamente un objeto JSON con la siguiente estructura, sin texto fuera del JSON.

Formato de Respuesta:

{
  "validacion_de_costos": [
    {
      "costo_recibido": "Costo1",
      "valor_recibido": "$Valor1",
      "es_valido": true,
      "justificacion": "Válido. Es un costo fijo, específico y fundamental para el análisis."
    }
  ],
  "costos_obligatorios_faltantes": [
    {
      "nombre": "Costo Obligatorio 1",
      "descripcion": "Descripción del costo obligatorio.",
      "motivo_critico": "Razón por la cual este costo es crítico."
    }
  ],
  "costos_recomendados_faltantes": [
    {
      "nombre": "Costo Recomendado 1",
      "descripcion": "Descripción del costo recomendado.",
      "beneficio": "Beneficio específico que aporta este costo."
    }
  ],
  "resumen_validacion": {
    "mensaje_general": "Resumen del resultado de la validación.",
    "puede_proseguir_analisis": false
  }
}

Nota: Este formato es solo una guía. Los textos genéricos deben ser reemplazados con contenido específico."#;

const ANALYSIS_TEMPLATE: &str = r#"# Rol
Actúa como un asesor financiero de élite y analista de riesgos, especializado en la rentabilidad y optimización de costos para {tipo_negocio} en {ubicacion}. Tu análisis debe ser preciso, práctico y basado en datos del mercado local ecuatoriano.

## Contexto
Soy un emprendedor con un negocio {tamano} de tipo {tipo_negocio} ubicado en {ubicacion}. Mi lista de costos fijos ya fue auditada por tu colega: los costos son fijos mensuales, se corrigieron los inválidos y los valores son realistas. Tu misión es auditar estos números contra el mercado local de {ubicacion}, identificar riesgos operativos y proponer optimizaciones.

**Nota importante:** Los costos de compensación humana (sueldos, salarios, honorarios, nómina, contabilidad) fueron excluidos deliberadamente.

## Información del Negocio
- **Tipo de Negocio:** {tipo_negocio}
- **Ubicación:** {ubicacion}
- **Costos Fijos Mensuales Validados:**
{lista_costos}

## Tarea
### 1. Análisis Comparativo de Mercado Local
Evalúa cada costo contra los rangos de mercado de {ubicacion}. El campo 'evaluacion' debe ser estrictamente **"Dentro del rango"** o **"Fuera del rango"**; todo el análisis cualitativo va en 'comentario_evaluacion'.

### 2. Análisis de Riesgos Operativos
Identifica riesgos a partir de costos fuera del rango, patrones preocupantes, vulnerabilidades del tipo de negocio en Ecuador y concentración excesiva de costos. Para cada riesgo indica impacto potencial y probabilidad.

### 3. Plan de Acción y Optimización Estratégica
Proporciona exactamente tres recomendaciones accionables y priorizadas, específicas para el contexto ecuatoriano.

## Formato de Respuesta
Tu respuesta debe ser únicamente un objeto JSON con la siguiente estructura, sin texto fuera del JSON.

{
  "analisis_costos_recibidos": {
    "nombre_costo_1": {
      "valor_recibido": "$valor",
      "evaluacion": "Dentro del rango" | "Fuera del rango",
      "comentario_evaluacion": "Análisis del costo comparado con el mercado local"
    }
  },
  "analisis_riesgos_operativos": [
    {
      "riesgo": "Descripción del riesgo operativo",
      "causa": "Costo o patrón que genera el riesgo",
      "impacto_potencial": "Impacto en operación, flujo de caja y rentabilidad",
      "probabilidad": "Alta" | "Media" | "Baja",
      "consecuencias_economicas": "Estimación de pérdidas potenciales en USD"
    }
  ],
  "plan_de_accion_recomendado": [
    {
      "titulo": "Título de la recomendación",
      "descripcion": "Acción específica a tomar",
      "prioridad": "Crítica" | "Alta" | "Media",
      "impacto_estimado": "Beneficio económico esperado",
      "inversion_requerida": "$valor estimado en USD, o 'Sin inversión adicional'",
      "plazo_implementacion": "Inmediato" | "1-3 meses" | "3-6 meses"
    }
  ]
}

## Restricciones del Análisis
- **NO realices** validaciones técnicas adicionales; ya fueron resueltas en la auditoría previa
- **NO identifiques** costos faltantes
- **NO incluyas** recomendaciones sobre costos de personal"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::business::{SizeCategory, UNSPECIFIED_LOCATION};

    fn record(name: &str, amount: &str) -> CostRecord {
        CostRecord::new(1).with_name(name).with_amount(amount)
    }

    fn quito_cafe() -> BusinessContext {
        BusinessContext::new("Quito", "Cafetería", SizeCategory::Medium)
    }

    #[test]
    fn test_cost_list_skips_incomplete_records() {
        let records = vec![record("Rent", "500"), record("", "100"), record("Luz", "  ")];
        assert_eq!(cost_list(&records).as_deref(), Some("Rent: 500"));
    }

    #[test]
    fn test_cost_list_trims_names() {
        let records = vec![record("  Alquiler ", "900"), record("Internet", "35.5")];
        assert_eq!(
            cost_list(&records).as_deref(),
            Some("Alquiler: 900\nInternet: 35.5")
        );
    }

    #[test]
    fn test_no_complete_records_builds_nothing() {
        let records = vec![record("", ""), record("Agua", "")];
        assert!(build_validation_prompt(&records, &quito_cafe()).is_none());
        assert!(build_analysis_prompt(&[], &quito_cafe()).is_none());
    }

    #[test]
    fn test_validation_prompt_embeds_context() {
        let records = vec![record("Rent", "500"), record("", "100")];
        let request = build_validation_prompt(&records, &quito_cafe()).unwrap();
        assert!(request.prompt.contains("negocio Mediano de tipo Cafetería ubicado en Quito"));
        assert!(request.prompt.contains("Lista de Costos Proporcionada:\nRent: 500\n"));
        assert!(!request.prompt.contains(": 100"));
        assert!(request.prompt.contains("puede_proseguir_analisis"));
        assert!(!request.prompt.contains("{ubicacion}"));
        assert!(!request.prompt.contains("{lista_costos}"));
    }

    #[test]
    fn test_analysis_prompt_uses_placeholders_when_unspecified() {
        let records = vec![record("Alquiler", "500")];
        let request = build_analysis_prompt(&records, &BusinessContext::unspecified()).unwrap();
        assert!(request.prompt.contains(UNSPECIFIED_LOCATION));
        assert!(request.prompt.contains("negocio Pequeño"));
        assert!(request.prompt.contains("Alquiler: 500"));
        assert!(request.prompt.contains("plan_de_accion_recomendado"));
    }

    #[test]
    fn test_user_text_is_not_treated_as_template_token() {
        let records = vec![record("Sede {ubicacion}", "10")];
        let request = build_validation_prompt(&records, &quito_cafe()).unwrap();
        assert!(request.prompt.contains("Sede {ubicacion}: 10"));
    }
}
