use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use cost_audit::analysis::types::{ActionItem, Inspect, StrategicAnalysisResult, ValidationResult};
use cost_audit::analysis::workflow::{AnalysisOutcome, NO_VALID_COSTS_MESSAGE};
use cost_audit::analysis::{
    build_analysis_prompt, build_validation_prompt, GatePrompt, HttpOracle, Resolution,
};
use cost_audit::business::{
    BusinessContext, FinancialRecordRepository, InMemoryBusinessDirectory, InMemoryModuleService,
    NewBusiness, SizeCategory,
};
use cost_audit::config::Config;
use cost_audit::records::{CostRecord, CostRecordStore, ModuleId};
use cost_audit::session::{ModuleSession, Section};
use cost_audit::util::format_money;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The fixed-costs module every costs file is simulated against
const FIXED_COSTS_MODULE: ModuleId = 1;

#[derive(Parser, Debug)]
#[command(
    name = "cost-audit",
    about = "Validate a small business's fixed costs, then get a market analysis",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Analysis endpoint (overrides config and COST_AUDIT_ENDPOINT)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run validation and, once confirmed, the strategic analysis
    Run(RunArgs),
    /// Print the prompt for one phase without contacting the service
    Prompt(PromptArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// TOML file with a [business] table and [[costs]] entries
    costs: PathBuf,
    /// Confirm the analysis without asking
    #[arg(long)]
    yes: bool,
    /// Print results as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct PromptArgs {
    costs: PathBuf,
    #[arg(long, value_enum, default_value_t = PhaseArg::Validation)]
    phase: PhaseArg,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum PhaseArg {
    Validation,
    Analysis,
}

// ═══════════════════════════════════════════════════════════════════════════
//  COSTS FILE
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
struct CostsFile {
    #[serde(default)]
    business: BusinessSection,
    #[serde(default)]
    costs: Vec<CostEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct BusinessSection {
    #[serde(default)]
    name: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    business_type: String,
    #[serde(default)]
    size: Option<SizeValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Id(u32),
    Name(String),
}

impl SizeValue {
    fn category(&self) -> Result<SizeCategory> {
        match self {
            SizeValue::Id(id) => Ok(SizeCategory::from_id(*id)),
            SizeValue::Name(name) => match name.trim().to_lowercase().as_str() {
                "small" | "pequeño" | "pequeno" => Ok(SizeCategory::Small),
                "medium" | "mediano" => Ok(SizeCategory::Medium),
                "large" | "grande" => Ok(SizeCategory::Large),
                other => bail!("Unknown business size '{}'", other),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct CostEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    amount: Option<AmountValue>,
}

/// Amounts may be written as TOML strings or numbers; both are kept as text
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AmountValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl AmountValue {
    fn as_text(&self) -> String {
        match self {
            AmountValue::Integer(n) => n.to_string(),
            AmountValue::Float(n) => n.to_string(),
            AmountValue::Text(s) => s.clone(),
        }
    }
}

impl CostsFile {
    fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid costs file {}", path.display()))
    }

    fn records(&self) -> Vec<CostRecord> {
        self.costs
            .iter()
            .map(|entry| {
                CostRecord::new(FIXED_COSTS_MODULE)
                    .with_name(entry.name.clone())
                    .with_amount(
                        entry
                            .amount
                            .as_ref()
                            .map(AmountValue::as_text)
                            .unwrap_or_default(),
                    )
            })
            .collect()
    }

    fn size(&self) -> Result<SizeCategory> {
        self.business
            .size
            .as_ref()
            .map(SizeValue::category)
            .transpose()
            .map(Option::unwrap_or_default)
    }

    fn context(&self) -> Result<BusinessContext> {
        Ok(BusinessContext::new(
            self.business.location.clone(),
            self.business.business_type.clone(),
            self.size()?,
        ))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  COMMANDS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    cost_audit::logging::init("warn");
    let cli = Cli::parse();
    match &cli.command {
        Commands::Run(args) => run(&cli, args).await,
        Commands::Prompt(args) => print_prompt(args),
    }
}

fn print_prompt(args: &PromptArgs) -> Result<()> {
    let file = CostsFile::load(&args.costs)?;
    let store = CostRecordStore::from_records(FIXED_COSTS_MODULE, file.records());
    let context = file.context()?;
    let request = match args.phase {
        PhaseArg::Validation => build_validation_prompt(store.records(), &context),
        PhaseArg::Analysis => build_analysis_prompt(store.records(), &context),
    };
    let request = request.ok_or_else(|| anyhow!(NO_VALID_COSTS_MESSAGE))?;
    println!("{}", request.prompt);
    Ok(())
}

fn build_oracle(cli: &Cli) -> Result<HttpOracle> {
    let mut config = Config::load();
    if cli.timeout.is_some() {
        config.request_timeout_secs = cli.timeout;
    }
    config.validate()?;
    let endpoint = config.endpoint_with(cli.endpoint.as_deref())?;
    tracing::debug!(%endpoint, config = %Config::config_location(), "using analysis endpoint");
    Ok(HttpOracle::new(endpoint, config.request_timeout())?)
}

/// Load the costs file into an in-memory module and business
async fn open_session(file: &CostsFile) -> Result<ModuleSession> {
    let service = Arc::new(InMemoryModuleService::with_default_modules());
    for record in file.records() {
        service.add_financial_record(record).await;
    }

    let size = file.size()?;
    let directory = InMemoryBusinessDirectory::new();
    let business = directory.create_business(NewBusiness {
        user_id: 1,
        name: file.business.name.clone(),
        business_type: file.business.business_type.clone(),
        location: file.business.location.clone(),
        size_id: size.id(),
    })?;

    let mut session = ModuleSession::load(
        FIXED_COSTS_MODULE,
        business.id,
        service.as_ref(),
        &directory,
        service.clone(),
    )
    .await?;
    session.go_to(Section::Simulate)?;
    Ok(session)
}

#[derive(Serialize)]
struct JsonReport<'a> {
    total: f64,
    validation: &'a ValidationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<&'a StrategicAnalysisResult>,
}

async fn run(cli: &Cli, args: &RunArgs) -> Result<()> {
    let file = CostsFile::load(&args.costs)?;
    let oracle = build_oracle(cli)?;
    let mut session = open_session(&file).await?;

    if !args.json {
        eprintln!(
            "Validating {} cost(s) for {} ({})...",
            session.store().len(),
            session.context().business_type,
            session.context().location,
        );
    }

    loop {
        session.validate(&oracle).await;

        let clearance = match session.gate() {
            GatePrompt::Confirm(prompt) => {
                if !args.json {
                    print_validation(prompt.result());
                    println!("\nTotal: {}", format_money(prompt.total()));
                }
                if args.yes || ask("¿Confirmar análisis?")? {
                    prompt.confirm()
                } else {
                    prompt.cancel();
                    eprintln!("Analysis cancelled.");
                    return Ok(());
                }
            }
            GatePrompt::Acknowledge(prompt) => {
                let result = prompt.result();
                if args.json {
                    print_json(&JsonReport {
                        total: session.store().total(),
                        validation: result,
                        analysis: None,
                    })?;
                } else {
                    print_validation(result);
                    println!("\nFix the issues above and run again.");
                }
                prompt.acknowledge();
                return Ok(());
            }
            GatePrompt::Failed(failure) => {
                eprintln!("Error: {}", failure.message());
                let message = failure.message().to_string();
                let resolution = if !args.yes && ask("Retry?")? {
                    failure.retry()
                } else {
                    failure.acknowledge()
                };
                match resolution {
                    Resolution::Retry => continue,
                    Resolution::Editing => bail!(message),
                }
            }
            GatePrompt::Pending => bail!("Validation did not finish"),
        };

        if !args.json {
            eprintln!("Running strategic analysis...");
        }
        let total = clearance.snapshot().total;
        let validation = session
            .validation()
            .result()
            .cloned()
            .ok_or_else(|| anyhow!("validation result missing"))?;
        match session.analyze(clearance, &oracle).await? {
            AnalysisOutcome::Succeeded(analysis) => {
                if args.json {
                    print_json(&JsonReport {
                        total,
                        validation: &validation,
                        analysis: Some(analysis),
                    })?;
                } else {
                    print_analysis(analysis, total);
                    let drift = analysis.shape_drift();
                    if !drift.is_empty() {
                        eprintln!(
                            "\n(note: {} unexpected field value(s) in the response)",
                            drift.len()
                        );
                    }
                }
                return Ok(());
            }
            outcome => {
                let message = outcome
                    .user_message()
                    .unwrap_or_else(|| "Analysis did not finish".to_string());
                bail!(message);
            }
        }
    }
}

fn ask(question: &str) -> Result<bool> {
    eprint!("{} [y/N] ", question);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(matches!(
        line.trim().to_lowercase().as_str(),
        "y" | "yes" | "s" | "si" | "sí"
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
//  REPORTS
// ═══════════════════════════════════════════════════════════════════════════

fn print_validation(result: &ValidationResult) {
    println!("Validation");
    for finding in &result.findings {
        let mark = if finding.is_valid { "ok " } else { "BAD" };
        println!(
            "  [{}] {} ({}): {}",
            mark, finding.name, finding.received_value, finding.justification
        );
    }
    if !result.missing_mandatory.is_empty() {
        println!("\nMissing mandatory costs");
        for missing in &result.missing_mandatory {
            println!("  - {}: {}", missing.name, missing.critical_reason);
        }
    }
    if !result.missing_recommended.is_empty() {
        println!("\nRecommended costs");
        for missing in &result.missing_recommended {
            println!("  - {}: {}", missing.name, missing.benefit);
        }
    }
    println!("\n{}", result.summary.message);
}

fn print_analysis(result: &StrategicAnalysisResult, total: f64) {
    println!("\nStrategic analysis (monthly fixed costs: {})", format_money(total));
    println!("\nMarket comparison");
    for (name, eval) in &result.cost_evaluations {
        println!(
            "  {} ({}): {}",
            name,
            eval.received_value,
            String::from(eval.evaluation.clone())
        );
        if !eval.comment.is_empty() {
            println!("      {}", eval.comment);
        }
    }
    if !result.risks.is_empty() {
        println!("\nOperational risks");
        for risk in &result.risks {
            println!(
                "  - {} [{}]: {}",
                risk.risk,
                String::from(risk.probability.clone()),
                risk.potential_impact
            );
        }
    }
    println!("\nAction plan");
    for (i, item) in result.action_plan.iter().enumerate() {
        print_action(i + 1, item);
    }
}

fn print_action(index: usize, item: &ActionItem) {
    println!(
        "  {}. {} [{}, {}]",
        index,
        item.title,
        String::from(item.priority.clone()),
        item.implementation_timeframe
    );
    println!("     {}", item.description);
    if !item.required_investment.is_empty() {
        println!("     Investment: {}", item.required_investment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_costs_file_accepts_numbers_and_strings() {
        let file: CostsFile = toml::from_str(
            r#"
            [business]
            location = "Quito"
            business_type = "Cafetería"
            size = "mediano"

            [[costs]]
            name = "Alquiler"
            amount = 500

            [[costs]]
            name = "Internet"
            amount = "35.50"

            [[costs]]
            name = "Luz"
            amount = 42.5
            "#,
        )
        .unwrap();

        let amounts: Vec<String> = file.records().into_iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec!["500", "35.50", "42.5"]);
        let context = file.context().unwrap();
        assert_eq!(context.size, SizeCategory::Medium);
        assert_eq!(context.location, "Quito");
    }

    #[test]
    fn test_costs_file_without_business_uses_placeholders() {
        let file: CostsFile = toml::from_str("[[costs]]\nname = \"Alquiler\"\n").unwrap();
        assert_eq!(file.context().unwrap(), BusinessContext::unspecified());
        assert_eq!(file.records()[0].amount, "");
    }

    #[test]
    fn test_size_by_id_and_unknown_name() {
        assert_eq!(SizeValue::Id(3).category().unwrap(), SizeCategory::Large);
        assert!(SizeValue::Name("gigante".to_string()).category().is_err());
    }

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "cost-audit",
            "run",
            "costs.toml",
            "--yes",
            "--json",
            "--endpoint",
            "http://127.0.0.1:9000/analizar",
        ])
        .unwrap();
        assert_eq!(cli.endpoint.as_deref(), Some("http://127.0.0.1:9000/analizar"));
        match cli.command {
            Commands::Run(args) => {
                assert!(args.yes && args.json);
                assert_eq!(args.costs, PathBuf::from("costs.toml"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
