//! Run one case end to end without a patient in the loop.
//!
//! Usage: OPENROUTER_API_KEY=key cargo run --bin run_case -- patient.json --max-steps 30

use anyhow::Context as _;
use clap::Parser;
use diagnosis_service::{
    PatientIntake, Ports, ServiceConfig, StartConsultationRequest, WorkflowMode,
    build_diagnostic_workflow, create_case_session, telemetry::init_tracing,
};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "run_case", about = "Run the diagnostic workflow on a patient intake file")]
struct Args {
    /// Patient intake JSON, either bare or wrapped as {"patient_data": ...}
    input: PathBuf,

    /// Task executions allowed before the run is aborted
    #[arg(long, default_value_t = 30)]
    max_steps: usize,

    /// Directory for the rendered report (overrides REPORT_DIR)
    #[arg(long)]
    report_dir: Option<PathBuf>,
}

fn read_intake(raw: &str) -> anyhow::Result<PatientIntake> {
    if let Ok(request) = serde_json::from_str::<StartConsultationRequest>(raw) {
        return Ok(request.patient_data);
    }
    serde_json::from_str(raw).context("input is not a patient intake")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = ServiceConfig::from_env()?;
    if let Some(report_dir) = args.report_dir {
        config.report_dir = report_dir;
    }

    let raw = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("cannot read {}", args.input.display()))?;
    let intake = read_intake(&raw)?;

    let graph = build_diagnostic_workflow(&Ports::from_config(&config), WorkflowMode::Batch)?;
    let mut session = create_case_session(intake);
    info!(session_id = %session.id, max_steps = args.max_steps, "Running case");

    let outcome = graph.execute_session(&mut session, args.max_steps).await;
    println!("{}", serde_json::to_string_pretty(&session.state)?);

    if let Err(e) = outcome {
        error!(error = %e, steps = session.steps_taken, "Case did not finish");
        return Err(e.into());
    }
    info!(
        steps = session.steps_taken,
        report = ?session.state.report_path,
        "Case finished"
    );
    Ok(())
}
