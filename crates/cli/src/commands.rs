//! Subcommand handlers

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use fire_assign_engine::logging::{parse_log_level, setup_logging};
use fire_assign_engine::prelude::*;
use fire_assign_engine::store::gini_coefficient;
use fire_assign_engine::{BatchReport, TraceStage};
use tracing::info;

use crate::output::{self, AssignmentRow, LoadRow, OutputFormat, StepRow};
use crate::seed::SeedFile;
use crate::{Cli, Commands};

pub async fn execute(cli: Cli) -> Result<()> {
    let mut config = EngineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(url) = cli.database {
        config.database.url = url;
    }
    if let Some(level) = cli.log_level {
        parse_log_level(&level)?;
        config.logging.level = level;
    }
    setup_logging(&config.logging, "fire")?;

    let store = Arc::new(
        SqliteStore::connect(&config.database)
            .await
            .with_context(|| format!("opening {}", config.database.url))?,
    );

    match cli.command {
        Commands::Init => {
            println!("{} {}", "✅ Database ready:".green(), config.database.url);
            Ok(())
        }
        Commands::Seed { file } => {
            let seed = SeedFile::from_path(&file)?;
            let counts = seed.apply(&store).await?;
            println!(
                "{} {} offices, {} managers, {} tickets, {} analyses",
                "🌱 Seeded".green(),
                counts.offices,
                counts.managers,
                counts.tickets,
                counts.analyses
            );
            Ok(())
        }
        Commands::Run { concurrency } => {
            if let Some(concurrency) = concurrency {
                config.dispatch.concurrency = concurrency;
            }
            let engine = build_engine(config, store).await?;
            let report = BatchDispatcher::new(Arc::new(engine))
                .dispatch_pending()
                .await?;
            print_report(&report, cli.format)
        }
        Commands::Assign { guid } => {
            let engine = build_engine(config, store).await?;
            let assignment = engine.assign_guid(&TicketGuid::from(guid)).await?;
            match cli.format {
                OutputFormat::Json => output::print_json(&assignment),
                OutputFormat::Table => {
                    println!("{}", output::render([AssignmentRow::from(&assignment)]));
                    Ok(())
                }
            }
        }
        Commands::Explain { guid, why_not } => {
            let engine = build_engine(config, store).await?;
            let trace = engine.explain(&TicketGuid::from(guid)).await?;
            match cli.format {
                OutputFormat::Json => output::print_json(&trace),
                OutputFormat::Table => {
                    print_trace(&trace, why_not.as_deref());
                    Ok(())
                }
            }
        }
        Commands::Loads => {
            let audit = store.load_audit().await?;
            let loads: Vec<u32> = audit.iter().map(|e| e.current_load).collect();
            let gini = gini_coefficient(&loads);
            let drifted = audit.iter().filter(|e| !e.is_consistent()).count();

            match cli.format {
                OutputFormat::Json => output::print_json(&serde_json::json!({
                    "managers": audit,
                    "gini": gini,
                    "drifted": drifted,
                }))?,
                OutputFormat::Table => {
                    println!("{}", output::render(audit.iter().map(LoadRow::from)));
                    println!("📊 Gini coefficient: {:.3}", gini);
                }
            }

            if drifted > 0 {
                anyhow::bail!("load counters drifted for {} manager(s)", drifted);
            }
            Ok(())
        }
    }
}

async fn build_engine(config: EngineConfig, store: Arc<SqliteStore>) -> Result<AssignmentEngine> {
    let engine = AssignmentEngine::builder()
        .with_config(config)
        .with_backend(store)
        .build()
        .await?;
    info!(
        "🏢 Loaded {} offices and {} managers",
        engine.snapshot().office_count(),
        engine.snapshot().manager_count()
    );
    Ok(engine)
}

fn print_report(report: &BatchReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return output::print_json(report);
    }

    let rows = report
        .assigned
        .iter()
        .chain(report.escalated.iter())
        .map(AssignmentRow::from);
    if report.total() > report.manual_review.len() {
        println!("{}", output::render(rows));
    }

    println!(
        "{} {} assigned, {} escalated, {} need manual review ({} ms)",
        "📋".bold(),
        report.assigned.len().to_string().green(),
        report.escalated.len().to_string().yellow(),
        report.manual_review.len().to_string().red(),
        report.elapsed_ms
    );
    for (office, count) in report.by_office() {
        println!("   🏢 {:<20} {}", office, count);
    }
    for failed in &report.manual_review {
        println!(
            "   {} {} after {} attempt(s): {}",
            "❌".red(),
            failed.ticket_guid,
            failed.attempts,
            failed.error
        );
    }
    Ok(())
}

fn print_trace(trace: &Trace, why_not: Option<&str>) {
    let summary = &trace.summary;
    println!(
        "{} office={} manager={} reason={} scope={:?}",
        "🧭".bold(),
        summary.office_id.as_ref().map(|o| o.as_str()).unwrap_or("-"),
        summary.manager_id.as_ref().map(|m| m.as_str()).unwrap_or("-"),
        summary.office_reason,
        summary.search_scope
    );
    if let Some(cause) = &summary.escalation_cause {
        println!("{} {}", "⚠️ Escalated:".yellow().bold(), cause);
    }
    println!("{}", output::render(trace.steps.iter().map(StepRow::from)));

    if let Some(subject) = why_not {
        let is_office = trace
            .steps
            .iter()
            .any(|s| s.stage == TraceStage::OfficeCandidate && s.subject == subject);
        let answer = if is_office {
            trace.why_not_office(&OfficeId::from(subject))
        } else {
            trace.why_not_manager(&ManagerId::from(subject))
        };
        match answer {
            Explanation::Chosen => println!("✅ {} was chosen", subject),
            Explanation::Rejected(reason) => {
                println!("↩️ {} was passed over: {}", subject, reason)
            }
            Explanation::NotConsidered => println!("➖ {} was never considered", subject),
        }
    }
}
