//! Subcommand runners and terminal reporting.

use ferry_api::{EntityGroup, Tool};
use ferry_sync::{
    EntityFilter, NotificationLevel, Orchestrator, RunReport, SyncEvent, WorkspacePair,
};
use miette::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Print events as they arrive until the orchestrator goes away.
fn spawn_event_printer(mut events: mpsc::UnboundedReceiver<SyncEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SyncEvent::Notification(n) => match n.level {
                    NotificationLevel::Info => println!("{}", n.message),
                    NotificationLevel::Error => eprintln!("error: {}", n.message),
                },
                SyncEvent::ItemSkipped {
                    group, id, reason, ..
                } => warn!(%group, %id, %reason, "skipped"),
                SyncEvent::ItemCompleted {
                    group,
                    completed,
                    total,
                    ..
                } => {
                    if completed == total || completed % 50 == 0 {
                        info!(%group, "{completed}/{total}");
                    }
                }
                SyncEvent::PhaseChanged {
                    workspace_id,
                    group,
                    phase,
                } => debug!(%workspace_id, %group, %phase, "phase"),
            }
        }
    })
}

/// Fetch workspaces, select the named ones and fetch their entities.
/// Target entities are only fetched when `with_target` is set.
async fn prepare(
    orchestrator: &mut Orchestrator,
    workspaces: &[String],
    year: Option<i32>,
    with_target: bool,
) -> Result<Vec<WorkspacePair>> {
    orchestrator
        .fetch_workspaces()
        .await
        .map_err(|e| miette::miette!("failed to fetch workspaces: {}", e))?;

    for name in workspaces {
        orchestrator
            .select_workspace(name, true)
            .map_err(|_| miette::miette!("no source workspace named {:?}", name))?;
    }

    let fetched = if with_target {
        orchestrator.fetch_entities().await
    } else {
        orchestrator.fetch_source_entities().await
    };
    let report = fetched.map_err(|e| miette::miette!("{}", e))?;
    if !report.is_success() {
        warn!(failed = report.failures.len(), "some workspaces could not be fetched");
    }

    let selected = orchestrator.selected_workspaces();
    if let Some(year) = year {
        for pair in &selected {
            let entries = EntityFilter::new(Tool::Source, EntityGroup::TimeEntries)
                .in_workspace(pair.source_id.clone());
            orchestrator.set_included_for_view(entries.clone(), false);
            orchestrator.set_included_for_view(entries.in_year(year), true);
        }
    }
    Ok(selected)
}

fn print_plan(orchestrator: &Orchestrator, selected: &[WorkspacePair]) {
    for pair in selected {
        let target = match &pair.target_id {
            Some(id) => format!("target workspace {}", id),
            None => "new target workspace".to_string(),
        };
        println!("{} ({} -> {})", pair.name, pair.source_id, target);
        for (group, phase) in orchestrator.phases().for_workspace(&pair.source_id) {
            let counts = orchestrator.record_counts(&pair.source_id, group);
            println!(
                "  {:<14} {:>6} of {:>6} records  {:>8} of {:>8} entries  [{}]",
                group.label(),
                counts.included_record_count,
                counts.total_record_count,
                counts.included_entry_count,
                counts.total_entry_count,
                phase
            );
        }
    }
}

fn finish(report: RunReport, verb: &str) -> Result<()> {
    println!(
        "{} {} items, skipped {}",
        verb,
        report.completed(),
        report.skipped()
    );
    if report.is_success() {
        return Ok(());
    }
    for failure in &report.failures {
        let group = failure.group.map(|g| g.label()).unwrap_or("workspace");
        eprintln!("  {} / {}: {}", failure.workspace_id, group, failure.error);
    }
    Err(miette::miette!(
        "{} workspace(s) stopped early; rerun to resume",
        report.failures.len()
    ))
}

pub async fn workspaces(mut orchestrator: Orchestrator) -> Result<()> {
    orchestrator
        .fetch_workspaces()
        .await
        .map_err(|e| miette::miette!("failed to fetch workspaces: {}", e))?;

    for tool in [Tool::Source, Tool::Target] {
        println!("{} workspaces:", tool);
        let filter = EntityFilter::new(tool, EntityGroup::Workspaces);
        for workspace in orchestrator.view(&filter) {
            let name = workspace.natural_key().unwrap_or_default();
            match &workspace.linked_id {
                Some(linked) => println!("  {} ({}) <-> {}", name, workspace.id, linked),
                None => println!("  {} ({})", name, workspace.id),
            }
        }
    }
    Ok(())
}

pub async fn plan(mut orchestrator: Orchestrator, workspaces: &[String], year: Option<i32>) -> Result<()> {
    let printer = spawn_event_printer(orchestrator.subscribe());
    let selected = prepare(&mut orchestrator, workspaces, year, true).await?;
    print_plan(&orchestrator, &selected);
    drop(orchestrator);
    let _ = printer.await;
    Ok(())
}

pub async fn transfer(
    mut orchestrator: Orchestrator,
    workspaces: &[String],
    year: Option<i32>,
) -> Result<()> {
    let printer = spawn_event_printer(orchestrator.subscribe());
    let selected = prepare(&mut orchestrator, workspaces, year, true).await?;
    print_plan(&orchestrator, &selected);

    orchestrator
        .approve_all()
        .map_err(|e| miette::miette!("{}", e))?;
    let report = orchestrator
        .transfer()
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    drop(orchestrator);
    let _ = printer.await;
    finish(report, "Transferred")
}

pub async fn delete(
    mut orchestrator: Orchestrator,
    workspaces: &[String],
    groups: &[EntityGroup],
    year: Option<i32>,
    confirmed: bool,
) -> Result<()> {
    let printer = spawn_event_printer(orchestrator.subscribe());
    let selected = prepare(&mut orchestrator, workspaces, year, false).await?;

    for pair in &selected {
        println!("{} ({})", pair.name, pair.source_id);
        for group in EntityGroup::TRANSFER_ORDER.iter().rev() {
            if !groups.is_empty() && !groups.contains(group) {
                continue;
            }
            let filter = EntityFilter::new(Tool::Source, *group)
                .in_workspace(pair.source_id.clone())
                .included(true);
            println!("  {:<14} {:>6} to delete", group.label(), orchestrator.view(&filter).len());
        }
    }

    if !confirmed {
        println!("Nothing deleted; pass --yes to delete the entities above.");
        drop(orchestrator);
        let _ = printer.await;
        return Ok(());
    }

    orchestrator
        .approve_all()
        .map_err(|e| miette::miette!("{}", e))?;
    let report = orchestrator
        .delete(groups)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    drop(orchestrator);
    let _ = printer.await;
    finish(report, "Deleted")
}
