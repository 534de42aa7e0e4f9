//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api;
use milepost_core::{
    Caller, HoldStatus, MemoryStore, ProgressionError, ProgressionService, ProjectId, RedbStore,
    Snapshot, StorageBackend, SubStageId, SubStageKind, SubStageStatus,
};
use std::path::{Path, PathBuf};

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    db_path: &PathBuf,
    backend: &str,
    host: &str,
    port: u16,
) -> Result<(), ProgressionError> {
    let service = open_service(db_path, backend)?;

    println!("Milepost Progression Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    println!("  Backend:  {}", backend);
    println!("  Database: {:?}", db_path);
    println!();
    println!("Endpoints:");
    println!("  GET  /health                               - Health check");
    println!("  GET  /progression/definitions              - Definition set");
    println!("  GET  /progression/{{project_id}}             - Progression snapshot");
    println!("  POST /progression/{{project_id}}             - Create record");
    println!("  POST /progression/{{project_id}}/complete    - Complete a sub-stage");
    println!("  POST /progression/{{project_id}}/percentage  - Advance a percentage");
    println!("  POST /progression/{{project_id}}/hold        - Change hold status");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, service).await
}

// =============================================================================
// DEFINITIONS COMMAND
// =============================================================================

/// Show the current definition set.
pub fn cmd_definitions(
    db_path: &PathBuf,
    backend: &str,
    json_mode: bool,
) -> Result<(), ProgressionError> {
    let service = open_service(db_path, backend)?;

    if json_mode {
        let output = serde_json::json!({
            "version": service.definitions_version(),
            "stages": service.definitions().stages(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Milepost Definitions (version {})", service.definitions_version());
    println!("================================");
    for stage in service.definitions().stages() {
        println!();
        println!("{}. {} ({})", stage.order, stage.name, stage.id);
        for sub in &stage.sub_stages {
            let kind = match sub.kind {
                SubStageKind::Binary => "binary",
                SubStageKind::Percentage => "percentage",
            };
            println!("   {}.{} {} ({}) [{}]", stage.order, sub.order, sub.name, sub.id, kind);
        }
    }
    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Persist the built-in pipeline as the stored definition set.
pub fn cmd_init(db_path: &PathBuf, backend: &str, force: bool) -> Result<(), ProgressionError> {
    let mut service = open_service(db_path, backend)?;
    service.init_definitions(force)?;
    println!(
        "Initialized definitions (version {}) in {:?}",
        service.definitions_version(),
        db_path
    );
    Ok(())
}

// =============================================================================
// CREATE COMMAND
// =============================================================================

/// Create a progression record for a project.
pub fn cmd_create(
    db_path: &PathBuf,
    backend: &str,
    json_mode: bool,
    project: &str,
) -> Result<(), ProgressionError> {
    let mut service = open_service(db_path, backend)?;
    let snapshot = service.create_project(&ProjectId::new(project), &local_admin())?;

    if json_mode {
        print_json(&snapshot);
        return Ok(());
    }
    println!("Created progression record for {}", project);
    print_snapshot(&snapshot, false);
    Ok(())
}

// =============================================================================
// SHOW COMMAND
// =============================================================================

/// Show a project's progression snapshot.
pub fn cmd_show(
    db_path: &PathBuf,
    backend: &str,
    json_mode: bool,
    project: &str,
    with_activity: bool,
) -> Result<(), ProgressionError> {
    let service = open_service(db_path, backend)?;
    let snapshot = service.snapshot(&ProjectId::new(project))?;

    if json_mode {
        print_json(&snapshot);
        return Ok(());
    }
    print_snapshot(&snapshot, with_activity);
    Ok(())
}

// =============================================================================
// COMPLETE COMMAND
// =============================================================================

/// Mark a binary sub-stage complete.
pub fn cmd_complete(
    db_path: &PathBuf,
    backend: &str,
    json_mode: bool,
    project: &str,
    sub_stage: &str,
) -> Result<(), ProgressionError> {
    let mut service = open_service(db_path, backend)?;
    let snapshot = service.complete(
        &ProjectId::new(project),
        &local_admin(),
        SubStageId::new(sub_stage),
        None,
    )?;

    if json_mode {
        print_json(&snapshot);
        return Ok(());
    }
    println!("Completed {} for {}", sub_stage, project);
    print_snapshot(&snapshot, false);
    Ok(())
}

// =============================================================================
// PERCENT COMMAND
// =============================================================================

/// Advance a percentage sub-stage.
pub fn cmd_percent(
    db_path: &PathBuf,
    backend: &str,
    json_mode: bool,
    project: &str,
    sub_stage: &str,
    value: u8,
    comment: Option<String>,
) -> Result<(), ProgressionError> {
    let mut service = open_service(db_path, backend)?;
    let snapshot = service.set_percentage(
        &ProjectId::new(project),
        &local_admin(),
        SubStageId::new(sub_stage),
        value,
        comment,
        None,
    )?;

    if json_mode {
        print_json(&snapshot);
        return Ok(());
    }
    println!("Set {} to {}% for {}", sub_stage, value, project);
    print_snapshot(&snapshot, false);
    Ok(())
}

// =============================================================================
// HOLD COMMAND
// =============================================================================

/// Change a project's hold status.
pub fn cmd_hold(
    db_path: &PathBuf,
    backend: &str,
    json_mode: bool,
    project: &str,
    status: &str,
) -> Result<(), ProgressionError> {
    let status = parse_hold_status(status)?;
    let mut service = open_service(db_path, backend)?;
    let snapshot = service.set_hold(&ProjectId::new(project), &local_admin(), status)?;

    if json_mode {
        print_json(&snapshot);
        return Ok(());
    }
    println!("Project {} is now {}", project, status);
    Ok(())
}

// =============================================================================
// PROJECTS COMMAND
// =============================================================================

/// List known projects.
pub fn cmd_projects(
    db_path: &PathBuf,
    backend: &str,
    json_mode: bool,
) -> Result<(), ProgressionError> {
    let service = open_service(db_path, backend)?;
    let projects = service.list_projects()?;

    if json_mode {
        let ids: Vec<&str> = projects.iter().map(|p| p.as_str()).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&ids).unwrap_or_default()
        );
        return Ok(());
    }

    if projects.is_empty() {
        println!("No projects in the pipeline.");
        return Ok(());
    }
    println!("Projects:");
    for project in projects {
        println!("  {}", project);
    }
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open a service on the requested backend.
pub fn open_service(db_path: &Path, backend: &str) -> Result<ProgressionService, ProgressionError> {
    let store = match backend {
        "memory" => StorageBackend::InMemory(MemoryStore::new()),
        _ => StorageBackend::Persistent(RedbStore::open(db_path)?),
    };
    ProgressionService::open(store)
}

/// The actor recorded for CLI mutations.
fn local_admin() -> Caller {
    Caller::admin("cli", "Local Operator")
}

fn parse_hold_status(raw: &str) -> Result<HoldStatus, ProgressionError> {
    match raw {
        "active" => Ok(HoldStatus::Active),
        "hold" => Ok(HoldStatus::Hold),
        "deactivated" => Ok(HoldStatus::Deactivated),
        other => Err(ProgressionError::NotFound(format!(
            "hold status '{}' (expected active, hold, or deactivated)",
            other
        ))),
    }
}

fn print_json(snapshot: &Snapshot) {
    println!(
        "{}",
        serde_json::to_string_pretty(snapshot).unwrap_or_default()
    );
}

/// Render a snapshot for human consumption.
fn print_snapshot(snapshot: &Snapshot, with_activity: bool) {
    println!();
    println!("Project:  {}", snapshot.project);
    println!("Status:   {}", snapshot.view.hold_status);
    println!("Revision: {}", snapshot.view.revision);
    if snapshot.view.archived {
        println!("Archived: yes (pipeline complete)");
    } else {
        println!("Current:  {}", snapshot.view.current_group);
    }

    for group in &snapshot.view.groups {
        let lock = if group.locked { "  (locked)" } else { "" };
        println!();
        println!(
            "{} [{}/{}] {}%{}",
            group.name, group.progress.completed, group.progress.total, group.progress.percentage,
            lock
        );
        for sub in &group.sub_stages {
            let marker = match sub.status {
                SubStageStatus::Completed => "[x]",
                SubStageStatus::InProgress => "[~]",
                SubStageStatus::Eligible => "[>]",
                SubStageStatus::Locked => "[ ]",
            };
            if sub.kind == SubStageKind::Percentage
                && sub.status != SubStageStatus::Locked
            {
                println!("  {} {} {}%", marker, sub.name, sub.percent);
            } else {
                println!("  {} {}", marker, sub.name);
            }
        }
    }

    if with_activity {
        println!();
        println!("Activity:");
        for entry in &snapshot.activity {
            println!(
                "  {} {} ({}) {}",
                entry.ts.format("%Y-%m-%d %H:%M:%S"),
                entry.actor_name,
                entry.actor_id,
                entry.details
            );
        }
    }
}
