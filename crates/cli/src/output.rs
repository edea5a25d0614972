use crate::error::CliError;
use engine_runtime::protocol::{StatusSnapshot, TickResponse};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// One line per tick: step position, percentage and the session message.
pub fn print_tick(response: &TickResponse) {
    let status = &response.status;
    let step = status.step.as_deref().unwrap_or("-");
    let marker = if response.success { "" } else { "FAILED " };
    println!(
        "[{}/{} {step}] {:>5.1}% {marker}{}",
        (status.step_index + 1).min(status.total_steps.max(1)),
        status.total_steps,
        status.progress_percent,
        response.message
    );
}

pub fn print_status(status: &StatusSnapshot) {
    let Some(token) = &status.session_token else {
        println!("No {} session", status.kind.as_str());
        return;
    };
    println!("{} session {token}", status.kind.as_str());
    println!("-----------------------------");
    println!("{:<16} {}", "Run", status.run_id.as_deref().unwrap_or("n/a"));
    println!("{:<16} {}", "Step", status.step.as_deref().unwrap_or("n/a"));
    println!("{:<16} {:.1}%", "Progress", status.progress_percent);
    println!("{:<16} {}", "Ticks", status.ticks);
    println!("{:<16} {}", "Completed", status.completed);
    if !status.skipped_steps.is_empty() {
        println!("{:<16} {}", "Skipped", status.skipped_steps.join(", "));
    }
    if let Some(error) = &status.error {
        let code = status.error_code.as_deref().unwrap_or("unknown");
        println!("{:<16} [{code}] {error}", "Error");
    }

    let p = &status.progress;
    if let (Some(done), Some(total)) = (p.files_done, p.files_total) {
        println!("{:<16} {done}/{total}", "Files");
    }
    if let (Some(done), Some(total)) = (p.tables_done, p.tables_total) {
        println!("{:<16} {done}/{total}", "Tables");
    }
    if let (Some(done), Some(total)) = (p.rows_done, p.rows_total) {
        println!("{:<16} {done}/{total}", "Rows");
    }
    if let Some(eta) = p.eta_secs {
        println!("{:<16} {eta}s", "ETA");
    }
    for artifact in &p.artifacts {
        println!("{:<16} {artifact}", "Artifact");
    }
}
