use jobsync_core::{JobRowView, SyncViewModel};

/// Renders the connection line followed by one row per tracked job.
pub fn render(view: &SyncViewModel) -> String {
    let mut out = status_line(view);
    out.push('\n');
    if view.jobs.is_empty() {
        out.push_str("  (no jobs)\n");
        return out;
    }
    for job in &view.jobs {
        out.push_str(&format_job_row(job));
        out.push('\n');
    }
    out
}

fn status_line(view: &SyncViewModel) -> String {
    let mut line = format!(
        "Connection: {} | Jobs: {} ({} active)",
        view.connection,
        view.jobs.len(),
        view.active_count
    );
    if view.reconnect_attempt > 0 {
        line.push_str(&format!(" | Reconnect attempt {}", view.reconnect_attempt));
    }
    if let Some(error) = &view.last_error {
        line.push_str(&format!(" | Error: {error}"));
    }
    line
}

fn format_job_row(job: &JobRowView) -> String {
    let percent = (job.progress * 100.0).clamp(0.0, 100.0);
    let mut row = format!(
        "  [{id}] {kind:<14} {status:<10} {percent:>5.1}%",
        id = job.job_id,
        kind = job.kind,
        status = job.status.as_str(),
    );
    if job.total_items > 0 {
        row.push_str(&format!(" {}/{}", job.processed_items, job.total_items));
    }
    if !job.current_step.is_empty() {
        row.push_str(&format!(" {}", job.current_step));
    }
    if let Some(error) = &job.error {
        row.push_str(&format!(" ({error})"));
    }
    row
}
