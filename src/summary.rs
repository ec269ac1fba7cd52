//! Operator-facing text report of a bootstrap run.
use crate::config::BootstrapConfig;
use crate::error::ErrorKind;
use crate::provision::ActionStatus;
use crate::result::{BootstrapResult, Outcome};
use crate::util::{display_path, indent_lines};

pub fn render_summary(result: &BootstrapResult, config: &BootstrapConfig) -> String {
    let mut out = String::new();
    match &result.outcome {
        Outcome::Done => push_line(&mut out, "bootstrap: done"),
        Outcome::Pending => push_line(&mut out, "bootstrap: incomplete"),
        Outcome::Aborted {
            phase,
            kind,
            reason,
        } => {
            push_line(
                &mut out,
                &format!("bootstrap: aborted at {phase} ({})", kind_label(*kind)),
            );
            push_line(&mut out, &format!("  reason: {reason}"));
        }
    }

    if !result.directories.created.is_empty() {
        let created: Vec<String> = result
            .directories
            .created
            .iter()
            .map(|path| display_path(path, Some(&config.project.dir)))
            .collect();
        push_line(&mut out, &format!("directories created: {}", created.join(", ")));
    }
    if !result.services_started.is_empty() {
        push_line(
            &mut out,
            &format!("services ready: {}", result.services_started.join(", ")),
        );
    }
    if !result.services_failed.is_empty() {
        push_line(
            &mut out,
            &format!("services failed: {}", result.services_failed.join(", ")),
        );
    }

    if !result.actions.is_empty() {
        push_line(&mut out, "provisioning:");
        for record in &result.actions {
            let status = match &record.result {
                ActionStatus::Applied => "applied".to_string(),
                ActionStatus::Skipped => "skipped (already satisfied)".to_string(),
                ActionStatus::Failed(reason) => format!("FAILED: {reason}"),
            };
            push_line(
                &mut out,
                &format!("  {:<24} {:<10} {status}", record.name, record.service),
            );
        }
    }

    for diagnostic in &result.diagnostics {
        push_line(&mut out, &format!("recent logs of {}:", diagnostic.service));
        if diagnostic.log_tail.trim().is_empty() {
            push_line(&mut out, "    (no output)");
        } else {
            out.push_str(&indent_lines(&diagnostic.log_tail, "    "));
        }
    }

    if result.is_success() {
        render_endpoints(&mut out, config);
    }
    out
}

fn render_endpoints(out: &mut String, config: &BootstrapConfig) {
    let admin = &config.workflow.admin;
    let store = &config.object_store;
    let database = &config.database;
    push_line(out, "");
    push_line(out, "endpoints:");
    push_line(
        out,
        &format!(
            "  workflow UI     {}  (user {} / password {})",
            config.workflow.web_url, admin.username, admin.password
        ),
    );
    push_line(
        out,
        &format!(
            "  object store    {}  (access key {} / secret key {})",
            store.base_url(),
            store.access_key,
            store.secret_key
        ),
    );
    push_line(out, &format!("  store console   {}", store.console_url));
    push_line(
        out,
        &format!(
            "  database        {}:{}/{}  (user {} / password {})",
            database.host, database.port, database.name, database.user, database.password
        ),
    );
    if !store.buckets.is_empty() {
        push_line(out, &format!("  buckets         {}", store.buckets.join(", ")));
    }
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::PrerequisiteMissing => "prerequisite missing",
        ErrorKind::InvalidCatalog => "invalid service catalog",
        ErrorKind::Filesystem => "filesystem error",
        ErrorKind::Launch => "launch error",
        ErrorKind::Readiness => "readiness error",
        ErrorKind::Provisioning => "provisioning failed",
        ErrorKind::Interrupted => "interrupted",
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}
