use anyhow::{bail, Context, Result};
use chrono::Utc;
use socialite_lib::domain::entities::{OutboxSummary, PendingAction};
use socialite_lib::infrastructure::database::ConnectionPool;
use socialite_lib::infrastructure::store::SqliteLocalStore;
use socialite_lib::{AppConfig, LocalStore};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
struct CliOptions {
    output: Option<PathBuf>,
    pretty: bool,
    purge: bool,
    database_url: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct ActionDigest {
    action_id: i64,
    action_type: String,
    status: String,
    retry_count: u32,
    enqueued_at_ms: i64,
    next_attempt_at_ms: Option<i64>,
    last_error: Option<String>,
}

#[derive(Debug, Default, serde::Serialize)]
struct PurgeSummary {
    completed_actions: u64,
    expired_stories: u64,
}

#[derive(Debug, serde::Serialize)]
struct OutboxReport {
    generated_at_ms: i64,
    database_url: String,
    pending: u64,
    completed: u64,
    failed: u64,
    oldest_pending_at_ms: Option<i64>,
    oldest_pending_age_ms: Option<i64>,
    pending_actions: Vec<ActionDigest>,
    failed_actions: Vec<ActionDigest>,
    purged: Option<PurgeSummary>,
}

fn usage() -> &'static str {
    "Usage: outbox_report [--output <path>] [--pretty] [--purge] [--database-url <url>]"
}

fn write_output(path: &Path, data: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    fs::write(path, data).with_context(|| format!("Failed to write {}", path.display()))
}

fn emit_payload(target: Option<&Path>, payload: &str) -> Result<()> {
    if let Some(path) = target {
        write_output(path, payload)?;
        println!("Report written to {}", path.display());
    } else {
        println!("{payload}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_args(args)?;
    let config = AppConfig::from_env();
    let database_url = resolve_database_url(&options, &config);

    let rt = Runtime::new().context("Failed to create Tokio runtime")?;
    let report = rt.block_on(async {
        collect_report(&database_url, options.purge, &config)
            .await
            .with_context(|| format!("Failed to collect outbox report from {database_url}"))
    })?;

    let payload = to_json(&report, options.pretty)?;
    emit_payload(options.output.as_deref(), &payload)
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(serde_json::to_string(value)?)
    }
}

fn parse_args<I>(args: I) -> Result<CliOptions>
where
    I: IntoIterator<Item = String>,
{
    let mut output: Option<PathBuf> = None;
    let mut pretty = false;
    let mut purge = false;
    let mut database_url: Option<String> = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-o" | "--output" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--output requires a path\n{}", usage()))?;
                output = Some(PathBuf::from(path));
            }
            "--pretty" => {
                pretty = true;
            }
            "--purge" => {
                purge = true;
            }
            "--database-url" => {
                let value = iter.next().ok_or_else(|| {
                    anyhow::anyhow!("--database-url requires a value\n{}", usage())
                })?;
                database_url = Some(value);
            }
            "-h" | "--help" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            other => {
                bail!("Unknown argument: {other}\n{}", usage());
            }
        }
    }

    Ok(CliOptions {
        output,
        pretty,
        purge,
        database_url,
    })
}

fn resolve_database_url(options: &CliOptions, config: &AppConfig) -> String {
    if let Some(url) = &options.database_url {
        return url.clone();
    }
    config.database.url.clone()
}

async fn collect_report(
    database_url: &str,
    purge: bool,
    config: &AppConfig,
) -> Result<OutboxReport> {
    let pool = ConnectionPool::connect(database_url, 1, Duration::from_secs(10))
        .await
        .with_context(|| format!("Failed to connect to database at {database_url}"))?;
    pool.migrate()
        .await
        .context("Failed to apply local store migrations")?;
    let store = SqliteLocalStore::new(pool.clone());

    let purged = if purge {
        let completed_actions = store
            .purge_completed_older_than(config.sync.completed_retention())
            .await
            .context("Failed to purge completed actions")?;
        let expired_stories = store
            .purge_expired_stories()
            .await
            .context("Failed to purge expired stories")?;
        Some(PurgeSummary {
            completed_actions,
            expired_stories,
        })
    } else {
        None
    };

    let summary = store
        .outbox_summary()
        .await
        .context("Failed to summarize outbox")?;
    let pending = store
        .list_pending_actions()
        .await
        .context("Failed to list pending actions")?;
    let failed = store
        .list_failed_actions()
        .await
        .context("Failed to list failed actions")?;
    pool.close().await;

    Ok(build_report(
        database_url,
        summary,
        &pending,
        &failed,
        purged,
        current_unix_ms(),
    ))
}

fn digest(action: &PendingAction) -> ActionDigest {
    ActionDigest {
        action_id: action.action_id.value(),
        action_type: action.action_type().as_str().to_string(),
        status: action.status.as_str().to_string(),
        retry_count: action.retry_count,
        enqueued_at_ms: action.enqueued_at.timestamp_millis(),
        next_attempt_at_ms: action.next_attempt_at.map(|ts| ts.timestamp_millis()),
        last_error: action.last_error.clone(),
    }
}

fn build_report(
    database_url: &str,
    summary: OutboxSummary,
    pending: &[PendingAction],
    failed: &[PendingAction],
    purged: Option<PurgeSummary>,
    now_ms: i64,
) -> OutboxReport {
    let oldest_pending_at_ms = summary.oldest_pending_at.map(|ts| ts.timestamp_millis());
    OutboxReport {
        generated_at_ms: now_ms,
        database_url: database_url.to_string(),
        pending: summary.pending,
        completed: summary.completed,
        failed: summary.failed,
        oldest_pending_at_ms,
        oldest_pending_age_ms: oldest_pending_at_ms.map(|at| now_ms.saturating_sub(at).max(0)),
        pending_actions: pending.iter().map(digest).collect(),
        failed_actions: failed.iter().map(digest).collect(),
        purged,
    }
}

fn current_unix_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use socialite_lib::domain::value_objects::{
        ActionId, ActionPayload, ActionStatus, FollowUserPayload,
    };
    use socialite_lib::shared::time::from_millis;

    fn action(id: i64, status: ActionStatus) -> PendingAction {
        PendingAction {
            action_id: ActionId::new(id).unwrap(),
            payload: ActionPayload::FollowUser(FollowUserPayload {
                target_user_id: "u9".into(),
                follow: true,
            }),
            status,
            retry_count: 2,
            enqueued_at: from_millis(1_000),
            updated_at: from_millis(1_500),
            next_attempt_at: None,
            completed_at: None,
            server_id: None,
            last_error: Some("server error 503: busy".into()),
        }
    }

    #[test]
    fn parses_defaults() {
        let opts = parse_args(Vec::<String>::new()).expect("options");
        assert!(!opts.pretty);
        assert!(!opts.purge);
        assert!(opts.output.is_none());
        assert!(opts.database_url.is_none());
    }

    #[test]
    fn parses_all_options() {
        let opts = parse_args(vec![
            "--database-url".into(),
            "sqlite::memory:".into(),
            "--output".into(),
            "out.json".into(),
            "--pretty".into(),
            "--purge".into(),
        ])
        .expect("options");

        assert_eq!(opts.database_url.as_deref(), Some("sqlite::memory:"));
        assert_eq!(opts.output.as_deref(), Some(Path::new("out.json")));
        assert!(opts.pretty);
        assert!(opts.purge);
    }

    #[test]
    fn rejects_unknown_argument() {
        let err = parse_args(vec!["--verbose".into()]).unwrap_err();
        assert!(format!("{err}").contains("Unknown argument"));
    }

    #[test]
    fn report_computes_oldest_pending_age() {
        let summary = OutboxSummary {
            pending: 1,
            completed: 0,
            failed: 1,
            oldest_pending_at: Some(from_millis(1_000)),
        };
        let report = build_report(
            "sqlite::memory:",
            summary,
            &[action(1, ActionStatus::Pending)],
            &[action(2, ActionStatus::Failed)],
            None,
            4_000,
        );

        assert_eq!(report.oldest_pending_age_ms, Some(3_000));
        assert_eq!(report.pending_actions[0].action_type, "follow_user");
        assert_eq!(report.failed_actions[0].status, "failed");
        assert!(report.purged.is_none());
    }

    #[tokio::test]
    async fn collects_report_from_fresh_database() {
        let report = collect_report("sqlite::memory:", true, &AppConfig::default())
            .await
            .expect("report");
        assert_eq!(report.pending, 0);
        assert!(report.pending_actions.is_empty());
        assert_eq!(report.purged.map(|p| p.completed_actions), Some(0));
    }
}
