use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

use listsync::cli::{run, Cli, Commands};

const CREDENTIAL_VARS: &[&str] = &[
    "GKEEP_EMAIL",
    "GKEEP_PASSWORD",
    "GKEEP_MASTER_TOKEN",
    "APPLE_ID",
    "APPLE_PASSWORD",
];

fn listsync() -> Command {
    let mut cmd = Command::cargo_bin("listsync").expect("Binary exists");
    for var in CREDENTIAL_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_lists_subcommands() {
    listsync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sync").and(predicate::str::contains("serve")));
}

#[test]
fn sync_without_keep_credentials_fails_fast() {
    listsync()
        .args(["sync", "--once"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing GKEEP_EMAIL"));
}

#[test]
fn sync_without_apple_credentials_fails_fast() {
    listsync()
        .args(["sync", "--once"])
        .env("GKEEP_EMAIL", "me@example.com")
        .env("GKEEP_MASTER_TOKEN", "aas_et/token")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing APPLE_ID or APPLE_PASSWORD"));
}

#[test]
fn unknown_subcommand_is_rejected() {
    listsync().arg("upload").assert().failure();
}

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
#[serial]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    for var in CREDENTIAL_VARS {
        std::env::remove_var(var);
    }
    let cli = Cli {
        config: None,
        command: Commands::Sync { once: true },
    };

    // Fails on missing credentials, after tracing has started.
    assert!(run(cli).await.is_err());

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
