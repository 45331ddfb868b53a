use std::env;
use std::sync::Arc;
use std::time::Duration;

use snafu::Snafu;

use parley_model::{Message, MessageStatus, Sender};
use parley_session::{ChatSession, SessionHandle, SessionSettings, SessionSnapshot};
use parley_source::{InMemorySource, MessageSource};

const SNAPSHOT_POLL_INTERVAL: Duration = Duration::from_millis(5);
const SNAPSHOT_WAIT_BUDGET: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
struct RunnerArgs {
    scenario: Scenario,
}

#[derive(Debug, Clone, Copy)]
enum Scenario {
    InitialLoad,
    PaginateExhaust,
    DuplicateAdd,
    UpdateInPlace,
    UnknownUpdate,
    SendEcho,
    PageFailure,
    SendFailure,
    SubscriptionFailure,
    All,
}

impl Scenario {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "initial_load" => Some(Self::InitialLoad),
            "paginate_exhaust" => Some(Self::PaginateExhaust),
            "duplicate_add" => Some(Self::DuplicateAdd),
            "update_in_place" => Some(Self::UpdateInPlace),
            "unknown_update" => Some(Self::UnknownUpdate),
            "send_echo" => Some(Self::SendEcho),
            "page_failure" => Some(Self::PageFailure),
            "send_failure" => Some(Self::SendFailure),
            "subscription_failure" => Some(Self::SubscriptionFailure),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::InitialLoad => "initial_load",
            Self::PaginateExhaust => "paginate_exhaust",
            Self::DuplicateAdd => "duplicate_add",
            Self::UpdateInPlace => "update_in_place",
            Self::UnknownUpdate => "unknown_update",
            Self::SendEcho => "send_echo",
            Self::PageFailure => "page_failure",
            Self::SendFailure => "send_failure",
            Self::SubscriptionFailure => "subscription_failure",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Snafu)]
enum RunnerError {
    #[snafu(display("missing required --scenario argument"))]
    MissingScenario { stage: &'static str },
    #[snafu(display("missing value for argument '{arg}'"))]
    MissingArgumentValue {
        stage: &'static str,
        arg: &'static str,
    },
    #[snafu(display("unknown scenario '{raw}'"))]
    UnknownScenario { stage: &'static str, raw: String },
    #[snafu(display("unknown argument '{raw}'"))]
    UnknownArgument { stage: &'static str, raw: String },
    #[snafu(display("scenario '{scenario}' failed: {reason}"))]
    ScenarioFailed {
        stage: &'static str,
        scenario: &'static str,
        reason: String,
    },
}

type RunnerResult<T> = Result<T, RunnerError>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(error) => {
            eprintln!("chat_qa_runner: {error}");
            eprintln!(
                "usage: chat_qa_runner --scenario <initial_load|paginate_exhaust|duplicate_add|update_in_place|unknown_update|send_echo|page_failure|send_failure|subscription_failure|all>"
            );
            std::process::exit(2);
        }
    };

    if let Err(error) = run(args).await {
        eprintln!("chat_qa_runner: {error}");
        std::process::exit(1);
    }
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> RunnerResult<RunnerArgs> {
    let mut scenario = None;

    while let Some(argument) = raw.next() {
        match argument.as_str() {
            "--scenario" => {
                let value = raw.next().ok_or(RunnerError::MissingArgumentValue {
                    stage: "parse-args",
                    arg: "--scenario",
                })?;
                scenario = Some(Scenario::parse(&value).ok_or(RunnerError::UnknownScenario {
                    stage: "parse-args",
                    raw: value,
                })?);
            }
            other => {
                return Err(RunnerError::UnknownArgument {
                    stage: "parse-args",
                    raw: other.to_string(),
                });
            }
        }
    }

    let scenario = scenario.ok_or(RunnerError::MissingScenario {
        stage: "parse-args",
    })?;
    Ok(RunnerArgs { scenario })
}

async fn run(args: RunnerArgs) -> RunnerResult<()> {
    let scenarios: Vec<Scenario> = match args.scenario {
        Scenario::All => vec![
            Scenario::InitialLoad,
            Scenario::PaginateExhaust,
            Scenario::DuplicateAdd,
            Scenario::UpdateInPlace,
            Scenario::UnknownUpdate,
            Scenario::SendEcho,
            Scenario::PageFailure,
            Scenario::SendFailure,
            Scenario::SubscriptionFailure,
        ],
        single => vec![single],
    };

    for scenario in scenarios {
        tracing::info!(scenario = scenario.name(), "running scenario");
        run_scenario(scenario).await?;
        println!("ok {}", scenario.name());
    }

    Ok(())
}

async fn run_scenario(scenario: Scenario) -> RunnerResult<()> {
    match scenario {
        Scenario::InitialLoad => initial_load().await,
        Scenario::PaginateExhaust => paginate_exhaust().await,
        Scenario::DuplicateAdd => duplicate_add().await,
        Scenario::UpdateInPlace => update_in_place().await,
        Scenario::UnknownUpdate => unknown_update().await,
        Scenario::SendEcho => send_echo().await,
        Scenario::PageFailure => page_failure().await,
        Scenario::SendFailure => send_failure().await,
        Scenario::SubscriptionFailure => subscription_failure().await,
        Scenario::All => Ok(()),
    }
}

fn spawn_session(source: &Arc<InMemorySource>, page_size: u32) -> SessionHandle {
    let dyn_source: Arc<dyn MessageSource> = Arc::clone(source) as Arc<dyn MessageSource>;
    ChatSession::spawn(dyn_source, SessionSettings { page_size })
}

async fn wait_for<F>(
    scenario: &'static str,
    handle: &SessionHandle,
    description: &str,
    predicate: F,
) -> RunnerResult<Arc<SessionSnapshot>>
where
    F: Fn(&SessionSnapshot) -> bool,
{
    let waited = tokio::time::timeout(SNAPSHOT_WAIT_BUDGET, async {
        loop {
            let snapshot = handle.snapshot();
            if predicate(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(SNAPSHOT_POLL_INTERVAL).await;
        }
    })
    .await;

    waited.map_err(|_| RunnerError::ScenarioFailed {
        stage: "wait-for-snapshot",
        scenario,
        reason: format!("timed out waiting for: {description}"),
    })
}

fn ensure(scenario: &'static str, condition: bool, reason: &str) -> RunnerResult<()> {
    if condition {
        Ok(())
    } else {
        Err(RunnerError::ScenarioFailed {
            stage: "ensure",
            scenario,
            reason: reason.to_string(),
        })
    }
}

fn live_message(id: &str, text: &str, status: MessageStatus) -> Message {
    Message::new(id, text, Sender::Admin, status, 0)
}

async fn initial_load() -> RunnerResult<()> {
    const NAME: &str = "initial_load";
    let source = Arc::new(InMemorySource::seeded(25));
    let handle = spawn_session(&source, 10);

    let snapshot = wait_for(NAME, &handle, "first page of 10", |snapshot| {
        snapshot.messages.len() == 10
    })
    .await?;

    ensure(
        NAME,
        snapshot.messages[0].id.as_str() == "msg-1",
        "first page must start at the oldest message",
    )?;
    ensure(
        NAME,
        snapshot.pending_error.is_none(),
        "clean load must not surface an error",
    )
}

async fn paginate_exhaust() -> RunnerResult<()> {
    const NAME: &str = "paginate_exhaust";
    let source = Arc::new(InMemorySource::seeded(25));
    let handle = spawn_session(&source, 10);
    wait_for(NAME, &handle, "first page", |snapshot| {
        snapshot.messages.len() == 10
    })
    .await?;

    handle.trigger_load_more();
    wait_for(NAME, &handle, "second page", |snapshot| {
        snapshot.messages.len() == 20
    })
    .await?;
    handle.trigger_load_more();
    let snapshot = wait_for(NAME, &handle, "final page", |snapshot| {
        snapshot.messages.len() == 25
    })
    .await?;

    let in_order = snapshot
        .messages
        .iter()
        .enumerate()
        .all(|(index, message)| message.id.as_str() == format!("msg-{}", index + 1));
    ensure(NAME, in_order, "pages must append in server order")?;

    // History is exhausted; an extra trigger must fetch nothing.
    handle.trigger_load_more();
    tokio::time::sleep(Duration::from_millis(30)).await;
    ensure(
        NAME,
        handle.messages().len() == 25,
        "exhausted history must not grow",
    )
}

async fn duplicate_add() -> RunnerResult<()> {
    const NAME: &str = "duplicate_add";
    let source = Arc::new(InMemorySource::seeded(1));
    let handle = spawn_session(&source, 10);
    wait_for(NAME, &handle, "seed message", |snapshot| {
        snapshot.messages.len() == 1
    })
    .await?;

    let added = live_message("live-2", "yo", MessageStatus::Sent);
    source.publish_added(&added);
    source.publish_added(&added);

    wait_for(NAME, &handle, "deduplicated add", |snapshot| {
        snapshot.messages.len() == 2
    })
    .await?;
    tokio::time::sleep(Duration::from_millis(30)).await;
    ensure(
        NAME,
        handle.messages().len() == 2,
        "redelivered add must merge exactly once",
    )
}

async fn update_in_place() -> RunnerResult<()> {
    const NAME: &str = "update_in_place";
    let source = Arc::new(InMemorySource::seeded(5));
    let handle = spawn_session(&source, 10);
    let before = wait_for(NAME, &handle, "seed messages", |snapshot| {
        snapshot.messages.len() == 5
    })
    .await?;
    let target = before.messages[2].clone();

    source.publish_updated(&target.clone().with_status(MessageStatus::Sent));

    let after = wait_for(NAME, &handle, "status flip", |snapshot| {
        snapshot.messages.len() == 5 && snapshot.messages[2].status == MessageStatus::Sent
    })
    .await?;
    ensure(
        NAME,
        after.messages[2].id == target.id,
        "update must not move the row",
    )
}

async fn unknown_update() -> RunnerResult<()> {
    const NAME: &str = "unknown_update";
    let source = Arc::new(InMemorySource::seeded(2));
    let handle = spawn_session(&source, 10);
    wait_for(NAME, &handle, "seed messages", |snapshot| {
        snapshot.messages.len() == 2
    })
    .await?;

    source.publish_updated(&live_message("msg-999", "ghost", MessageStatus::Sent));
    source.publish_added(&live_message("sentinel", "after", MessageStatus::Sent));

    let snapshot = wait_for(NAME, &handle, "sentinel add", |snapshot| {
        snapshot.messages.len() == 3
    })
    .await?;
    ensure(
        NAME,
        snapshot.pending_error.is_none(),
        "unknown update must not raise an error",
    )?;
    ensure(
        NAME,
        !snapshot
            .messages
            .iter()
            .any(|message| message.id.as_str() == "msg-999"),
        "unknown update must not insert",
    )
}

async fn send_echo() -> RunnerResult<()> {
    const NAME: &str = "send_echo";
    let source = Arc::new(InMemorySource::seeded(3));
    let handle = spawn_session(&source, 10);
    wait_for(NAME, &handle, "seed messages", |snapshot| {
        snapshot.messages.len() == 3
    })
    .await?;

    handle.send("hello there");

    let snapshot = wait_for(NAME, &handle, "echoed send", |snapshot| {
        snapshot.messages.len() == 4
    })
    .await?;
    let tail_matches = snapshot
        .messages
        .last()
        .is_some_and(|message| message.text == "hello there");
    ensure(NAME, tail_matches, "echo must land at the tail")?;

    tokio::time::sleep(Duration::from_millis(30)).await;
    ensure(
        NAME,
        handle.messages().len() == 4,
        "send response plus echo must not double-insert",
    )
}

async fn page_failure() -> RunnerResult<()> {
    const NAME: &str = "page_failure";
    let source = Arc::new(InMemorySource::seeded(25));
    let handle = spawn_session(&source, 10);
    wait_for(NAME, &handle, "first page", |snapshot| {
        snapshot.messages.len() == 10
    })
    .await?;

    source.fail_next_fetch();
    handle.trigger_load_more();
    wait_for(NAME, &handle, "reported fetch failure", |snapshot| {
        snapshot.pending_error.is_some()
    })
    .await?;

    // Live channels must survive the pagination failure.
    source.publish_added(&live_message("live-x", "still here", MessageStatus::Sent));
    wait_for(NAME, &handle, "live add after failure", |snapshot| {
        snapshot.messages.len() == 11
    })
    .await?;

    handle.clear_error();
    wait_for(NAME, &handle, "cleared error", |snapshot| {
        snapshot.pending_error.is_none()
    })
    .await?;

    handle.trigger_load_more();
    wait_for(NAME, &handle, "retried page", |snapshot| {
        snapshot.messages.len() == 21
    })
    .await?;
    Ok(())
}

async fn send_failure() -> RunnerResult<()> {
    const NAME: &str = "send_failure";
    let source = Arc::new(InMemorySource::seeded(1));
    let handle = spawn_session(&source, 10);
    wait_for(NAME, &handle, "seed message", |snapshot| {
        snapshot.messages.len() == 1
    })
    .await?;

    source.fail_next_send();
    handle.send("first attempt");
    let snapshot = wait_for(NAME, &handle, "reported send failure", |snapshot| {
        snapshot.pending_error.is_some()
    })
    .await?;
    ensure(
        NAME,
        snapshot.messages.len() == 1,
        "failed send must not insert",
    )?;

    handle.send("second attempt");
    wait_for(NAME, &handle, "retried send echo", |snapshot| {
        snapshot.messages.len() == 2
    })
    .await?;
    Ok(())
}

async fn subscription_failure() -> RunnerResult<()> {
    const NAME: &str = "subscription_failure";
    let source = Arc::new(InMemorySource::seeded(25));
    source.fail_subscriptions(true);
    let handle = spawn_session(&source, 10);

    wait_for(
        NAME,
        &handle,
        "load despite failed subscriptions",
        |snapshot| snapshot.messages.len() == 10 && snapshot.pending_error.is_some(),
    )
    .await?;

    handle.trigger_load_more();
    wait_for(NAME, &handle, "pagination still works", |snapshot| {
        snapshot.messages.len() == 20
    })
    .await?;
    Ok(())
}
