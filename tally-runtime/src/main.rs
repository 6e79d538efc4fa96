// you don't want your application runtime to randomly crash
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

use {
    std::{path::{Path, PathBuf}, process::exit},
    tracing::{Level, info, debug, error},
    tracing_subscriber::FmtSubscriber,
    tokio::io::{AsyncBufReadExt, BufReader},
    clap::{Parser, Subcommand},
    anyhow::{Context, anyhow, bail},
    tally_runtime::{
        ActionInput,
        CounterAction,
        config::RuntimeConfig,
        kv::{BoxedStore, KvStore, StoredValue},
    },
};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to yaml config. Without it, counter is kept in ./tally.sqlite
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Invoke the counter action and print its result as json
    Invoke {
        /// Input parameter, may be repeated: --param text '1+1'
        #[arg(long = "param", short = 'p', num_args = 2, value_names = ["KEY", "VALUE"])]
        params: Vec<String>,

        /// Json object with input parameters. --param values take precedence.
        #[arg(long, short = 'P')]
        param_file: Option<PathBuf>,
    },
    /// Inspect or edit the key-value store
    #[command(subcommand)]
    Kv(KvCommand),
}

#[derive(Subcommand, Debug)]
enum KvCommand {
    Get {
        key: String,
    },
    /// Values set from the command line are stored as text
    Set {
        key: String,
        value: String,
    },
    Del {
        key: String,
    },
    List,
    /// Deletes every key in the store
    Clean {
        /// Skip the confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Sets COUNT keys at once: KEY_PREFIX<i> = VALUE_PREFIX<i> for i starting at START
    SetMany {
        key_prefix: String,
        value_prefix: String,
        start: u64,
        count: u64,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    let config = match args.config {
        Some(config_path) => match RuntimeConfig::load(config_path.clone()).await {
            Ok(v) => v,
            Err(err) => {
                eprintln!("failed to load config from {config_path:?}: {err}");
                exit(1);
            }
        },
        None => RuntimeConfig::default(),
    };

    FmtSubscriber::builder()
        .with_max_level(Level::from(config.log_level))
        .with_writer(std::io::stderr)
        .init();

    if let Some(config_path) = config.config_path.as_ref() {
        info!("loaded config from {config_path:?}");
    }

    if let Err(err) = run_command(config, args.command).await {
        error!("{err:?}");
        exit(1);
    }
}

async fn run_command(config: RuntimeConfig, command: Command) -> anyhow::Result<()> {
    let store = config.store().context("failed to open kv store")?;

    match command {
        Command::Invoke { params, param_file } => {
            let input = build_input(&params, param_file.as_deref()).await?;
            let (result, event) = CounterAction::from_boxed(store)
                .invoke_traced(&input)
                .await
                .context("failed to invoke action")?;
            debug!(read = ?event.read, write = ?event.write, "invocation finished");
            println!("{}", serde_json::to_string_pretty(&result)?);
        },
        Command::Kv(command) => run_kv_command(store, command).await?,
    }

    Ok(())
}

async fn run_kv_command(store: BoxedStore, command: KvCommand) -> anyhow::Result<()> {
    match command {
        KvCommand::Get { key } => {
            let value = store.get(&key).await?;
            println!("{}", serde_json::to_string(&value)?);
        },
        KvCommand::Set { key, value } => {
            store.set(&key, StoredValue::Text(value)).await?;
            info!("set {key}");
        },
        KvCommand::Del { key } => {
            if store.delete(&key).await? {
                info!("deleted {key}");
            } else {
                info!("{key} does not exist");
            }
        },
        KvCommand::List => {
            for key in store.list().await? {
                println!("{key}");
            }
        },
        KvCommand::Clean { force } => {
            if !force && !confirm("Type 'yes' to remove all content from the store").await? {
                info!("doing nothing");
                return Ok(());
            }
            let deleted = store.clear().await?;
            info!("all content cleared, {deleted} keys deleted");
        },
        KvCommand::SetMany { key_prefix, value_prefix, start, count } => {
            let entries = numbered_entries(&key_prefix, &value_prefix, start, count)?;
            let total = entries.len();
            store.set_many(entries).await?;
            info!("set {total} keys");
        },
    }

    Ok(())
}

async fn confirm(question: &str) -> anyhow::Result<bool> {
    eprintln!("{question}");
    let mut answer = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut answer).await
        .context("failed to read answer")?;
    Ok(answer.trim() == "yes")
}

/// Entries `key_prefix<i>` = `value_prefix<i>` for `count` consecutive indices, values stored as text.
fn numbered_entries(key_prefix: &str, value_prefix: &str, start: u64, count: u64) -> anyhow::Result<Vec<(String, StoredValue)>> {
    let end = start.checked_add(count).ok_or_else(|| anyhow!("start + count is out of range"))?;
    Ok((start..end)
        .map(|i| (format!("{key_prefix}{i}"), StoredValue::Text(format!("{value_prefix}{i}"))))
        .collect())
}

async fn build_input(params: &[String], param_file: Option<&Path>) -> anyhow::Result<ActionInput> {
    let mut input = match param_file {
        Some(path) => {
            let content = tokio::fs::read(path).await
                .with_context(|| format!("failed to read param file {path:?}"))?;
            serde_json::from_slice::<ActionInput>(&content)
                .with_context(|| format!("param file {path:?} should contain a json object"))?
        },
        None => ActionInput::new(),
    };

    input.extend(params_to_input(params)?);
    Ok(input)
}

fn params_to_input(params: &[String]) -> anyhow::Result<ActionInput> {
    if params.len() % 2 != 0 {
        bail!("--param expects a key and a value");
    }

    let mut input = ActionInput::new();
    for pair in params.chunks(2) {
        let [key, value] = pair else {
            return Err(anyhow!("--param expects a key and a value"));
        };
        input.insert(key.clone(), serde_json::Value::String(value.clone()));
    }
    Ok(input)
}
