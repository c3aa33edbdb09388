//! banwatch - fail2ban jail monitor
//!
//! Polls a fail2ban jail through `fail2ban-client`, keeps the latest
//! counters and ban list on screen and lets the operator lift a ban.

mod cli;
mod client;
mod console;
mod error;
mod jail;
mod manifest;
mod poller;
mod unban;

use cli::{Cli, Commands};
use client::Fail2banClient;
use console::Action;
use error::Result;
use jail::{JailSnapshot, JailStateStore, SystemClock};
use manifest::BanwatchConfig;
use poller::{PollHandle, PollLoop};
use unban::UnbanHandler;

use std::sync::Arc;
use tokio::task::JoinHandle;

fn main() {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        // Bad operator input exits like a usage error
        std::process::exit(if e.is_validation() { 2 } else { 1 });
    }
}

/// Log to stderr; `RUST_LOG` wins unless `--verbose` is given
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
    {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }
}

fn run(cli: Cli) -> Result<()> {
    let (path, required) = cli.config_path();
    let (jail, interval) = (cli.jail, cli.interval);

    let command = match cli.command {
        // Commands that don't require config
        Commands::Completion { shell } => {
            Cli::generate_completion(shell);
            return Ok(());
        }
        command => command,
    };

    let config = manifest::load(&path, required)?.with_overrides(jail, interval)?;
    let rt = tokio::runtime::Runtime::new()?;

    match command {
        Commands::Status { json } => rt.block_on(status(&config, json)),
        Commands::Watch => rt.block_on(watch(&config)),
        Commands::Unban { address } => rt.block_on(unban(&config, &address)),
        Commands::Completion { .. } => Ok(()),
    }
}

/// Poll loop, store and unban handler wired together for one jail
struct Session {
    store: JailStateStore,
    handle: PollHandle,
    handler: UnbanHandler<Fail2banClient>,
    task: JoinHandle<()>,
}

impl Session {
    /// Spawn the poll loop; must be called inside the runtime
    fn start(config: &BanwatchConfig) -> Self {
        let client = Arc::new(Fail2banClient::new(&config.client));
        let store = JailStateStore::new(&config.monitor.jail);
        let (poller, handle) = PollLoop::new(
            Arc::clone(&client),
            store.clone(),
            Arc::new(SystemClock),
            config.monitor.interval(),
        );
        let task = tokio::spawn(poller.run());
        let handler = UnbanHandler::new(client, &config.monitor.jail, handle.clone());

        Self {
            store,
            handle,
            handler,
            task,
        }
    }

    async fn stop(self) {
        self.handle.shutdown().await;
        if let Err(e) = self.task.await {
            tracing::error!("poll loop task failed: {}", e);
        }
    }
}

fn print_snapshot(snapshot: &JailSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
    } else {
        print!("{}", console::render(snapshot));
    }
    Ok(())
}

/// One poll, one report
async fn status(config: &BanwatchConfig, json: bool) -> Result<()> {
    let client = Arc::new(Fail2banClient::new(&config.client));
    let store = JailStateStore::new(&config.monitor.jail);
    let (mut poller, _handle) = PollLoop::new(
        client,
        store.clone(),
        Arc::new(SystemClock),
        config.monitor.interval(),
    );

    let result = poller.poll_once().await;
    print_snapshot(&store.current(), json)?;
    result.map(|_| ())
}

/// Unban one address and show the refreshed jail
async fn unban(config: &BanwatchConfig, address: &str) -> Result<()> {
    let session = Session::start(config);
    let result = session.handler.unban(address).await;
    session.stop().await;

    let unbanned = result?;
    println!("Unbanned: {}\n", unbanned.address);
    print_snapshot(&unbanned.snapshot, false)
}

/// Keep the report on screen and serve operator commands until told to stop
async fn watch(config: &BanwatchConfig) -> Result<()> {
    let session = Session::start(config);

    let mut updates = session.store.subscribe();
    let renderer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            println!("{}", console::render(&snapshot));
        }
    });

    print!("{}", console::help());
    let mut lines = console::spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.recv(), if stdin_open => {
                let Some(line) = line else {
                    // No operator attached; keep polling until interrupted
                    tracing::debug!("stdin closed, watching until interrupted");
                    stdin_open = false;
                    continue;
                };

                match console::parse_action(&line) {
                    None => {}
                    Some(Action::Refresh) => session.handle.refresh_now().await?,
                    Some(Action::Unban(address)) => {
                        let result = session.handler.unban(&address).await;
                        println!("{}", console::unban_feedback(&result));
                    }
                    Some(Action::Help) => print!("{}", console::help()),
                    Some(Action::Quit) => break,
                    Some(Action::Unknown(word)) => {
                        println!("Unknown command '{}', type 'h' for help", word);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.stop().await;
    renderer.abort();
    Ok(())
}
