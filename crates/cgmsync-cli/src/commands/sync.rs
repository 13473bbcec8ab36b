use std::io::{self, Write};

use anyhow::{bail, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use cgmsync_core::{Backend, Config, CountdownScheduler, CycleOutcome, SyncEvent};

use super::{newest_first, print_readings, Runtime};

pub async fn fetch(config: &mut Config, backend: Backend, limit: usize, json: bool) -> Result<()> {
    let runtime = Runtime::build(config)?;
    runtime.sync.restore_history(backend).await;

    let outcome = runtime.sync.run_cycle(backend).await;
    runtime.save_session_state(config).await?;

    match outcome {
        Ok(CycleOutcome::Merged { fetched, inserted }) if !json => {
            println!("{}: fetched {} readings, {} new", backend, fetched, inserted);
        }
        Ok(_) => {}
        Err(e) => bail!("{}", e.user_message()),
    }

    let history = runtime.sync.history().snapshot(backend).await;
    print_readings(&newest_first(&history, limit), json)
}

pub async fn watch(config: &mut Config, backend: Backend) -> Result<()> {
    let runtime = Runtime::build(config)?;
    let restored = runtime.sync.restore_history(backend).await;
    if restored > 0 {
        let history = runtime.sync.history().snapshot(backend).await;
        print_readings(&newest_first(&history, 12), false)?;
    }

    let interval = config.reading_interval();
    let mut scheduler = CountdownScheduler::new(runtime.sync.monitor().clone(), interval);
    let mut countdown = scheduler.subscribe();
    scheduler.start();

    let mut events = runtime.events.subscribe();
    let handle = runtime.sync.start(backend, interval);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    println!("Watching {} every {} min (r + Enter to sync now, Ctrl-C to stop)", backend, interval.as_secs() / 60);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().eq_ignore_ascii_case("r") => handle.trigger(),
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => stdin_open = false,
            },
            changed = countdown.changed() => {
                if changed.is_err() {
                    break;
                }
                let value = *countdown.borrow_and_update();
                print!("\r{:<16} {:>8}", value.state.to_string(), value.display());
                io::stdout().flush()?;
            }
            event = events.recv() => match event {
                Ok(SyncEvent::HistoryMerged { backend: merged, inserted, .. }) if merged == backend => {
                    let history = runtime.sync.history().snapshot(backend).await;
                    println!();
                    print_readings(&newest_first(&history, inserted), false)?;
                }
                Ok(SyncEvent::Error { message, .. }) => println!("\r{:<26}", message),
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => debug!(skipped = n, "Event receiver lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    println!();
    handle.stop().await;
    scheduler.stop().await;
    runtime.save_session_state(config).await?;
    Ok(())
}
