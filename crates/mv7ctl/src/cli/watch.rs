//! `watch` subcommand: stream property-change notifications.

use std::sync::atomic::Ordering;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use super::{Config, MicEvent, RUNNING, Result, open_engine};

pub(super) fn cmd_watch() -> Result<()> {
    let config = Config::load_or_default();
    let (mic, events) = open_engine(&config)?;
    println!("Synchronized. Watching for changes (Ctrl+C to stop)...");

    while RUNNING.load(Ordering::SeqCst) {
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(MicEvent::PropertyChanged(id)) => {
                // The snapshot already carries the public mode view, so a
                // pending switch prints as `loading`.
                match mic.snapshot().get(id) {
                    Some(value) => println!("{id} = {value}"),
                    None => println!("{id} = (pending re-fetch)"),
                }
            }
            Ok(MicEvent::ConnectionLost(reason)) => {
                eprintln!("Connection lost: {reason}");
                break;
            }
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    mic.close();
    Ok(())
}
