//! `console` subcommand: raw pass-through to the device.
//!
//! No protocol knowledge: inbound messages are printed as they arrive on a
//! background reader, stdin lines are framed and sent verbatim. Useful for
//! manual probing of the command set.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use super::{Config, RUNNING, Result, Transport, open_transport};

pub(super) fn cmd_console() -> Result<()> {
    let config = Config::load_or_default();
    let transport = Arc::new(open_transport(&config)?);
    println!("Connected. Type raw commands; Ctrl+D to exit.");

    let reader = {
        let transport = Arc::clone(&transport);
        thread::spawn(move || {
            while RUNNING.load(Ordering::SeqCst) {
                match transport.receive(Some(Duration::from_millis(200))) {
                    Ok(Some(message)) => {
                        print!("{message}");
                        if !message.ends_with('\n') {
                            println!();
                        }
                        let _ = io::stdout().flush();
                    }
                    Ok(None) => {}
                    Err(e) => {
                        eprintln!("read error: {e}");
                        break;
                    }
                }
            }
        })
    };

    let stdin = io::stdin();
    let mut send_error = None;
    for line in stdin.lock().lines() {
        if !RUNNING.load(Ordering::SeqCst) {
            break;
        }
        let line = line?;
        let command = line.trim_end();
        if command.is_empty() {
            continue;
        }
        if let Err(e) = transport.send(command) {
            send_error = Some(e);
            break;
        }
    }

    RUNNING.store(false, Ordering::SeqCst);
    reader.join().ok();

    match send_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
