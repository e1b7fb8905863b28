//! `identify` subcommand: flash the device LEDs.

use super::{Config, Result, Transport, open_transport};

pub(super) fn cmd_identify() -> Result<()> {
    let config = Config::load_or_default();
    let transport = open_transport(&config)?;
    transport.send(mv7ctl_lib::protocol::CMD_IDENTIFY)?;
    println!("Identify sent.");
    Ok(())
}
