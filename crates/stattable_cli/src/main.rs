//! CLI smoke entry point.
//!
//! Registers one demo statistics table on a fresh host, runs the host
//! lifecycle and prints the statistics to stdout.

use log::error;
use stattable_core::{
    core_version, default_log_level, include_owned_table_extension, init_logging, HookResult,
    Host, HostConfig, Stage, TableExtension, TableId, TableIdentity,
};
use std::io::Write;
use std::process::ExitCode;

const LOG_DIR_ENV: &str = "STATTABLE_LOG_DIR";

struct StageTable {
    identity: TableIdentity,
    solves: u32,
}

impl TableExtension for StageTable {
    fn identity(&self) -> &TableIdentity {
        &self.identity
    }

    fn init_solve(&mut self, _host: &Host, _table: TableId) -> HookResult<()> {
        self.solves += 1;
        Ok(())
    }

    fn output(&mut self, host: &Host, _table: TableId, sink: &mut dyn Write) -> HookResult<()> {
        writeln!(
            sink,
            "{:<17}: stage={} solves={}",
            self.identity.description(),
            host.stage(),
            self.solves
        )?;
        Ok(())
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    if let Ok(log_dir) = std::env::var(LOG_DIR_ENV) {
        init_logging(default_log_level(), &log_dir)?;
    }

    let mut host = Host::new(HostConfig {
        name: "smoke".to_string(),
        ..HostConfig::default()
    });
    let identity = TableIdentity::new(
        host.handle(),
        "stage",
        "Solving stage",
        1000,
        Stage::Solving,
    )?;
    include_owned_table_extension(&mut host, StageTable { identity, solves: 0 })?;

    host.transform()?;
    host.solve()?;
    println!("stattable_core version={}", core_version());
    host.print_statistics(&mut std::io::stdout().lock())?;
    host.free()?;
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_run module=cli status=error error={}", err);
            eprintln!("stattable_cli: {err}");
            ExitCode::FAILURE
        }
    }
}
