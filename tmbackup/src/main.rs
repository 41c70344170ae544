//! tmbackup - main entry point

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tmbackup::config::RunOptions;
use tmbackup::daemon::shutdown::run_until_signal;
use tmbackup::executor::{BackupExecutor, BackupJob};
use tmbackup::fs::TimeBase;
use tmbackup::location::{marker, BackupLocation};
use tmbackup::{transfer, utils};

#[derive(Parser, Debug)]
#[command(author, version, about = "Incremental snapshot backups with rsync", long_about = None)]
struct Args {
    /// Verbose output, also passed on to rsync
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also send log records to syslog
    #[arg(short, long, global = true)]
    syslog: bool,

    /// Keep expired snapshots instead of deleting them after a backup
    #[arg(short, long, global = true)]
    keep_expired: bool,

    /// Option for ssh, e.g. --ssh-opt "-p 2222" (repeatable)
    #[arg(long = "ssh-opt", value_name = "OPT", global = true, allow_hyphen_values = true)]
    ssh_opts: Vec<String>,

    /// rsync binary to run
    #[arg(long, value_name = "PATH", env = "TMBACKUP_RSYNC", default_value = "rsync", global = true)]
    rsync: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Turn an existing directory into a backup location
    Init {
        /// Local path or user@host:path
        location: String,

        /// Name snapshots in local time instead of UTC
        #[arg(long)]
        local_time: bool,
    },
    /// Back up a directory into a backup location
    Backup {
        /// Local directory to back up
        source: PathBuf,

        /// Local path or user@host:path
        location: String,

        /// File of rsync exclude patterns
        exclude_file: Option<PathBuf>,
    },
    /// List the differences between two snapshots
    Diff {
        first: String,
        second: String,
    },
}

impl Args {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            verbose: self.verbose,
            syslog: self.syslog,
            keep_expired: self.keep_expired,
            ssh_options: self
                .ssh_opts
                .iter()
                .flat_map(|opt| opt.split_whitespace())
                .map(str::to_string)
                .collect(),
            rsync_program: self.rsync.clone(),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    let options = args.run_options();

    if let Err(e) = utils::logger::init(options.log_level(), options.syslog) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    let result = run_until_signal(async { Ok(run(args.command, options).await) })
        .await
        .map_err(anyhow::Error::from)
        .and_then(|outcome| outcome);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, options: RunOptions) -> anyhow::Result<()> {
    match command {
        Commands::Init {
            location,
            local_time,
        } => {
            let target = BackupLocation::resolve(&location, &options.ssh_options)
                .await
                .with_context(|| format!("Cannot initialize {}", location))?;
            marker::init(&target, TimeBase::from_use_utc(!local_time))
                .await
                .with_context(|| format!("Cannot initialize {}", location))?;
        }
        Commands::Backup {
            source,
            location,
            exclude_file,
        } => {
            let job = BackupJob {
                source,
                destination: location.clone(),
                exclude_file,
            };
            let result = BackupExecutor::new(options)
                .execute(job)
                .await
                .with_context(|| format!("Backup into {} failed", location))?;
            tracing::info!("Latest snapshot: {}", result.snapshot);
        }
        Commands::Diff { first, second } => {
            let lines = transfer::compare(&first, &second, &options.transfer_config())
                .await
                .context("Cannot compare snapshots")?;
            for line in lines {
                println!("{}", line);
            }
        }
    }
    Ok(())
}
