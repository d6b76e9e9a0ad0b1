///
/// concord-stress - Run contention workloads against the concord primitives
///
/// - concord-stress semaphore: permit bounds for both semaphores
/// - concord-stress channel: conservation through every channel
/// - concord-stress rwlock: reader/writer exclusion
/// - concord-stress pool / queued / timers: executor and timer guarantees
/// - concord-stress all: every workload in turn
///

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use concord_stress::{StressProfile, Workload};

#[derive(Parser)]
#[command(name = "concord-stress")]
#[command(author, version, about = "Stress the concord concurrency primitives", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML profile sizing the workloads
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Threads per workload
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Operations per thread
    #[arg(long, global = true)]
    iterations: Option<usize>,

    /// Log primitive internals to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Permit bounds of the FIFO and waiter-preference semaphores
    Semaphore,
    /// Exactly-once delivery through every channel
    Channel,
    /// Exclusion guarantees of both read/write locks
    Rwlock,
    /// Pool bounds and task completion of the pooled executor
    Pool,
    /// Serial submission-order execution of the queued executor
    Queued,
    /// Due-time ordering of the timer daemon
    Timers,
    /// Every workload in turn
    All,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .init();

    let profile = match &cli.config {
        Some(path) => match StressProfile::load(path) {
            Ok(profile) => profile,
            Err(e) => {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        },
        None => StressProfile::default(),
    }
    .with_overrides(cli.threads, cli.iterations);

    let workloads: &[Workload] = match cli.command {
        Commands::Semaphore => &[Workload::Semaphore],
        Commands::Channel => &[Workload::Channel],
        Commands::Rwlock => &[Workload::RwLock],
        Commands::Pool => &[Workload::Pool],
        Commands::Queued => &[Workload::Queued],
        Commands::Timers => &[Workload::Timers],
        Commands::All => &Workload::ALL,
    };

    for workload in workloads {
        match workload.run(&profile) {
            Ok(report) => println!("{}", report),
            Err(e) => {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        }
    }
}
