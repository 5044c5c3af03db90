use clap::Parser;
use clouvel_cli::memory::MemoryCli;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "clouvel", version, about = "Regression memory for recurring errors")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Manage regression memories for the current project.
    Memory(MemoryCli),
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries JSON only. Override with RUST_LOG.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Memory(memory_cli) => clouvel_cli::memory::run(memory_cli),
    }
}
