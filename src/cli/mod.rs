use crate::Result;
use clap::Parser;

mod command;
mod port;
mod quit;
mod run;

/// Launch and supervise the Omnify chord daemon sidecar
#[derive(Debug, clap::Parser)]
#[clap(name = "omnify-sidecar", version, about)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    Command(command::Command),
    Port(port::Port),
    Quit(quit::Quit),
    Run(run::Run),
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    match args.command {
        Commands::Command(command) => command.run().await,
        Commands::Port(port) => port.run().await,
        Commands::Quit(quit) => quit.run().await,
        Commands::Run(run) => run.run().await,
    }
}

/// Settings with the launch overrides shared by several subcommands applied.
fn launch_settings(
    mode: Option<crate::launch::LaunchKind>,
    temp_dir: Option<&std::path::Path>,
    launcher: Option<&std::path::Path>,
) -> crate::settings::Settings {
    let mut settings = crate::settings::settings().clone();
    if let Some(mode) = mode {
        settings.launch.mode = mode;
    }
    if let Some(dir) = temp_dir {
        settings.launch.temp_dir = Some(dir.to_path_buf());
    }
    if let Some(launcher) = launcher {
        settings.launch.launcher_script = Some(launcher.to_path_buf());
    }
    settings
}
