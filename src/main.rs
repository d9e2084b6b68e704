use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{build, plan};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "bob")]
#[command(version = VERSION)]
#[command(about = "Nightly pallet builder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh the checkout, build the pallet and deliver its artifact
    Build(build::BuildArgs),
    /// Validate a build configuration and show what a build would do
    Plan(plan::PlanArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let (json_result, exit_code) = commands::run_json(cli.command);
    output::print_json_result(json_result);

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn build_takes_a_config_path() {
        let cli = Cli::try_parse_from(["bob", "build", "/etc/bob/stacki.toml"]).unwrap();
        match cli.command {
            Commands::Build(args) => {
                assert_eq!(args.config, std::path::PathBuf::from("/etc/bob/stacki.toml"))
            }
            Commands::Plan(_) => panic!("expected build"),
        }
    }

    #[test]
    fn exit_codes_are_clamped() {
        assert_eq!(exit_code_to_u8(-1), 0);
        assert_eq!(exit_code_to_u8(20), 20);
        assert_eq!(exit_code_to_u8(1000), 255);
    }
}
