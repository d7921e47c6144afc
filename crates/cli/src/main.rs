use std::process::ExitCode;

fn main() -> ExitCode {
    telroute_cli::run()
}
