use std::process::ExitCode;

fn main() -> ExitCode {
    ocbot_cli::run()
}
