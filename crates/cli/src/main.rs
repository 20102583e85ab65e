use std::process::ExitCode;

fn main() -> ExitCode {
    kopi_cli::run()
}
