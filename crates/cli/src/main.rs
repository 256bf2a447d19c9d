use std::process::ExitCode;

fn main() -> ExitCode {
    poolcalc_cli::run()
}
