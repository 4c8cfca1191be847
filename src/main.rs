use std::process::ExitCode;

fn main() -> ExitCode {
    crawlgrid::app::startup::startup()
}
