use std::process::ExitCode;

fn main() -> ExitCode {
    heap_pressure::run_cli()
}
