use clap::Parser;
use pufreader::{
    app::{logger::init_logging, App},
    cli::Cli,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let app = match App::from_cli(cli) {
        Ok(app) => app,
        Err(err) => {
            eprintln!("pufreader: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = init_logging(app.log_level(), app.log_file()) {
        eprintln!("pufreader: cannot open log: {err}");
        return ExitCode::FAILURE;
    }
    match app.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            eprintln!("pufreader: {err}");
            ExitCode::FAILURE
        }
    }
}
