use cemantix_solver::CliError;

fn is_robot_mode_args() -> bool {
    std::env::args().any(|arg| arg == "--json")
}

fn report_error(err: &CliError) {
    if is_robot_mode_args() {
        let payload = serde_json::json!({
            "error": {
                "code": err.code,
                "kind": err.kind,
                "message": err.message,
                "hint": err.hint,
                "retryable": err.retryable,
            }
        });
        eprintln!("{payload}");
    } else {
        eprintln!("{}", err.message);
        if let Some(hint) = &err.hint {
            eprintln!("hint: {hint}");
        }
    }
}

fn main() {
    // Load .env early; ignore if missing.
    dotenvy::dotenv().ok();

    let raw_args: Vec<String> = std::env::args().collect();
    let parsed = match cemantix_solver::parse_cli(raw_args) {
        Ok(parsed) => parsed,
        Err(err) if err.code == 0 => {
            // --help / --version
            print!("{}", err.message);
            return;
        }
        Err(err) => {
            // clap already renders usage errors for humans.
            if is_robot_mode_args() {
                report_error(&err);
            } else {
                eprint!("{}", err.message);
            }
            std::process::exit(err.code);
        }
    };

    if let Err(err) = cemantix_solver::run_with_parsed(parsed) {
        report_error(&err);
        std::process::exit(err.code);
    }
}
