//! chronicle-hook: the per-event binary Claude Code's settings.json invokes
//! for every lifecycle and tool-use hook.
//!
//! Reads one JSON hook payload from stdin, classifies and persists it, and
//! writes the decision JSON to stdout. Never panics and never blocks the
//! host on a backend failure; the worst case is an allow decision with a
//! logged error.

mod logging;

use std::io::{Read, Write};

use chronicle_core::{Config, Engine};

fn main() {
    let config = Config::load().unwrap_or_else(|err| {
        eprintln!("chronicle-hook: failed to load config, using defaults: {err}");
        Config::default()
    });
    let _logging_guard = logging::init(&config);

    let mut raw = Vec::new();
    if let Err(err) = std::io::stdin().read_to_end(&mut raw) {
        tracing::error!(error = %err, "Failed to read stdin, allowing by default");
        emit_default_allow();
        return;
    }

    let engine = match Engine::bootstrap() {
        Ok(engine) => engine,
        Err(err) => {
            tracing::error!(error = %err, "Failed to bootstrap engine, allowing by default");
            emit_default_allow();
            return;
        }
    };

    let (output, code) = engine.handle(&raw);
    write_output(&output);
    std::process::exit(code);
}

fn emit_default_allow() {
    write_output(&chronicle_protocol::HookOutput::default_allow(None));
}

fn write_output(output: &chronicle_protocol::HookOutput) {
    match serde_json::to_string(output) {
        Ok(json) => println!("{json}"),
        Err(err) => {
            tracing::error!(error = %err, "Failed to serialize hook output");
            println!("{{\"continue\":true}}");
        }
    }
    let _ = std::io::stdout().flush();
}
