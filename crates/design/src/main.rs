use std::io::{BufRead, Write};
use std::path::PathBuf;

use design_scene_lib::command::{execute_json, CommandResponse};
use design_scene_lib::harness::TestHarness;
use design_scene_lib::settings::EngineSettings;

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "design_scene=info,design_scene_lib=info".into()),
        )
        .init();

    let mut harness = TestHarness::with_settings(EngineSettings::load());

    // Parse --scene <path> argument
    if let Some(path) = parse_scene_arg() {
        match harness.scene.load(&path) {
            Ok(()) => tracing::info!("Loaded scene from {} ({} items)", path.display(), harness.item_count()),
            Err(e) => tracing::error!("Failed to load scene from {}: {e}", path.display()),
        }
    }

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to read stdin: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = execute_json(&mut harness, &line).unwrap_or_else(|e| CommandResponse::err(e));
        let json = serde_json::to_string(&response)
            .unwrap_or_else(|e| format!(r#"{{"success":false,"error":"{e}"}}"#));
        if writeln!(stdout, "{json}").and_then(|_| stdout.flush()).is_err() {
            break;
        }
    }
}

fn parse_scene_arg() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        if args[i] == "--scene" && i + 1 < args.len() {
            return Some(PathBuf::from(&args[i + 1]));
        }
        i += 1;
    }
    None
}
