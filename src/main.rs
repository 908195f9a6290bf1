//! ClassArena - round-based class arena match core
//!
//! With `--headless` runs a bot match and writes its combat log. Without it,
//! loads the class kits, settings and layout a host would use and reports
//! whether a match could start with them.

use std::process::ExitCode;

use classarena::cli::{self, Args};
use classarena::error::ConfigError;
use classarena::headless::{run_headless_match, HeadlessMatchConfig};
use classarena::settings::{ArenaLayout, RonLayoutStore};
use classarena::states::play_match::KitRegistry;
use classarena::states::MatchSettings;

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}

fn main() -> ExitCode {
    init_tracing();
    std::panic::set_hook(Box::new(|info| {
        tracing::error!(%info, "panic");
    }));

    let args = cli::parse_args();
    let result = match &args.headless {
        Some(_) => run_headless(&args),
        None => check_setup(&args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn run_headless(args: &Args) -> Result<(), String> {
    let Some(path) = &args.headless else {
        return Ok(());
    };
    let mut config = HeadlessMatchConfig::load_from_file(path).map_err(|e| e.to_string())?;
    if let Some(output) = &args.output {
        config.output_path = Some(output.display().to_string());
    }
    if let Some(max_duration) = args.max_duration {
        config.max_duration_secs = max_duration;
    }
    if let Some(classes) = &args.classes {
        config.classes_path = Some(classes.clone());
    }
    if let Some(settings) = &args.settings {
        config.settings = MatchSettings::load(settings).map_err(|e| e.to_string())?;
    }

    let result = run_headless_match(config).map_err(|e| e.to_string())?;
    println!("Outcome: {:?}", result.outcome);
    if !result.winners.is_empty() {
        println!("Winners: {}", result.winners.join(", "));
    }
    println!("Map: {}", result.map.as_deref().unwrap_or("-"));
    println!("Banned: {}", result.banned_class.as_deref().unwrap_or("-"));
    println!("Combat time: {:.1}s", result.match_time);
    for player in &result.players {
        println!(
            "  {:<12} {:<8} hp {:>3}  dealt {:>4}  taken {:>4}  healed {:>4}{}",
            player.name,
            player.class_name.as_deref().unwrap_or("-"),
            player.final_health,
            player.damage_dealt,
            player.damage_taken,
            player.healing_done,
            if player.survived { "" } else { "  (eliminated)" },
        );
    }
    Ok(())
}

fn check_setup(args: &Args) -> Result<(), String> {
    let kits = match &args.classes {
        Some(path) => KitRegistry::load(path),
        None => KitRegistry::builtin(),
    }
    .map_err(|e| e.to_string())?;
    let settings = match &args.settings {
        Some(path) => MatchSettings::load(path),
        None => Ok(MatchSettings::default()),
    }
    .map_err(|e| e.to_string())?;
    let layout = match &args.layout {
        Some(path) => RonLayoutStore::new(path.clone()).load(),
        None => Ok::<ArenaLayout, ConfigError>(ArenaLayout::default()),
    }
    .map_err(|e| e.to_string())?;

    println!("Mode: {:?} (tick {}ms)", settings.mode, settings.tick_ms);
    for kind in kits.kinds() {
        if let Some(kit) = kits.get(kind) {
            println!("  {:<8} {} abilities", kind.name(), kit.definition.abilities.len());
        }
    }
    match layout.check() {
        Ok(()) => println!("Layout ready: {} maps", layout.maps.len()),
        Err(refusal) => println!("Layout incomplete: {}", refusal),
    }
    Ok(())
}
