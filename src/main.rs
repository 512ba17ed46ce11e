use std::env;
use std::fs;

use civ4save_reader::{Context, ParseState, SaveFile, TypeTable};

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!(
            "Usage: {} <path-to-save> --types <types.json> [--max-players <N>] [--plots] [--json]",
            args[0]
        );
        std::process::exit(1);
    }

    let save_path = &args[1];
    let mut ctx = Context::default();
    let mut types_path: Option<&String> = None;
    let mut show_plots = false;
    let mut json_output = false;

    // Parse the remaining flags
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--types" => {
                if let Some(path) = args.get(i + 1) {
                    types_path = Some(path);
                    i += 2;
                } else {
                    eprintln!("ERROR: --types flag requires a path argument.");
                    std::process::exit(1);
                }
            }
            "--max-players" => {
                match args.get(i + 1).and_then(|v| v.parse::<usize>().ok()) {
                    Some(n) if n > 0 => {
                        ctx = Context::new(n);
                        i += 2;
                    }
                    _ => {
                        eprintln!("ERROR: --max-players requires a positive integer.");
                        std::process::exit(1);
                    }
                }
            }
            "--plots" => {
                show_plots = true;
                i += 1;
            }
            "--json" => {
                json_output = true;
                i += 1;
            }
            other => {
                eprintln!("ERROR: Unknown argument {:?}", other);
                std::process::exit(1);
            }
        }
    }

    let types_path = match types_path {
        Some(p) => p,
        None => {
            eprintln!("ERROR: --types <types.json> is required (game-type member tables).");
            std::process::exit(1);
        }
    };

    let types = match fs::read_to_string(types_path) {
        Ok(json) => match TypeTable::from_json(&json) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("ERROR: Failed to load type tables from {}", types_path);
                eprintln!("  {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("ERROR: Failed to read {}", types_path);
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    if !json_output {
        println!("Reading save file: {}", save_path);
        println!("{}", "=".repeat(60));
    }

    let mut save = match SaveFile::open(save_path, ctx, types) {
        Ok(save) => save,
        Err(e) => {
            eprintln!("\nERROR: Failed to read save file");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    if json_output {
        let doc = match json_summary(&mut save) {
            Ok(doc) => doc,
            Err(e) => {
                eprintln!("ERROR: Failed to decode save file");
                eprintln!("  {}", e);
                std::process::exit(1);
            }
        };
        match serde_json::to_string_pretty(&doc) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("ERROR: Failed to serialize summary");
                eprintln!("  {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let layout = save.file_layout();
    println!("\nFile Layout:");
    println!("  Raw size: {} bytes", layout.raw_len);
    println!(
        "  Header / compressed / tail: {} / {} / {} bytes",
        layout.header_len, layout.compressed_len, layout.tail_len
    );
    println!("  Logical buffer: {} bytes", layout.logical_len);
    println!("  Compression ratio: {:.2}", layout.compression_ratio());

    let summary = save
        .version()
        .and_then(|version| {
            println!("\nSave Information:");
            println!("  Format version: {}", version);
            let turn = save.current_turn()?;
            println!("  Current turn: {}", turn);
            let (w, h) = save.map_size()?;
            println!("  Map: {}x{} plots", w, h);
            Ok(())
        })
        .and_then(|_| {
            let settings = save.settings()?;
            println!("\nSettings:");
            println!("  Game name: {}", settings.game_name);
            println!("  Map script: {}", settings.map_script);
            println!(
                "  Speed: {}",
                settings.game_speed.name.as_deref().unwrap_or("?")
            );
            println!(
                "  Difficulty: {}",
                settings.handicap.name.as_deref().unwrap_or("?")
            );
            println!("  Civs: {}", settings.num_civs);
            Ok(())
        })
        .and_then(|_| {
            let state = save.game_state()?;
            println!("\nGame State:");
            println!("  Total cities: {}", state.total_cities);
            println!("  Total population: {}", state.total_population);
            println!("  Scores: {:?}", state.scores);
            Ok(())
        })
        .and_then(|_| {
            let players = save.players()?;
            println!("\nPlayers:");
            for player in players.values() {
                println!(
                    "  {}. {} ({}) - score {}, {} cities, {} plots",
                    player.idx,
                    player.name,
                    player.civ.name.as_deref().unwrap_or("?"),
                    player.score,
                    player.cities.len(),
                    player.owned_plots
                );
            }
            Ok(())
        });

    if let Err(e) = summary {
        eprintln!("\nERROR: Failed to decode save file");
        eprintln!("  {}", e);
        std::process::exit(1);
    }

    if show_plots {
        match save.plots() {
            Ok(plots) => {
                println!("\nPlots:");
                println!("  Decoded: {}", plots.len());
                println!("  Parse state: {:?}", save.parse_state());
                if save.parse_state() == ParseState::Partial {
                    if let Some(diag) = save.plot_diagnostics() {
                        println!(
                            "  Scan stopped at offset {} after {}/{} plots",
                            diag.offset, diag.plots_decoded, diag.plots_expected
                        );
                        println!("  Last good plot: {:?}", diag.last_good);
                        println!("  Cause: {}", diag.error);
                    }
                }
            }
            Err(e) => {
                eprintln!("\nERROR: Plot scan failed");
                eprintln!("  {}", e);
                std::process::exit(1);
            }
        }
    }

    println!("\n{}", "=".repeat(60));
    println!("Done.");
}

fn json_summary(
    save: &mut SaveFile<TypeTable>,
) -> civ4save_reader::Result<serde_json::Value> {
    let settings = save.settings()?.clone();
    let game_state = save.game_state()?.clone();
    let players = save.players()?.clone();
    Ok(serde_json::json!({
        "settings": settings,
        "game_state": game_state,
        "players": players,
    }))
}
