// Copyright 2021 Sean Gillespie.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use colorclear::classify::{classify, ClassifyError};
use colorclear::grid::{with_move_marked, Cell, Grid, GridError};
use colorclear::seed::{generate_board, SeedError};
use colorclear::{solve, DEFAULT_BEAM_WIDTH, DEFAULT_MAX_DEPTH};
use structopt::StructOpt;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Debug, StructOpt)]
#[structopt(name = "colorclear", about = "Parallel beam-search solver for the Former puzzle")]
struct Options {
    /// Beam width: how many candidate boards each worker retains per layer.
    #[structopt(short, long, default_value = "500")]
    width: usize,

    /// Number of worker threads. 0 auto-detects hardware concurrency.
    #[structopt(short, long, default_value = "0")]
    threads: usize,

    /// Maximum search depth (moves).
    #[structopt(short, long, default_value = "63")]
    depth: u32,

    /// Generate a board from a seed string using the Alea PRNG.
    #[structopt(long, name = "SEED")]
    seed: Option<String>,

    /// Classify a board from a screenshot image.
    #[structopt(long, name = "PATH", parse(from_os_str))]
    image: Option<PathBuf>,

    /// Print the solution as a JSON object instead of the human-readable summary.
    #[structopt(long)]
    json: bool,

    /// Print the board before each move, with the cluster about to be clicked marked.
    #[structopt(long)]
    replay: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("--seed and --image are mutually exclusive")]
    ConflictingBoardSources,
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error(transparent)]
    Seed(#[from] SeedError),
}

/// The board printed in the original puzzle's own example file, used when neither
/// `--seed` nor `--image` is given so the binary is runnable with zero arguments.
fn example_grid() -> Grid {
    use Cell::{Blue as B, Green as G, Orange as Y, Pink as R};
    let rows = vec![
        vec![G, Y, Y, R, G, G, R],
        vec![B, R, B, R, R, R, Y],
        vec![G, G, B, Y, G, B, R],
        vec![R, B, R, R, Y, G, G],
        vec![Y, Y, G, B, Y, G, R],
        vec![Y, B, R, Y, Y, B, B],
        vec![R, R, Y, G, Y, G, B],
        vec![G, Y, B, Y, Y, Y, Y],
        vec![R, G, G, B, B, B, Y],
    ];
    Grid::from_rows(&rows).expect("example board has fixed, valid dimensions")
}

fn load_board(options: &Options) -> Result<Grid, CliError> {
    match (&options.seed, &options.image) {
        (Some(_), Some(_)) => Err(CliError::ConflictingBoardSources),
        (Some(seed), None) => Ok(generate_board(seed)?),
        (None, Some(path)) => Ok(classify(path)?),
        (None, None) => Ok(example_grid()),
    }
}

fn run(options: Options) -> anyhow::Result<()> {
    let board = load_board(&options)?;

    let start = Instant::now();
    let solution = solve(&board, options.width, options.threads, options.depth);
    let elapsed = start.elapsed();

    if options.json {
        let json = serde_json::to_string(&solution).expect("BeamSolution always serializes");
        println!("{}", json);
        return Ok(());
    }

    println!("Elapsed time: {:.3}s", elapsed.as_secs_f64());
    println!("Boards analyzed: {}", solution.boards_analyzed);
    if elapsed.as_secs_f64() > 0.0 {
        println!(
            "Boards/sec: {:.1}",
            solution.boards_analyzed as f64 / elapsed.as_secs_f64()
        );
    }
    println!("Duplicates dropped: {}", solution.duplicates_dropped);

    if !solution.solved {
        println!("No solution found within the given constraints.");
    } else {
        println!("Solution found with {} moves.", solution.moves.len());
    }

    let mut board = board;
    for (i, coordinate) in solution.moves.iter().enumerate() {
        let mv = board.cluster_expand(*coordinate);
        println!("move {}: click {} (clears {} cells)", i + 1, coordinate, mv.len());
        if options.replay {
            print!("{}", with_move_marked(&board, &mv));
        }
        board = board.play(&mv);
    }

    Ok(())
}

fn main() -> ExitCode {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let options = Options::from_args();
    match run(options) {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            eprintln!("{:#}", err);
            match err.downcast_ref::<CliError>() {
                Some(CliError::ConflictingBoardSources) => ExitCode::from(1),
                _ => ExitCode::from(2),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_grid_has_sixty_three_occupied_cells() {
        let grid = example_grid();
        assert_eq!(grid.count_occupied(), 63);
    }

    #[test]
    fn seed_and_image_together_is_a_usage_error() {
        let options = Options {
            width: DEFAULT_BEAM_WIDTH,
            threads: 0,
            depth: DEFAULT_MAX_DEPTH,
            seed: Some("x".to_string()),
            image: Some(PathBuf::from("board.png")),
            json: false,
            replay: false,
        };
        assert!(matches!(load_board(&options), Err(CliError::ConflictingBoardSources)));
    }

    #[test]
    fn no_sources_falls_back_to_example_board() {
        let options = Options {
            width: DEFAULT_BEAM_WIDTH,
            threads: 0,
            depth: DEFAULT_MAX_DEPTH,
            seed: None,
            image: None,
            json: false,
            replay: false,
        };
        assert!(load_board(&options).is_ok());
    }
}
