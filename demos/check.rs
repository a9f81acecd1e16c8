use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::eyre;

use aig_verify::aiger::Circuit;
use aig_verify::bdd::BddConfig;
use aig_verify::manager::Manager;
use aig_verify::model::compile;
use aig_verify::reach::{Budget, ImageMethod};
use aig_verify::region::load_region;
use aig_verify::syntax::check_synthesis_shape;
use aig_verify::verify::{check_circuit, validate_circuits, CheckConfig};

#[derive(Debug, Parser)]
#[command(author, version, about = "Symbolic verification of AIGER synthesis results")]
struct Cli {
    /// BDD size (in bits, so the actual size is `2^size` nodes).
    #[arg(long, value_name = "INT", default_value = "20")]
    size: usize,

    /// Computed table size (in bits).
    #[arg(long, value_name = "INT", default_value = "16")]
    cache_size: usize,

    /// Preimage computation.
    #[arg(long, value_enum, default_value = "compose")]
    image: Image,

    /// Wall-clock limit in seconds.
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Maximum number of fixpoint rounds.
    #[arg(long, value_name = "INT")]
    max_rounds: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum Image {
    Compose,
    RelProduct,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check that no error state is reachable
    Safety {
        /// Circuit in ASCII AIGER format
        circuit: PathBuf,
    },

    /// Validate a winning region of a strategy
    Region {
        /// Strategy circuit
        strategy: PathBuf,
        /// Combinational circuit over the strategy latches
        region: PathBuf,
        /// Dump the region BDD in DOT format
        #[arg(long, value_name = "FILE")]
        dot: Option<PathBuf>,
    },

    /// Check a synthesized circuit against the game it solves
    Shape {
        original: PathBuf,
        synthesized: PathBuf,
    },
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let cli = Cli::parse();

    let mut budget = Budget::unlimited();
    if let Some(seconds) = cli.timeout {
        budget = budget.with_timeout(Duration::from_secs(seconds));
    }
    if let Some(rounds) = cli.max_rounds {
        budget = budget.with_max_rounds(rounds);
    }
    let config = CheckConfig {
        bdd: BddConfig::default()
            .with_storage_bits(cli.size)
            .with_cache_bits(cli.cache_size),
        image: match cli.image {
            Image::Compose => ImageMethod::Compose,
            Image::RelProduct => ImageMethod::RelProduct,
        },
        budget,
    };
    log::debug!("config = {:?}", config);

    match cli.command {
        Command::Safety { circuit } => {
            let circuit = Circuit::read(&circuit)?;
            let report = check_circuit(&circuit, &config)?;
            println!("{} (rounds: {})", report.verdict, report.rounds);
            if let Some(witness) = report.witness {
                println!("initial state steps into: {}", witness);
            }
        }

        Command::Region { strategy, region, dot } => {
            let strategy = Circuit::read(&strategy)?;
            let region = Circuit::read(&region)?;
            let verdict = validate_circuits(&strategy, &region, &config)?;
            println!("{}", verdict);

            if let Some(path) = dot {
                let dd = Manager::try_new(config.bdd)?;
                let model = compile(&strategy, &dd)?;
                let w = load_region(&dd, &model, &region)?;
                let text = dd.to_dot(&[&w]).map_err(|e| eyre!("cannot render DOT: {}", e))?;
                std::fs::write(&path, text)?;
                println!("DOT in {}", path.display());
            }
        }

        Command::Shape { original, synthesized } => {
            let original = Circuit::read(&original)?;
            let synthesized = Circuit::read(&synthesized)?;
            check_synthesis_shape(&original, &synthesized)?;
            println!("OK");
        }
    }

    let time_total = time_total.elapsed();
    println!("Done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
