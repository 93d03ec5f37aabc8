use std::{
    fs,
    io::{self, BufReader},
    path::PathBuf,
};

use atsp_aco::{
    colony::config::{BoundsPolicy, DeadEnd, DepositPolicy, Guidance, InitialTrail},
    colony::Config,
    experiment::{Experiment, Grid, Steps, Summary, Sweep},
    tsplib, Result,
};
use clap::Parser;
use tracing::{error, info, warn, Level};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Opt {
    /// TSPLIB instances with a full weight matrix, or directories of `.atsp` files, else reads from stdin
    files: Vec<PathBuf>,

    /// JSON file with solver parameters, overridden by any flag below
    #[arg(long)]
    config: Option<PathBuf>,

    /// Exponent of the pheromone intensity, `start:end:step` sweeps a range
    #[arg(long)]
    alpha: Option<Steps>,

    /// Exponent of the inverse distance, `start:end:step` sweeps a range
    #[arg(long)]
    beta: Option<Steps>,

    /// Fraction of pheromone that evaporates every iteration, `start:end:step` sweeps a range
    #[arg(long)]
    evaporation_rate: Option<Steps>,

    /// Ratio between the upper and lower pheromone bound per ant, `start:end:step` sweeps a range
    #[arg(long)]
    exploration_factor: Option<Steps>,

    /// Number of ants, one per city by default
    #[arg(long)]
    ants: Option<usize>,

    #[arg(long)]
    iterations: Option<usize>,

    #[arg(long, value_enum)]
    bounds: Option<BoundsPolicy>,

    #[arg(long, value_enum)]
    deposit: Option<DepositPolicy>,

    /// Pheromone deposited per unit of inverse length when all ants deposit
    #[arg(long)]
    deposit_constant: Option<f64>,

    #[arg(long, value_enum)]
    guidance: Option<Guidance>,

    #[arg(long, value_enum)]
    initial_trail: Option<InitialTrail>,

    #[arg(long, value_enum)]
    dead_end: Option<DeadEnd>,

    /// Seed of the first run, later runs add their index
    #[arg(long)]
    seed: Option<u64>,

    /// Number of independent runs
    #[arg(long, default_value_t = 1)]
    runs: usize,

    /// Optimal tour length, looked up for known TSPLIB instances by default
    #[arg(long)]
    optimum: Option<f64>,

    /// Report how many edges of the best tour belong to a minimum arborescence
    #[arg(long)]
    overlap: bool,

    /// Worker threads for tour construction, all cores by default
    #[arg(long)]
    threads: Option<usize>,

    /// Print one JSON summary per line instead of a markdown table
    #[arg(long)]
    json: bool,

    /// Log more, repeat for even more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Opt {
    fn solver_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => serde_json::from_reader(BufReader::new(fs::File::open(path)?))?,
            None => Config::default(),
        };

        macro_rules! apply {
            ($($field: ident),*) => {
                $(
                    if let Some(value) = self.$field {
                        config.$field = value;
                    }
                )*
            };
        }
        apply!(
            iterations,
            bounds,
            deposit,
            deposit_constant,
            guidance,
            initial_trail,
            dead_end
        );
        if self.ants.is_some() {
            config.ants = self.ants;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        Ok(config)
    }

    fn grid(&self) -> Grid {
        Grid {
            alpha: self.alpha,
            beta: self.beta,
            evaporation_rate: self.evaporation_rate,
            exploration_factor: self.exploration_factor,
        }
    }
}

fn main() {
    let opt = Opt::parse();
    tracing_subscriber::fmt()
        .with_max_level(match opt.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        })
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run(&opt) {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run(opt: &Opt) -> Result<()> {
    if let Some(threads) = opt.threads {
        if let Err(err) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            warn!("Keeping the default thread pool: {err}");
        }
    }

    let instances = if opt.files.is_empty() {
        info!("Reading from stdin");
        vec![tsplib::parse(io::stdin().lock())?]
    } else {
        tsplib::instance_paths(&opt.files)?
            .iter()
            .map(|path| tsplib::read(path))
            .collect::<Result<Vec<_>>>()?
    };

    let sweep = Sweep {
        experiment: Experiment {
            config: opt.solver_config()?,
            runs: opt.runs,
            optimum: opt.optimum,
            overlap: opt.overlap,
        },
        grid: opt.grid(),
    };
    let points = sweep.grid.configs(&sweep.experiment.config).len() * instances.len();

    if !opt.json {
        println!("{}", Summary::TABLE_HEADER);
    }
    let best = sweep.run(&instances, |summary| {
        if opt.json {
            println!("{}", serde_json::to_string(summary)?);
        } else {
            println!("{}", summary.table_row());
        }
        Ok(())
    })?;

    match best {
        Some(best) if points > 1 && !opt.json => {
            println!();
            println!("{}", best.best_parameters());
            println!(
                "Best tour: {}",
                best.best
                    .tour
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ")
            );
        }
        Some(_) => {}
        None => warn!("No instances found"),
    }
    Ok(())
}
