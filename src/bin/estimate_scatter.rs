// ----------------------------------- CLI -----------------------------------
use clap::Parser;
use std::path::PathBuf;

use sss::Error;
use sss::config::read_config_file;
use sss::estimation::ScatterEstimation;
use sss::recon::ReconstructionRegistry;
use sss::simulate::SimulatorRegistry;
use sss::utils::group_digits;

#[derive(Parser, Debug, Clone)]
#[command(name = "estimate_scatter",
          about = "Iterative model-based scatter estimation for PET data")]
pub struct Cli {

    /// Configuration file (TOML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override the number of scatter iterations from the config file
    #[arg(short, long)]
    pub iterations: Option<usize>,

    #[cfg(not(feature = "serial"))]
    /// Maximum number of rayon threads
    #[arg(short = 'j', long, default_value_t = 4)]
    pub num_threads: usize,
}

// --------------------------------------------------------------------------------

fn main() -> Result<(), Error> {

    let args = Cli::parse();

    #[cfg(not(feature = "serial"))]
    match rayon::ThreadPoolBuilder::new().num_threads(args.num_threads).build_global() {
        Err(e) => println!("{}", e),
        Ok(_)  => println!("Using up to {} threads.", args.num_threads),
    }

    let mut config = read_config_file(args.config)?;
    if let Some(iterations) = args.iterations {
        config.estimation.scatter_iterations = iterations;
    }
    println!("estimating scatter over {} iterations", config.estimation.scatter_iterations);

    let mut estimation = ScatterEstimation::new(config);
    estimation.set_up(&SimulatorRegistry::default(), &ReconstructionRegistry::default())?;
    let output = estimation.process_data()?;

    println!("final scatter estimate: {} bins, total {:.6e}",
             group_digits(output.scatter.info.total_bins()),
             output.scatter.total());
    Ok(())
}
