// ----------------------------------- CLI -----------------------------------
use clap::Parser;
use std::path::PathBuf;

use sss::Error;
use sss::config::read_config_file;
use sss::image::Image;
use sss::scanner::{ProjDataInfo, subsample_projdata_info};
use sss::simulate::{SimulatorInputs, SimulatorRegistry};
use sss::subsample::subsample_image;
use sss::utils::timing::Progress;

#[derive(Parser, Debug, Clone)]
#[command(name = "simulate_scatter",
          about = "One pass of the single-scatter simulation, without tail fitting")]
pub struct Cli {

    /// Configuration file (TOML); the activity estimate is taken from
    /// files.initial_activity_image
    #[arg(short, long)]
    pub config: PathBuf,

    /// Where to write the simulated scatter sinograms
    #[arg(short, long, default_value = "simulated_scatter.pd")]
    pub output: PathBuf,

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

    let mut timer = Progress::new();
    let config = read_config_file(args.config)?;

    timer.start("loading images");
    let atten_image = Image::from_raw_file(&config.files.atten_image)?;
    let activity_path = config.files.initial_activity_image.as_ref()
        .ok_or("simulate_scatter needs files.initial_activity_image")?;
    let activity_image = Image::from_raw_file(activity_path)?;
    timer.done();

    timer.start("reducing the geometry");
    let scanner = config.scanner;
    let full_info = ProjDataInfo::new_full(scanner);
    let sub_dets  = config.simulation.sub_num_dets_per_ring.unwrap_or(scanner.num_dets_per_ring);
    let sub_rings = config.simulation.sub_num_rings.unwrap_or(scanner.num_rings);
    let template = subsample_projdata_info(&full_info, sub_dets, sub_rings)?.ssrb();

    let (sub_atten, sub_activity) =
        if config.simulation.zoom_xy > 1.0 || config.simulation.zoom_z > 1.0 {
            (subsample_image(&atten_image, config.simulation.zoom_xy,
                             config.simulation.zoom_z, None)?,
             subsample_image(&activity_image, config.simulation.zoom_xy,
                             config.simulation.zoom_z, None)?)
        } else {
            (atten_image, activity_image)
        };
    timer.done();

    let mut simulator = SimulatorRegistry::default().create(&config.simulation, SimulatorInputs {
        template,
        attenuation_image: sub_atten.clone(),
        density_image_for_scatter_points: sub_atten,
    })?;
    println!("method: {}", simulator.method_info());

    let sampled = simulator.sample_scatter_points()?;
    println!("sampled {sampled} scatter points");

    simulator.set_activity_image(sub_activity);
    timer.start("simulating");
    let (scatter, total) = simulator.process_data()?;
    timer.done_with_message(&format!("simulated scatter total {total:.6e}"));

    scatter.to_file(&args.output)?;
    println!("wrote {}", args.output.display());
    Ok(())
}
