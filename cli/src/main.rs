use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre;
use graphet_core::{discover_timesteps, formats::params::read_params_report, FnameTemplate};
use tracing::Level;

mod render;

use render::Colormap;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log more, repeat for even more
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the timesteps found in a simulation directory
    Timesteps {
        dir: PathBuf,
        #[arg(short, long, default_value = "flds.tot.%05d")]
        template: FnameTemplate,
    },
    /// Parse a parameter file and print its values
    Params { file: PathBuf },
    /// Register a simulation, aggregate one timestep and summarize it
    Inspect(InspectArgs),
    /// Render one field of one timestep to a PNG heatmap
    Render(RenderArgs),
    /// Stack a Tristan-v2 output directory over several steps
    Stack(StackArgs),
}

#[derive(Args)]
struct SimArgs {
    /// Simulation directory
    dir: PathBuf,
    #[arg(long, default_value = "flds.tot.%05d")]
    fields: FnameTemplate,
    /// Ignore field files, e.g. for particle-only output
    #[arg(long)]
    no_fields: bool,
    #[arg(long)]
    particles: Option<FnameTemplate>,
    /// Defaults to the first timestep found
    #[arg(short, long)]
    step: Option<u32>,
    #[arg(long, default_value_t = 128)]
    width: usize,
    #[arg(long, default_value_t = 128)]
    height: usize,
}

#[derive(Args)]
struct InspectArgs {
    #[command(flatten)]
    sim: SimArgs,
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct RenderArgs {
    #[command(flatten)]
    sim: SimArgs,
    #[arg(short, long)]
    field: String,
    #[arg(short, long, value_enum, default_value_t = Colormap::Viridis)]
    colormap: Colormap,
    /// Pixels per cell
    #[arg(long, default_value_t = 4)]
    scale: u32,
    #[arg(short, long, default_value = "out.png")]
    output: PathBuf,
}

#[derive(Args)]
struct StackArgs {
    dir: PathBuf,
    /// Tristan-v2 input file with the simulation parameters
    #[arg(long)]
    cfg: Option<PathBuf>,
    /// `a..b` (exclusive) or a comma separated list
    #[arg(long, default_value = "0..1", value_parser = parse_steps)]
    steps: Steps,
    /// On-disk axis order
    #[arg(long, default_value = "zyx")]
    axes: String,
    /// Axis indices to swap, e.g. `0,1`
    #[arg(long, value_parser = parse_swap)]
    swap: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Steps(Vec<u32>);

fn parse_steps(s: &str) -> Result<Steps, String> {
    let num = |n: &str| n.trim().parse::<u32>().map_err(|e| format!("{n:?}: {e}"));
    if let Some((a, b)) = s.split_once("..") {
        return Ok(Steps((num(a)?..num(b)?).collect()));
    }
    s.split(',').map(num).collect::<Result<_, _>>().map(Steps)
}

fn parse_swap(s: &str) -> Result<(usize, usize), String> {
    let (a, b) = s
        .split_once(',')
        .ok_or_else(|| format!("expected `i,j`, got {s:?}"))?;
    let num = |n: &str| n.trim().parse::<usize>().map_err(|e| format!("{n:?}: {e}"));
    Ok((num(a)?, num(b)?))
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Timesteps { dir, template } => {
            let steps = discover_timesteps(&dir, &template)?;
            for step in steps {
                println!("{step}");
            }
        }
        Command::Params { file } => {
            let params = read_params_report(&file).map_err(|report| eyre::eyre!("{report:?}"))?;
            for (key, value) in params {
                println!("{key} = {value}");
            }
        }
        Command::Inspect(args) => hdf5_commands::inspect(args).await?,
        Command::Render(args) => hdf5_commands::render(args).await?,
        Command::Stack(args) => hdf5_commands::stack(args)?,
    }

    Ok(())
}

#[cfg(feature = "hdf5")]
mod hdf5_commands {
    use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

    use color_eyre::eyre::{self, eyre};
    use graphet_core::{
        plugin::{tristan_v2::TristanV2, AxisLayout, PluginConfig},
        Data,
    };
    use graphet_lazy_data::{
        Hdf5Backend, MemoryUsage, Simulation, SimulationConfig, SimulationIdx, Simulations,
    };
    use serde::Serialize;

    use super::{InspectArgs, RenderArgs, SimArgs, StackArgs};
    use crate::render::render_png;

    #[derive(Serialize)]
    struct RasterSummary {
        width: usize,
        height: usize,
        min: Option<f64>,
        max: Option<f64>,
    }

    #[derive(Serialize)]
    struct Summary {
        name: String,
        path: PathBuf,
        tsteps: Vec<u32>,
        field_keys: Vec<String>,
        step: u32,
        rasters: BTreeMap<String, RasterSummary>,
        memory: String,
        memory_bytes: MemoryUsage,
    }

    /// Registers the simulation and loads `args.step` on the blocking pool.
    async fn open(
        args: &SimArgs,
    ) -> eyre::Result<(Simulations<Hdf5Backend>, SimulationIdx, Arc<Simulation<Hdf5Backend>>, u32)> {
        let sims = Simulations::new(Hdf5Backend);
        let config = SimulationConfig {
            fields_template: (!args.no_fields).then(|| args.fields.clone()),
            particles_template: args.particles.clone(),
            ..SimulationConfig::new(&args.dir)
        };
        let idx = sims.add(config)?;
        let sim = sims.get(idx)?;
        let step = match args.step {
            Some(step) => step,
            None => *sim
                .tsteps()
                .first()
                .ok_or_else(|| eyre!("No timesteps found in {:?}", args.dir))?,
        };
        sims.load_in_background(idx, step).await?;
        Ok((sims, idx, sim, step))
    }

    pub async fn inspect(args: InspectArgs) -> eyre::Result<()> {
        let (sims, idx, sim, step) = open(&args.sim).await?;

        let mut rasters = BTreeMap::new();
        let field_keys = if sim.config().fields_template.is_some() {
            let set = sim.aggregate(step, args.sim.width, args.sim.height)?;
            for key in set.keys() {
                if let Some(raster) = set.raster(key) {
                    let range = raster.value_range();
                    rasters.insert(
                        key.to_string(),
                        RasterSummary {
                            width: raster.width(),
                            height: raster.height(),
                            min: range.map(|r| r.min),
                            max: range.map(|r| r.max),
                        },
                    );
                }
            }
            sims.field_keys(idx)?
        } else {
            Vec::new()
        };

        if args.json {
            let memory = sims.memory_usage(idx)?;
            let summary = Summary {
                name: sim.name().to_string(),
                path: sim.path().to_path_buf(),
                tsteps: sim.tsteps().to_vec(),
                field_keys,
                step,
                rasters,
                memory: memory.to_string(),
                memory_bytes: memory,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            println!("{sim}");
            for (key, r) in rasters {
                println!("{key}: {}x{}", r.width, r.height);
            }
        }
        Ok(())
    }

    pub async fn render(args: RenderArgs) -> eyre::Result<()> {
        let (sims, idx, _sim, step) = open(&args.sim).await?;
        let raster = sims.raster(idx, step, &args.field, args.sim.width, args.sim.height)?;
        render_png(&raster, args.colormap, args.scale, &args.output)?;
        println!("{}", args.output.display());
        Ok(())
    }

    pub fn stack(args: StackArgs) -> eyre::Result<()> {
        let steps = args.steps.0;
        let first = *steps
            .first()
            .ok_or_else(|| eyre!("No steps requested"))?;
        let config = PluginConfig {
            axes: AxisLayout::new(&args.axes, args.swap)?,
            ..Default::default()
        };
        let plugin = TristanV2::new(&args.dir, args.cfg, first, config);
        let data = Data::new(plugin, steps)?;
        println!("{data}");
        Ok(())
    }
}

#[cfg(not(feature = "hdf5"))]
mod hdf5_commands {
    use color_eyre::eyre;

    use super::{InspectArgs, RenderArgs, StackArgs};

    const NO_HDF5: &str = "graphet was built without HDF5 support, rebuild with `--features hdf5`";

    pub async fn inspect(_args: InspectArgs) -> eyre::Result<()> {
        eyre::bail!(NO_HDF5)
    }

    pub async fn render(_args: RenderArgs) -> eyre::Result<()> {
        eyre::bail!(NO_HDF5)
    }

    pub fn stack(_args: StackArgs) -> eyre::Result<()> {
        eyre::bail!(NO_HDF5)
    }
}
