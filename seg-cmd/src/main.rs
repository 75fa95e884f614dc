#![recursion_limit = "256"]

use std::path::{Path, PathBuf};

use anyhow::Context;
use burn::{
    backend::Autodiff,
    module::Module,
    prelude::{Backend, Config},
};
use clap::{Parser, Subcommand, ValueEnum};
use network::NetworkConfig;
use tracing_subscriber::EnvFilter;

#[cfg(not(feature = "wgpu"))]
type MainBackend = burn::backend::NdArray<f32>;
#[cfg(feature = "wgpu")]
type MainBackend = burn::backend::Wgpu;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Preset {
    #[value(name = "56")]
    FcDenseNet56,
    #[value(name = "67")]
    FcDenseNet67,
    #[value(name = "103")]
    FcDenseNet103,
}

/// Inspect FC-DenseNet segmentation networks.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Architecture preset
    #[arg(long, value_enum, default_value = "56")]
    preset: Preset,

    /// JSON network config, takes precedence over the preset and the channel/class counts
    #[arg(long)]
    config: Option<PathBuf>,

    /// Input image channels
    #[arg(long, default_value_t = 3)]
    channels: usize,

    /// Number of classes
    #[arg(long, default_value_t = 2)]
    classes: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the layer schedule, the channels of every stage and the parameter count
    Summary,
    /// Measure the receptive field radius of a freshly initialized network
    Radius {
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Save the resolved network config as JSON
    WriteConfig { path: PathBuf },
}

impl Args {
    fn network(&self) -> anyhow::Result<NetworkConfig> {
        let network = match &self.config {
            Some(path) => NetworkConfig::load(path)
                .map_err(|e| anyhow::anyhow!("Failed to load {}: {e}", path.display()))?,
            None => {
                let preset = match self.preset {
                    Preset::FcDenseNet56 => NetworkConfig::fc_densenet56,
                    Preset::FcDenseNet67 => NetworkConfig::fc_densenet67,
                    Preset::FcDenseNet103 => NetworkConfig::fc_densenet103,
                };
                preset(self.channels, self.classes)
            }
        };
        network.validate()?;
        Ok(network)
    }
}

fn summary(network: &NetworkConfig, device: &<MainBackend as Backend>::Device) -> anyhow::Result<()> {
    let schedule = network.schedule()?;
    let plan = network.channel_plan()?;
    let model = network.init::<MainBackend>(device)?;

    println!(
        "{}: {} input channels, {} classes",
        network.name, network.input_channels, network.num_classes
    );
    println!("Layers per dense block: {:?}", schedule.as_slice());
    println!("Stem: {} filters", plan.stem);
    for (i, stage) in plan.encoder.iter().enumerate() {
        println!(
            "Encoder {i}: {} layers, {} -> {} channels",
            stage.layers, stage.input, stage.output
        );
    }
    println!(
        "Bottleneck: {} layers on {} channels, {} new",
        schedule.bottleneck(),
        plan.bottleneck_input,
        plan.bottleneck_grown
    );
    for (i, stage) in plan.decoder.iter().enumerate() {
        println!(
            "Decoder {i}: up {} -> {}, skip {}, {} layers on {} channels, {} new",
            stage.upsample_in, stage.upsample_out, stage.skip, stage.layers, stage.input, stage.grown
        );
    }
    println!("Head: {} -> {} classes", plan.head_input, network.num_classes);
    println!("Inputs must be multiples of {}", network.size_factor());
    println!("Parameters: {}", model.num_params());
    Ok(())
}

fn radius(
    network: &NetworkConfig,
    seed: Option<u64>,
    device: &<MainBackend as Backend>::Device,
) -> anyhow::Result<()> {
    if let Some(seed) = seed {
        <Autodiff<MainBackend> as Backend>::seed(seed);
    }
    let model = network.init::<Autodiff<MainBackend>>(device)?;
    let radius = model.estimate_radius(network.radius, device);
    println!("Theoretical radius: {}", network.radius);
    println!("Measured radius: {radius}");
    Ok(())
}

fn write_config(network: &NetworkConfig, path: &Path) -> anyhow::Result<()> {
    network
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Wrote {} config to {}", network.name, path.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let network = args.network()?;
    let device = Default::default();

    match &args.command {
        Command::Summary => summary(&network, &device),
        Command::Radius { seed } => radius(&network, *seed, &device),
        Command::WriteConfig { path } => write_config(&network, path),
    }
}
