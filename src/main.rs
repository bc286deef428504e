use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use log::info;
use rand::{rngs::StdRng, SeedableRng};

use digitnet::{
    data::image_to_input, train_loop, ActivationFunction, Dataset, Network, TrainConfig,
};

/// Train and run a feedforward network on MNIST-style digit images.
#[derive(Parser)]
#[command(name = "digitnet", version, about)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a new network and save it in the binary model format.
    Train(TrainArgs),
    /// Report accuracy of a saved model on a labelled IDX set.
    Test {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        images: PathBuf,
        #[arg(long)]
        labels: PathBuf,
        /// The model was trained with sigmoid hidden layers.
        #[arg(long)]
        sigmoid: bool,
    },
    /// Classify a single image file.
    Predict {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        image: PathBuf,
        /// Side length the image is resized to before flattening.
        #[arg(long, default_value_t = 28)]
        size: u32,
        #[arg(long)]
        sigmoid: bool,
    },
}

#[derive(Args)]
struct TrainArgs {
    #[arg(long)]
    images: PathBuf,
    #[arg(long)]
    labels: PathBuf,
    /// JSON file with hyperparameters; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Comma-separated layer widths, e.g. 784,128,64,10.
    #[arg(long, value_delimiter = ',')]
    layers: Option<Vec<usize>>,
    #[arg(long)]
    epochs: Option<usize>,
    #[arg(long)]
    batch_size: Option<usize>,
    #[arg(long)]
    learning_rate: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,
    /// Use sigmoid instead of ReLU between hidden layers.
    #[arg(long)]
    sigmoid: bool,
    /// Binary model output path. The resolved training config is written
    /// next to it with a `.config.json` extension.
    #[arg(long, default_value = "mnist_model.dat")]
    out: PathBuf,
    /// Also write a JSON export of the trained network.
    #[arg(long)]
    json: Option<PathBuf>,
    /// Labelled hold-out set evaluated after training.
    #[arg(long, requires = "test_labels")]
    test_images: Option<PathBuf>,
    #[arg(long, requires = "test_images")]
    test_labels: Option<PathBuf>,
}

fn hidden(sigmoid: bool) -> ActivationFunction {
    if sigmoid {
        ActivationFunction::Sigmoid
    } else {
        ActivationFunction::ReLU
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Command::Train(args) => train(args),
        Command::Test { model, images, labels, sigmoid } => {
            let network = Network::load_model_with(&model, hidden(sigmoid))?;
            let data = Dataset::load(&images, &labels)?;
            report(&network, &data)
        }
        Command::Predict { model, image, size, sigmoid } => {
            let network = Network::load_model_with(&model, hidden(sigmoid))?;
            let input = image_to_input(&image, size, size)?;
            let output = network.predict(&input)?;
            println!("Predicted digit: {}", output.argmax());
            for (class, p) in output.as_slice().iter().enumerate() {
                println!("  {}: {:.4}", class, p);
            }
            Ok(())
        }
    }
}

/// File-based config with command-line overrides applied on top.
fn resolve_config(args: &TrainArgs) -> Result<TrainConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => TrainConfig::load_json(path)?,
        None => TrainConfig::default(),
    };
    if let Some(layers) = &args.layers {
        config.network.layer_sizes = layers.clone();
    }
    if args.sigmoid {
        config.network.hidden_activation = ActivationFunction::Sigmoid;
    }
    config.epochs = args.epochs.unwrap_or(config.epochs);
    config.batch_size = args.batch_size.unwrap_or(config.batch_size);
    config.learning_rate = args.learning_rate.unwrap_or(config.learning_rate);
    config.seed = args.seed.or(config.seed);
    config.validate()?;
    Ok(config)
}

fn config_path(out: &Path) -> PathBuf {
    out.with_extension("config.json")
}

fn train(args: TrainArgs) -> Result<(), Box<dyn Error>> {
    let config = resolve_config(&args)?;

    let data = Dataset::load(&args.images, &args.labels)?;
    info!("loaded {} training samples of width {}", data.len(), data.input_size());

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut network = Network::from_spec(&config.network, &mut rng)?;
    info!(
        "training {:?} ({} hidden) for {} epochs, batch size {}, learning rate {}",
        network.layer_sizes(),
        network.hidden_activation(),
        config.epochs,
        config.batch_size,
        config.learning_rate
    );

    train_loop(&mut network, &data.inputs, &data.labels, &config, &mut rng)?;

    network.save_model(&args.out)?;
    let config_out = config_path(&args.out);
    config.save_json(&config_out)?;
    info!("wrote training config to {}", config_out.display());
    if let Some(path) = &args.json {
        network.save_json(path)?;
    }

    if let (Some(images), Some(labels)) = (&args.test_images, &args.test_labels) {
        report(&network, &Dataset::load(images, labels)?)?;
    }
    Ok(())
}

fn report(network: &Network, data: &Dataset) -> Result<(), Box<dyn Error>> {
    let eval = network.evaluate(&data.inputs, &data.labels)?;
    println!("{} out of {} correct.", eval.correct, eval.total);
    println!("Accuracy: {:.2}%", eval.accuracy() * 100.0);
    Ok(())
}
