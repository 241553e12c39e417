//! CLI for stroke screening.
//!
//! Usage:
//!   stroke-screen face <image> --name 홍길동          # Human-readable output
//!   stroke-screen face <image> --json                 # JSON output
//!   stroke-screen arm --start a.json --end b.json     # Pre-extracted hand keypoints
//!   stroke-screen inspect face                        # Show the resolved model

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use stroke_screen::{
    Config, ErtDetector, HandPair, KeypointSet, LandmarkDetector, Modality, ModelResolver, Outcome,
    Payload, Pipeline, Point, ProposalParams, Raster, Subject,
};

#[derive(Parser, Debug)]
#[command(name = "stroke-screen")]
#[command(author, version, about = "Face and arm stroke screening", long_about = None)]
struct Args {
    /// Model tree root (overrides config and STROKE_MODELS_ROOT)
    #[arg(long, global = true)]
    models_root: Option<PathBuf>,

    /// JSON config file (default: built-in defaults plus STROKE_* variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Screen a face photograph for facial palsy
    Face {
        /// Input image file
        image: PathBuf,

        /// Display name used in the explanation
        #[arg(long)]
        name: Option<String>,

        /// Face region model path
        #[arg(long, default_value = "seeta_fd_frontal_v1.0.bin")]
        detector: PathBuf,

        /// Face mesh landmark model path
        #[arg(long, default_value = "face_mesh_ert.bin.bz2")]
        landmarks: PathBuf,

        /// Minimum face size for detection
        #[arg(long, default_value = "20")]
        min_face_size: u32,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Screen arm drift from hand keypoints in a start and an end pose
    Arm {
        /// Start pose keypoints (JSON: {"left": [[x, y], ...], "right": null})
        #[arg(long)]
        start: PathBuf,

        /// End pose keypoints
        #[arg(long)]
        end: PathBuf,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Resolve a modality's configured model and describe it
    Inspect {
        /// face, arm or speech
        modality: String,

        /// Model version (default: the configured one)
        #[arg(long)]
        version: Option<String>,
    },
}

/// Hand keypoints as written by an external hand tracker.
#[derive(Deserialize, Debug)]
struct HandFile {
    left: Option<Vec<[f64; 2]>>,
    right: Option<Vec<[f64; 2]>>,
}

impl HandFile {
    fn into_pair(self) -> HandPair {
        let to_set = |points: Vec<[f64; 2]>| {
            KeypointSet::new(points.into_iter().map(|[x, y]| Point::new(x, y)).collect())
        };
        HandPair {
            left: self.left.map(to_set),
            right: self.right.map(to_set),
        }
    }
}

#[derive(Serialize)]
struct ModelInfo {
    modality: Modality,
    version: String,
    directory: String,
    source: String,
    features: usize,
    scaler: String,
    degraded: bool,
}

/// Face detector that never finds anything; arm runs never call it.
struct NoFace;

impl LandmarkDetector for NoFace {
    fn detect(&self, _image: &Raster) -> stroke_screen::Result<Vec<Subject>> {
        Ok(Vec::new())
    }
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> stroke_screen::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };
    if let Some(root) = &args.models_root {
        config.models_root = root.clone();
    }
    Ok(config)
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&args)?;
    log::debug!("Models root: {}", config.models_root.display());

    match args.command {
        Command::Face {
            image,
            name,
            detector,
            landmarks,
            min_face_size,
            json,
            output,
        } => {
            let params = ProposalParams {
                min_face_size,
                ..ProposalParams::default()
            };
            let detector = ErtDetector::load(&detector, &landmarks, &params)?;
            log::info!("Landmark model has {} points", detector.num_landmarks());

            let pipeline = Pipeline::new(config, Box::new(detector));
            let bytes = std::fs::read(&image)?;
            let outcome = pipeline.run("face", Payload::Image(&bytes), name.as_deref())?;
            emit(&outcome, json, output.as_deref())
        }
        Command::Arm {
            start,
            end,
            json,
            output,
        } => {
            let start = read_hands(&start)?;
            let end = read_hands(&end)?;
            let pipeline = Pipeline::new(config, Box::new(NoFace));
            let outcome = pipeline.run_arm_keypoints(&start, &end)?;
            emit(&outcome, json, output.as_deref())
        }
        Command::Inspect { modality, version } => {
            let modality: Modality = modality.parse()?;
            let version = version.unwrap_or_else(|| config.version(modality).to_string());
            let resolver = ModelResolver::new(config.models_root.clone());
            let bundle = resolver.resolve(modality, &version)?;

            let info = ModelInfo {
                modality,
                version: bundle.version.clone(),
                directory: bundle.dir.display().to_string(),
                source: bundle.source.to_string(),
                features: bundle.manifest.len(),
                scaler: if bundle.scaler.is_passthrough() {
                    "passthrough".to_string()
                } else {
                    format!("{} features", bundle.scaler.n_features().unwrap_or_default())
                },
                degraded: bundle.is_degraded(),
            };
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
    }
}

fn read_hands(path: &Path) -> Result<HandPair, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let file: HandFile = serde_json::from_str(&text)?;
    Ok(file.into_pair())
}

fn emit(outcome: &Outcome, json: bool, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let output_str = if json {
        serde_json::to_string_pretty(outcome)?
    } else {
        format_human_readable(outcome)
    };

    if let Some(path) = output {
        std::fs::write(path, &output_str)?;
        log::info!("Output written to {}", path.display());
    } else {
        println!("{}", output_str);
    }
    Ok(())
}

fn format_human_readable(outcome: &Outcome) -> String {
    let mut s = String::new();

    s.push_str(&format!("Modality: {}\n", outcome.modality));
    s.push_str(&format!(
        "Model: {} ({})\n",
        outcome.model_version, outcome.model_source
    ));
    s.push_str(&format!(
        "Result: {} (p={:.4})\n",
        if outcome.is_abnormal() { "abnormal" } else { "normal" },
        outcome.probability
    ));
    s.push_str(&format!("\n{}\n", outcome.explanation));

    s.push_str(&format!("\nFeatures ({}):\n", outcome.features.len()));
    for (name, value) in outcome.features.iter() {
        s.push_str(&format!("  {name:<28} {value}\n"));
    }

    s
}
