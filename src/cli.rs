use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use memorability_nn::{context_window, ContextWindowSpec, Matrix, ModelInput, ModelSpec, RegressionReport, SavedModel};

#[derive(Parser, Debug)]
#[command(
    name = "memorability-nn",
    version,
    about = "Build, inspect and run audio memorability regressors."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a model from a JSON spec and save its weights.
    Init {
        #[arg(long)]
        spec: String,
        #[arg(long)]
        out: String,
    },
    /// Print the architecture summary of a saved model.
    Describe {
        #[arg(long)]
        model: String,
    },
    /// Run an evaluation-mode forward pass over a JSON input batch.
    Predict {
        #[arg(long)]
        model: String,
        #[arg(long)]
        input: String,
        /// JSON array of labels, one per example.
        #[arg(long)]
        labels: Option<String>,
    },
    /// Expand a JSON frame matrix into context windows.
    Window {
        #[arg(long)]
        input: String,
        #[arg(long, default_value_t = 0)]
        left: usize,
        #[arg(long, default_value_t = 0)]
        right: usize,
        /// Write the result here instead of stdout.
        #[arg(long)]
        out: Option<String>,
    },
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Command::Init { spec, out } => init(&spec, &out),
            Command::Describe { model } => describe(&model),
            Command::Predict { model, input, labels } => predict(&model, &input, labels.as_deref()),
            Command::Window { input, left, right, out } => window(&input, left, right, out.as_deref()),
        }
    }
}

fn init(spec_path: &str, out: &str) -> Result<()> {
    let spec = ModelSpec::load_json(spec_path).with_context(|| format!("loading spec {spec_path}"))?;
    let saved = spec.build().with_context(|| format!("building model `{}`", spec.name))?;
    for line in saved.model.describe() {
        info!("{line}");
    }
    saved.save_json(out).with_context(|| format!("writing {out}"))?;
    println!("Saved `{}` ({} parameters) to {out}", saved.name, saved.model.num_parameters());
    Ok(())
}

fn describe(model_path: &str) -> Result<()> {
    let saved = SavedModel::load_json(model_path).with_context(|| format!("loading model {model_path}"))?;
    println!("{}", saved.name);
    if let Some(d) = &saved.description {
        println!("{d}");
    }
    for line in saved.model.describe() {
        println!("{line}");
    }
    Ok(())
}

fn predict(model_path: &str, input_path: &str, labels_path: Option<&str>) -> Result<()> {
    let mut saved = SavedModel::load_json(model_path).with_context(|| format!("loading model {model_path}"))?;
    let input: ModelInput = read_json(input_path)?;
    let predictions = saved.model.predict(&input).context("forward pass")?;
    for row in &predictions.data {
        let cells: Vec<String> = row.iter().map(|v| format!("{v:.6}")).collect();
        println!("{}", cells.join(","));
    }

    if let Some(path) = labels_path {
        let labels: Vec<f64> = read_json(path)?;
        let report = RegressionReport::from_predictions(&predictions, &labels)
            .context("scoring predictions against labels")?;
        info!(samples = report.samples, mse = report.mse, mae = report.mae, pearson = ?report.pearson, "evaluation");
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn window(input_path: &str, left: usize, right: usize, out: Option<&str>) -> Result<()> {
    let rows: Vec<Vec<f64>> = read_json(input_path)?;
    let frames = Matrix::from_rows(rows).context("frame matrix")?;
    let windows = context_window(&frames, ContextWindowSpec::new(left, right));
    info!(frames = frames.rows, windows = windows.rows, width = windows.cols, "context window");
    let json = serde_json::to_string(&windows.data)?;
    match out {
        Some(path) => std::fs::write(path, json).with_context(|| format!("writing {path}"))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {path}"))?;
    serde_json::from_reader(std::io::BufReader::new(file)).with_context(|| format!("parsing {path}"))
}
