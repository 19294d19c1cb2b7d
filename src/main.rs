use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tumor_classifier::{
    config::{ClassLabels, Config, DEFAULT_LABELS},
    web::serve,
};

#[derive(Parser)]
#[command(name = "tumor-classifier")]
#[command(about = "Brain tumor MRI classification service")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0:8000")]
    bind: String,

    /// Path to the ONNX classification model
    #[arg(long, default_value = "models/brain_tumor_vgg16.onnx")]
    model: String,

    /// Class labels in training index order
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_LABELS.map(String::from))]
    labels: Vec<String>,

    /// Number of worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// ONNX Runtime intra-op threads
    #[arg(long)]
    intra_threads: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable development mode
    #[arg(long)]
    dev: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting brain tumor classification service...");
    tracing::info!("Bind address: {}", args.bind);
    tracing::info!("Model path: {}", args.model);

    let labels = ClassLabels::new(args.labels)?;
    let config = Config::new(
        args.bind,
        args.model,
        labels,
        args.workers,
        args.intra_threads,
        args.dev,
    )?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()?;

    runtime.block_on(serve(config))?;

    Ok(())
}
