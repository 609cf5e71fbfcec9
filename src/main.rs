use burn::backend::{Autodiff, NdArray};
use dotenv::dotenv;
use gridcem::{CemConfig, train};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

type TrainBackend = Autodiff<NdArray>;

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gridcem=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let config = CemConfig::from_env()?;
    tracing::info!("Configuration: {:?}", config);

    let history = train::<TrainBackend>(config, Default::default())?;

    if let Some(best) = history.best() {
        tracing::info!(
            "Best round {}: mean_reward={:.3}, elite_threshold={:.3}",
            best.round,
            best.mean_reward,
            best.elite_threshold
        );
    }
    if let Some(last) = history.last() {
        tracing::info!(
            "Final round {}: mean_reward={:.3}, elite_threshold={:.3}",
            last.round,
            last.mean_reward,
            last.elite_threshold
        );
    }

    Ok(())
}
