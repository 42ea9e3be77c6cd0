mod app;
mod input;
mod settings;

use app::App;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = settings::load_settings()?;
    let app = App::new(settings)?;
    app.run()?;

    Ok(())
}
