use clap::Parser;
use voxkb_cli::{Cli, commands};
use voxkb_telemetry::TelemetryOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    voxkb_telemetry::init_with_options(
        TelemetryOptions::new("voxkb")
            .with_default_filter("warn,voxkb_rag=info")
            .with_json(cli.log_json),
    )?;

    commands::run(cli).await
}
