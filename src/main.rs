use clap::Parser as _;

/// Entry point for the ecs-sd file_sd adapter.
///
/// Initializes logging, parses the command line and runs the discovery
/// loop until interrupted. Configuration errors abort startup.
///
/// # Examples
///
/// ```bash
/// ecs-sd --config.file config/ecs_sd_config.yml --output.file ecs.json
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    ecs_sd::run(ecs_sd::Options::parse()).await
}
