use std::error::Error;
use std::sync::Arc;

use tracing::{error, info};

use fota_agent::agent::state::State;
use fota_agent::agent::{AgentContext, StateMachine};
use fota_agent::archive::StreamArchiveOpener;
use fota_agent::client::HttpUpdateServer;
use fota_agent::command::ProcessRunner;
use fota_agent::config::{AgentConfigLoader, AgentConfigLoaderFile};
use fota_agent::installmodes::InstallModeRegistry;
use fota_agent::{cli::Cli, logging::Logging};

fn main() -> Result<(), Box<dyn Error>> {
    // init logging singleton
    Logging::try_init()?;

    let cli = Cli::init_fota_agent_cli();

    if cli.print_debug_info() {
        println!("Printing debug info");
        println!("CLI: {:#?}", cli);
        return Ok(());
    }

    // Program must run as root, but should accept simple behaviors such as --version, --help, etc
    #[cfg(unix)]
    if !nix::unistd::Uid::effective().is_root() {
        return Err("Program must run as root".into());
    }

    let config = AgentConfigLoaderFile::new(&cli.get_config_path()).load_config()?;
    info!(
        server = %config.server_address,
        poll_interval = config.poll_interval.as_secs(),
        "configuration loaded"
    );

    let server = HttpUpdateServer::try_new(&config.server_address)?;
    let executor = Arc::new(ProcessRunner::new());
    let registry =
        InstallModeRegistry::with_defaults(executor.clone(), Arc::new(StreamArchiveOpener::new()));
    info!(modes = ?registry.modes(), "install modes registered");

    let context = AgentContext::new(&config, Box::new(server), executor, registry);
    let machine = StateMachine::new(context, State::idle());

    info!("Creating the signal handler");
    ctrlc::set_handler({
        let handle = machine.handle();
        move || handle.stop()
    })
    .map_err(|e| {
        error!("Could not set signal handler: {}", e);
        e
    })?;

    info!("Starting the fota agent");
    machine.run();
    info!("fota agent stopped");

    Ok(())
}
