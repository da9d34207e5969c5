//! PISA's operator CLI entry point: parse args, load config, set up
//! logging, build the pipeline, then block until Ctrl-C signals a condvar
//! from the installed `CtrlC` handler.

use std::process;
use std::sync::Arc;

use ethereum_types::Address;
use log::info;
use parking_lot::{Condvar, Mutex};

use pisa::{default_signer, run};
use pisa_provider::fake::FakeProvider;
use pisa_store::MemoryStore;

fn main() {
    let matches = pisa_config::cli().get_matches();

    let config = pisa_config::load(&matches).unwrap_or_else(|e| {
        eprintln!("configuration error: {e}");
        process::exit(2);
    });

    let _logger = pisa_logger::setup_log(&config.log.to_logger_config()).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(2);
    });

    info!(target: "pisa", "starting with rpc_url={} chain_id={}", config.chain.rpc_url, config.chain.chain_id);

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("failed to start async runtime: {e}");
        process::exit(1);
    });

    let exit = Arc::new((Mutex::new(false), Condvar::new()));
    let exit_for_ctrlc = exit.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let (lock, cvar) = &*exit_for_ctrlc;
        *lock.lock() = true;
        cvar.notify_all();
    }) {
        eprintln!("failed to install Ctrl-C handler: {e}");
        process::exit(1);
    }

    let pisa_handle = runtime.block_on(async {
        // No production JSON-RPC provider is implemented (out of scope);
        // wiring runs against the in-process fake until one exists.
        let provider = Arc::new(FakeProvider::new());
        let store: Arc<dyn pisa_store::Store> = Arc::new(MemoryStore::new());
        let signing_address = Address::from_slice(&[0x42; 20]);
        let signer = default_signer(signing_address);

        match run(provider, store, signing_address, signer, &config).await {
            Ok(pisa) => pisa.handle(),
            Err(e) => {
                eprintln!("failed to start: {e}");
                process::exit(1);
            }
        }
    });

    info!(target: "pisa", "running, current head: {:?}", pisa_handle.current_head());

    let (lock, cvar) = &*exit;
    let mut should_exit = lock.lock();
    while !*should_exit {
        cvar.wait(&mut should_exit);
    }

    info!(target: "pisa", "shutting down, last queue depth: {}", pisa_handle.queue_depth());
}
