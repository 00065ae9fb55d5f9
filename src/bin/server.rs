//! Server binary: wires configuration, logging, the `mio` reactor, the
//! event loop shim, and a fresh keyspace together, then runs forever.

use std::net::SocketAddr;
use std::process::ExitCode;

use keyspace_core::config::Config;
use keyspace_core::event_loop::EventLoop;
use keyspace_core::reactor::MioReactor;

fn main() -> ExitCode {
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            log::error!("invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    let addr = SocketAddr::new(config.bind_addr, config.port);
    log::info!("binding on {addr} (backlog {})", config.backlog);

    let reactor = match MioReactor::bind(addr) {
        Ok(reactor) => reactor,
        Err(err) => {
            log::error!("failed to bind {addr}: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = EventLoop::new(reactor).run() {
        log::error!("event loop terminated: {err}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
