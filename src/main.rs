use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
use warp::Filter;

mod args;
mod auth;
mod backend;
mod flash;
mod pages;
mod reply;
mod routes;
mod sessions;
mod site;
mod sync;
mod time;
mod user;

#[cfg(test)]
mod mock;

use args::Args;
use backend::Backend;
use site::Site;
use sync::{ContentSync, GitPull};

#[tokio::main]
async fn main() -> ExitCode {
    if std::env::var_os("RUST_LOG").is_none() {
        pretty_env_logger::formatted_builder()
            .parse_filters("info")
            .init();
    } else {
        pretty_env_logger::init();
    }

    let args = Args::parse();
    let addr = match args.addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("invalid address: {e}");
            return ExitCode::FAILURE;
        }
    };

    let backend = Backend::new(args.data_dir()).await;
    let site = match Site::new(backend, args.site_config()).await {
        Ok(site) => Arc::new(site),
        Err(e) => {
            error!("couldn't start: {e:?}");
            return ExitCode::FAILURE;
        }
    };

    let git = GitPull::new(args.content_dir().clone(), args.remote().to_string());
    let sync = Arc::new(ContentSync::new(
        Arc::new(git),
        args.sync_timeout(),
        args.webhook_secret(),
    ));
    if sync.is_open() {
        warn!("no --webhook-secret given, anyone who can reach /webhook can trigger a pull");
    }

    let routes = routes::routes(site, sync, args.content_dir().clone(), args.secure())
        .with(warp::log("mainsite"));

    info!("listening on {addr}");
    warp::serve(routes).run(addr).await;

    ExitCode::SUCCESS
}
