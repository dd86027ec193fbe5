//! `cpack` -- restore ComfyUI workspaces from pack archives and run their
//! workflows.
//!
//! # Environment variables
//!
//! | Variable     | Required | Default            | Description                                  |
//! |--------------|----------|--------------------|----------------------------------------------|
//! | `CPACK_HOME` | no       | `$HOME/.comfypack` | Model store, default workspace, digest cache |
//! | `RUST_LOG`   | no       | `cpack=info`       | Log filter                                   |

mod commands;
mod config;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Cli;

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "cpack=info";

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match commands::dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "cpack failed");
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
