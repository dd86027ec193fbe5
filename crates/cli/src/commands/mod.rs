//! Subcommand implementations.

mod describe;
mod models;
mod pack;
mod run;
mod unpack;

use cpack_core::home::CpackHome;
use cpack_models::{DigestCache, HttpDownloader, ModelResolver, ModelStore, TerminalInput};

use crate::config::{Cli, Command};

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let global = cli.global;
    match cli.command {
        Command::Pack {
            workflow_api,
            workflow,
            workspace,
            output,
        } => pack::execute(&global, &workflow_api, workflow.as_deref(), workspace, &output).await,
        Command::Unpack {
            pack,
            workspace,
            models: model_args,
        } => unpack::execute(&global, &pack, workspace, &model_args).await,
        Command::Models {
            snapshot,
            workspace,
            models: model_args,
        } => models::execute(&global, &snapshot, workspace, &model_args).await,
        Command::Describe {
            workflow,
            json_schema,
        } => describe::execute(&workflow, json_schema),
        Command::Run {
            workflow,
            workspace,
            inputs,
            inputs_file,
            output_dir,
            input_dir,
            timeout,
        } => {
            run::execute(
                &global,
                run::RunArgs {
                    workflow,
                    workspace,
                    inputs,
                    inputs_file,
                    output_dir,
                    input_dir,
                    timeout,
                },
            )
            .await
        }
    }
}

/// Resolver over the home's model store, prompting on the terminal.
fn terminal_resolver(home: &CpackHome) -> ModelResolver<TerminalInput, HttpDownloader> {
    ModelResolver::new(
        ModelStore::new(home.models_dir()),
        DigestCache::load(home.sha_cache_file()),
        TerminalInput,
        HttpDownloader::new(),
    )
}

/// Pretty-print a value as JSON on stdout.
fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
