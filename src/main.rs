// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use cli::{AccessCommands, Cli, Commands, InstanceCommands};
use siteward::db::models::VersionAction;
use siteward::{ManagerConfig, UpdateRequest};

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = ManagerConfig::load(cli.config.as_deref())?;

    match command {
        Commands::Init => commands::cmd_init(&config),

        Commands::Instance(instance_cmd) => match instance_cmd {
            InstanceCommands::Add {
                name,
                web_root,
                access,
                app,
                web_url,
                temp_dir,
                interpreter,
                host,
                port,
                user,
                password_env,
            } => commands::cmd_instance_add(
                &config,
                commands::InstanceSpec {
                    name,
                    web_root,
                    access,
                    app,
                    web_url,
                    temp_dir,
                    interpreter,
                    host,
                    port,
                    user,
                    password_env,
                },
            ),
            InstanceCommands::List { json } => commands::cmd_instance_list(&config, json),
            InstanceCommands::Show { instance, json } => {
                commands::cmd_instance_show(&config, &instance, json)
            }
            InstanceCommands::Remove { instance } => {
                commands::cmd_instance_remove(&config, &instance)
            }
            InstanceCommands::Versions { instance, json } => {
                commands::cmd_instance_versions(&config, &instance, json)
            }
        },

        Commands::Access(AccessCommands::Check { instance, json }) => {
            commands::cmd_access_check(&config, &instance, json)
        }

        Commands::Adopt {
            instance,
            branch,
            source,
            vcs,
            revision,
        } => {
            let mut request = UpdateRequest::new(VersionAction::Create, vcs, branch);
            request.revision = revision;
            commands::cmd_adopt(&config, &instance, &source, request)
        }

        Commands::Verify {
            instance,
            all,
            json,
        } => commands::cmd_verify(&config, &instance, all, json),

        Commands::Update {
            instance,
            branch,
            source,
            vcs,
            upgrade,
            revision,
            lock,
            json,
        } => {
            let action = if upgrade {
                VersionAction::Upgrade
            } else {
                VersionAction::Update
            };
            let mut request = UpdateRequest::new(action, vcs, branch);
            request.revision = revision;
            request.lock_site = lock;
            commands::cmd_update(&config, &instance, &source, request, json)
        }

        Commands::Lock { instance } => commands::cmd_lock(&config, &instance),
        Commands::Unlock { instance } => commands::cmd_unlock(&config, &instance),

        Commands::Manifest {
            instance,
            live,
            data_dirs,
            output,
        } => commands::cmd_manifest(&config, &instance, live, &data_dirs, output.as_deref()),
    }
}
