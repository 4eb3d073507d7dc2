//! stacklift - Entry Point
//!
//! Deploys groups of dependent CloudFormation stacks and reports their changes.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use stacklift::cli::{Args, Commands};
use stacklift::cloud::aws::AwsConnector;
use stacklift::cloud::CloudConnector;
use stacklift::commands::{self, DeployStackOptions};
use stacklift::deploy::waiter::WaitSettings;
use stacklift::logs::{init_logging, LogOptions};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_options = LogOptions {
        log_level: args.log_level,
        json_format: args.json_logs,
    };
    if args.json_logs {
        colored::control::set_override(false);
    }
    if let Err(e) = init_logging(log_options) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match run(args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    let connector: Arc<dyn CloudConnector> = Arc::new(AwsConnector::new());

    match command {
        Commands::ReadConfig(read) => {
            let value = commands::read_config(
                &read.file,
                &read.section,
                &read.key,
                read.default.as_deref(),
                read.parameter,
            )
            .with_context(|| format!("Failed to read {}", read.file.display()))?;
            println!("{}", value);
        }
        Commands::DeployGroup(group) => {
            commands::deploy_group(
                connector,
                &group.config_file,
                &group.group_name,
                WaitSettings::default(),
            )
            .await
            .with_context(|| format!("Failed to deploy group {}", group.group_name))?;
        }
        Commands::DeployTemplate(deploy) => {
            let outcome = commands::deploy_template(
                connector.as_ref(),
                &deploy.config_file,
                &deploy.section,
                &deploy.template_file,
                deploy.function_root,
                deploy.stack_desired_state,
            )
            .await
            .with_context(|| format!("Failed to deploy {}", deploy.section))?;
            info!("\n{}", outcome);
        }
        Commands::DeployStack(deploy) => {
            let stack_name = deploy.stack_name.clone();
            let options = DeployStackOptions {
                stack_name: deploy.stack_name,
                region: deploy.region,
                template_file: deploy.template_file,
                params_file: deploy.params_file,
                role_arn: deploy.role_arn,
                capabilities: deploy.capabilities,
                stack_desired_state: deploy.stack_desired_state,
                changeset_desired_state: deploy.changeset_desired_state,
            };
            let outcome = commands::deploy_stack(connector.as_ref(), options)
                .await
                .with_context(|| format!("Failed to deploy {}", stack_name))?;
            info!("\n{}", outcome);
        }
        Commands::ModuleDir(config) => {
            let module_dir = commands::module_dir(&config.config_file)
                .with_context(|| format!("Failed to read {}", config.config_file.display()))?;
            println!("{}", module_dir.display());
        }
        Commands::UploadArchive(upload) => {
            let store = connector.object_store().await?;
            commands::upload_archive(store.as_ref(), &upload.archive_url, &upload.archive_path)
                .await
                .with_context(|| format!("Failed to upload {}", upload.archive_path.display()))?;
        }
        Commands::ExtractArchive(config) => {
            commands::extract_archive(connector.as_ref(), &config.config_file)
                .await
                .context("Failed to extract the module archive")?;
        }
    }

    Ok(())
}
