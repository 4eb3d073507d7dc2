use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::logs::LogLevel;
use crate::models::stack::{ChangesetDesiredState, StackDesiredState};

#[derive(Parser, Debug)]
#[command(name = "stacklift", version, about = "Deploy dependent CloudFormation stacks as a group")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Default log level (RUST_LOG takes precedence)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ReadConfigArgs {
    #[arg(short, long)]
    pub file: PathBuf,

    #[arg(short, long)]
    pub section: String,

    /// Printed when the key is missing
    #[arg(short, long)]
    pub default: Option<String>,

    /// Read from the section's Parameters
    #[arg(short, long, default_value_t = false)]
    pub parameter: bool,

    pub key: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DeployGroupArgs {
    #[arg(short = 'f', long)]
    pub config_file: PathBuf,

    #[arg(short, long)]
    pub group_name: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DeployTemplateArgs {
    #[arg(short = 'f', long)]
    pub config_file: PathBuf,

    /// Config section of the stack
    #[arg(short, long)]
    pub section: String,

    #[arg(short, long)]
    pub template_file: PathBuf,

    #[arg(long)]
    pub function_root: Option<PathBuf>,

    #[arg(long, default_value = "present")]
    pub stack_desired_state: StackDesiredState,
}

/// Deploy a single stack without a config file
#[derive(ClapArgs, Debug, Clone)]
pub struct DeployStackArgs {
    #[arg(long)]
    pub stack_name: String,

    #[arg(long)]
    pub region: String,

    #[arg(long)]
    pub template_file: PathBuf,

    /// JSON object of parameter values
    #[arg(long)]
    pub params_file: Option<PathBuf>,

    #[arg(long)]
    pub role_arn: Option<String>,

    /// Comma-separated capabilities
    #[arg(long, default_value = "CAPABILITY_IAM")]
    pub capabilities: String,

    #[arg(long, default_value = "present")]
    pub stack_desired_state: StackDesiredState,

    #[arg(long, default_value = "completed")]
    pub changeset_desired_state: ChangesetDesiredState,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct UploadArchiveArgs {
    /// Destination, `s3://bucket/key`
    #[arg(long)]
    pub archive_url: String,

    pub archive_path: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ConfigFileArgs {
    #[arg(short = 'f', long)]
    pub config_file: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a value of a config section
    ReadConfig(ReadConfigArgs),

    /// Deploy every template of a group in dependency order
    DeployGroup(DeployGroupArgs),

    /// Deploy one template using a config section
    DeployTemplate(DeployTemplateArgs),

    DeployStack(DeployStackArgs),

    /// Print the module directory of a config file
    ModuleDir(ConfigFileArgs),

    /// Upload a module archive
    UploadArchive(UploadArchiveArgs),

    /// Unpack the module archive of a config file into its module directory
    ExtractArchive(ConfigFileArgs),
}
