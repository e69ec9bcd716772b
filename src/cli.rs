use clap::Parser;
use std::path::PathBuf;

use crate::utils::version;

#[derive(Parser, Debug)]
#[command(author, version = version(), about)]
pub struct Cli {
    /// Files to upload, or folder roots when --folder is given
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Treat the given paths as folder trees (applies the depth filter)
    #[arg(long)]
    pub folder: bool,

    /// Storage endpoint base URL (overrides configuration)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Maximum concurrent uploads, 1-10 (overrides configuration)
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Credentials file (defaults to files in the data creds directory)
    #[arg(long)]
    pub creds: Option<PathBuf>,
}
