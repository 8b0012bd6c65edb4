use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pwkeep", version)]
#[command(about = "Interactive credential store backed by a single encrypted archive.")]
pub struct Cli {
    /// Archive file to operate on. A missing file is created on exit.
    pub archive: PathBuf,
}
