use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "./config.yaml")]
    pub config: String,
}
