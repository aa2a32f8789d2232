use clap::Parser;

#[derive(Parser)]
#[command(name = "relayhub")]
pub(crate) struct Cli {
    /// Data directory holding config.json and data.sqlite. The DATA
    /// environment variable takes precedence.
    #[arg(long, default_value = "")]
    pub(crate) data_dir: String,
    #[arg(long, default_value = "127.0.0.1")]
    pub(crate) host: String,
    /// Overrides the configured port; 0 keeps the config value.
    #[arg(long, default_value_t = 0)]
    pub(crate) port: u16,
}
