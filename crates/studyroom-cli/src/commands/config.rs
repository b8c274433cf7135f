use clap::Subcommand;
use studyroom_core::StudyroomConfig;

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Print the effective configuration as JSON
    Show,
    /// Print the config file path
    Path,
}

pub fn run(cmd: ConfigCmd) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        ConfigCmd::Show => {
            let cfg = StudyroomConfig::load()?;
            println!("{}", serde_json::to_string_pretty(&cfg)?);
        }
        ConfigCmd::Path => {
            println!("{}", StudyroomConfig::path()?.display());
        }
    }
    Ok(())
}
