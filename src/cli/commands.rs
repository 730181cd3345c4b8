//! CLI command definitions

use clap::Args;

/// Install a recipe
#[derive(Debug, Args, Clone)]
pub struct SetupCommand {
    /// Path to recipe YAML file
    #[arg(short, long)]
    pub file: String,

    /// Override GPU vendor detection (nvidia, amd, intel, none)
    #[arg(long)]
    pub gpu: Option<String>,

    /// Skip steps that completed in the last setup run of this recipe
    #[arg(long)]
    pub resume: bool,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

/// Launch an installed application
#[derive(Debug, Args, Clone)]
pub struct LaunchCommand {
    /// Path to recipe YAML file
    #[arg(short, long)]
    pub file: String,

    /// Access token handed to the app (falls back to the recipe's env var)
    #[arg(long)]
    pub token: Option<String>,

    /// Extra environment variables for the app (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Don't open a browser when the app reports its URL
    #[arg(long)]
    pub no_browser: bool,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,
}

/// Validate a recipe file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to recipe YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Recipe name to filter by
    #[arg(short, long)]
    pub recipe: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific run by ID
    #[arg(long)]
    pub run: Option<String>,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 {
        return Err(format!("Invalid key=value pair: {}", s));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}
