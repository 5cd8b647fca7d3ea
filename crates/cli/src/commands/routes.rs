//! `laconic routes` - print the demo route table.

use laconic::{LaconicConfig, RouteInfo};

use crate::demo;

/// Format routes as an aligned table.
#[must_use]
pub fn table(routes: &[RouteInfo]) -> String {
    let mut out = format!("{:<24} {:<32} {}\n", "METHODS", "RULE", "ENDPOINT");
    for route in routes {
        out.push_str(&route.to_string());
        out.push('\n');
    }
    out
}

/// Print the route table of the demo API.
///
/// # Errors
///
/// Returns an error if the configuration or the API definition is invalid.
pub fn print() -> Result<(), Box<dyn std::error::Error>> {
    let config = LaconicConfig::from_env()?;
    let app = demo::build(config)?;

    #[allow(clippy::print_stdout)]
    {
        print!("{}", table(&app.routes()));
    }
    Ok(())
}
