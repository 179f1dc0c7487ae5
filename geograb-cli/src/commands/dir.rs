//! Dir command - one-level crawl of a service directory.

use geograb::region::list_directory_children;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the dir command.
pub fn run(runner: &CliRunner, url: &str, json: bool) -> Result<(), CliError> {
    runner.log_startup("dir");
    let session = runner.session()?;
    let children = runner.block_on(list_directory_children(session.client(), url))?;

    if json {
        let text = serde_json::to_string_pretty(&children)
            .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
        println!("{}", text);
        return Ok(());
    }

    if children.is_empty() {
        println!("No browsable services under {}", url);
        return Ok(());
    }
    for child in &children {
        println!("  {:<32} {:<16} {}", child.display_name, child.kind.to_string(), child.url);
    }
    Ok(())
}
