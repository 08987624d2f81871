//! Tags command - list the known CPython release tags

use crate::catalog::TagCatalog;
use crate::cli::args::TagsArgs;
use crate::config::Config;
use crate::error::{PyforgeError, PyforgeResult};
use crate::version::{Interpreter, VersionSpec};
use console::style;

/// Execute the tags command
pub async fn execute(args: TagsArgs, config: &Config) -> PyforgeResult<()> {
    let catalog = if args.refresh {
        TagCatalog::refresh(&config.resolver.catalog_url)?
    } else {
        TagCatalog::bundled()?
    };

    let range = match &args.range {
        Some(raw) => {
            let spec = VersionSpec::parse(raw, false)?;
            if spec.interpreter != Interpreter::CPython {
                return Err(PyforgeError::User(
                    "release tags only exist for CPython versions".to_string(),
                ));
            }
            spec.range().cloned()
        }
        None => None,
    };

    let mut count = 0;
    for tag in catalog.tags() {
        if let Some(range) = &range {
            if !range.matches(&tag.version) {
                continue;
            }
        }
        if args.installer_only && !tag.has_installer {
            continue;
        }
        count += 1;
        if tag.has_installer {
            println!("{}  {}", tag.version, style("(installer)").dim());
        } else {
            println!("{}", tag.version);
        }
    }

    println!();
    println!("{count} tags");
    Ok(())
}
