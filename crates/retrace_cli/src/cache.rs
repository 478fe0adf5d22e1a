//! `retrace cache`: manage the persisted replay cache.

use std::error::Error;
use std::path::{Path, PathBuf};

use retrace_cache::{CacheError, TraceCache};

use crate::settings::load_settings;
use crate::{CacheAction, GlobalArgs};

/// Runs the `retrace cache` command.
pub fn run(action: &CacheAction, global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    match action {
        CacheAction::Clear { dir } => {
            let dir = match dir {
                Some(dir) => PathBuf::from(dir),
                None => load_settings(global)?.replay.cache_dir,
            };
            let removed = clear(&dir)?;
            if !global.quiet {
                if removed {
                    eprintln!("    Removed {}", dir.display());
                } else {
                    eprintln!("    Nothing to remove at {}", dir.display());
                }
            }
            Ok(0)
        }
    }
}

fn clear(dir: &Path) -> Result<bool, CacheError> {
    let removed = TraceCache::clear(dir)?;
    log::debug!("cache clear {}: removed = {removed}", dir.display());
    Ok(removed)
}
