//! Cache management commands.

use std::path::Path;

use clap::Subcommand;

use super::load_config;
use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show persistent cache statistics
    Stats,
    /// Remove all persisted tiles
    Clear,
}

/// Run a cache subcommand.
pub fn run(config: Option<&Path>, action: CacheAction) -> Result<(), CliError> {
    let config = load_config(config)?;
    let directory = &config.cache.directory;
    let suffix = &config.cache.file_suffix;

    match action {
        CacheAction::Stats => {
            let (files, bytes) = scan(directory, suffix)?;
            println!("Persistent cache: {}", directory.display());
            println!("  Tiles: {}", files);
            println!("  Size:  {} bytes", bytes);
            Ok(())
        }
        CacheAction::Clear => {
            let removed = clear(directory, suffix)?;
            println!(
                "Removed {} persisted tile(s) from {}",
                removed,
                directory.display()
            );
            Ok(())
        }
    }
}

fn matching_files(directory: &Path, suffix: &str) -> Result<Vec<std::path::PathBuf>, CliError> {
    let entries = match std::fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_name().to_string_lossy().ends_with(suffix) {
            files.push(entry.path());
        }
    }
    Ok(files)
}

fn scan(directory: &Path, suffix: &str) -> Result<(usize, u64), CliError> {
    let files = matching_files(directory, suffix)?;
    let mut bytes = 0;
    for file in &files {
        bytes += std::fs::metadata(file)?.len();
    }
    Ok((files.len(), bytes))
}

fn clear(directory: &Path, suffix: &str) -> Result<usize, CliError> {
    let files = matching_files(directory, suffix)?;
    for file in &files {
        std::fs::remove_file(file)?;
    }
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert_eq!(scan(&missing, ".tile").unwrap(), (0, 0));
    }

    #[test]
    fn test_clear_removes_only_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x=1,y=2,z=3.tile"), b"abc").unwrap();
        std::fs::write(dir.path().join("x=4,y=5,z=6.tile"), b"defg").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        let (files, bytes) = scan(dir.path(), ".tile").unwrap();
        assert_eq!(files, 2);
        assert_eq!(bytes, 7);

        assert_eq!(clear(dir.path(), ".tile").unwrap(), 2);
        assert!(dir.path().join("notes.txt").exists());
    }
}
