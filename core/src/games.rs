use std::path::Path;

use serde::Serialize;
use walkdir::WalkDir;

/// One installed game: a direct subdirectory of the install root.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstalledGame {
    pub name: String,
    pub path: String,
    pub size: u64,
}

/// Enumerate direct subdirectories of `install_root`, reporting the
/// recursive size of each.
pub fn list_installed_games(install_root: &Path) -> Vec<InstalledGame> {
    let Ok(entries) = std::fs::read_dir(install_root) else {
        return Vec::new();
    };
    let mut games: Vec<InstalledGame> = entries
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .map(|entry| {
            let path = entry.path();
            InstalledGame {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: path.to_string_lossy().into_owned(),
                size: directory_size(&path),
            }
        })
        .collect();
    games.sort_by(|a, b| a.name.cmp(&b.name));
    games
}

fn directory_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}
