use std::env;
use std::fs;
use std::path::PathBuf;

use common::AlbumItem;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = env::args()
        .nth(1)
        .or_else(|| env::var("ALBUMS_DIR").ok())
        .unwrap_or_else(|| "albums".to_string());
    let dir = PathBuf::from(dir);

    let mut manifests: Vec<PathBuf> = fs::read_dir(&dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|ext| ext == "json").unwrap_or(false))
        .collect();
    manifests.sort();

    if manifests.is_empty() {
        println!("No manifests under {}", dir.display());
        return Ok(());
    }

    let mut total = 0usize;
    for path in manifests {
        let data = fs::read(&path)?;
        let items: Vec<AlbumItem> = serde_json::from_slice(&data)?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        println!("{}: {} items", name, items.len());
        total += items.len();
    }
    println!("Total: {} items", total);

    Ok(())
}
