use anyhow::Result;
use std::path::Path;

use fumen_core::schema::Database;

pub fn show_status(db_path: &Path) -> Result<()> {
    let db = Database::open(db_path)?;

    let songs = db.count_songs()?;
    let patterns = db.count_patterns()?;

    println!("\nFumen Status\n");
    println!("  Database: {}", db_path.display());
    println!("  Songs:    {}", songs);
    println!("  Patterns: {}", patterns);

    if patterns == 0 {
        println!("\n  Run `fumen index` to scan your source directories");
    }

    Ok(())
}
