use std::path::Path;
use std::time::Instant;

use standings_core::db::repository::StudentRepository;
use standings_core::roster_csv::read_roster_csv;
use tracing::info;

/// Run the `import` command: read a roster CSV and upsert students.
pub async fn run(config_path: &str, csv_path: &str, dry_run: bool) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;

    println!("Reading roster from: {}", csv_path);
    let start = Instant::now();
    let students = read_roster_csv(Path::new(csv_path))?;

    let active = students.iter().filter(|s| s.is_active()).count();
    println!(
        "Parsed {} students ({} active) in {:.1}s",
        students.len(),
        active,
        start.elapsed().as_secs_f64()
    );

    if dry_run {
        println!("\nDry run mode - no data was written to the database.");
        return Ok(());
    }

    let repo = super::open_repo(&config).await?;
    for student in &students {
        repo.upsert_student(student).await?;
    }
    info!(count = students.len(), "roster import complete");
    println!("Imported {} students.", students.len());

    Ok(())
}
