//! Embedded static assets
//!
//! SQL migrations and the distributed team seed file are compiled into the
//! binary so a single executable can bootstrap an empty database.

use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "migrations/"]
pub struct MigrationAssets;

#[derive(RustEmbed)]
#[folder = "seed/"]
pub struct SeedAssets;

impl MigrationAssets {
    /// Get all embedded migrations as (filename, content) pairs, sorted by
    /// filename so version ordering matches filesystem ordering.
    pub fn get_migrations() -> Vec<(String, String)> {
        let mut migrations: Vec<(String, String)> = Self::iter()
            .filter(|name| name.ends_with(".sql"))
            .filter_map(|name| {
                Self::get(&name).map(|file| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(file.data.as_ref()).to_string(),
                    )
                })
            })
            .collect();
        migrations.sort_by(|a, b| a.0.cmp(&b.0));
        migrations
    }
}

impl SeedAssets {
    /// Get the distributed team seed file, if present.
    pub fn team_seed() -> Option<String> {
        Self::get("teams.json")
            .map(|file| String::from_utf8_lossy(file.data.as_ref()).to_string())
    }
}
