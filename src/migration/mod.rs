pub use sea_orm_migration::prelude::*;

mod m20260118_000001_create_recordings_table;
mod m20260118_000002_create_recording_segments_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260118_000001_create_recordings_table::Migration),
            Box::new(m20260118_000002_create_recording_segments_table::Migration),
        ]
    }
}
