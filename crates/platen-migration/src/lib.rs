use sea_orm_migration::prelude::*;

mod m0001_create_users;
mod m0002_create_files;
mod m0003_create_catalogs;
mod m0004_create_printers;
mod m0005_create_jobs;
mod m0006_create_job_requirements;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m0001_create_users::Migration),
            Box::new(m0002_create_files::Migration),
            Box::new(m0003_create_catalogs::Migration),
            Box::new(m0004_create_printers::Migration),
            Box::new(m0005_create_jobs::Migration),
            Box::new(m0006_create_job_requirements::Migration),
        ]
    }
}
