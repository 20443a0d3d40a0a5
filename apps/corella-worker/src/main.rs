//! Corella provisioning worker.
//!
//! Drains the durable provisioning queue: account creation against the
//! cloud directory, ORCID refreshes and directory profile sync.

mod config;
mod logging;

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use config::Config;
use corella_db::{run_migrations, DbPool, PgAccountStore};
use corella_directory::{
    ContactDirectory, OpenStackClient, OrcidClient, Provisioner, RestContactDirectory, SmtpNotifier,
};
use corella_provisioning::{Manager, ProvisioningWorker, WorkQueue};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.log_filter);

    let pool = match DbPool::connect_with_max(&config.database_url, config.db_max_connections).await
    {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "Failed to connect to database");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_migrations(&pool).await {
        error!(error = %e, "Failed to run migrations");
        std::process::exit(1);
    }

    let notifier = match SmtpNotifier::new(&config.smtp) {
        Ok(notifier) => Arc::new(notifier),
        Err(e) => {
            error!(error = %e, "Failed to build SMTP transport");
            std::process::exit(1);
        }
    };

    let cloud = Arc::new(OpenStackClient::new(config.cloud));
    let orcid = Arc::new(OrcidClient::new(config.orcid));
    let store = Arc::new(PgAccountStore::new(pool.inner().clone()));

    let contacts = config.contact_directory_url.clone().map(|url| {
        Arc::new(RestContactDirectory::new(
            url,
            config.contact_directory_api_key.clone(),
        )) as Arc<dyn ContactDirectory>
    });

    let provisioner = Provisioner::new(cloud.clone(), cloud.clone(), config.provisioner);
    let manager = Arc::new(Manager::new(
        store,
        cloud,
        provisioner,
        notifier,
        orcid,
        contacts,
        config.manager,
    ));

    let queue = Arc::new(WorkQueue::new(pool.inner().clone(), config.queue));
    let worker = Arc::new(ProvisioningWorker::new(queue, manager, config.worker));

    let runner = worker.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }

    worker.shutdown();
    if let Err(e) = handle.await {
        error!(error = %e, "Worker task panicked");
    }
    info!("Shutdown complete");
}
