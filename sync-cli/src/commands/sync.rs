//! Reconcile local puffs with the server.

use anyhow::{Context, Result};
use pufftrack_sync_client::{
    CredentialStore, MemoryCredentialStore, MockTransport, PuffSync, RunOutcome, Transport,
    WebSocketTransport,
};
use pufftrack_sync_core::ConnectionStatus;
use pufftrack_sync_types::{AuthToken, ClientEvent, PuffCount, ServerEvent, SyncedPuffIds};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::config::{self, CliConfig};

/// Run the sync command.
///
/// With `mock`, an in-process server accepts every batch. With `watch`,
/// reconciliation keeps running in the background until Ctrl-C.
pub async fn run(data_dir: &Path, config: &CliConfig, mock: bool, watch: bool) -> Result<()> {
    let ledger_store = Arc::new(config::ledger_store(data_dir));

    if mock {
        let transport = MockTransport::new();
        let credentials = Arc::new(MemoryCredentialStore::with_token(AuthToken::new("mock")));
        let client = PuffSync::open(
            config.to_sync_config(),
            transport.clone(),
            credentials,
            ledger_store,
        )
        .await
        .context("Failed to open sync client")?;

        let already_synced = client.puffs().await.iter().filter(|e| e.synced).count();
        install_accept_all(&transport, already_synced as u64);

        println!("Using mock transport (in-process server)");
        return drive(&client, watch).await;
    }

    let credentials = Arc::new(config::credential_store(data_dir));
    if credentials
        .load()
        .await
        .context("Failed to read credential")?
        .is_none()
    {
        anyhow::bail!("Not signed in. Run 'pufftrack login --token <token>' first.");
    }

    let client = PuffSync::open(
        config.to_sync_config(),
        WebSocketTransport::new(),
        credentials,
        ledger_store,
    )
    .await
    .context("Failed to open sync client")?;

    drive(&client, watch).await
}

async fn drive<T: Transport + 'static>(client: &PuffSync<T>, watch: bool) -> Result<()> {
    let status = client
        .resume_session()
        .await
        .context("Failed to start session")?;

    if watch {
        client.start();
        println!("Session: {status}");
        println!("Syncing in the background. Press Ctrl-C to stop.");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        client.disconnect().await;
        info!("watch stopped");
        return Ok(());
    }

    if status != ConnectionStatus::Connected {
        let reason = client
            .session_status()
            .await
            .last_error
            .unwrap_or_else(|| status.to_string());
        client.disconnect().await;
        anyhow::bail!("Could not connect to server: {reason}");
    }

    let outcome = client.sync_now().await;
    client.disconnect().await;

    match outcome.context("Sync failed")? {
        RunOutcome::Skipped => println!("A sync is already running."),
        RunOutcome::UpToDate => println!("Up to date."),
        RunOutcome::Synced { sent, confirmed } => {
            println!("Sent {sent} puffs, server confirmed {confirmed}.");
        }
    }
    Ok(())
}

/// Answer like a server that accepts every puff it is sent.
fn install_accept_all(transport: &MockTransport, already_synced: u64) {
    let count = Arc::new(AtomicU64::new(already_synced));
    transport.respond_with(move |event| match event {
        ClientEvent::GetPuffCount => vec![ServerEvent::PuffCount(PuffCount {
            count: count.load(Ordering::SeqCst),
        })],
        ClientEvent::AddPuffs(batch) => {
            let ids = batch.ids();
            count.fetch_add(ids.len() as u64, Ordering::SeqCst);
            vec![ServerEvent::SyncedPuffIds(SyncedPuffIds { ids })]
        }
        _ => vec![],
    });
}
