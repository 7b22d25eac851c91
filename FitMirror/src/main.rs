mod logs;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use fitappraisal::{AppraisalCache, JaniceClient};
use fitconfig::get_config;
use fitesi::EsiClient;
use fitrefdata::{HttpReferenceSource, ReferenceCache};
use fitservice::FitService;
use fitstore::FittingStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "fitmirror", version, about = "Mirror of EVE Online saved fittings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pull every remote fitting into the store
    Sync(Authed),
    /// Grouped listing, optionally filtered
    List {
        #[command(flatten)]
        subject: SubjectArg,
        /// Substring of a fitting or hull name
        #[arg(default_value = "")]
        query: String,
    },
    /// One stored fitting with resolved names
    Show(FittingArg),
    /// EFT text of a stored fitting
    Export(FittingArg),
    /// Market value of a stored fitting
    Price(FittingArg),
    /// Detail, EFT and price together
    Bundle(FittingArg),
    /// Delete a fitting remotely, keeping the local copy
    RemoveRemote(AuthedFitting),
    /// Upload a stored fitting to the remote side
    Push(AuthedFitting),
    /// Permanently delete a stored fitting
    DeleteLocal(FittingArg),
    /// Public identity of the character
    Profile(Authed),
    /// Exchange a refresh token for a new access token
    RefreshToken {
        #[arg(long, env = "FITMIRROR_REFRESH_TOKEN", hide_env_values = true)]
        refresh_token: String,
    },
}

#[derive(Args, Debug)]
struct SubjectArg {
    /// Character id
    #[arg(long, env = "FITMIRROR_CHARACTER_ID")]
    subject: i64,
}

#[derive(Args, Debug)]
struct TokenArg {
    /// Access token for the remote API
    #[arg(long, env = "FITMIRROR_ACCESS_TOKEN", hide_env_values = true)]
    token: String,
}

#[derive(Args, Debug)]
struct Authed {
    #[command(flatten)]
    subject: SubjectArg,
    #[command(flatten)]
    token: TokenArg,
}

#[derive(Args, Debug)]
struct FittingArg {
    #[command(flatten)]
    subject: SubjectArg,
    /// Fitting id
    fitting_id: i64,
}

#[derive(Args, Debug)]
struct AuthedFitting {
    #[command(flatten)]
    subject: SubjectArg,
    #[command(flatten)]
    token: TokenArg,
    /// Fitting id
    fitting_id: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = get_config();
    logs::init_logging(&config);

    if let Err(e) = run(cli.command).await {
        error!("❌ {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(command: Commands) -> Result<()> {
    if let Commands::RefreshToken { refresh_token } = &command {
        let esi = EsiClient::from_config()?;
        return print_json(&esi.refresh_access_token(refresh_token).await?);
    }

    let service = build_service()?;

    match command {
        Commands::Sync(args) => {
            let outcome = service.sync(args.subject.subject, &args.token.token).await?;
            print_json(&outcome)
        }
        Commands::List { subject, query } => {
            print_json(&service.list(subject.subject, &query).await?)
        }
        Commands::Show(args) => {
            print_json(&service.detail(args.subject.subject, args.fitting_id).await?)
        }
        Commands::Export(args) => {
            let eft = service.export(args.subject.subject, args.fitting_id).await?;
            print!("{}", eft);
            Ok(())
        }
        Commands::Price(args) => print_json(
            &service
                .price_estimate(args.subject.subject, args.fitting_id)
                .await?,
        ),
        Commands::Bundle(args) => {
            print_json(&service.bundle(args.subject.subject, args.fitting_id).await?)
        }
        Commands::RemoveRemote(args) => print_json(
            &service
                .remove_remote(args.subject.subject, args.fitting_id, &args.token.token)
                .await?,
        ),
        Commands::Push(args) => print_json(
            &service
                .sync_to_remote(args.subject.subject, args.fitting_id, &args.token.token)
                .await?,
        ),
        Commands::DeleteLocal(args) => {
            let removed = service
                .delete_local(args.subject.subject, args.fitting_id)
                .await?;
            print_json(&serde_json::json!({ "removed": removed }))
        }
        Commands::Profile(args) => print_json(
            &service
                .profile(args.subject.subject, &args.token.token)
                .await?,
        ),
        Commands::RefreshToken { .. } => Ok(()),
    }
}

/// Wires the store, remote client and caches from the global configuration
fn build_service() -> Result<FitService> {
    let config = get_config();

    info!("📦 Opening fitting storage...");
    let store = FittingStore::new(fitstore::backend_from_config(&config)?);

    let esi = EsiClient::from_config()?;
    let source = HttpReferenceSource::from_config(esi.clone())?;
    let refdata = ReferenceCache::from_config(Arc::new(source))?;

    let appraiser = JaniceClient::from_config()?;
    let appraisals = AppraisalCache::from_config(Arc::new(appraiser))?;

    let interval = Duration::from_secs(config.get_sync_min_interval_seconds());
    info!(
        backend = store.backend_kind(),
        sync_interval_seconds = interval.as_secs(),
        "✅ Fitting service ready"
    );

    Ok(FitService::new(store, Arc::new(esi), refdata, appraisals).with_sync_interval(interval))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
