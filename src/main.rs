use anyhow::{Context, bail};
use clap::Parser;
use crmsync::crm::{Contact, ContactDraft, ContactStatus, Organization, OrganizationDraft};
use crmsync::{
    Actor, Entity, EntityId, FilterState, MemoryRepository, RecordingNotifier, Repository,
    SyncConfig, SyncError, Workspace,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const ORGANIZATIONS: [&str; 3] = ["Acme Corp", "Globex", "Initech"];
const FIRST_NAMES: [&str; 6] = ["Ada", "Grace", "Alan", "Edsger", "Barbara", "Ken"];

/// Seeds an in-memory CRM, filters the contact list, selects the view and
/// bulk-deletes it with one injected failure. Prints the outcome as JSON.
#[derive(Debug, Parser)]
#[command(name = "crmsync", version, about)]
struct Args {
    /// Number of contacts to seed
    #[arg(long, default_value_t = 12)]
    contacts: usize,

    /// Search text applied to the contact list
    #[arg(long)]
    search: Option<String>,

    /// Position within the selection whose delete the backend rejects
    #[arg(long)]
    fail_index: Option<usize>,

    /// Directory for persisted filter and selection state
    #[arg(long)]
    state_dir: Option<PathBuf>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crmsync=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    if args.contacts == 0 {
        bail!("--contacts must be at least 1");
    }

    let mut config = SyncConfig::from_env()
        .context("failed to read configuration")?
        .enable_bulk(true);
    if let Some(dir) = &args.state_dir {
        config = config.state_dir(dir);
    }

    let notifier = Arc::new(RecordingNotifier::new());
    let workspace = Workspace::open(config)
        .context("failed to open workspace")?
        .with_notifier(notifier.clone());
    workspace.sign_in(Actor::new("demo", "Demo User"))?;

    let organizations = Arc::new(MemoryRepository::<Organization>::new());
    let org_actions = workspace.coordinator::<Organization>(organizations.clone(), "organization");
    let mut org_ids = Vec::with_capacity(ORGANIZATIONS.len());
    for name in ORGANIZATIONS {
        let org = org_actions
            .create(OrganizationDraft::new(name).industry("Manufacturing"))
            .await?;
        org_ids.push(org.id().clone());
    }

    let contacts = Arc::new(MemoryRepository::<Contact>::new());
    let contact_actions = workspace.coordinator::<Contact>(contacts.clone(), "contact");
    let drafts: Vec<ContactDraft> = (0..args.contacts)
        .map(|n| {
            let org = n % ORGANIZATIONS.len();
            let company = ORGANIZATIONS[org].split_whitespace().next().unwrap_or("example");
            let first = FIRST_NAMES[n % FIRST_NAMES.len()];
            ContactDraft::new(first, format!("#{}", n + 1))
                .email(format!("{}.{}@{}.com", first, n + 1, company).to_lowercase())
                .organization(org_ids[org].clone())
                .status(if n % 2 == 0 { ContactStatus::Active } else { ContactStatus::Lead })
        })
        .collect();
    contact_actions.bulk_create(drafts).await?.into_result()?;

    let repository: Arc<dyn Repository<Contact>> = contacts.clone();
    let mut list = workspace.entity_list(repository, "contacts", FilterState::with_search());
    if let Some(text) = &args.search {
        list.filters_mut().set_search(text.clone());
    }
    let view = list.refresh().await?;
    info!(visible = view.items.len(), total = view.total, "contact list loaded");

    let targets = view.items.clone();
    list.selection_mut().select_all(&targets, true);
    let selected = list.selection().selected_ids();

    if let Some(index) = args.fail_index {
        let id = selected
            .get(index)
            .with_context(|| format!("--fail-index {} is outside the {} selected contacts", index, selected.len()))?;
        contacts.fail_for(id.clone(), SyncError::transport("connection reset by peer"))?;
    }

    let outcome = contact_actions
        .bulk_delete_selected(list.selection_mut())
        .await?;
    let after = list.snapshot()?;
    let remaining: Vec<EntityId> = list.selection().selected_ids();

    let report = json!({
        "seeded": args.contacts,
        "search": args.search,
        "visible_before": view.items.len(),
        "selected": selected.len(),
        "bulk_delete": {
            "status": outcome.status,
            "succeeded": outcome.success_count,
            "failed": outcome.failed_count,
            "errors": outcome
                .errors()
                .map(|(index, error)| json!({ "index": index, "error": error.to_string() }))
                .collect::<Vec<_>>(),
        },
        "still_selected": remaining,
        "visible_after": after.items.iter().map(Contact::full_name).collect::<Vec<_>>(),
        "backend_rows": contacts.rows()?.len(),
        "notifications": notifier.notifications(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    workspace.sign_out()?;
    Ok(())
}
