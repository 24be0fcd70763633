use crmsync::crm::{
    Contact, ContactDraft, ContactPatch, ContactStatus, Opportunity, OpportunityDraft,
    OpportunityStage, Organization, OrganizationDraft,
};
use crmsync::{
    Actor, Entity, EntityId, FilterState, FilterValue, MemoryRepository, OverrideRepository,
    Repository, SelectionState, SyncConfig, SyncError, Value, Workspace,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;

fn signed_in(config: SyncConfig) -> Workspace {
    let workspace = Workspace::open(config).unwrap();
    workspace.sign_in(Actor::new("rep-7", "Riley")).unwrap();
    workspace
}

#[tokio::test]
async fn contacts_of_one_organization_with_status_facets() {
    let workspace = signed_in(SyncConfig::new().enable_bulk(true));
    let organizations = Arc::new(MemoryRepository::<Organization>::new());
    let contacts = Arc::new(MemoryRepository::<Contact>::new());

    let orgs = workspace.coordinator::<Organization>(organizations.clone(), "organization");
    let acme = orgs
        .create(OrganizationDraft::new("Acme Corp").industry("Rockets"))
        .await
        .unwrap();
    let globex = orgs.create(OrganizationDraft::new("Globex")).await.unwrap();

    let people = workspace.coordinator::<Contact>(contacts.clone(), "contact");
    let drafts = vec![
        ContactDraft::new("Wile", "Coyote")
            .organization(acme.id().clone())
            .status(ContactStatus::Active),
        ContactDraft::new("Road", "Runner").organization(acme.id().clone()),
        ContactDraft::new("Hank", "Scorpio")
            .organization(globex.id().clone())
            .status(ContactStatus::Active),
    ];
    let outcome = people.bulk_create(drafts).await.unwrap();
    assert_eq!(outcome.success_count, 3);

    let source: Arc<dyn Repository<Contact>> = contacts.clone();
    let mut list = workspace.entity_list(source, "contacts", FilterState::with_search());
    list.filters_mut()
        .set_filter("organization_id", FilterValue::equals(acme.id().clone()));
    let snapshot = list.refresh().await.unwrap();

    let mut names: Vec<String> = snapshot.items.iter().map(Contact::full_name).collect();
    names.sort();
    assert_eq!(names, vec!["Road Runner", "Wile Coyote"]);
    assert!(
        snapshot
            .items
            .iter()
            .all(|contact| contact.metadata().created_by.as_deref() == Some("rep-7"))
    );

    let by_status = crmsync::filter::facet_counts(&snapshot.items, "status");
    assert!(by_status.contains(&(Value::from(ContactStatus::Active), 1)));
    assert!(by_status.contains(&(Value::from(ContactStatus::Lead), 1)));
}

#[tokio::test]
async fn pipeline_patch_is_validated_against_the_whole_record() {
    let workspace = signed_in(SyncConfig::new());
    let deals = Arc::new(MemoryRepository::<Opportunity>::new());
    let coordinator = workspace.coordinator::<Opportunity>(deals.clone(), "opportunity");

    let deal = coordinator
        .create(OpportunityDraft::new("Fleet renewal", 50_000.0).probability(20))
        .await
        .unwrap();
    assert_eq!(deal.weighted_amount(), 10_000.0);

    let advanced = coordinator
        .update(
            deal.id(),
            crmsync::crm::OpportunityPatch {
                stage: Some(OpportunityStage::Negotiation),
                probability: Some(75),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(*advanced.stage(), OpportunityStage::Negotiation);
    assert_eq!(advanced.metadata().version, 1);

    let rejected = coordinator
        .update(
            deal.id(),
            crmsync::crm::OpportunityPatch {
                probability: Some(140),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(rejected, Err(SyncError::ValidationFailed(_))));
    assert_eq!(*deals.rows().unwrap()[0].probability(), 75);
}

#[tokio::test]
async fn filters_and_selection_survive_a_restart() {
    let dir = tempdir().unwrap();
    let config = SyncConfig::new().state_dir(dir.path());
    let rows: Vec<Contact> = {
        let contacts = MemoryRepository::<Contact>::new();
        let workspace = signed_in(config.clone());
        let coordinator = workspace.coordinator::<Contact>(Arc::new(contacts), "contact");
        let mut created = Vec::new();
        for (first, last) in [("Ada", "Lovelace"), ("Alan", "Turing"), ("Adam", "Osborne")] {
            created.push(coordinator.create(ContactDraft::new(first, last)).await.unwrap());
        }
        created
    };
    let target = rows
        .iter()
        .find(|contact| contact.first_name() == "Ada")
        .map(|contact| contact.id().clone())
        .unwrap();

    {
        let workspace = signed_in(config.clone());
        let source: Arc<dyn Repository<Contact>> =
            Arc::new(MemoryRepository::with_rows(rows.clone()));
        let mut list = workspace.entity_list(source, "contacts", FilterState::with_search());
        list.filters_mut().set_search("ada");
        list.refresh().await.unwrap();
        assert!(list.selection_mut().select(&target));
    }

    let workspace = signed_in(config);
    let source: Arc<dyn Repository<Contact>> = Arc::new(MemoryRepository::with_rows(rows));
    let mut list = workspace.entity_list(source, "contacts", FilterState::with_search());
    assert_eq!(list.filters().filters().search_text(), Some("ada"));

    let snapshot = list.refresh().await.unwrap();
    assert_eq!(snapshot.total, 2);
    assert_eq!(snapshot.selection_state, SelectionState::Partial);
    assert_eq!(list.selection().selected_ids(), vec![target]);
}

#[tokio::test]
async fn overridden_delete_archives_instead_of_removing() {
    let workspace = signed_in(SyncConfig::new());
    let contacts = Arc::new(MemoryRepository::<Contact>::new());
    let coordinator = workspace.coordinator::<Contact>(contacts.clone(), "contact");
    let contact = coordinator
        .create(ContactDraft::new("Dana", "Scully"))
        .await
        .unwrap();

    let archived = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&archived);
    let fallback: Arc<dyn Repository<Contact>> = contacts.clone();
    let archiving = OverrideRepository::new(Arc::clone(&fallback)).on_delete(move |id: EntityId| {
        let counter = Arc::clone(&counter);
        let fallback = Arc::clone(&fallback);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            let patch = ContactPatch {
                status: Some(ContactStatus::Inactive),
                ..ContactPatch::default()
            };
            fallback
                .update(&id, patch, &crmsync::AuditStamp::new("archiver"))
                .await
                .map(|_| ())
        }
    });
    let coordinator = workspace.coordinator::<Contact>(Arc::new(archiving), "contact");
    coordinator.delete(contact.id()).await.unwrap();

    assert_eq!(archived.load(Ordering::SeqCst), 1);
    let stored = contacts.rows().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(*stored[0].status(), ContactStatus::Inactive);
}
