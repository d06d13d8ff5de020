use liha_core::db::open_db_in_memory;
use liha_core::{
    BackendError, CanvasSession, ContentItem, DropEvent, MutationOutcome, ObjectInstance,
    ObjectRepository, ObjectStoreBackend, ObjectType, ObjectTypeService, PropertyType,
    PropertyValueType, QueryBackend, QueryKey, ReadState, RepoError, SessionError,
    SqliteObjectRepository, SqliteObjectTypeRepository, SyncConfig, SyncEngine,
};

fn sample_object(id: &str) -> ObjectInstance {
    let mut item = ContentItem::new("a", "text", 0, 0);
    item.content = "# Meeting notes".to_string();
    ObjectInstance::with_items(id, [item]).unwrap()
}

#[test]
fn object_round_trips_through_repository() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteObjectRepository::new(&conn);
    let object = sample_object("o1");

    repo.save_object(&object).unwrap();
    assert_eq!(repo.get_object("o1").unwrap(), Some(object.clone()));

    let moved = object.insert(ContentItem::new("b", "table", 0, 12)).unwrap();
    repo.save_object(&moved).unwrap();
    let loaded = repo.get_object("o1").unwrap().unwrap();
    assert_eq!(loaded.len(), 2);
}

#[test]
fn missing_object_is_none() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteObjectRepository::new(&conn);

    assert_eq!(repo.get_object("nope").unwrap(), None);
}

#[test]
fn list_object_ids_returns_every_saved_object() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteObjectRepository::new(&conn);
    repo.save_object(&sample_object("o2")).unwrap();
    repo.save_object(&sample_object("o1")).unwrap();

    let mut ids = repo.list_object_ids().unwrap();
    ids.sort();
    assert_eq!(ids, vec!["o1".to_string(), "o2".to_string()]);
}

#[test]
fn undecodable_body_is_invalid_data() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO objects (id, body) VALUES ('o1', 'not json');",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO objects (id, body) VALUES ('o2', '{\"id\":\"other\"}');",
        [],
    )
    .unwrap();
    let repo = SqliteObjectRepository::new(&conn);

    assert!(matches!(
        repo.get_object("o1"),
        Err(RepoError::InvalidData(_))
    ));
    assert!(matches!(
        repo.get_object("o2"),
        Err(RepoError::InvalidData(_))
    ));
}

#[tokio::test]
async fn backend_reports_missing_object_as_not_found() {
    let backend = ObjectStoreBackend::new(open_db_in_memory().unwrap());
    let key = QueryKey::from("ghost");

    let err = backend.fetch(&key).await.unwrap_err();
    assert_eq!(err, BackendError::NotFound(key));
}

#[tokio::test]
async fn backend_refuses_document_stored_under_other_key() {
    let backend = ObjectStoreBackend::new(open_db_in_memory().unwrap());

    let err = backend
        .persist(&QueryKey::from("o2"), sample_object("o1"))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Storage(_)));

    let stored = backend.with_connection(|conn| {
        SqliteObjectRepository::new(conn).list_object_ids().unwrap()
    });
    assert!(stored.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backend_persists_and_fetches_from_multi_thread_runtime() {
    let backend = ObjectStoreBackend::new(open_db_in_memory().unwrap());
    let key = QueryKey::from("o1");
    let object = sample_object("o1");

    backend.persist(&key, object.clone()).await.unwrap();
    assert_eq!(backend.fetch(&key).await.unwrap(), object);
}

#[test]
fn object_type_create_get_list_update() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ObjectTypeService::new(SqliteObjectTypeRepository::new(&mut conn));
    let book = ObjectType::new("Book")
        .with_property(PropertyType::new("author", "Author", PropertyValueType::Text))
        .with_property(PropertyType::new("read", "Read", PropertyValueType::Checkbox));

    service.create_object_type(&book).unwrap();
    assert_eq!(service.list_object_type_ids().unwrap(), vec![book.id.clone()]);

    let loaded = service.get_object_type(&book.id).unwrap().unwrap();
    assert_eq!(loaded, book);

    let mut renamed = loaded.clone();
    renamed.name = "Novel".to_string();
    renamed.icon = Some("book".to_string());
    service.update_object_type(&renamed).unwrap();
    let reloaded = service.get_object_type(&book.id).unwrap().unwrap();
    assert_eq!(reloaded.name, "Novel");
    assert_eq!(reloaded.icon.as_deref(), Some("book"));
    assert_eq!(reloaded.property_types.len(), 2);

    assert!(service.get_object_type("missing").unwrap().is_none());
    let ghost = ObjectType::new("Ghost");
    assert!(matches!(
        service.update_object_type(&ghost),
        Err(RepoError::NotFound(_))
    ));
}

#[test]
fn object_type_with_blank_name_is_rejected_before_storage() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = ObjectTypeService::new(SqliteObjectTypeRepository::new(&mut conn));

    let err = service
        .create_object_type(&ObjectType::new("  "))
        .unwrap_err();
    assert!(matches!(err, RepoError::ObjectType(_)));
    assert!(service.list_object_type_ids().unwrap().is_empty());
}

#[tokio::test]
async fn canvas_session_persists_dropped_block_to_sqlite() {
    let backend = ObjectStoreBackend::new(open_db_in_memory().unwrap());
    backend.with_connection(|conn| {
        SqliteObjectRepository::new(conn)
            .save_object(&sample_object("o1"))
            .unwrap()
    });

    let engine = SyncEngine::new(backend.clone(), SyncConfig::default());
    let mut changes = engine.subscribe(&QueryKey::from("o1"));
    let session = CanvasSession::open(engine, "o1");
    assert!(matches!(
        session.drop_block(&DropEvent::new(0, 12, "text")),
        Err(SessionError::NotLoaded(_))
    ));

    changes.changed().await.unwrap();
    assert!(matches!(session.current(), ReadState::Ready(_)));
    assert_eq!(session.reference().unwrap().title, "Meeting notes");

    let outcome = session.drop_block(&DropEvent::new(0, 12, "text")).unwrap();
    assert_eq!(session.blocks().len(), 2);
    let ticket = outcome.into_ticket().unwrap();
    assert_eq!(ticket.settled().await, MutationOutcome::Committed);

    let stored = backend.with_connection(|conn| {
        SqliteObjectRepository::new(conn).get_object("o1").unwrap()
    });
    assert_eq!(stored.map(|object| object.len()), Some(2));

    let engine = session.engine().clone();
    session.close();
    assert!(engine.is_shut_down());
}

#[tokio::test]
async fn canvas_session_for_missing_object_is_unavailable() {
    let backend = ObjectStoreBackend::new(open_db_in_memory().unwrap());
    let engine = SyncEngine::new(backend, SyncConfig::default());
    let mut changes = engine.subscribe(&QueryKey::from("ghost"));
    let session = CanvasSession::open(engine, "ghost");

    changes.changed().await.unwrap();
    assert!(matches!(session.current(), ReadState::Unavailable(_)));
    assert!(session.blocks().is_empty());
    assert_eq!(session.engine().drain_errors().len(), 1);
}
