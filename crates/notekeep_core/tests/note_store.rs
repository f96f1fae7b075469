use notekeep_core::{
    ChecklistItem, InMemoryNoteRepository, Note, NoteRepository, NoteService, RepoError,
    SqliteNoteRepository,
};

fn groceries() -> Note {
    let mut note = Note::new("Groceries");
    note.content = Some("weekly run".to_string());
    note.add_item("Milk");
    note.add_item("Eggs");
    note
}

fn assert_equal_content(left: &Note, right: &Note) {
    assert_eq!(left.id(), right.id());
    assert_eq!(left.title, right.title);
    assert_eq!(left.content, right.content);
    assert_eq!(left.items, right.items);
    assert_eq!(left.created_at(), right.created_at());
}

fn check_add_then_get<R: NoteRepository>(repo: &R) {
    let note = groceries();
    let persisted = repo.add(&note).unwrap();

    let loaded = repo.get(note.id()).unwrap().unwrap();
    assert_equal_content(&loaded, &note);
    assert_eq!(loaded.updated_at(), persisted.updated_at());
    assert!(loaded.updated_at() >= loaded.created_at());
}

fn check_update_replaces_content<R: NoteRepository>(repo: &R) {
    let mut note = groceries();
    repo.add(&note).unwrap();

    note.title = "Groceries (Sat)".to_string();
    note.items[0].text = "Milk x2".to_string();
    note.items[1].is_completed = true;
    note.add_item("Bread");
    let persisted = repo.update(&note).unwrap();

    let loaded = repo.get(note.id()).unwrap().unwrap();
    assert_equal_content(&loaded, &note);
    assert_eq!(loaded.updated_at(), persisted.updated_at());
    assert_eq!(repo.list().unwrap().len(), 1);
}

fn check_update_missing_is_not_found<R: NoteRepository>(repo: &R) {
    let note = groceries();
    let err = repo.update(&note).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(id) if id == note.id()));
    assert!(repo.get(note.id()).unwrap().is_none());
}

fn check_add_existing_is_duplicate<R: NoteRepository>(repo: &R) {
    let note = groceries();
    repo.add(&note).unwrap();

    let mut again = note.clone();
    again.title = "other".to_string();
    let err = repo.add(&again).unwrap_err();
    assert!(matches!(err, RepoError::DuplicateId(id) if id == note.id()));
    assert_eq!(repo.get(note.id()).unwrap().unwrap().title, "Groceries");
}

fn check_delete_is_idempotent<R: NoteRepository>(repo: &R) {
    let note = groceries();
    repo.add(&note).unwrap();

    repo.delete(note.id()).unwrap();
    repo.delete(note.id()).unwrap();
    assert!(repo.get(note.id()).unwrap().is_none());
    assert!(repo.list().unwrap().is_empty());
}

fn check_item_order_round_trips<R: NoteRepository>(repo: &R) {
    let mut note = Note::new("Packing");
    for index in 0..25 {
        note.add_item(format!("item {index}"));
    }
    assert!(note.move_item(24, 0));
    assert!(note.move_item(3, 10));
    repo.add(&note).unwrap();

    let loaded = repo.get(note.id()).unwrap().unwrap();
    let texts: Vec<&str> = loaded.items.iter().map(|item| item.text.as_str()).collect();
    let expected: Vec<&str> = note.items.iter().map(|item| item.text.as_str()).collect();
    assert_eq!(texts, expected);
}

fn check_import_preserves_timestamps<R: NoteRepository>(repo: &R) {
    let local = repo.add(&groceries()).unwrap();

    let remote = Note::restore(
        local.id(),
        "Groceries (remote)",
        None,
        vec![ChecklistItem::new("Oat milk")],
        local.created_at(),
        local.updated_at() + 60_000,
    )
    .unwrap();
    assert!(repo.import(&remote).unwrap());

    let loaded = repo.get(local.id()).unwrap().unwrap();
    assert_equal_content(&loaded, &remote);
    assert_eq!(loaded.updated_at(), remote.updated_at());

    let fresh = Note::restore(
        uuid::Uuid::new_v4(),
        "Remote only",
        None,
        Vec::new(),
        1_000,
        2_000,
    )
    .unwrap();
    assert!(repo.import(&fresh).unwrap());
    assert_eq!(repo.get(fresh.id()).unwrap().unwrap().updated_at(), 2_000);
}

fn check_import_never_replaces_newer_copy<R: NoteRepository>(repo: &R) {
    let local = repo.add(&groceries()).unwrap();

    for (title, updated_at) in [("older", local.created_at()), ("tied", local.updated_at())] {
        let remote = Note::restore(
            local.id(),
            title,
            None,
            vec![ChecklistItem::new("remote row")],
            local.created_at(),
            updated_at,
        )
        .unwrap();
        assert!(!repo.import(&remote).unwrap());
    }

    let loaded = repo.get(local.id()).unwrap().unwrap();
    assert_equal_content(&loaded, &local);
    assert_eq!(loaded.updated_at(), local.updated_at());
}

fn check_concurrent_writes_to_one_id_are_atomic<R: NoteRepository>(repo: &R) {
    const ITEMS: usize = 12;
    const ROUNDS: usize = 40;
    let base = Note::new("seed");

    std::thread::scope(|scope| {
        for writer in 0..3 {
            let base = base.clone();
            scope.spawn(move || {
                for round in 0..ROUNDS {
                    let mut note = base.clone();
                    note.title = format!("w{writer}-r{round}");
                    note.items = (0..ITEMS)
                        .map(|_| ChecklistItem::new(note.title.clone()))
                        .collect();
                    if round % 5 == 4 {
                        repo.delete(note.id()).unwrap();
                        continue;
                    }
                    match repo.update(&note) {
                        Err(RepoError::NotFound(_)) => match repo.add(&note) {
                            Ok(_) | Err(RepoError::DuplicateId(_)) => {}
                            Err(err) => panic!("add failed: {err}"),
                        },
                        other => {
                            other.unwrap();
                        }
                    }
                }
            });
        }
        for _ in 0..2 {
            scope.spawn(|| {
                for _ in 0..(ROUNDS * 3) {
                    if let Some(note) = repo.get(base.id()).unwrap() {
                        assert_eq!(note.items.len(), ITEMS, "partial checklist observed");
                        assert!(note.items.iter().all(|item| item.text == note.title));
                    }
                }
            });
        }
    });
}

fn check_list_keeps_insertion_order<R: NoteRepository>(repo: &R) {
    let first = Note::new("first");
    let second = Note::new("second");
    let third = Note::new("third");
    for note in [&first, &second, &third] {
        repo.add(note).unwrap();
    }

    let ids: Vec<_> = repo.list().unwrap().iter().map(Note::id).collect();
    assert_eq!(ids, vec![first.id(), second.id(), third.id()]);
}

macro_rules! store_contract {
    ($module:ident, $make:expr) => {
        mod $module {
            use super::*;

            #[test]
            fn add_then_get_returns_equal_note() {
                check_add_then_get(&$make);
            }

            #[test]
            fn update_replaces_content() {
                check_update_replaces_content(&$make);
            }

            #[test]
            fn update_missing_is_not_found() {
                check_update_missing_is_not_found(&$make);
            }

            #[test]
            fn add_existing_is_duplicate() {
                check_add_existing_is_duplicate(&$make);
            }

            #[test]
            fn delete_is_idempotent() {
                check_delete_is_idempotent(&$make);
            }

            #[test]
            fn item_order_round_trips() {
                check_item_order_round_trips(&$make);
            }

            #[test]
            fn import_preserves_timestamps() {
                check_import_preserves_timestamps(&$make);
            }

            #[test]
            fn import_never_replaces_newer_copy() {
                check_import_never_replaces_newer_copy(&$make);
            }

            #[test]
            fn concurrent_writes_to_one_id_are_atomic() {
                check_concurrent_writes_to_one_id_are_atomic(&$make);
            }

            #[test]
            fn list_keeps_insertion_order() {
                check_list_keeps_insertion_order(&$make);
            }
        }
    };
}

store_contract!(sqlite, SqliteNoteRepository::open_in_memory().unwrap());
store_contract!(memory, InMemoryNoteRepository::new());

#[test]
fn sqlite_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notekeep.db");
    let note = groceries();

    let repo = SqliteNoteRepository::open(&path).unwrap();
    let persisted = repo.add(&note).unwrap();
    repo.close().unwrap();

    let reopened = SqliteNoteRepository::open(&path).unwrap();
    let loaded = reopened.get(note.id()).unwrap().unwrap();
    assert_equal_content(&loaded, &note);
    assert_eq!(loaded.updated_at(), persisted.updated_at());
}

#[test]
fn invalid_note_is_rejected_before_write() {
    let repo = SqliteNoteRepository::open_in_memory().unwrap();
    let mut note = groceries();
    let duplicate = note.items[0].clone();
    note.items.push(duplicate);

    let err = repo.add(&note).unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
    assert!(repo.list().unwrap().is_empty());
}

#[test]
fn service_save_note_adds_then_updates() {
    let service = NoteService::new(SqliteNoteRepository::open_in_memory().unwrap());
    let mut note = groceries();

    let first = service.save_note(&note).unwrap();
    note.items[0].is_completed = true;
    let second = service.save_note(&note).unwrap();

    assert!(second.updated_at() >= first.updated_at());
    let listed = service.list_notes().unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].items[0].is_completed);
    assert_eq!(listed[0].created_at(), note.created_at());
}
