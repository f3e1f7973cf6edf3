use shared::domain::PageRequest;

use super::*;
use crate::test_support::{book_factory, Book};

async fn repository() -> EntityRepository<Book> {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    EntityRepository::new(Arc::new(EntityManager::new(storage)), "book", book_factory())
}

#[tokio::test]
async fn save_merges_only_declared_fields() {
    let repo = repository().await;
    let mut stored = Book::titled("Dune");
    stored.shelf_mark = "A-12".into();
    let key = repo.save(&mut stored).await.expect("save");

    // a freshly bound record carries no shelf mark
    let mut edited = Book::titled("Dune Messiah");
    edited.id = Some(1);
    edited.pages = Some(256);
    repo.save(&mut edited).await.expect("save");

    let loaded = repo.find(&key).await.expect("find").expect("book");
    assert_eq!(loaded.title, "Dune Messiah");
    assert_eq!(loaded.pages, Some(256));
    assert_eq!(loaded.shelf_mark, "A-12");
    assert_eq!(edited.shelf_mark, "A-12");
}

#[tokio::test]
async fn unknown_key_is_inserted_as_is() {
    let repo = repository().await;
    let mut book = Book::titled("Emma");
    book.id = Some(40);
    let key = repo.save(&mut book).await.expect("save");
    assert_eq!(key.as_str(), "40");
    assert_eq!(repo.fetch_all(&Query::all()).await.expect("all").len(), 1);
}

#[tokio::test]
async fn flush_writes_queued_changes_together() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let manager = EntityManager::new(storage.clone());

    let mut unit = manager.unit_of_work();
    unit.insert("book", "id", Book::titled("Dune").to_fields());
    unit.insert("book", "id", Book::titled("Emma").to_fields());
    assert_eq!(unit.pending_changes(), 2);
    assert_eq!(storage.count_rows("book", &Query::all()).await.expect("count"), 0);

    let keys = unit.flush().await.expect("flush");
    assert_eq!(keys, vec![RecordKey::new("1"), RecordKey::new("2")]);
    let emma = manager.find("book", &keys[1]).await.expect("find").expect("row");
    assert_eq!(emma.fields["id"], serde_json::json!(2));
    assert_eq!(emma.fields["title"], serde_json::json!("Emma"));

    let mut unit = manager.unit_of_work();
    unit.remove("book", keys[0].clone());
    assert!(unit.flush().await.expect("flush").is_empty());
    assert!(manager.find("book", &keys[0]).await.expect("find").is_none());
    assert!(manager.unit_of_work().flush().await.expect("empty flush").is_empty());
}

#[tokio::test]
async fn failed_save_is_not_written_by_a_later_one() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    sqlx::query(
        "CREATE TRIGGER reject_forbidden BEFORE INSERT ON records
         WHEN json_extract(NEW.fields, '$.title') = 'Forbidden'
         BEGIN SELECT RAISE(ABORT, 'title rejected'); END",
    )
    .execute(storage.pool())
    .await
    .expect("trigger");
    let repo = EntityRepository::new(
        Arc::new(EntityManager::new(storage.clone())),
        "book",
        book_factory(),
    );

    let mut rejected = Book::titled("Forbidden");
    rejected.id = Some(5);
    repo.save(&mut rejected).await.expect_err("rejected by trigger");

    let key = repo.save(&mut Book::titled("Dune")).await.expect("save");
    assert_eq!(key.as_str(), "1");
    let titles: Vec<String> = repo
        .fetch_all(&Query::all())
        .await
        .expect("all")
        .into_iter()
        .map(|book| book.title)
        .collect();
    assert_eq!(titles, vec!["Dune"]);
    assert!(repo.find(&RecordKey::new("5")).await.expect("find").is_none());
}

#[tokio::test]
async fn failed_unit_writes_none_of_its_changes() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    sqlx::query(
        "CREATE TRIGGER reject_forbidden BEFORE INSERT ON records
         WHEN json_extract(NEW.fields, '$.title') = 'Forbidden'
         BEGIN SELECT RAISE(ABORT, 'title rejected'); END",
    )
    .execute(storage.pool())
    .await
    .expect("trigger");
    let manager = EntityManager::new(storage.clone());

    let mut unit = manager.unit_of_work();
    unit.insert("book", "id", Book::titled("Dune").to_fields());
    unit.insert("book", "id", Book::titled("Forbidden").to_fields());
    unit.flush().await.expect_err("second insert rejected");

    assert_eq!(storage.count_rows("book", &Query::all()).await.expect("count"), 0);
}

#[tokio::test]
async fn pages_are_sliced_in_memory() {
    let repo = repository().await;
    for title in ["A", "B", "C"] {
        repo.save(&mut Book::titled(title)).await.expect("save");
    }
    let page = repo
        .fetch_page(&Query::all(), PageRequest::new(2, 2).expect("request"))
        .await
        .expect("page");
    assert_eq!(page.total_items, 3);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].title, "C");
}

#[tokio::test]
async fn delete_removes_existing_and_ignores_absent() {
    let repo = repository().await;
    let key = repo.save(&mut Book::titled("Dune")).await.expect("save");

    repo.delete(&key).await.expect("delete");
    assert!(repo.find(&key).await.expect("find").is_none());
    repo.delete(&key).await.expect("delete again");
}

#[tokio::test]
async fn base_query_narrows_default_listing() {
    let repo = repository()
        .await
        .with_base_query(Query::all().where_eq("title", "Emma"));
    for title in ["Dune", "Emma", "Emma"] {
        repo.save(&mut Book::titled(title)).await.expect("save");
    }

    let page = repo
        .fetch_page(&repo.default_query(), PageRequest::first(10).expect("request"))
        .await
        .expect("page");
    assert_eq!(page.total_items, 2);
    assert!(page.items.iter().all(|book| book.title == "Emma"));
}
