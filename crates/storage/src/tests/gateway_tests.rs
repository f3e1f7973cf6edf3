use super::*;
use crate::test_support::{book_factory, loan_factory, Book, Loan};

async fn gateway() -> TableGateway<Book> {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    TableGateway::new(storage, "book", book_factory())
}

#[tokio::test]
async fn save_assigns_sequential_keys() {
    let gateway = gateway().await;
    let mut first = Book::titled("Dune");
    let mut second = Book::titled("Emma");

    assert_eq!(gateway.save(&mut first).await.expect("save").as_str(), "1");
    assert_eq!(gateway.save(&mut second).await.expect("save").as_str(), "2");
    assert_eq!(first.id, Some(1));

    let loaded = gateway
        .fetch_by_key(&RecordKey::new("2"))
        .await
        .expect("fetch")
        .expect("record");
    assert_eq!(loaded, second);
}

#[tokio::test]
async fn save_with_key_overwrites_whole_row() {
    let gateway = gateway().await;
    let mut book = Book::titled("Dune");
    book.shelf_mark = "A-12".into();
    let key = gateway.save(&mut book).await.expect("save");

    let mut edited = Book::titled("Dune Messiah");
    edited.id = Some(1);
    gateway.save(&mut edited).await.expect("save");

    let loaded = gateway.fetch_by_key(&key).await.expect("fetch").expect("record");
    assert_eq!(loaded.title, "Dune Messiah");
    assert_eq!(loaded.shelf_mark, "");
}

#[tokio::test]
async fn pages_are_counted_in_sql() {
    let gateway = gateway().await;
    for n in 1..=5 {
        gateway
            .save(&mut Book::titled(&format!("Book {n}")))
            .await
            .expect("save");
    }

    let page = gateway
        .fetch_page(&Query::all(), PageRequest::new(2, 2).expect("request"))
        .await
        .expect("page");
    assert_eq!(page.total_items, 5);
    assert_eq!(page.page_count(), 3);
    let titles: Vec<_> = page.items.iter().map(|b| b.title.as_str()).collect();
    assert_eq!(titles, vec!["Book 3", "Book 4"]);

    let beyond = gateway
        .fetch_page(&Query::all(), PageRequest::new(9, 2).expect("request"))
        .await
        .expect("page");
    assert_eq!(beyond.current_page, 3);
    assert_eq!(beyond.items.len(), 1);
}

#[tokio::test]
async fn base_query_becomes_default() {
    let gateway = gateway().await.with_base_query(Query::all().where_eq("title", "Emma"));
    gateway.save(&mut Book::titled("Dune")).await.expect("save");
    gateway.save(&mut Book::titled("Emma")).await.expect("save");

    let query = gateway.default_query();
    let page = gateway
        .fetch_page(&query, PageRequest::first(10).expect("request"))
        .await
        .expect("page");
    assert_eq!(page.total_items, 1);
    assert_eq!(page.items[0].title, "Emma");
}

#[tokio::test]
async fn deleting_absent_key_is_ok() {
    let gateway = gateway().await;
    gateway
        .delete(&RecordKey::new("404"))
        .await
        .expect("delete");
}

#[tokio::test]
async fn composite_key_must_be_supplied() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let loans = TableGateway::new(storage, "loan", loan_factory());

    let err = loans
        .save(&mut Loan::default())
        .await
        .expect_err("no key");
    assert!(matches!(err, PersistenceError::MissingKey));

    let mut loan = Loan {
        book_id: "1".into(),
        member: "ana".into(),
    };
    let key = loans.save(&mut loan).await.expect("save");
    assert_eq!(key.as_str(), "1,ana");
    assert!(loans.fetch_by_key(&key).await.expect("fetch").is_some());
}

#[tokio::test]
async fn concurrent_saves_keep_every_record() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("crud_gateway_concurrent_{suffix}"));
    let db_path = temp_root.join("records.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));
    let storage = Storage::new(&database_url).await.expect("db");
    let gateway = Arc::new(TableGateway::new(storage.clone(), "book", book_factory()));

    let mut handles = Vec::new();
    for n in 0..20 {
        let gateway = Arc::clone(&gateway);
        handles.push(tokio::spawn(async move {
            let mut book = Book::titled(&format!("Book {n}"));
            let key = gateway.save(&mut book).await.expect("save");
            (key, book)
        }));
    }
    let mut keys = Vec::new();
    for handle in handles {
        let (key, book) = handle.await.expect("join");
        assert_eq!(book.id.map(|id| id.to_string()), Some(key.as_str().to_string()));
        keys.push(key);
    }
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 20);

    let stored = gateway.fetch_all(&Query::all()).await.expect("all");
    assert_eq!(stored.len(), 20);
    let mut titles: Vec<_> = stored.iter().map(|book| book.title.clone()).collect();
    titles.sort();
    titles.dedup();
    assert_eq!(titles.len(), 20);

    storage.pool().close().await;
    std::fs::remove_dir_all(temp_root).expect("cleanup");
}
