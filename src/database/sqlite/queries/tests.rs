use super::*;
use crate::database::sqlite::Database;
use std::time::Duration;
use tempfile::TempDir;

async fn create_test_pool() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let database = Database::initialize_from_config_dir(temp_dir.path())
        .await
        .expect("should create database");
    (temp_dir, database.pool().clone())
}

async fn create_space(pool: &SqlitePool, name: &str) -> Space {
    let (space, _) = SpaceQueries::create(
        pool,
        NewSpace {
            name: name.to_string(),
            description: Some("desc".to_string()),
            problem_statement: None,
            user_id: "founder".to_string(),
        },
    )
    .await
    .expect("should create space");
    space
}

// Rows created within the same instant would tie on created_at
async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test]
async fn space_creation_and_join() {
    let (_temp_dir, pool) = create_test_pool().await;

    let (space, owner) = SpaceQueries::create(
        &pool,
        NewSpace {
            name: "Acme".to_string(),
            description: None,
            problem_statement: Some("Founders lose context".to_string()),
            user_id: "alice".to_string(),
        },
    )
    .await
    .expect("should create space");

    assert_eq!(owner.role, MemberRole::Owner);
    assert_eq!(owner.user_id, "alice");
    assert_eq!(owner.space_id, space.id);
    assert!(!space.invite_token.is_empty());

    let fetched = SpaceQueries::get_by_id(&pool, &space.id)
        .await
        .expect("query should succeed")
        .expect("space should exist");
    assert_eq!(fetched, space);

    let (joined_space, member) = SpaceQueries::join(&pool, &space.invite_token, "bob")
        .await
        .expect("join should succeed")
        .expect("token should be known");
    assert_eq!(joined_space.id, space.id);
    assert_eq!(member.role, MemberRole::Member);

    // Joining again keeps the original membership
    let (_, again) = SpaceQueries::join(&pool, &space.invite_token, "bob")
        .await
        .expect("join should succeed")
        .expect("token should be known");
    assert_eq!(again.id, member.id);

    // The owner joining through the invite stays owner
    let (_, owner_again) = SpaceQueries::join(&pool, &space.invite_token, "alice")
        .await
        .expect("join should succeed")
        .expect("token should be known");
    assert_eq!(owner_again.role, MemberRole::Owner);

    let members = SpaceQueries::list_members(&pool, &space.id)
        .await
        .expect("should list members");
    assert_eq!(members.len(), 2);

    assert!(
        SpaceQueries::join(&pool, "not-a-token", "carol")
            .await
            .expect("join should succeed")
            .is_none()
    );
    assert!(
        SpaceQueries::get_by_id(&pool, "missing")
            .await
            .expect("query should succeed")
            .is_none()
    );
}

#[tokio::test]
async fn message_ordering_and_scope() {
    let (_temp_dir, pool) = create_test_pool().await;
    let space = create_space(&pool, "One").await;
    let other = create_space(&pool, "Two").await;

    for content in ["first", "second"] {
        MessageQueries::create(
            &pool,
            NewMessage {
                space_id: space.id.clone(),
                user_id: "u1".to_string(),
                content: content.to_string(),
            },
        )
        .await
        .expect("should create message");
        tick().await;
    }
    MessageQueries::create(
        &pool,
        NewMessage {
            space_id: other.id.clone(),
            user_id: "u2".to_string(),
            content: "elsewhere".to_string(),
        },
    )
    .await
    .expect("should create message");

    let messages = MessageQueries::list_by_space(&pool, &space.id)
        .await
        .expect("should list messages");
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second"]);

    let all = MessageQueries::list_all(&pool, None)
        .await
        .expect("should list all");
    assert_eq!(all.len(), 3);
    let scoped = MessageQueries::list_all(&pool, Some(&other.id))
        .await
        .expect("should list scoped");
    assert_eq!(scoped.len(), 1);
}

#[tokio::test]
async fn journal_crud_operations() {
    let (_temp_dir, pool) = create_test_pool().await;
    let space = create_space(&pool, "Acme").await;

    let mut ids = Vec::new();
    for i in 0..7 {
        let entry = JournalQueries::create(
            &pool,
            NewJournalEntry {
                space_id: space.id.clone(),
                user_id: "u1".to_string(),
                title: format!("Week {i}"),
                content: "Talked to users".to_string(),
            },
        )
        .await
        .expect("should create entry");
        ids.push(entry.id);
        tick().await;
    }

    let recent = JournalQueries::list_recent(&pool, &space.id, RECENT_JOURNAL_ENTRIES)
        .await
        .expect("should list recent");
    assert_eq!(recent.len(), 5);
    assert_eq!(recent[0].title, "Week 6");

    let all = JournalQueries::list_by_space(&pool, &space.id)
        .await
        .expect("should list all");
    assert_eq!(all.len(), 7);

    let updated = JournalQueries::update(
        &pool,
        &ids[0],
        JournalEntryUpdate {
            title: None,
            content: Some("Pivoted to B2B".to_string()),
        },
    )
    .await
    .expect("should update")
    .expect("entry should exist");
    assert_eq!(updated.title, "Week 0");
    assert_eq!(updated.content, "Pivoted to B2B");
    assert!(updated.updated_at >= updated.created_at);

    assert!(
        JournalQueries::update(&pool, "missing", JournalEntryUpdate::default())
            .await
            .expect("should run update")
            .is_none()
    );

    let deleted = JournalQueries::delete(&pool, &ids[0])
        .await
        .expect("should delete")
        .expect("entry should exist");
    assert_eq!(deleted.id, ids[0]);
    assert!(
        JournalQueries::delete(&pool, &ids[0])
            .await
            .expect("should run delete")
            .is_none()
    );
}

#[tokio::test]
async fn document_crud_operations() {
    let (_temp_dir, pool) = create_test_pool().await;
    let space = create_space(&pool, "Acme").await;

    let document = DocumentQueries::create(
        &pool,
        NewDocument {
            space_id: space.id.clone(),
            title: "Roadmap".to_string(),
            url: Some("https://example.com/roadmap.pdf".to_string()),
            summary: None,
        },
    )
    .await
    .expect("should create document");

    let updated = DocumentQueries::update(
        &pool,
        &document.id,
        DocumentUpdate {
            summary: Some("Launch by Q4".to_string()),
            ..DocumentUpdate::default()
        },
    )
    .await
    .expect("should update")
    .expect("document should exist");
    assert_eq!(updated.title, "Roadmap");
    assert_eq!(updated.summary.as_deref(), Some("Launch by Q4"));
    assert_eq!(updated.url, document.url);

    let listed = DocumentQueries::list_by_space(&pool, &space.id)
        .await
        .expect("should list");
    assert_eq!(listed.len(), 1);

    DocumentQueries::delete(&pool, &document.id)
        .await
        .expect("should delete")
        .expect("document should exist");
    assert!(
        DocumentQueries::list_all(&pool, None)
            .await
            .expect("should list")
            .is_empty()
    );
}

#[tokio::test]
async fn task_crud_operations() {
    let (_temp_dir, pool) = create_test_pool().await;
    let space = create_space(&pool, "Acme").await;

    let task = TaskQueries::create(
        &pool,
        NewTask {
            space_id: space.id.clone(),
            user_id: Some("u1".to_string()),
            title: "Ship MVP".to_string(),
            category: Some("Product".to_string()),
        },
    )
    .await
    .expect("should create task");
    assert_eq!(task.status, TaskStatus::Todo);

    let updated = TaskQueries::update(
        &pool,
        &task.id,
        TaskUpdate {
            status: Some(TaskStatus::InProgress),
            ..TaskUpdate::default()
        },
    )
    .await
    .expect("should update")
    .expect("task should exist");
    assert_eq!(updated.status, TaskStatus::InProgress);
    assert_eq!(updated.category.as_deref(), Some("Product"));

    let fetched = TaskQueries::get_by_id(&pool, &task.id)
        .await
        .expect("should fetch")
        .expect("task should exist");
    assert_eq!(fetched.status, TaskStatus::InProgress);

    let details = SpaceQueries::get_details(&pool, &space.id)
        .await
        .expect("should load details")
        .expect("space should exist");
    assert_eq!(details.tasks.len(), 1);
    assert_eq!(details.members.len(), 1);
    assert!(details.documents.is_empty());

    TaskQueries::delete(&pool, &task.id)
        .await
        .expect("should delete")
        .expect("task should exist");
    assert!(
        TaskQueries::list_by_space(&pool, &space.id)
            .await
            .expect("should list")
            .is_empty()
    );
}

#[tokio::test]
async fn space_ids_are_listed() {
    let (_temp_dir, pool) = create_test_pool().await;
    let first = create_space(&pool, "One").await;
    tick().await;
    let second = create_space(&pool, "Two").await;

    let ids = SpaceQueries::list_ids(&pool).await.expect("should list ids");
    assert_eq!(ids, vec![first.id, second.id]);
}
