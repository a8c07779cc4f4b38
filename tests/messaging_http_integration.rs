//! End-to-end tests: the reqwest client against the axum reference server.
//!
//! Each test binds the server to an ephemeral port, points the client at it
//! and drives the client-side components exactly as an application would.

use std::sync::Arc;
use std::time::Duration;

use school_messaging::adapters::{
    messaging_router, HttpMessagingClient, InMemoryMessagingBackend, MessagingAppState,
};
use school_messaging::application::messaging::{
    ConversationDirectory, ConversationSession, CreateConversationCommand, MessagingServices,
    SearchOutcome, SearchSettings, SessionOutcome, UserSearch,
};
use school_messaging::config::ApiConfig;
use school_messaging::domain::foundation::UserId;
use school_messaging::domain::messaging::{
    MessagingError, PreviewStrategy, Role, SelectedFile, UserSummary, Viewer,
};

// =============================================================================
// Test Infrastructure
// =============================================================================

struct TestServer {
    backend: Arc<InMemoryMessagingBackend>,
    client: Arc<HttpMessagingClient>,
    base_url: String,
}

fn uid(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn person(id: &str, name: &str, role: Role) -> UserSummary {
    UserSummary::new(uid(id), Some(name.to_string()), format!("{}@school.test", id), role)
}

fn viewer(id: &str, role: Role) -> Viewer {
    Viewer::new(uid(id), role)
}

async fn start_server() -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let backend = Arc::new(
        InMemoryMessagingBackend::new(base_url.clone())
            .with_chunk_size(1024)
            .with_user(person("teacher", "Tess Moore", Role::Teacher))
            .with_user(person("student", "Alice Lane", Role::Student))
            .with_user(person("parent", "Paul Lane", Role::Parent))
            .with_user(person("staff", "Alister Grey", Role::Staff)),
    );
    let app = messaging_router(
        MessagingAppState::new(backend.clone()),
        Duration::from_secs(10),
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = ApiConfig {
        base_url: base_url.clone(),
        ..ApiConfig::default()
    };
    let client = Arc::new(
        HttpMessagingClient::new(&config)
            .unwrap()
            .with_chunk_size(4 * 1024),
    );

    TestServer {
        backend,
        client,
        base_url,
    }
}

/// A small PNG-like payload; the server trusts the declared content type.
fn image_file(size: usize) -> SelectedFile {
    let mut data = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    data.resize(size, 7);
    SelectedFile::from_bytes("photo.png", Some("image/png"), data)
}

// =============================================================================
// Scenario A: group creation with an initial message
// =============================================================================

#[tokio::test]
async fn group_with_initial_message_is_listed_first_and_opens_with_one_message() {
    let server = start_server().await;
    let teacher = viewer("teacher", Role::Teacher);
    let directory = ConversationDirectory::new(server.client.clone());

    let older = directory
        .create_conversation(&teacher, CreateConversationCommand::direct(uid("parent")))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let club = directory
        .create_conversation(
            &teacher,
            CreateConversationCommand::group("Maths Club", vec![uid("student"), uid("parent")])
                .with_initial_message("Welcome!"),
        )
        .await
        .unwrap();

    let listed = directory.list(&teacher).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id(), club.id());
    assert_eq!(listed[1].id(), older.id());
    assert_eq!(listed[0].title_for(&teacher.id), "Maths Club");

    let services = MessagingServices::from_backend(server.client.clone());
    let session = ConversationSession::new(teacher.clone(), *club.id(), services);
    assert_eq!(session.open().await.unwrap(), SessionOutcome::Opened);

    let view = session.view().unwrap();
    assert_eq!(view.title, "Maths Club");
    assert!(view.is_group);
    assert_eq!(view.participants.len(), 3);
    assert_eq!(view.rows.len(), 1);
    assert_eq!(view.rows[0].message.sender_id(), &teacher.id);
    assert_eq!(view.rows[0].message.content(), "Welcome!");
    assert!(view.rows[0].is_own);

    // opening marks the thread seen on the server
    assert!(server.backend.seen_marker(&teacher.id, club.id()).is_some());
}

#[tokio::test]
async fn missing_conversation_returns_to_directory() {
    let server = start_server().await;
    let teacher = viewer("teacher", Role::Teacher);
    let directory = ConversationDirectory::new(server.client.clone());
    let direct = directory
        .create_conversation(&teacher, CreateConversationCommand::direct(uid("student")))
        .await
        .unwrap();
    directory
        .delete_conversation(&teacher, direct.id())
        .await
        .unwrap();

    let services = MessagingServices::from_backend(server.client.clone());
    let session = ConversationSession::new(teacher, *direct.id(), services);
    assert_eq!(
        session.open().await.unwrap(),
        SessionOutcome::ReturnToDirectory
    );
}

#[tokio::test]
async fn direct_conversation_roster_is_fixed() {
    let server = start_server().await;
    let teacher = viewer("teacher", Role::Teacher);
    let directory = ConversationDirectory::new(server.client.clone());
    let direct = directory
        .create_conversation(&teacher, CreateConversationCommand::direct(uid("student")))
        .await
        .unwrap();

    let services = MessagingServices::from_backend(server.client.clone());
    let session = ConversationSession::new(teacher, *direct.id(), services);
    session.open().await.unwrap();

    let err = session.add_participant(&uid("parent")).await.unwrap_err();
    assert!(matches!(err, MessagingError::Forbidden(_)));
}

// =============================================================================
// Scenario B: image attachment with real upload progress
// =============================================================================

#[tokio::test]
async fn image_upload_reports_progress_and_yields_inline_attachment() {
    let server = start_server().await;
    let teacher = viewer("teacher", Role::Teacher);
    let directory = ConversationDirectory::new(server.client.clone());
    let direct = directory
        .create_conversation(&teacher, CreateConversationCommand::direct(uid("student")))
        .await
        .unwrap();

    let services = MessagingServices::from_backend(server.client.clone());
    let session = ConversationSession::new(teacher.clone(), *direct.id(), services);
    session.open().await.unwrap();

    let mut progress = session.upload_progress();
    session.select_file(image_file(64 * 1024)).unwrap();
    let message = session.send("").await.unwrap();

    let mut values = Vec::new();
    while let Ok(value) = progress.try_recv() {
        values.push(value);
    }
    assert!(!values.is_empty());
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "{:?}", values);
    assert_eq!(values.last(), Some(&100));

    let attachment = message.attachment().expect("message carries the attachment");
    assert_eq!(attachment.mime_type, "image/png");
    assert_eq!(attachment.size_bytes, 64 * 1024);
    assert_eq!(attachment.preview_strategy(), PreviewStrategy::InlineImage);
    assert!(attachment.url.starts_with(&server.base_url));

    let response = reqwest::get(&attachment.url).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.headers()[reqwest::header::CONTENT_TYPE],
        "image/png"
    );
    let bytes = response.bytes().await.unwrap();
    assert_eq!(bytes.len(), 64 * 1024);
    assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
}

#[tokio::test]
async fn rejected_upload_aborts_the_send() {
    let server = start_server().await;
    let teacher = viewer("teacher", Role::Teacher);
    let directory = ConversationDirectory::new(server.client.clone());
    let direct = directory
        .create_conversation(&teacher, CreateConversationCommand::direct(uid("student")))
        .await
        .unwrap();

    let services = MessagingServices::from_backend(server.client.clone());
    let session = ConversationSession::new(teacher.clone(), *direct.id(), services);
    session.open().await.unwrap();

    let file = SelectedFile::from_bytes("tool.exe", Some("application/x-msdownload"), vec![1; 32]);
    session.select_file(file).unwrap();
    let err = session.send("see attached").await.unwrap_err();
    assert!(matches!(err, MessagingError::Upload(_)), "{:?}", err);

    let history = session.refresh().await.unwrap();
    assert!(history.is_empty());
}

// =============================================================================
// Scenario C: debounced participant search
// =============================================================================

#[tokio::test]
async fn rapid_keystrokes_issue_a_single_search() {
    let server = start_server().await;
    let teacher = viewer("teacher", Role::Teacher);
    let search = UserSearch::new(
        server.client.clone(),
        SearchSettings {
            debounce: Duration::from_millis(200),
            min_chars: 2,
        },
    );

    let type_after = |text: &'static str, delay_ms: u64| {
        let search = &search;
        let teacher = &teacher;
        async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            search.search(teacher, text, None, &[]).await
        }
    };
    let (a, al, ali) = tokio::join!(type_after("a", 0), type_after("al", 30), type_after("ali", 60));

    assert_eq!(a.unwrap(), SearchOutcome::Cleared);
    assert_eq!(al.unwrap(), SearchOutcome::Superseded);
    let found = match ali.unwrap() {
        SearchOutcome::Applied(users) => users,
        other => panic!("expected applied results, got {:?}", other),
    };

    let log = server.backend.search_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].text, "ali");

    let ids: Vec<&str> = found.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, vec!["student", "staff"]);
    assert_eq!(search.results(), found);
}

#[tokio::test]
async fn search_filters_by_role_over_http() {
    let server = start_server().await;
    let teacher = viewer("teacher", Role::Teacher);
    let search = UserSearch::new(
        server.client.clone(),
        SearchSettings {
            debounce: Duration::from_millis(10),
            min_chars: 2,
        },
    );

    let outcome = search
        .search(&teacher, "lane", Some(Role::Parent), &[])
        .await
        .unwrap();
    match outcome {
        SearchOutcome::Applied(users) => {
            assert_eq!(users.len(), 1);
            assert_eq!(users[0].id, uid("parent"));
        }
        other => panic!("expected applied results, got {:?}", other),
    }
    assert_eq!(server.backend.search_log()[0].role, Some(Role::Parent));
}
