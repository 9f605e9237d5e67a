use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow};

use baycheck::club::Club;
use baycheck::feed::StaticFeed;
use baycheck::sweeper::{ReviewBoard, sweep};
use baycheck::wire;

const FIXTURE: &str = r#"{
    "resources": [
        {"id": 1, "name": "Bay 1", "type": "simulator"},
        {"id": 2, "name": "Bay 2", "type": "simulator"},
        {"id": 3, "name": "Bay 3", "type": "simulator"},
        {"id": 11, "name": "Conference Room", "type": "conference_room"}
    ],
    "bookings": [
        {"id": 100, "bay_id": 2, "request_date": "2024-06-01", "start_time": "10:30:00", "end_time": "11:30:00"}
    ],
    "blocks": [
        {"id": 7, "bay_id": 1, "block_date": "2024-06-04", "start_time": "12:00", "end_time": "13:00", "block_type": "maintenance"}
    ],
    "closures": [
        {"id": 1, "title": "Independence Day", "startDate": "2024-07-04", "affectedAreas": "all_bays", "isActive": true},
        {"id": 2, "title": "Old", "startDate": "2024-07-05", "affectedAreas": "entire_facility", "isActive": false}
    ],
    "requests": [
        {"id": 200, "bay_id": 2, "request_date": "2024-06-01", "start_time": "11:00", "end_time": "12:00",
         "user_name": "Pat", "status": "pending"}
    ]
}"#;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let feed = Arc::new(StaticFeed::from_json(FIXTURE).unwrap());
    let club = Arc::new(Club::new(feed));
    let board = Arc::new(ReviewBoard::new());
    sweep(&club, &board).await.unwrap();

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let club = club.clone();
            let board = board.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, club, board, "baycheck".to_string(), None).await;
            });
        }
    });

    addr
}

async fn connect(addr: SocketAddr, password: &str) -> Result<Client, tokio_postgres::Error> {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("club")
        .user("staff")
        .password(password);

    let (client, connection) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        let _ = connection.await;
    });
    Ok(client)
}

async fn rows(client: &Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|msg| match msg {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn availability_reports_conflicts_and_clear_slots() {
    let addr = start_test_server().await;
    let client = connect(addr, "baycheck").await.unwrap();

    let conflict = rows(
        &client,
        "SELECT * FROM availability WHERE resource_id = 2 AND date = '2024-06-01' AND start_time = '10:00' AND end_time = '11:00'",
    )
    .await;
    assert_eq!(conflict.len(), 1);
    assert_eq!(conflict[0].get("status"), Some("conflict"));
    assert_eq!(conflict[0].get("kind"), Some("booking"));
    assert_eq!(
        conflict[0].get("reason"),
        Some("Conflicts with existing booking: 10:30-11:30")
    );

    let clear = rows(
        &client,
        "SELECT * FROM availability WHERE resource_id = 3 AND date = '2024-06-01' AND start_time = '10:00' AND end_time = '11:00'",
    )
    .await;
    assert_eq!(clear[0].get("status"), Some("available"));
    assert_eq!(clear[0].get("reason"), None);

    let excluded = rows(
        &client,
        "SELECT * FROM availability WHERE resource_id = 2 AND date = '2024-06-01' AND start_time = '10:30' AND end_time = '11:30' AND exclude_booking = 100",
    )
    .await;
    assert_eq!(excluded[0].get("status"), Some("available"));

    let holiday = rows(
        &client,
        "SELECT * FROM availability WHERE resource_id = 1 AND date = '2024-07-04' AND start_time = '08:00' AND end_time = '09:00'",
    )
    .await;
    assert_eq!(holiday[0].get("reason"), Some("Conflicts with closure: Independence Day"));
}

#[tokio::test]
async fn slot_grid_and_free_windows() {
    let addr = start_test_server().await;
    let client = connect(addr, "baycheck").await.unwrap();

    // Tuesday, 08:30-20:00, with a 12:00-13:00 block on bay 1.
    let slots = rows(&client, "SELECT * FROM slots WHERE resource_id = 1 AND date = '2024-06-04'").await;
    assert_eq!(slots.first().unwrap().get("start_time"), Some("08:30"));
    assert_eq!(slots.last().unwrap().get("end_time"), Some("20:00"));
    let noon = slots.iter().find(|r| r.get("start_time") == Some("12:00")).unwrap();
    assert_eq!(noon.get("available"), Some("f"));
    let eleven = slots.iter().find(|r| r.get("start_time") == Some("11:00")).unwrap();
    assert_eq!(eleven.get("available"), Some("t"));

    let monday = rows(&client, "SELECT * FROM slots WHERE resource_id = 1 AND date = '2024-06-03'").await;
    assert!(monday.is_empty());

    let windows = rows(
        &client,
        "SELECT * FROM free_windows WHERE resource_id = 1 AND date = '2024-06-04'",
    )
    .await;
    let spans: Vec<(&str, &str)> = windows
        .iter()
        .map(|r| (r.get("start_time").unwrap(), r.get("end_time").unwrap()))
        .collect();
    assert_eq!(spans, vec![("08:30", "12:00"), ("13:00", "20:00")]);
}

#[tokio::test]
async fn closures_resources_and_areas() {
    let addr = start_test_server().await;
    let client = connect(addr, "baycheck").await.unwrap();

    let closures = rows(&client, "SELECT * FROM closures").await;
    assert_eq!(closures.len(), 1);
    assert_eq!(closures[0].get("title"), Some("Independence Day"));
    assert_eq!(closures[0].get("resource_ids"), Some("1,2,3"));
    assert_eq!(closures[0].get("start_time"), None);

    let resources = rows(&client, "SELECT * FROM resources").await;
    assert_eq!(resources.len(), 4);
    assert_eq!(resources[3].get("kind"), Some("conference_room"));

    let ids = rows(&client, "SELECT * FROM affected_areas WHERE raw = 'bay_1, conference_room'").await;
    let ids: Vec<&str> = ids.iter().map(|r| r.get("resource_id").unwrap()).collect();
    assert_eq!(ids, vec!["1", "11"]);

    let none = rows(&client, "SELECT * FROM affected_areas WHERE raw = '[not json'").await;
    assert!(none.is_empty());
}

#[tokio::test]
async fn pending_reviews_come_from_the_sweep() {
    let addr = start_test_server().await;
    let client = connect(addr, "baycheck").await.unwrap();

    let reviews = rows(&client, "SELECT * FROM pending_reviews").await;
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].get("request_id"), Some("200"));
    assert_eq!(reviews[0].get("requester"), Some("Pat"));
    assert_eq!(reviews[0].get("status"), Some("conflict"));
}

#[tokio::test]
async fn extended_protocol_binds_parameters() {
    let addr = start_test_server().await;
    let client = connect(addr, "baycheck").await.unwrap();

    let rows = client
        .query(
            "SELECT * FROM availability WHERE resource_id = $1 AND date = $2 AND start_time = $3 AND end_time = $4",
            &[&"2", &"2024-06-01", &"10:00", &"11:00"],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let status: &str = rows[0].get("status");
    assert_eq!(status, "conflict");
}

#[tokio::test]
async fn errors_carry_sqlstate() {
    let addr = start_test_server().await;
    let client = connect(addr, "baycheck").await.unwrap();

    let err = client
        .simple_query(
            "SELECT * FROM availability WHERE resource_id = 2 AND date = '2024-06-01' AND start_time = '11:00' AND end_time = '10:00'",
        )
        .await
        .unwrap_err();
    assert_eq!(err.code().map(|c| c.code()), Some("22023"));

    let err = client.simple_query("SELECT * FROM bookings").await.unwrap_err();
    assert_eq!(err.code().map(|c| c.code()), Some("42601"));

    let err = client
        .simple_query("SELECT * FROM slots WHERE resource_id = 1 AND date = '2024-06-04' AND duration = 1")
        .await
        .unwrap_err();
    assert_eq!(err.code().map(|c| c.code()), Some("22023"));
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let addr = start_test_server().await;
    assert!(connect(addr, "nope").await.is_err());
}
