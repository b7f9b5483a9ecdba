//! Registry behavior under connection loss and failed dials.

use std::time::Duration;

use bson::doc;
use mongo_dao::prelude::*;
use mongo_dao::testing::MockDriver;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Heartbeat {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    sequence: i64,
}

impl Model for Heartbeat {}

fn dao_with(driver: &MockDriver) -> Dao {
    let config = DbConfig {
        options: DbOptions {
            database: "reconnect_test".to_string(),
            ..Default::default()
        },
        uris: vec!["127.0.0.1:27017".to_string()],
    };
    let registry = ConnectionRegistry::new(driver.clone().into_arc());
    Dao::new(&config, registry).unwrap()
}

#[tokio::test]
async fn operations_resume_after_connection_loss() {
    let driver = MockDriver::new();
    let dao = dao_with(&driver);

    dao.save(Heartbeat { id: None, sequence: 1 }).await.unwrap();
    assert_eq!(driver.connect_calls(), 1);

    driver.close_current("connection reset");
    // Give the eviction watcher a chance to run.
    tokio::time::sleep(Duration::from_millis(20)).await;

    dao.save(Heartbeat { id: None, sequence: 2 }).await.unwrap();
    assert_eq!(driver.connect_calls(), 2, "a fresh dial should follow the close");

    let count = dao.for_model::<Heartbeat>().count(doc! {}).await.unwrap();
    assert_eq!(count, 2);
    assert_eq!(driver.connect_calls(), 2, "the re-established connection is reused");
}

#[tokio::test]
async fn failed_dial_surfaces_and_is_retried() {
    let driver = MockDriver::new();
    let dao = dao_with(&driver);
    driver.fail_next_connects(1);

    let err = dao
        .save(Heartbeat { id: None, sequence: 1 })
        .await
        .unwrap_err();
    assert!(err.is_connection_error());

    // The failure was not cached: the next call dials again and succeeds.
    dao.save(Heartbeat { id: None, sequence: 2 }).await.unwrap();
    assert_eq!(driver.connect_calls(), 2);
}

#[tokio::test]
async fn concurrent_operations_share_one_dial() {
    let driver = MockDriver::new();
    driver.set_connect_delay(Duration::from_millis(30));
    let dao = dao_with(&driver);

    let results = futures::future::join_all((0..8).map(|sequence| {
        let dao = dao.clone();
        async move { dao.save(Heartbeat { id: None, sequence }).await }
    }))
    .await;

    for result in results {
        result.unwrap();
    }
    assert_eq!(driver.connect_calls(), 1);
    assert_eq!(driver.documents("heartbeat").len(), 8);
}

#[tokio::test]
async fn concurrent_callers_all_observe_a_failed_dial() {
    let driver = MockDriver::new();
    driver.set_connect_delay(Duration::from_millis(30));
    driver.fail_next_connects(1);
    let dao = dao_with(&driver);

    let results = futures::future::join_all((0..4).map(|_| {
        let dao = dao.clone();
        async move { dao.connect().await }
    }))
    .await;

    assert_eq!(driver.connect_calls(), 1, "one dial serves every waiter");
    for result in results {
        let err = result.err().expect("every waiter should observe the failure");
        assert!(err.is_connection_error());
    }
}
