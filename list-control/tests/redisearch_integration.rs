//! List controls against a live RediSearch index.
//!
//! Skipped unless `REDIS_URL` points at a Redis server with the search module loaded.

use std::sync::Arc;
use std::time::Duration;

use list_control::{
    ControlParams, ControlServices, ConnectionManager, FieldDescriptor, FieldType, IndexPattern,
    InMemoryFilterStore, InMemoryIndexPatterns, OptionValue, RediSearchService, create_list_control,
    redis::{self, AsyncCommands, Value},
};
use serial_test::serial;

const INDEX: &str = "list_control_test_idx";
const PREFIX: &str = "list_control_test:";

fn redis_url() -> Option<String> {
    let _ = env_logger::builder().is_test(true).try_init();
    match std::env::var("REDIS_URL") {
        Ok(url) if !url.is_empty() => Some(url),
        _ => {
            eprintln!("REDIS_URL not set; skipping RediSearch integration test");
            None
        }
    }
}

async fn seed(conn: &mut ConnectionManager) {
    let _: Result<Value, _> = redis::cmd("FT.DROPINDEX").arg(INDEX).arg("DD").query_async(conn).await;

    let _: () = redis::cmd("FT.CREATE")
        .arg(INDEX)
        .arg(vec!["ON", "HASH", "PREFIX", "1", PREFIX, "SCHEMA"])
        .arg(vec!["host", "TAG", "bytes", "NUMERIC", "secure", "TAG"])
        .query_async(conn)
        .await
        .expect("index created");

    let docs = [
        ("web-01", 512, "true"),
        ("web-01", 512, "false"),
        ("web-01", 1024, "false"),
        ("web-02", 1024, "true"),
        ("web-02", 2048, "true"),
        ("db-01", 4096, "false"),
    ];
    for (i, (host, bytes, secure)) in docs.iter().enumerate() {
        let key = format!("{PREFIX}{i}");
        let _: () = conn
            .hset_multiple(&key, &[("host", host.to_string()), ("bytes", bytes.to_string()), ("secure", secure.to_string())])
            .await
            .expect("document stored");
    }

    for _ in 0..50 {
        let reply: Vec<Value> = redis::cmd("FT.SEARCH")
            .arg(INDEX)
            .arg("*")
            .arg(vec!["LIMIT", "0", "0"])
            .query_async(conn)
            .await
            .expect("search runs");
        if matches!(reply.first(), Some(Value::Int(n)) if *n as usize == docs.len()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("index never caught up with seeded documents");
}

fn pattern() -> IndexPattern {
    IndexPattern::new(
        "logs",
        INDEX,
        vec![
            FieldDescriptor::named("host", FieldType::String),
            FieldDescriptor::named("bytes", FieldType::Number),
            FieldDescriptor::named("secure", FieldType::Boolean),
        ],
    )
}

async fn services(url: &str) -> ControlServices<InMemoryIndexPatterns, RediSearchService> {
    let search = RediSearchService::connect(url).await.expect("redis reachable");
    seed(&mut search.connection()).await;
    ControlServices::new(
        InMemoryIndexPatterns::new().with_pattern(pattern()),
        search,
        Arc::new(InMemoryFilterStore::new()),
    )
}

#[tokio::test]
#[serial]
async fn options_follow_document_frequency() {
    let Some(url) = redis_url() else { return };
    let services = services(&url).await;

    let control = create_list_control(ControlParams::new("host-ctl", "host", "logs"), &services, false)
        .await
        .expect("control builds");

    assert!(control.is_enabled());
    assert_eq!(
        control.options().as_slice(),
        &[OptionValue::from("web-01"), OptionValue::from("web-02"), OptionValue::from("db-01")]
    );
}

#[tokio::test]
#[serial]
async fn numeric_keys_come_back_as_numbers() {
    let Some(url) = redis_url() else { return };
    let services = services(&url).await;

    let control = create_list_control(ControlParams::new("bytes-ctl", "bytes", "logs"), &services, false)
        .await
        .expect("control builds");

    assert!(!control.params().options.dynamic_options);
    assert_eq!(control.options().len(), 4);
    assert!(control.options().iter().all(|value| matches!(value, OptionValue::Number(_))));
}

#[tokio::test]
#[serial]
async fn prefix_query_and_sibling_filters_narrow_options() {
    let Some(url) = redis_url() else { return };
    let services = services(&url).await;

    let mut hosts = create_list_control(ControlParams::new("host-ctl", "host", "logs"), &services, false)
        .await
        .expect("control builds");
    assert!(hosts.refresh(&services.search, Some("web")).await.expect("refresh"));
    assert_eq!(
        hosts.options().as_slice(),
        &[OptionValue::from("web-01"), OptionValue::from("web-02")]
    );

    let mut secure = create_list_control(ControlParams::new("secure-ctl", "secure", "logs"), &services, false)
        .await
        .expect("control builds");
    secure.set_value(OptionValue::from(true)).expect("enabled");
    secure.commit().expect("commit");

    assert!(hosts.refresh(&services.search, None).await.expect("refresh"));
    assert_eq!(
        hosts.options().as_slice(),
        &[OptionValue::from("web-02"), OptionValue::from("web-01")]
    );
}
