//! Tests for lazy broker creation and registry identity.

use turnstile::{AdmissionConfig, BrokerRegistry, DatabaseId};

fn config(limit: usize) -> AdmissionConfig {
    AdmissionConfig::builder()
        .max_simultaneous_queries_per_db(limit)
        .build()
}

#[tokio::test]
async fn same_database_yields_same_broker() {
    let registry = BrokerRegistry::new(config(2));
    let first = registry.broker_for(DatabaseId::from(42));
    let second = registry.broker_for(DatabaseId::from(42));
    assert_eq!(first, second);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn distinct_databases_yield_distinct_brokers() {
    let registry = BrokerRegistry::new(config(2));
    let first = registry.broker_for(DatabaseId::from(1));
    let second = registry.broker_for(DatabaseId::from(2));
    assert_ne!(first, second);
    assert_eq!(registry.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_callers_construct_exactly_one_broker() {
    let registry = BrokerRegistry::new(AdmissionConfig::default());

    let mut callers = Vec::new();
    for _ in 0..64 {
        let registry = registry.clone();
        callers.push(tokio::spawn(async move {
            registry.broker_for(DatabaseId::from(42))
        }));
    }

    let winner = registry.broker_for(DatabaseId::from(42));
    for caller in callers {
        assert_eq!(caller.await.unwrap(), winner);
    }
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn capacity_is_read_from_config_at_creation() {
    let registry = BrokerRegistry::new(config(3));
    let broker = registry.broker_for(DatabaseId::from(7));
    assert_eq!(broker.capacity(), 3);
    assert_eq!(broker.available_permits(), 3);
}

#[tokio::test]
async fn close_all_closes_every_broker() {
    let registry = BrokerRegistry::new(config(1));
    let first = registry.broker_for(DatabaseId::from(1));
    let second = registry.broker_for(DatabaseId::from(2));

    registry.close_all();
    assert!(first.is_closed());
    assert!(second.is_closed());
}
