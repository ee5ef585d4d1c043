//! Integration tests for batch routing across the delivery modes

use fhir_to_server::adapters::fhir::{FhirServerClient, InMemoryTransactionSink};
use fhir_to_server::adapters::fhirpath::JsonPathEvaluator;
use fhir_to_server::adapters::object_store::{InMemoryObjectStore, CONTENT_TYPE_FHIR_NDJSON};
use fhir_to_server::config::{load_config_from_str, AppConfig, ObjectLayout};
use fhir_to_server::core::dispatch::{BatchProcessor, DeliveryMode, DeliverySink};
use fhir_to_server::domain::{BatchMetadata, BundleType, DeliveryErrorKind, Message};
use fhir_to_server::metrics::{
    InMemoryMetrics, ProcessingErrorKind, BUNDLE_SIZE, OBJECTS_WRITTEN_TOTAL,
    TRANSACTION_DURATION_NORMALIZED_SECONDS,
};
use mockito::Matcher;
use serde_json::{json, Value};
use std::sync::Arc;

fn put(resource_type: &str, id: &str, version: &str) -> Value {
    json!({
        "resource": {"resourceType": resource_type, "id": id, "meta": {"versionId": version}},
        "request": {"method": "PUT", "url": format!("{resource_type}/{id}")}
    })
}

fn delete(url: &str) -> Value {
    json!({"request": {"method": "DELETE", "url": url}})
}

fn bundle(entries: Vec<Value>) -> Value {
    json!({"resourceType": "Bundle", "type": "transaction", "entry": entries})
}

fn message(payload: Vec<Value>) -> Option<Message<Vec<Value>>> {
    Some(Message::new(
        payload,
        BatchMetadata::new("fhir.bundles", 1, 42, "fhir-to-server"),
    ))
}

fn build(config: &AppConfig, sink: DeliverySink) -> (BatchProcessor, Arc<InMemoryMetrics>) {
    let metrics = Arc::new(InMemoryMetrics::new());
    let processor = BatchProcessor::new(
        config,
        sink,
        Arc::new(JsonPathEvaluator::new()),
        metrics.clone(),
    )
    .unwrap();
    (processor, metrics)
}

#[tokio::test]
async fn test_merged_batch_mode_from_toml() {
    let config = load_config_from_str(
        r#"
[fhir]
url = "http://localhost:8080/fhir"
override_bundle_type = "batch"

[fhir.merge_batches_into_single_bundle]
enabled = true
bundle_max_size = 2
"#,
    )
    .unwrap();

    let sink = Arc::new(InMemoryTransactionSink::new());
    let (processor, metrics) = build(&config, DeliverySink::Fhir(sink.clone()));
    assert!(matches!(processor.mode(), DeliveryMode::MergedBatch { .. }));

    let summary = processor
        .process_batch(message(vec![
            bundle(vec![put("Patient", "a", "1"), put("Patient", "b", "1")]),
            json!({"resourceType": "Observation", "id": "stray"}),
            bundle(vec![put("Patient", "a", "2"), delete("Patient/b"), put("Encounter", "e", "1")]),
        ]))
        .await
        .unwrap();

    let sent = sink.bundles();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].bundle_type(), Some(BundleType::Batch));
    let urls: Vec<&str> = sent[0].entries().iter().filter_map(|e| e.url()).collect();
    assert_eq!(urls, vec!["Patient/a", "Encounter/e"]);
    assert_eq!(
        sent[0].entries()[0].resource().unwrap().body()["meta"]["versionId"],
        "2"
    );

    assert_eq!(summary.bundles_received, 2);
    assert_eq!(summary.unsupported_skipped, 1);
    assert_eq!(summary.entries_sent, 2);
    assert_eq!(metrics.errors(ProcessingErrorKind::UnsupportedResourceType), 1);
    assert_eq!(metrics.samples(BUNDLE_SIZE), vec![2.0]);
    assert_eq!(metrics.samples(TRANSACTION_DURATION_NORMALIZED_SECONDS).len(), 1);
}

#[tokio::test]
async fn test_object_store_mode_writes_ndjson_per_type() {
    let mut config = AppConfig::default();
    config.object_store.enabled = true;
    config.object_store.bucket_name = "fhir".to_string();
    config.object_store.object_name_prefix = "raw/".to_string();
    config.object_store.layout = ObjectLayout::NdjsonByType;

    let store = Arc::new(InMemoryObjectStore::new());
    let (processor, metrics) = build(&config, DeliverySink::ObjectStore(store.clone()));

    let summary = processor
        .process_batch(message(vec![
            bundle(vec![put("Patient", "a", "1"), put("Observation", "o", "1")]),
            bundle(vec![put("Patient", "a", "2"), delete("Observation/o")]),
        ]))
        .await
        .unwrap();

    assert_eq!(summary.objects_written, 2);
    assert_eq!(metrics.counter(OBJECTS_WRITTEN_TOTAL), 2);

    let keys: Vec<String> = store.objects().into_iter().map(|o| o.key).collect();
    assert_eq!(keys.len(), 2);
    assert!(keys[0].starts_with("raw/Patient/bundle-"));
    assert!(keys[0].ends_with("-1-42.ndjson"));
    assert!(keys[1].starts_with("raw/Observation/_delete/bundle-"));

    let patients = store.get(&keys[0]).unwrap();
    assert_eq!(patients.content_type, CONTENT_TYPE_FHIR_NDJSON);
    let line: Value = serde_json::from_str(patients.body_str()).unwrap();
    assert_eq!(line["meta"]["versionId"], "2");
    assert_eq!(patients.metadata["kafka-group-id"], "fhir-to-server");
}

#[tokio::test]
async fn test_object_store_single_message() {
    let mut config = AppConfig::default();
    config.object_store.enabled = true;
    config.object_store.bucket_name = "fhir".to_string();
    config.object_store.layout = ObjectLayout::WholeBundle;

    let store = Arc::new(InMemoryObjectStore::new());
    let (processor, _) = build(&config, DeliverySink::ObjectStore(store.clone()));

    processor
        .process_single(Some(Message::new(
            bundle(vec![put("Patient", "a", "1"), delete("Patient/z")]),
            BatchMetadata::new("fhir.bundles", 0, 3, "fhir-to-server"),
        )))
        .await
        .unwrap();

    let keys: Vec<String> = store.objects().into_iter().map(|o| o.key).collect();
    assert_eq!(keys.len(), 2);
    assert!(keys[0].starts_with("Bundle/bundle-"));
    assert!(keys[1].starts_with("Bundle/_delete/bundle-"));
}

#[tokio::test]
async fn test_per_bundle_mode_against_fhir_server() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/fhir")
        .match_header("content-type", "application/fhir+json")
        .match_body(Matcher::PartialJson(json!({"resourceType": "Bundle"})))
        .with_status(200)
        .with_body(r#"{"resourceType": "Bundle", "type": "transaction-response"}"#)
        .expect(2)
        .create_async()
        .await;

    let mut config = AppConfig::default();
    config.fhir.url = format!("{}/fhir", server.url());
    let client = Arc::new(FhirServerClient::new(&config.fhir).unwrap());
    let (processor, _) = build(&config, DeliverySink::Fhir(client));

    let summary = processor
        .process_batch(message(vec![
            bundle(vec![put("Patient", "a", "1")]),
            bundle(vec![put("Patient", "a", "2")]),
        ]))
        .await
        .unwrap();

    assert_eq!(summary.transactions_sent, 2);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_rejected_bundle_aborts_batch() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .with_status(422)
        .with_body(r#"{"resourceType": "OperationOutcome", "issue": [{"severity": "error", "code": "invalid"}]}"#)
        .expect(1)
        .create_async()
        .await;

    let mut config = AppConfig::default();
    config.fhir.url = server.url();
    let client = Arc::new(FhirServerClient::new(&config.fhir).unwrap());
    let (processor, metrics) = build(&config, DeliverySink::Fhir(client));

    let err = processor
        .process_batch(message(vec![
            bundle(vec![put("Patient", "a", "1")]),
            bundle(vec![put("Patient", "b", "1")]),
        ]))
        .await
        .unwrap_err();

    assert_eq!(err.delivery_kind(), Some(DeliveryErrorKind::MalformedPayload));
    assert_eq!(metrics.errors(ProcessingErrorKind::SendingFailed), 0);
    // the second bundle was never sent
    mock.assert_async().await;
}
