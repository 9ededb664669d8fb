//! End-to-end tests for the store engine through the provider surface.

use diskstore::{
    Converter, ConverterError, ExecutionContext, JsonConverter, StoreError, StoreProvider,
    ValueUpdate,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Person {
    name: String,
    age: u32,
}

fn person(name: &str, age: u32) -> Person {
    Person {
        name: name.to_string(),
        age,
    }
}

/// JSON converter that counts writes and can be switched to fail them.
#[derive(Clone, Default)]
struct InstrumentedConverter {
    inner: JsonConverter,
    writes: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl Converter for InstrumentedConverter {
    fn write<T: Serialize>(&self, value: Option<&T>, file: &Path) -> Result<(), ConverterError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ConverterError::new("simulated encode failure"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(value, file)
    }

    fn read<T: DeserializeOwned>(&self, file: &Path) -> Result<Option<T>, ConverterError> {
        self.inner.read(file)
    }
}

fn provider(dir: &Path) -> StoreProvider<JsonConverter> {
    StoreProvider::with_context(dir, JsonConverter::new(), ExecutionContext::inline())
}

#[tokio::test]
async fn value_store_lifecycle_scenario() {
    let dir = tempdir().unwrap();
    let provider = provider(dir.path());
    let store = provider.value_store::<Person>("v").unwrap();

    assert_eq!(store.get().await.unwrap(), None);

    let written = store.put(person("A", 1)).await.unwrap();
    assert_eq!(written, person("A", 1));

    store.clear().await.unwrap();
    assert_eq!(store.get().await.unwrap(), None);

    // Still usable after clear.
    store.put(person("B", 2)).await.unwrap();
    assert_eq!(store.get().await.unwrap(), Some(person("B", 2)));
}

#[tokio::test]
async fn list_store_people_scenario() {
    let dir = tempdir().unwrap();
    let provider = provider(dir.path());
    let store = provider.list_store::<Person>("people").unwrap();

    store
        .put(vec![person("A", 1), person("B", 2)])
        .await
        .unwrap();

    let result = store.remove_matching(|p| p.age == 1).await.unwrap();
    assert_eq!(result, vec![person("B", 2)]);
    assert_eq!(store.get().await.unwrap(), vec![person("B", 2)]);
}

#[tokio::test]
async fn empty_and_absent_are_asymmetric_between_store_kinds() {
    let dir = tempdir().unwrap();
    let provider = provider(dir.path());

    let value = provider.value_store::<Person>("fresh-value").unwrap();
    let list = provider.list_store::<Person>("fresh-list").unwrap();

    assert_eq!(value.get().await.unwrap(), None);
    assert_eq!(list.get().await.unwrap(), Vec::<Person>::new());
}

#[test]
fn concurrent_adds_lose_no_updates() {
    let dir = tempdir().unwrap();
    let provider = provider(dir.path());
    let store = provider.list_store::<u32>("counters").unwrap();

    let handles: Vec<_> = (0..16_u32)
        .map(|i| {
            let store = store.clone();
            thread::spawn(move || store.blocking_add(i).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut list = store.blocking_get().unwrap();
    list.sort_unstable();
    assert_eq!(list, (0..16).collect::<Vec<u32>>());
}

#[tokio::test]
async fn failed_converter_write_preserves_previous_value() {
    let dir = tempdir().unwrap();
    let converter = InstrumentedConverter::default();
    let fail = converter.fail_writes.clone();
    let provider = StoreProvider::with_context(dir.path(), converter, ExecutionContext::inline());
    let store = provider.value_store::<Person>("v").unwrap();

    store.put(person("durable", 1)).await.unwrap();

    fail.store(true, Ordering::SeqCst);
    let result = store.put(person("lost", 2)).await;
    assert!(matches!(result, Err(StoreError::Converter(_))));

    fail.store(false, Ordering::SeqCst);
    assert_eq!(store.get().await.unwrap(), Some(person("durable", 1)));
}

#[tokio::test]
async fn remove_without_match_skips_the_disk_write() {
    let dir = tempdir().unwrap();
    let converter = InstrumentedConverter::default();
    let writes = converter.writes.clone();
    let provider = StoreProvider::with_context(dir.path(), converter, ExecutionContext::inline());
    let store = provider.list_store::<Person>("people").unwrap();

    store.put(vec![person("A", 1)]).await.unwrap();
    let writes_after_put = writes.load(Ordering::SeqCst);

    let list = store.remove_matching(|p| p.age == 99).await.unwrap();
    assert_eq!(list, vec![person("A", 1)]);
    assert_eq!(writes.load(Ordering::SeqCst), writes_after_put);

    // A matching removal does write.
    store.remove_matching(|p| p.age == 1).await.unwrap();
    assert_eq!(writes.load(Ordering::SeqCst), writes_after_put + 1);
}

#[tokio::test]
async fn replace_without_match_skips_the_disk_write() {
    let dir = tempdir().unwrap();
    let converter = InstrumentedConverter::default();
    let writes = converter.writes.clone();
    let provider = StoreProvider::with_context(dir.path(), converter, ExecutionContext::inline());
    let store = provider.list_store::<Person>("people").unwrap();

    store.put(vec![person("A", 1)]).await.unwrap();
    let writes_after_put = writes.load(Ordering::SeqCst);

    let list = store
        .replace(person("Z", 9), |p| p.name == "missing")
        .await
        .unwrap();
    assert_eq!(list, vec![person("A", 1)]);
    assert_eq!(writes.load(Ordering::SeqCst), writes_after_put);
}

#[tokio::test]
async fn observers_see_replay_then_every_change_in_order() {
    let dir = tempdir().unwrap();
    let provider = StoreProvider::with_context(
        dir.path(),
        JsonConverter::new(),
        ExecutionContext::worker(),
    );
    let store = provider.value_store::<Person>("v").unwrap();

    let mut updates = store.observe().await.unwrap();
    assert_eq!(updates.next().await, Some(ValueUpdate::empty()));

    store.put(person("A", 1)).await.unwrap();
    store.put(person("B", 2)).await.unwrap();
    store.clear().await.unwrap();

    assert_eq!(updates.next().await, Some(ValueUpdate::of(person("A", 1))));
    assert_eq!(updates.next().await, Some(ValueUpdate::of(person("B", 2))));
    assert_eq!(updates.next().await, Some(ValueUpdate::empty()));
}

#[tokio::test]
async fn late_observer_replays_current_state_not_history() {
    let dir = tempdir().unwrap();
    let provider = provider(dir.path());
    let store = provider.list_store::<u32>("numbers").unwrap();

    store.put(vec![1, 2]).await.unwrap();
    store.add(3).await.unwrap();

    let mut updates = store.observe().await.unwrap();
    assert_eq!(updates.next().await, Some(vec![1, 2, 3]));
}

#[tokio::test]
async fn delete_terminates_observers_and_store() {
    let dir = tempdir().unwrap();
    let provider = provider(dir.path());
    let store = provider.list_store::<u32>("numbers").unwrap();
    store.put(vec![1]).await.unwrap();

    let mut updates = store.observe().await.unwrap();
    assert_eq!(updates.next().await, Some(vec![1]));

    store.delete().await.unwrap();
    assert!(!store.path().exists());

    // Terminal empty update, then end of stream, without polling.
    assert_eq!(updates.next().await, Some(Vec::new()));
    assert_eq!(updates.next().await, None);

    assert!(matches!(store.get().await, Err(StoreError::Deleted)));
}

#[tokio::test]
async fn spawned_operations_are_applied_in_order() {
    let dir = tempdir().unwrap();
    let provider = StoreProvider::with_context(
        dir.path(),
        JsonConverter::new(),
        ExecutionContext::worker(),
    );
    let store = provider.list_store::<u32>("numbers").unwrap();

    for i in 0..5 {
        store.spawn_add(i);
    }
    // The worker is serial, so an awaited get observes all prior spawns.
    assert_eq!(store.get().await.unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn per_call_context_rebinding_works() {
    let dir = tempdir().unwrap();
    let provider = StoreProvider::with_context(
        dir.path(),
        JsonConverter::new(),
        ExecutionContext::worker(),
    );
    let store = provider.value_store::<u32>("n").unwrap();

    let inline = store.with_context(ExecutionContext::inline());
    inline.put(7).await.unwrap();

    // Same state, same observers, different dispatch.
    assert_eq!(store.get().await.unwrap(), Some(7));
}

#[tokio::test]
async fn persisted_state_survives_new_store_instances() {
    let dir = tempdir().unwrap();

    {
        let provider = provider(dir.path());
        let store = provider.list_store::<Person>("people").unwrap();
        store.put(vec![person("A", 1)]).await.unwrap();
    }

    let provider = provider(dir.path());
    let store = provider.list_store::<Person>("people").unwrap();
    assert_eq!(store.get().await.unwrap(), vec![person("A", 1)]);
}
