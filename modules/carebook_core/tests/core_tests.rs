//! The wired core: gate, file backend and application config.

use std::collections::HashMap;
use std::sync::Arc;

use carebook_core::contract::model::{ClinicSettings, Record};
use carebook_core::domain::collections::{Patients, Settings};
use carebook_core::domain::device::DeviceInfo;
use carebook_core::domain::error::StoreError;
use carebook_core::domain::events::CarebookEvent;
use carebook_core::domain::session::{SUPER_ADMIN_IDENTIFIER, SUPER_ADMIN_SECRET};
use carebook_core::infra::storage::MemoryStore;
use carebook_core::CarebookCore;
use runtime::{AppConfig, StorageBackend, StorageConfig};
use serde_json::json;
use tempfile::TempDir;

fn patient(name: &str) -> Record {
    json!({ "name": name }).as_object().cloned().unwrap()
}

fn file_config(dir: &TempDir) -> AppConfig {
    AppConfig {
        app: runtime::AppSection {
            home_dir: dir.path().to_string_lossy().to_string(),
        },
        storage: Some(StorageConfig {
            backend: StorageBackend::File,
            path: "data/store.json".to_string(),
        }),
        logging: None,
        modules_dir: None,
        modules: HashMap::new(),
    }
}

#[test]
fn saves_are_refused_until_session_data_is_loaded() {
    let core = CarebookCore::in_memory();
    core.sessions().signup("a@x.com", "pw").unwrap();
    core.login("a@x.com", "pw").unwrap();

    assert_eq!(
        core.save::<Patients>(&vec![]),
        Err(StoreError::not_loaded("patients"))
    );

    let data = core.load_session_data();
    assert!(data.patients.is_empty());
    assert_eq!(data.settings, ClinicSettings::default());

    core.save::<Patients>(&vec![patient("P1")]).unwrap();
    assert_eq!(core.store().load_patients(), vec![patient("P1")]);
}

#[test]
fn logout_closes_the_gate_and_signals() {
    let core = CarebookCore::in_memory();
    let mut rx = core.subscribe();
    core.sessions().signup("a@x.com", "pw").unwrap();
    core.login("a@x.com", "pw").unwrap();
    core.load_session_data();

    core.logout();
    assert!(core
        .save::<Settings>(&ClinicSettings::default())
        .is_err());

    let mut saw_end = false;
    while let Ok(event) = rx.try_recv() {
        if let CarebookEvent::SessionEnded { identifier } = event {
            assert_eq!(identifier.as_deref(), Some("a@x.com"));
            saw_end = true;
        }
    }
    assert!(saw_end);
}

#[test]
fn switching_user_requires_a_fresh_load() {
    let core = CarebookCore::in_memory();
    core.sessions().signup("a@x.com", "pw").unwrap();
    core.sessions().signup("b@x.com", "pw").unwrap();

    core.login("a@x.com", "pw").unwrap();
    core.load_session_data();
    core.save::<Patients>(&vec![patient("A")]).unwrap();

    // no logout in between; the gate still refuses b's save
    core.login("b@x.com", "pw").unwrap();
    assert!(core.save::<Patients>(&vec![patient("B")]).is_err());

    core.load_session_data();
    core.save::<Patients>(&vec![patient("B")]).unwrap();
    assert_eq!(core.store().load_for::<Patients>("a@x.com"), vec![patient("A")]);
}

#[test]
fn import_records_data_update_for_the_session() {
    let core = CarebookCore::in_memory();
    core.login(SUPER_ADMIN_IDENTIFIER, SUPER_ADMIN_SECRET).unwrap();
    core.load_session_data();
    let backup = core.store().export_all().unwrap();

    assert!(core.import_all(&backup.contents));
    assert!(!core.import_all("{}"));

    let entries = core.access_log().entries();
    assert_eq!(entries.len(), 3);
    assert_eq!(
        serde_json::to_value(entries[0].status).unwrap(),
        json!("ERROR")
    );
    assert_eq!(
        serde_json::to_value(entries[1].action).unwrap(),
        json!("DATA_UPDATE")
    );
    // the gate closed with the restore
    assert!(core.save::<Patients>(&vec![]).is_err());
}

#[test]
fn file_backend_persists_across_instances() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);

    let core = CarebookCore::from_app_config(&config).unwrap();
    core.sessions().signup("a@x.com", "pw").unwrap();
    core.login("a@x.com", "pw").unwrap();
    core.load_session_data();
    core.save::<Patients>(&vec![patient("P1")]).unwrap();
    drop(core);

    assert!(dir.path().join("data/store.json").exists());

    let reopened = CarebookCore::from_app_config(&config).unwrap();
    assert_eq!(
        reopened.sessions().current_user().as_deref(),
        Some("a@x.com")
    );
    assert_eq!(reopened.load_session_data().patients, vec![patient("P1")]);
}

#[test]
fn module_config_is_validated() {
    let dir = TempDir::new().unwrap();
    let mut config = file_config(&dir);
    config
        .modules
        .insert("carebook_core".to_string(), json!({"relay_endpoint": 12}));

    assert!(CarebookCore::from_app_config(&config).is_err());
}

#[test]
fn relay_endpoint_enables_the_http_relay() {
    let dir = TempDir::new().unwrap();
    let mut config = file_config(&dir);
    config.storage = Some(StorageConfig {
        backend: StorageBackend::Memory,
        path: String::new(),
    });
    config.modules.insert(
        "carebook_core".to_string(),
        json!({"relay_endpoint": "http://127.0.0.1:9/logs", "client_label": "front-desk"}),
    );

    let core = CarebookCore::from_app_config(&config).unwrap();
    assert_eq!(core.config().client_label, "front-desk");
    assert!(core.config().relay_endpoint.is_some());
    assert!(!dir.path().join("data").exists());
}

#[test]
fn universal_logout_reaches_another_client_of_the_same_file() {
    let dir = TempDir::new().unwrap();
    let mut config = file_config(&dir);
    config
        .modules
        .insert("carebook_core".to_string(), json!({"session_scope": "process"}));

    let front_desk = CarebookCore::from_app_config(&config).unwrap();
    front_desk.sessions().signup("doc@x.com", "pw").unwrap();
    front_desk.login("doc@x.com", "pw").unwrap();
    front_desk.load_session_data();
    front_desk.save::<Patients>(&vec![patient("P1")]).unwrap();

    let office = CarebookCore::from_app_config(&config).unwrap();
    assert_eq!(office.sessions().current_user(), None);
    office
        .login(SUPER_ADMIN_IDENTIFIER, SUPER_ADMIN_SECRET)
        .unwrap();
    assert_eq!(
        front_desk.sessions().current_user().as_deref(),
        Some("doc@x.com")
    );
    office.sessions().trigger_universal_logout().unwrap();

    let mut rx = front_desk.subscribe();
    assert!(front_desk.poll_universal_logout());
    assert_eq!(front_desk.sessions().current_user(), None);
    let mut ended = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let CarebookEvent::SessionEnded { identifier } = event {
            ended.push(identifier);
        }
    }
    assert_eq!(ended, vec![Some("doc@x.com".to_string())]);

    // the admin is exempt, and nobody's data was lost along the way
    assert!(!office.poll_universal_logout());
    assert_eq!(
        office.store().load_for::<Patients>("doc@x.com"),
        vec![patient("P1")]
    );
    assert_eq!(office.sessions().list_users().unwrap().len(), 1);
}

#[test]
fn relay_and_access_log_share_one_device_description() {
    let dir = TempDir::new().unwrap();
    let mut config = file_config(&dir);
    config.modules.insert(
        "carebook_core".to_string(),
        json!({"relay_endpoint": "http://127.0.0.1:9/logs", "origin_host": "front-desk"}),
    );

    let core = CarebookCore::from_app_config(&config).unwrap();
    assert_eq!(core.access_log().device().host, "front-desk");

    let device = DeviceInfo::detect("kiosk", Some("lobby"));
    let core = CarebookCore::with_device(
        Arc::new(MemoryStore::new()),
        None,
        &Default::default(),
        device.clone(),
    );
    core.sessions().signup("a@x.com", "pw").unwrap();
    assert_eq!(core.access_log().device(), &device);
    assert_eq!(core.access_log().entries()[0].device, device.description());
}
