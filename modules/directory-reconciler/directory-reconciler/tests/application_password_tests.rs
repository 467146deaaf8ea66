#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for application password credentials

mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::{RecordingDirectory, reconciler};
use directory_reconciler::domain::resources::{ApplicationPasswordSpec, ApplicationSpec};
use directory_reconciler::{ApplicationsClient, Drift, PersistedState};
use directory_reconciler_sdk::PasswordCredential;
use futures::future::join_all;
use secrecy::ExposeSecret;
use serde_json::json;

const MISSING_APP: &str = "99999999-9999-9999-9999-999999999999";

async fn application(dir: &std::sync::Arc<RecordingDirectory>) -> String {
    let spec = ApplicationSpec {
        display_name: "deployer".to_owned(),
        ..ApplicationSpec::default()
    };
    let state = reconciler(dir).applications().create(&spec).await.unwrap();
    dir.clear_calls();
    state.id.to_string()
}

#[tokio::test]
async fn test_create_read_delete() {
    let dir = RecordingDirectory::new();
    let app = application(&dir).await;
    let passwords = reconciler(&dir).application_passwords();

    let desired = ApplicationPasswordSpec {
        display_name: Some("ci".to_owned()),
        end_date_relative: Some("240h".to_owned()),
        ..ApplicationPasswordSpec::new(app.clone())
    };
    let state = passwords.create(&desired).await.unwrap();

    assert_eq!(state.id.object_id(), app);
    assert_eq!(state.record.key_id, state.id.key_id());
    assert_eq!(state.record.display_name.as_deref(), Some("ci"));
    assert!(state.record.end_date.is_some());
    assert_eq!(state.record.end_date_relative.as_deref(), Some("240h"));
    assert!(!state.secret.as_ref().unwrap().expose_secret().is_empty());

    let read = passwords.read(&state.id).await.unwrap().unwrap();
    assert_eq!(read.record.key_id, state.record.key_id);
    assert_eq!(read.record.end_date, state.record.end_date);
    assert!(read.record.end_date_relative.is_none());
    assert!(read.secret.is_none());

    match passwords.refresh(&state).await.unwrap() {
        Drift::InSync(fresh) => assert_eq!(fresh.record, state.record),
        other => panic!("expected no drift, got {other:?}"),
    }

    passwords.delete(&state.id).await.unwrap();
    assert!(passwords.read(&state.id).await.unwrap().is_none());
    passwords.delete(&state.id).await.unwrap();
    assert_eq!(dir.calls_to("applications.remove_password"), 1);
}

#[tokio::test]
async fn test_missing_application_is_validation_error() {
    let dir = RecordingDirectory::new();
    let passwords = reconciler(&dir).application_passwords();

    let err = passwords
        .create(&ApplicationPasswordSpec::new(MISSING_APP))
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(err.field(), Some("application_object_id"));
    assert_eq!(dir.calls_to("applications.add_password"), 0);
}

#[tokio::test]
async fn test_inputs_cannot_change_in_place() {
    let dir = RecordingDirectory::new();
    let app = application(&dir).await;
    let passwords = reconciler(&dir).application_passwords();
    let state = passwords
        .create(&ApplicationPasswordSpec::new(app.clone()))
        .await
        .unwrap();

    let unchanged = passwords
        .update(&state, &ApplicationPasswordSpec::new(app.clone()))
        .await
        .unwrap();
    assert_eq!(
        unchanged.secret.as_ref().unwrap().expose_secret(),
        state.secret.as_ref().unwrap().expose_secret()
    );

    let renamed = ApplicationPasswordSpec {
        display_name: Some("renamed".to_owned()),
        ..ApplicationPasswordSpec::new(app)
    };
    let err = passwords.update(&state, &renamed).await.unwrap_err();
    assert_eq!(err.field(), Some("display_name"));
}

#[tokio::test]
async fn test_relative_lifetime_cannot_change_in_place() {
    let dir = RecordingDirectory::new();
    let app = application(&dir).await;
    let passwords = reconciler(&dir).application_passwords();
    let ten_days = ApplicationPasswordSpec {
        end_date_relative: Some("240h".to_owned()),
        ..ApplicationPasswordSpec::new(app.clone())
    };
    let state = passwords.create(&ten_days).await.unwrap();

    let unchanged = passwords.update(&state, &ten_days).await.unwrap();
    assert_eq!(unchanged.record, state.record);

    dir.clear_calls();
    let one_hour = ApplicationPasswordSpec {
        end_date_relative: Some("1h".to_owned()),
        ..ApplicationPasswordSpec::new(app.clone())
    };
    let err = passwords.update(&state, &one_hour).await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(err.field(), Some("end_date_relative"));

    let dropped = passwords
        .update(&state, &ApplicationPasswordSpec::new(app))
        .await
        .unwrap_err();
    assert_eq!(dropped.field(), Some("end_date_relative"));
    assert_eq!(dir.call_count(), 0);

    // the remembered lifetime survives persistence
    let loaded = passwords.load(passwords.persist(&state).unwrap()).unwrap();
    assert_eq!(loaded.record.end_date_relative.as_deref(), Some("240h"));
    assert!(passwords.update(&loaded, &one_hour).await.is_err());
}

#[tokio::test]
async fn test_writes_to_one_application_never_overlap() {
    let dir = RecordingDirectory::new();
    let app = application(&dir).await;
    let service = reconciler(&dir);
    let passwords = service.application_passwords();
    let apps = service.applications();
    let app_state = apps
        .read(&directory_reconciler::ObjectId::parse_uuid(&app).unwrap())
        .await
        .unwrap()
        .unwrap();

    dir.set_latency(Duration::from_millis(20));
    let specs: Vec<ApplicationPasswordSpec> = (0..4)
        .map(|n| ApplicationPasswordSpec {
            display_name: Some(format!("runner-{n}")),
            ..ApplicationPasswordSpec::new(app.clone())
        })
        .collect();
    let desired_app = ApplicationSpec {
        display_name: "deployer".to_owned(),
        identifier_uris: vec!["api://deployer".to_owned()],
        ..ApplicationSpec::default()
    };
    let (created, updated) = tokio::join!(
        join_all(specs.iter().map(|spec| passwords.create(spec))),
        apps.update(&app_state, &desired_app),
    );
    updated.unwrap();

    let keys: HashSet<String> = created.into_iter().map(|s| s.unwrap().record.key_id).collect();
    assert_eq!(keys.len(), 4);
    assert_eq!(dir.calls_to("applications.add_password"), 4);
    assert_eq!(dir.max_overlap(&app), 1);
}

#[tokio::test]
async fn test_import_requires_current_identity() {
    let dir = RecordingDirectory::new();
    let app = application(&dir).await;
    let passwords = reconciler(&dir).application_passwords();
    let state = passwords
        .create(&ApplicationPasswordSpec::new(app.clone()))
        .await
        .unwrap();

    let imported = passwords.import(&state.id.to_string()).await.unwrap();
    assert_eq!(imported.record, state.record);

    let legacy = format!("{app}/{}", state.id.key_id());
    assert!(passwords.import(&legacy).await.unwrap_err().is_malformed_identifier());
    assert!(passwords.import("not-an-id").await.unwrap_err().is_malformed_identifier());
}

// =============================================================================
// Persisted state
// =============================================================================

#[tokio::test]
async fn test_persist_then_load_keeps_secret() {
    let dir = RecordingDirectory::new();
    let app = application(&dir).await;
    let passwords = reconciler(&dir).application_passwords();
    let state = passwords
        .create(&ApplicationPasswordSpec::new(app))
        .await
        .unwrap();

    let persisted = passwords.persist(&state).unwrap();
    assert_eq!(persisted.schema_version, 1);
    assert_eq!(persisted.id, state.id.to_string());

    let loaded = passwords.load(persisted).unwrap();
    assert_eq!(loaded.record, state.record);
    assert_eq!(
        loaded.secret.as_ref().unwrap().expose_secret(),
        state.secret.as_ref().unwrap().expose_secret()
    );
}

#[tokio::test]
async fn test_load_upgrades_legacy_state() {
    let dir = RecordingDirectory::new();
    let app = application(&dir).await;
    let added = dir
        .inner()
        .add_password(
            &app,
            PasswordCredential {
                display_name: Some("legacy".to_owned()),
                ..PasswordCredential::default()
            },
        )
        .await
        .unwrap();
    let key_id = added.key_id.unwrap();
    let passwords = reconciler(&dir).application_passwords();

    let flat = PersistedState::new(
        0,
        app.clone(),
        json!({
            "application_object_id": app,
            "key_id": key_id,
            "description": "legacy",
            "value": "chosen-secret",
            "end_date_relative": "",
        }),
    );
    let loaded = passwords.load(flat).unwrap();

    assert_eq!(loaded.id.to_string(), format!("{app}/password/{key_id}"));
    assert_eq!(loaded.schema_version, 1);
    assert_eq!(loaded.record.display_name.as_deref(), Some("legacy"));
    assert_eq!(loaded.secret.as_ref().unwrap().expose_secret(), "chosen-secret");
    assert!(!passwords.refresh(&loaded).await.unwrap().is_absent());

    // loading what was just persisted changes nothing
    let persisted = passwords.persist(&loaded).unwrap();
    let reloaded = passwords.load(persisted.clone()).unwrap();
    assert_eq!(passwords.persist(&reloaded).unwrap(), persisted);

    let pair = PersistedState::new(0, format!("{app}/{key_id}"), json!({ "application_object_id": app }));
    let loaded = passwords.load(pair).unwrap();
    assert_eq!(loaded.id.key_id(), key_id);
}

#[tokio::test]
async fn test_load_rejects_unusable_legacy_state() {
    let dir = RecordingDirectory::new();
    let passwords = reconciler(&dir).application_passwords();

    let no_key = PersistedState::new(0, MISSING_APP, json!({ "application_object_id": MISSING_APP }));
    let err = passwords.load(no_key).unwrap_err();
    assert!(err.is_malformed_identifier());
    assert_eq!(err.identity(), Some(MISSING_APP));

    let future = PersistedState::new(7, format!("{MISSING_APP}/password/key"), json!({}));
    assert!(passwords.load(future).unwrap_err().is_validation());
    assert_eq!(dir.call_count(), 0);
}
