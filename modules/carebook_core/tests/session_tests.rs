mod common;

use carebook_core::contract::error::{AdminError, AuthError};
use carebook_core::contract::model::{AccessAction, AccessStatus, GlobalConfig};
use carebook_core::domain::events::{CarebookEvent, ChangeScope};
use carebook_core::domain::keys::KEY_UNIVERSAL_LOGOUT_AT;
use carebook_core::domain::ports::KeyValueStore;
use carebook_core::domain::session::{SUPER_ADMIN_IDENTIFIER, SUPER_ADMIN_SECRET};
use chrono::Utc;
use common::Fixture;

#[test]
fn signup_normalizes_and_login_is_case_insensitive() {
    let fx = Fixture::new();
    fx.sessions.signup("Doc@X.com", "1234").unwrap();

    let session = fx.sessions.login("doc@x.com", "1234").unwrap();
    assert_eq!(session.identifier, "doc@x.com");
    assert!(!session.is_admin);
    assert_eq!(fx.sessions.current_user().as_deref(), Some("doc@x.com"));

    fx.sessions.logout();
    assert_eq!(
        fx.sessions.login("DOC@X.COM", "wrong"),
        Err(AuthError::InvalidCredentials)
    );
    assert_eq!(fx.sessions.current_user(), None);
}

#[test]
fn signup_rejects_duplicates_and_empty_input() {
    let fx = Fixture::new();
    fx.sessions.signup("a@x.com", "pw").unwrap();

    assert_eq!(
        fx.sessions.signup(" A@X.COM ", "other"),
        Err(AuthError::already_exists("a@x.com"))
    );
    assert!(matches!(
        fx.sessions.signup("  ", "pw"),
        Err(AuthError::Validation { .. })
    ));
    assert!(matches!(
        fx.sessions.signup("b@x.com", ""),
        Err(AuthError::Validation { .. })
    ));
    assert!(matches!(
        fx.sessions.signup("admin_master", "pw"),
        Err(AuthError::Validation { .. })
    ));
    assert_eq!(fx.store.load_users().len(), 1);
}

#[test]
fn signup_does_not_start_a_session() {
    let fx = Fixture::new();
    fx.sessions.signup("a@x.com", "pw").unwrap();
    assert_eq!(fx.sessions.current_user(), None);

    let events = fx.events.take();
    assert!(events.contains(&CarebookEvent::DirectoryChanged {
        scope: ChangeScope::Users
    }));
}

#[test]
fn unknown_identifier_is_invalid_and_logged() {
    let fx = Fixture::new();
    assert_eq!(
        fx.sessions.login(" Ghost@X.com ", "pw"),
        Err(AuthError::InvalidCredentials)
    );

    let entries = fx.log.entries();
    assert_eq!(entries[0].email, "ghost@x.com");
    assert_eq!(entries[0].action, AccessAction::Login);
    assert_eq!(entries[0].status, AccessStatus::Error);
}

#[test]
fn admin_sentinel_needs_no_directory_entry() {
    let fx = Fixture::new();
    let session = fx
        .sessions
        .login(SUPER_ADMIN_IDENTIFIER, SUPER_ADMIN_SECRET)
        .unwrap();

    assert!(session.is_admin);
    assert!(fx.sessions.is_admin());
    assert!(fx.store.load_users().is_empty());
    assert_eq!(fx.log.entries()[0].status, AccessStatus::Success);
}

#[test]
fn admin_sentinel_is_case_sensitive() {
    let fx = Fixture::new();
    assert_eq!(
        fx.sessions.login("admin_master", SUPER_ADMIN_SECRET),
        Err(AuthError::InvalidCredentials)
    );
    assert_eq!(
        fx.sessions.login(SUPER_ADMIN_IDENTIFIER, "guess"),
        Err(AuthError::InvalidCredentials)
    );
    assert!(!fx.sessions.is_admin());
}

#[test]
fn failed_sentinel_login_is_logged_as_submitted() {
    let fx = Fixture::new();
    assert_eq!(
        fx.sessions.login(" ADMIN_MASTER ", "guess"),
        Err(AuthError::InvalidCredentials)
    );
    assert_eq!(
        fx.sessions.login("Admin_Master", SUPER_ADMIN_SECRET),
        Err(AuthError::InvalidCredentials)
    );

    let emails: Vec<_> = fx.log.entries().into_iter().map(|e| e.email).collect();
    assert_eq!(emails, vec!["Admin_Master", "ADMIN_MASTER"]);
}

#[test]
fn switching_accounts_ends_the_previous_session() {
    let fx = Fixture::new();
    fx.sessions.signup("b@x.com", "pw").unwrap();
    fx.login_user("a@x.com");
    fx.events.take();

    fx.sessions.login("b@x.com", "pw").unwrap();
    assert_eq!(fx.sessions.current_user().as_deref(), Some("b@x.com"));

    let events = fx.events.take();
    assert!(events.contains(&CarebookEvent::SessionEnded {
        identifier: Some("a@x.com".to_string())
    }));

    let entries = fx.log.entries();
    assert_eq!(entries[0].email, "b@x.com");
    assert_eq!(entries[0].action, AccessAction::Login);
    assert_eq!(entries[1].email, "a@x.com");
    assert_eq!(entries[1].action, AccessAction::Logout);
}

#[test]
fn logging_in_again_as_the_same_account_keeps_quiet() {
    let fx = Fixture::new();
    fx.login_user("a@x.com");
    fx.events.take();

    fx.sessions.login("A@x.com", "pw").unwrap();
    assert!(!fx
        .events
        .take()
        .iter()
        .any(|e| matches!(e, CarebookEvent::SessionEnded { .. })));
    assert!(fx
        .log
        .entries()
        .iter()
        .all(|e| e.action != AccessAction::Logout));
}

#[test]
fn blocked_account_cannot_log_in() {
    let fx = Fixture::new();
    fx.sessions.signup("a@x.com", "pw").unwrap();
    fx.login_admin();
    assert_eq!(fx.sessions.toggle_user_block("a@x.com"), Ok(true));
    fx.sessions.logout();

    assert_eq!(fx.sessions.login("a@x.com", "pw"), Err(AuthError::Blocked));
    assert_eq!(
        fx.sessions.login("a@x.com", "bad"),
        Err(AuthError::InvalidCredentials)
    );

    fx.login_admin();
    assert_eq!(fx.sessions.toggle_user_block("a@x.com"), Ok(false));
    fx.sessions.logout();
    assert!(fx.sessions.login("a@x.com", "pw").is_ok());
}

#[test]
fn login_refreshes_last_active() {
    let fx = Fixture::new();
    fx.sessions.signup("a@x.com", "pw").unwrap();
    let created = fx.store.load_users()[0].last_active;

    let before = Utc::now();
    fx.sessions.login("a@x.com", "pw").unwrap();
    let after = Utc::now();

    let last_active = fx.store.load_users()[0].last_active;
    assert!(last_active >= before && last_active <= after);
    assert!(last_active >= created);
}

#[test]
fn logout_publishes_session_end_and_logs() {
    let fx = Fixture::new();
    fx.login_user("a@x.com");
    fx.events.take();

    assert_eq!(fx.sessions.logout().as_deref(), Some("a@x.com"));
    assert_eq!(fx.sessions.current_user(), None);
    assert!(fx.store.session_started_at().is_none());

    let events = fx.events.take();
    assert!(events.contains(&CarebookEvent::SessionEnded {
        identifier: Some("a@x.com".to_string())
    }));
    let newest = &fx.log.entries()[0];
    assert_eq!(newest.action, AccessAction::Logout);
    assert_eq!(newest.email, "a@x.com");
}

#[test]
fn logout_without_session_still_signals() {
    let fx = Fixture::new();
    assert_eq!(fx.sessions.logout(), None);
    assert_eq!(
        fx.events.take(),
        vec![CarebookEvent::SessionEnded { identifier: None }]
    );
    assert!(fx.log.entries().is_empty());
}

#[test]
fn admin_operations_are_refused_for_regular_users() {
    let fx = Fixture::new();
    fx.sessions.signup("b@x.com", "pw").unwrap();
    fx.login_user("a@x.com");
    let users_before = fx.store.load_users();
    fx.events.take();

    assert_eq!(fx.sessions.toggle_user_block("b@x.com"), Err(AdminError::Forbidden));
    assert_eq!(fx.sessions.delete_user("b@x.com"), Err(AdminError::Forbidden));
    assert_eq!(
        fx.sessions.update_user_password("b@x.com", "x"),
        Err(AdminError::Forbidden)
    );
    assert_eq!(
        fx.sessions.admin_create_user("c@x.com", "x"),
        Err(AdminError::Forbidden)
    );
    assert_eq!(fx.sessions.list_users(), Err(AdminError::Forbidden));
    assert_eq!(fx.sessions.recovery_requests(), Err(AdminError::Forbidden));
    assert_eq!(
        fx.sessions.trigger_universal_logout(),
        Err(AdminError::Forbidden)
    );
    assert_eq!(
        fx.sessions.update_global_config(&GlobalConfig::default()),
        Err(AdminError::Forbidden)
    );

    assert_eq!(fx.store.load_users(), users_before);
    assert!(fx.events.take().is_empty());
}

#[test]
fn sentinel_account_is_protected() {
    let fx = Fixture::new();
    fx.sessions.signup("a@x.com", "pw").unwrap();
    fx.login_admin();
    let users_before = fx.store.load_users();
    fx.events.take();

    for result in [
        fx.sessions.toggle_user_block(SUPER_ADMIN_IDENTIFIER).map(|_| ()),
        fx.sessions.delete_user(SUPER_ADMIN_IDENTIFIER),
        fx.sessions.update_user_password(SUPER_ADMIN_IDENTIFIER, "x"),
        fx.sessions.admin_create_user(SUPER_ADMIN_IDENTIFIER, "x"),
    ] {
        let err = result.unwrap_err();
        assert_eq!(err, AdminError::ProtectedAccount);
        assert!(err.is_refusal());
    }

    assert_eq!(fx.store.load_users(), users_before);
    assert!(fx.events.take().is_empty());
}

#[test]
fn admin_manages_accounts() {
    let fx = Fixture::new();
    fx.login_admin();

    fx.sessions.admin_create_user("New@X.com", "first").unwrap();
    assert_eq!(
        fx.sessions.admin_create_user("new@x.com", "again"),
        Err(AdminError::already_exists("new@x.com"))
    );
    fx.sessions
        .update_user_password("new@x.com", "second")
        .unwrap();
    assert_eq!(fx.sessions.list_users().unwrap()[0].password, "second");

    assert_eq!(
        fx.sessions.delete_user("missing@x.com"),
        Err(AdminError::user_not_found("missing@x.com"))
    );
    fx.sessions.delete_user("new@x.com").unwrap();
    assert!(fx.sessions.list_users().unwrap().is_empty());

    fx.sessions.logout();
    assert_eq!(
        fx.sessions.login("new@x.com", "second"),
        Err(AuthError::InvalidCredentials)
    );
}

#[test]
fn global_config_is_admin_written_and_shared() {
    let fx = Fixture::new();
    fx.login_admin();
    let config = GlobalConfig {
        app_name: "North Clinic".to_string(),
        maintenance_mode: true,
        ..GlobalConfig::default()
    };
    fx.events.take();
    fx.sessions.update_global_config(&config).unwrap();
    assert_eq!(fx.events.take(), vec![CarebookEvent::ConfigChanged]);
    fx.sessions.logout();

    // maintenance mode is informational; regular logins still work
    fx.login_user("a@x.com");
    assert_eq!(fx.sessions.global_config(), config);
}

#[test]
fn universal_logout_ends_older_regular_sessions() {
    let fx = Fixture::new();
    fx.login_user("a@x.com");
    assert!(!fx.sessions.poll_universal_logout());

    // flag raised by the admin on another device after this session began
    let later = Utc::now() + chrono::Duration::seconds(1);
    fx.kv
        .set(KEY_UNIVERSAL_LOGOUT_AT, &later.to_rfc3339())
        .unwrap();

    assert!(fx.sessions.poll_universal_logout());
    assert_eq!(fx.sessions.current_user(), None);

    // a session started after the flag survives
    std::thread::sleep(std::time::Duration::from_millis(1100));
    fx.sessions.login("a@x.com", "pw").unwrap();
    assert!(!fx.sessions.poll_universal_logout());
    assert_eq!(fx.sessions.current_user().as_deref(), Some("a@x.com"));
}

#[test]
fn universal_logout_spares_the_admin() {
    let fx = Fixture::new();
    fx.login_admin();
    let at = fx.sessions.trigger_universal_logout().unwrap();
    assert!(fx
        .events
        .take()
        .contains(&CarebookEvent::UniversalLogout { at }));
    assert_eq!(fx.store.universal_logout_at(), Some(at));

    assert!(!fx.sessions.poll_universal_logout());
    assert!(fx.sessions.is_admin());
}

#[test]
fn heartbeat_refreshes_activity() {
    let fx = Fixture::new();
    fx.sessions.heartbeat();
    assert!(fx.log.entries().is_empty());

    fx.login_user("a@x.com");
    let before = fx.store.load_users()[0].last_active;
    fx.sessions.heartbeat();

    assert!(fx.store.load_users()[0].last_active >= before);
    let newest = &fx.log.entries()[0];
    assert_eq!(newest.action, AccessAction::Heartbeat);
    assert_eq!(newest.status, AccessStatus::Success);
}

#[test]
fn recovery_requests_are_appended_for_the_admin() {
    let fx = Fixture::new();
    fx.sessions.request_password_recovery(" A@X.com").unwrap();
    fx.sessions.request_password_recovery("b@x.com").unwrap();
    assert!(matches!(
        fx.sessions.request_password_recovery(""),
        Err(AuthError::Validation { .. })
    ));

    fx.login_admin();
    let requests = fx.sessions.recovery_requests().unwrap();
    let emails: Vec<_> = requests.iter().map(|r| r.email.as_str()).collect();
    assert_eq!(emails, vec!["a@x.com", "b@x.com"]);
}
