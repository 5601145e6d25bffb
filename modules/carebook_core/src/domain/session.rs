use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::contract::error::{AdminError, AuthError};
use crate::contract::model::{
    AccessAction, AccessStatus, GlobalConfig, RecoveryRequest, SessionInfo, UserAccount,
};
use crate::domain::access_log::AccessLog;
use crate::domain::events::{CarebookEvent, ChangeScope};
use crate::domain::keys::normalize_identifier;
use crate::domain::ports::EventPublisher;
use crate::domain::store::PersistenceStore;

/// Identifier of the built-in super-admin. Compared verbatim, so it never
/// collides with a directory entry (those are lowercase).
pub const SUPER_ADMIN_IDENTIFIER: &str = "ADMIN_MASTER";

/// Secret of the built-in super-admin. Compiled in; there is no way to
/// change it at runtime.
pub const SUPER_ADMIN_SECRET: &str = "Carebook#Master!";

/// True when `identifier` designates the super-admin in any spelling.
fn is_sentinel(identifier: &str) -> bool {
    normalize_identifier(identifier) == normalize_identifier(SUPER_ADMIN_IDENTIFIER)
}

/// Credential checks, the session pointer and admin-only operations.
///
/// Every method reads the directory fresh from the store, so two managers
/// over the same backend see each other's writes.
pub struct SessionManager {
    store: Arc<PersistenceStore>,
    log: Arc<AccessLog>,
    events: Arc<dyn EventPublisher<CarebookEvent>>,
}

impl SessionManager {
    pub fn new(
        store: Arc<PersistenceStore>,
        log: Arc<AccessLog>,
        events: Arc<dyn EventPublisher<CarebookEvent>>,
    ) -> Self {
        Self { store, log, events }
    }

    fn publish_directory(&self, scope: ChangeScope) {
        self.events
            .publish(&CarebookEvent::DirectoryChanged { scope });
    }

    fn require_admin(&self) -> Result<(), AdminError> {
        if self.is_admin() {
            Ok(())
        } else {
            debug!("Admin operation refused for non-admin session");
            Err(AdminError::Forbidden)
        }
    }

    /// Normalized target of an admin mutation, refusing the super-admin.
    fn admin_target(&self, identifier: &str) -> Result<String, AdminError> {
        self.require_admin()?;
        if is_sentinel(identifier) {
            debug!("Refusing to modify the super-admin account");
            return Err(AdminError::ProtectedAccount);
        }
        Ok(normalize_identifier(identifier))
    }

    fn start_session(&self, identifier: &str, is_admin: bool) -> Result<SessionInfo, AuthError> {
        // switching accounts ends the outgoing session first
        if self
            .store
            .current_identifier()
            .is_some_and(|current| current != identifier)
        {
            self.logout();
        }

        let started_at = Utc::now();
        self.store.set_session(identifier, started_at)?;
        self.log
            .record(identifier, AccessAction::Login, AccessStatus::Success);
        Ok(SessionInfo {
            identifier: identifier.to_string(),
            is_admin,
            started_at,
        })
    }

    fn reject_login(&self, identifier: &str, err: AuthError) -> Result<SessionInfo, AuthError> {
        self.log
            .record(identifier, AccessAction::Login, AccessStatus::Error);
        info!(error = %err, "Login rejected");
        Err(err)
    }

    // --- session ---

    #[instrument(name = "carebook.session.login", skip(self, secret), fields(identifier = %identifier))]
    pub fn login(&self, identifier: &str, secret: &str) -> Result<SessionInfo, AuthError> {
        if identifier == SUPER_ADMIN_IDENTIFIER && secret == SUPER_ADMIN_SECRET {
            info!("Super-admin session started");
            return self.start_session(SUPER_ADMIN_IDENTIFIER, true);
        }

        if is_sentinel(identifier) {
            return self.reject_login(identifier.trim(), AuthError::InvalidCredentials);
        }

        let email = normalize_identifier(identifier);
        let mut users = self.store.load_users();
        let Some(user) = users
            .iter_mut()
            .find(|u| u.email == email && u.password == secret)
        else {
            return self.reject_login(&email, AuthError::InvalidCredentials);
        };

        if user.blocked {
            return self.reject_login(&email, AuthError::Blocked);
        }

        user.last_active = Utc::now();
        if let Err(e) = self.store.save_users(&users) {
            warn!(error = %e, "Could not persist lastActive");
        } else {
            self.publish_directory(ChangeScope::Users);
        }

        let session = self.start_session(&email, false)?;
        info!("Session started");
        Ok(session)
    }

    /// Register a regular account. Does not log in.
    #[instrument(name = "carebook.session.signup", skip(self, secret), fields(identifier = %identifier))]
    pub fn signup(&self, identifier: &str, secret: &str) -> Result<(), AuthError> {
        let email = normalize_identifier(identifier);
        if email.is_empty() {
            return Err(AuthError::validation("identifier must not be empty"));
        }
        if secret.is_empty() {
            return Err(AuthError::validation("secret must not be empty"));
        }
        if is_sentinel(&email) {
            return Err(AuthError::validation("identifier is reserved"));
        }

        let mut users = self.store.load_users();
        if users.iter().any(|u| u.email == email) {
            return Err(AuthError::already_exists(email));
        }

        users.push(UserAccount::new(
            email.clone(),
            secret.to_string(),
            Utc::now(),
        ));
        self.store.save_users(&users)?;

        self.log
            .record(&email, AccessAction::Login, AccessStatus::Success);
        self.publish_directory(ChangeScope::Users);
        info!("Account registered");
        Ok(())
    }

    /// End the current session and tell subscribers to drop per-user state.
    /// Returns the identifier that was logged in, if any.
    #[instrument(name = "carebook.session.logout", skip(self))]
    pub fn logout(&self) -> Option<String> {
        let outgoing = self.store.current_identifier();

        if let Err(e) = self.store.clear_session() {
            warn!(error = %e, "Could not clear session keys");
        }
        if let Some(id) = &outgoing {
            self.log.record(id, AccessAction::Logout, AccessStatus::Success);
        }

        self.events.publish(&CarebookEvent::SessionEnded {
            identifier: outgoing.clone(),
        });
        info!(identifier = ?outgoing, "Session ended");
        outgoing
    }

    pub fn current_user(&self) -> Option<String> {
        self.store.current_identifier()
    }

    pub fn is_admin(&self) -> bool {
        self.current_user().as_deref() == Some(SUPER_ADMIN_IDENTIFIER)
    }

    /// Refresh `lastActive` of the logged-in regular user and leave a trace
    /// in the access log.
    #[instrument(name = "carebook.session.heartbeat", skip(self))]
    pub fn heartbeat(&self) {
        let Some(current) = self.current_user() else {
            return;
        };

        if current != SUPER_ADMIN_IDENTIFIER {
            let mut users = self.store.load_users();
            if let Some(user) = users.iter_mut().find(|u| u.email == current) {
                user.last_active = Utc::now();
                match self.store.save_users(&users) {
                    Ok(()) => self.publish_directory(ChangeScope::Users),
                    Err(e) => warn!(error = %e, "Could not persist lastActive"),
                }
            }
        }

        self.log
            .record(&current, AccessAction::Heartbeat, AccessStatus::Success);
    }

    /// Log the current regular session out when the universal logout flag
    /// was raised after it started. Returns `true` when that happened.
    #[instrument(name = "carebook.session.poll_universal_logout", skip(self))]
    pub fn poll_universal_logout(&self) -> bool {
        let Some(current) = self.current_user() else {
            return false;
        };
        if current == SUPER_ADMIN_IDENTIFIER {
            return false;
        }
        let Some(flag) = self.store.universal_logout_at() else {
            return false;
        };

        let stale = self
            .store
            .session_started_at()
            .is_none_or(|started| flag > started);
        if stale {
            info!(flag = %flag, "Universal logout applied to current session");
            self.logout();
        }
        stale
    }

    #[instrument(name = "carebook.session.request_password_recovery", skip(self))]
    pub fn request_password_recovery(&self, identifier: &str) -> Result<(), AuthError> {
        let email = normalize_identifier(identifier);
        if email.is_empty() {
            return Err(AuthError::validation("identifier must not be empty"));
        }

        let mut requests = self.store.load_recovery_requests();
        requests.push(RecoveryRequest {
            email,
            timestamp: Utc::now(),
        });
        self.store.save_recovery_requests(&requests)?;

        self.publish_directory(ChangeScope::RecoveryRequests);
        Ok(())
    }

    pub fn global_config(&self) -> GlobalConfig {
        self.store.load_global_config()
    }

    // --- admin only ---

    pub fn list_users(&self) -> Result<Vec<UserAccount>, AdminError> {
        self.require_admin()?;
        Ok(self.store.load_users())
    }

    pub fn recovery_requests(&self) -> Result<Vec<RecoveryRequest>, AdminError> {
        self.require_admin()?;
        Ok(self.store.load_recovery_requests())
    }

    #[instrument(name = "carebook.session.admin_create_user", skip(self, secret), fields(identifier = %identifier))]
    pub fn admin_create_user(&self, identifier: &str, secret: &str) -> Result<(), AdminError> {
        let email = self.admin_target(identifier)?;
        if email.is_empty() || secret.is_empty() {
            return Err(AdminError::validation(
                "identifier and secret must not be empty",
            ));
        }

        let mut users = self.store.load_users();
        if users.iter().any(|u| u.email == email) {
            return Err(AdminError::already_exists(email));
        }
        users.push(UserAccount::new(email, secret.to_string(), Utc::now()));
        self.store.save_users(&users)?;

        self.publish_directory(ChangeScope::Users);
        info!("Account created by admin");
        Ok(())
    }

    /// Flip the blocked flag. Returns the new value.
    #[instrument(name = "carebook.session.toggle_user_block", skip(self))]
    pub fn toggle_user_block(&self, identifier: &str) -> Result<bool, AdminError> {
        let email = self.admin_target(identifier)?;

        let mut users = self.store.load_users();
        let user = users
            .iter_mut()
            .find(|u| u.email == email)
            .ok_or_else(|| AdminError::user_not_found(&email))?;
        user.blocked = !user.blocked;
        let blocked = user.blocked;
        self.store.save_users(&users)?;

        self.publish_directory(ChangeScope::Users);
        info!(blocked, "Account block toggled");
        Ok(blocked)
    }

    /// Remove the directory entry. The account's collections stay in storage.
    #[instrument(name = "carebook.session.delete_user", skip(self))]
    pub fn delete_user(&self, identifier: &str) -> Result<(), AdminError> {
        let email = self.admin_target(identifier)?;

        let mut users = self.store.load_users();
        let before = users.len();
        users.retain(|u| u.email != email);
        if users.len() == before {
            return Err(AdminError::user_not_found(email));
        }
        self.store.save_users(&users)?;

        self.publish_directory(ChangeScope::Users);
        info!("Account deleted");
        Ok(())
    }

    #[instrument(name = "carebook.session.update_user_password", skip(self, new_secret))]
    pub fn update_user_password(
        &self,
        identifier: &str,
        new_secret: &str,
    ) -> Result<(), AdminError> {
        let email = self.admin_target(identifier)?;
        if new_secret.is_empty() {
            return Err(AdminError::validation("secret must not be empty"));
        }

        let mut users = self.store.load_users();
        let user = users
            .iter_mut()
            .find(|u| u.email == email)
            .ok_or_else(|| AdminError::user_not_found(&email))?;
        user.password = new_secret.to_string();
        self.store.save_users(&users)?;

        self.publish_directory(ChangeScope::Users);
        info!("Account secret replaced");
        Ok(())
    }

    /// Raise the flag that makes every regular session log out on its next
    /// poll. Returns the instant written.
    #[instrument(name = "carebook.session.trigger_universal_logout", skip(self))]
    pub fn trigger_universal_logout(&self) -> Result<DateTime<Utc>, AdminError> {
        self.require_admin()?;

        let at = Utc::now();
        self.store.set_universal_logout_at(at)?;
        self.events.publish(&CarebookEvent::UniversalLogout { at });
        info!(at = %at, "Universal logout triggered");
        Ok(at)
    }

    #[instrument(name = "carebook.session.update_global_config", skip_all)]
    pub fn update_global_config(&self, config: &GlobalConfig) -> Result<(), AdminError> {
        self.require_admin()?;

        self.store.save_global_config(config)?;
        self.events.publish(&CarebookEvent::ConfigChanged);
        info!(app_name = %config.app_name, "Global configuration updated");
        Ok(())
    }
}
