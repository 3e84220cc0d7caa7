//! Session controller
//!
//! Tracks who is signed in and keeps the realtime channel in step with it:
//! signing in (or restoring a stored session) starts the channel, signing
//! out stops it and clears the dashboard.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::dashboard::{Dashboard, DashboardHandlers, DashboardState};
use crate::api::ApiClient;
use crate::config::AppConfig;
use crate::credentials::TokenStorage;
use crate::realtime::{HttpStatusProbe, RealtimeManager, StatusProbe};
use crate::services::auth_service::AuthService;
use crate::services::events::EventEmitter;
use crate::types::auth::{AuthResponse, Credentials, UpdateProfileRequest, User, UserProfile, UserStats};
use crate::types::error::{OneMailError, Result};

#[derive(Debug, Clone, Default)]
struct Account {
    user: Option<User>,
    profile: Option<UserProfile>,
    stats: Option<UserStats>,
}

#[derive(Clone)]
pub struct SessionController {
    auth: AuthService,
    realtime: RealtimeManager,
    probe: Arc<dyn StatusProbe>,
    events: EventEmitter,
    dashboard: Dashboard,
    account: Arc<RwLock<Account>>,
}

impl SessionController {
    pub fn new(
        auth: AuthService,
        realtime: RealtimeManager,
        probe: Arc<dyn StatusProbe>,
        events: EventEmitter,
    ) -> Self {
        Self {
            auth,
            realtime,
            probe,
            events,
            dashboard: Dashboard::new(),
            account: Arc::new(RwLock::new(Account::default())),
        }
    }

    /// Controller over HTTP and websockets, wired from configuration
    pub fn from_config(config: &AppConfig, tokens: TokenStorage, events: EventEmitter) -> Self {
        let api = ApiClient::http(&config.api.base_url, tokens.clone(), events.clone());
        let realtime = RealtimeManager::websocket(config.realtime.clone(), tokens);
        let probe = Arc::new(HttpStatusProbe::new(config.realtime.status_url.clone()));
        Self::new(AuthService::new(api), realtime, probe, events)
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn realtime(&self) -> &RealtimeManager {
        &self.realtime
    }

    pub fn dashboard(&self) -> DashboardState {
        self.dashboard.snapshot()
    }

    pub async fn user(&self) -> Option<User> {
        self.account.read().await.user.clone()
    }

    pub async fn profile(&self) -> Option<UserProfile> {
        self.account.read().await.profile.clone()
    }

    pub async fn stats(&self) -> Option<UserStats> {
        self.account.read().await.stats.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.account.read().await.user.is_some() && self.auth.tokens().is_authenticated()
    }

    // ========================================================================
    // Sign-in state
    // ========================================================================

    /// Resume a stored session
    ///
    /// The stored access token is verified first, then a refresh is
    /// attempted. If neither works the stored session is wiped.
    pub async fn restore(&self) -> Option<User> {
        let tokens = self.auth.tokens();
        let stored = tokens.user()?;
        if !tokens.is_authenticated() {
            debug!("Stored user without tokens, nothing to restore");
            return None;
        }

        let user = if self.auth.verify_token().await {
            Some(stored)
        } else {
            info!("Stored access token rejected, refreshing");
            match self.auth.refresh_token().await {
                Ok(_) => tokens.user(),
                Err(e) => {
                    warn!("Could not restore session: {}", e);
                    if let Err(clear_err) = tokens.clear_session() {
                        error!("Failed to clear stored session: {}", clear_err);
                    }
                    None
                }
            }
        };

        if let Some(user) = &user {
            info!("Restored session for {}", user.id);
            self.start(user.clone()).await;
        }
        user
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<User> {
        let response = self.auth.login(credentials).await?;
        self.signed_in(response).await
    }

    pub async fn register(&self, credentials: &Credentials) -> Result<User> {
        let response = self.auth.register(credentials).await?;
        self.signed_in(response).await
    }

    async fn signed_in(&self, response: AuthResponse) -> Result<User> {
        if !response.success {
            return Err(OneMailError::Auth(if response.message.is_empty() {
                "Authentication failed".to_string()
            } else {
                response.message
            }));
        }

        let user = response.data.user;
        self.start(user.clone()).await;
        Ok(user)
    }

    /// Stop the realtime channel, forget the session and ask for a login
    pub async fn logout(&self) -> Result<()> {
        self.realtime.disconnect();
        self.dashboard.reset();
        *self.account.write().await = Account::default();

        let result = self.auth.logout();
        if let Err(e) = &result {
            error!("Logout error: {}", e);
        }
        self.events.login_required();
        result
    }

    async fn start(&self, user: User) {
        self.account.write().await.user = Some(user);

        tokio::join!(self.refresh_profile(), self.refresh_stats());

        self.check_realtime_status().await;
        self.realtime.connect(Arc::new(DashboardHandlers::new(
            self.dashboard.clone(),
            self.events.clone(),
        )));
    }

    // ========================================================================
    // Account data
    // ========================================================================

    /// Reload the profile; failures are logged and leave the old one
    pub async fn refresh_profile(&self) {
        match self.auth.get_user_profile().await {
            Ok(profile) => self.account.write().await.profile = Some(profile),
            Err(e) => warn!("Failed to load user profile: {}", e),
        }
    }

    pub async fn refresh_stats(&self) {
        match self.auth.get_user_stats().await {
            Ok(stats) => self.account.write().await.stats = Some(stats),
            Err(e) => warn!("Failed to load user stats: {}", e),
        }
    }

    pub async fn update_profile(&self, update: &UpdateProfileRequest) -> Result<UserProfile> {
        let profile = self.auth.update_profile(update).await?;
        let mut account = self.account.write().await;
        account.profile = Some(profile.clone());
        account.user = self.auth.tokens().user();
        Ok(profile)
    }

    /// One status request at sign-in, reported as a notice on failure
    async fn check_realtime_status(&self) {
        let Some(token) = self.auth.tokens().access_token() else {
            return;
        };

        match self.probe.probe(&token).await {
            Ok(()) => {}
            Err(e @ OneMailError::Api { .. }) => {
                warn!("Realtime status check rejected: {}", e);
                self.events
                    .destructive("WebSocket Status Error", "Failed to check WebSocket status.");
            }
            Err(e) => {
                error!("Error checking realtime status: {}", e);
                self.events
                    .destructive("Connection Error", "Failed to check WebSocket status.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RealtimeConfig;
    use crate::realtime::{Connection, Connector, Frame};
    use crate::services::events::{Notice, SessionEvent};
    use crate::types::auth::Tokens;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Accepts every open; the connection stays silent until closed
    #[derive(Default)]
    struct QuietConnector {
        opens: AtomicUsize,
    }

    struct QuietConnection;

    #[async_trait]
    impl Connection for QuietConnection {
        async fn next_frame(&mut self) -> Option<Result<Frame>> {
            std::future::pending().await
        }

        async fn close(&mut self) {}
    }

    #[async_trait]
    impl Connector for QuietConnector {
        async fn open(&self, _url: &str) -> Result<Box<dyn Connection>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(QuietConnection))
        }
    }

    struct Fixture {
        controller: SessionController,
        connector: Arc<QuietConnector>,
        rx: flume::Receiver<SessionEvent>,
        tokens: TokenStorage,
    }

    fn fixture(server: &MockServer) -> Fixture {
        let tokens = TokenStorage::in_memory();
        let (events, rx) = EventEmitter::channel();
        let api = ApiClient::http(&format!("{}/api", server.uri()), tokens.clone(), events.clone());
        let connector = Arc::new(QuietConnector::default());
        let probe = Arc::new(HttpStatusProbe::new(format!(
            "{}/api/websocket/status",
            server.uri()
        )));
        let realtime = RealtimeManager::new(
            RealtimeConfig::default(),
            tokens.clone(),
            connector.clone(),
            probe.clone(),
        );

        Fixture {
            controller: SessionController::new(AuthService::new(api), realtime, probe, events),
            connector,
            rx,
            tokens,
        }
    }

    fn user_json() -> serde_json::Value {
        json!({"id": "u1", "phoneNumber": "+15551234567", "createdAt": "c", "updatedAt": "u"})
    }

    fn store_session(tokens: &TokenStorage) {
        tokens
            .set_tokens(&Tokens {
                access_token: "A1".to_string(),
                refresh_token: "R1".to_string(),
            })
            .unwrap();
        tokens
            .set_user(&serde_json::from_value(user_json()).unwrap())
            .unwrap();
    }

    async fn mount_account_routes(server: &MockServer, status_code: u16) {
        Mock::given(method("GET"))
            .and(path("/api/user/profile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json()))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/user/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalEmails": 12, "categorizedEmails": 10, "spamEmails": 1, "lastLoginAt": "2024-05-01T10:00:00Z"
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/websocket/status"))
            .respond_with(ResponseTemplate::new(status_code).set_body_json(json!({"connected": true})))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    fn titles(rx: &flume::Receiver<SessionEvent>) -> Vec<String> {
        rx.try_iter()
            .map(|event| match event {
                SessionEvent::Notice(Notice { title, .. }) => title,
                SessionEvent::LoginRequired => "<login>".to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_restore_with_valid_token_connects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user/verify"))
            .and(header("authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;
        mount_account_routes(&server, 200).await;

        let f = fixture(&server);
        store_session(&f.tokens);

        let user = f.controller.restore().await.unwrap();
        assert_eq!(user.id, "u1");
        assert!(f.controller.is_authenticated().await);
        assert_eq!(f.controller.stats().await.map(|s| s.total_emails), Some(12));
        assert!(f.controller.profile().await.is_some());

        let realtime = f.controller.realtime().clone();
        wait_until(|| realtime.is_connected()).await;
        assert!(f.controller.dashboard().is_connected);
        assert_eq!(f.connector.opens.load(Ordering::SeqCst), 1);
        assert_eq!(titles(&f.rx), vec!["Connected"]);

        f.controller.realtime().disconnect();
    }

    #[tokio::test]
    async fn test_restore_clears_session_when_refresh_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/user/verify"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Token expired"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/user/refresh"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid refresh token"})))
            .mount(&server)
            .await;

        let f = fixture(&server);
        store_session(&f.tokens);

        assert_eq!(f.controller.restore().await, None);
        assert!(!f.tokens.is_authenticated());
        assert_eq!(f.tokens.user(), None);
        assert!(!f.controller.is_authenticated().await);
        assert_eq!(f.connector.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_restore_without_stored_session_does_nothing() {
        let server = MockServer::start().await;
        let f = fixture(&server);

        assert_eq!(f.controller.restore().await, None);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_login_then_logout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/user/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": "ok",
                "data": {"user": user_json(), "tokens": {"accessToken": "A1", "refreshToken": "R1"}}
            })))
            .mount(&server)
            .await;
        // Status check fails: reported, connection still attempted
        mount_account_routes(&server, 500).await;

        let f = fixture(&server);
        let user = f
            .controller
            .login(&Credentials {
                phone_number: "+15551234567".to_string(),
                password: "Secret123".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(user.id, "u1");

        let realtime = f.controller.realtime().clone();
        wait_until(|| realtime.is_connected()).await;

        f.controller.logout().await.unwrap();
        assert!(!f.controller.realtime().is_connected());
        assert!(f.controller.realtime().is_manually_closed());
        assert_eq!(f.controller.dashboard(), DashboardState::default());
        assert_eq!(f.controller.user().await, None);
        assert!(!f.tokens.is_authenticated());

        assert_eq!(
            titles(&f.rx),
            vec!["WebSocket Status Error", "Connected", "<login>"]
        );
    }
}
