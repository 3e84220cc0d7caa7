//! Account and session operations against the oneMail API
//!
//! Thin typed wrappers over `ApiClient`: every call goes through the
//! refresh-and-retry guard, and the ones that change the session (login,
//! register, logout, account deletion) keep `TokenStorage` in step.

use tracing::{debug, info, warn};
use url::Url;

use crate::api::{ApiClient, ApiRequest};
use crate::credentials::TokenStorage;
use crate::types::auth::{
    AuthResponse, ChangePasswordRequest, Credentials, DeleteAccountRequest, EmailAccountStatus,
    GmailAuthUrlResponse, GmailCallbackRequest, GmailCallbackResponse, MessageResponse, Tokens,
    UpdateProfileRequest, User, UserProfile, UserStats,
};
use crate::types::error::{OneMailError, Result};

#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
}

impl AuthService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn tokens(&self) -> &TokenStorage {
        self.api.tokens()
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    pub async fn register(&self, credentials: &Credentials) -> Result<AuthResponse> {
        let response: AuthResponse = self
            .api
            .request(ApiRequest::post("/user/register").json(credentials)?)
            .await?;
        self.store_session(&response)?;
        Ok(response)
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse> {
        let response: AuthResponse = self
            .api
            .request(ApiRequest::post("/user/login").json(credentials)?)
            .await?;
        self.store_session(&response)?;
        Ok(response)
    }

    fn store_session(&self, response: &AuthResponse) -> Result<()> {
        if response.success {
            self.tokens().set_tokens(&response.data.tokens)?;
            self.tokens().set_user(&response.data.user)?;
            info!("Signed in as {}", response.data.user.id);
        }
        Ok(())
    }

    /// Forget the local session; the backend keeps no logout state
    pub fn logout(&self) -> Result<()> {
        self.tokens().clear_session()?;
        info!("Signed out");
        Ok(())
    }

    pub async fn refresh_token(&self) -> Result<Tokens> {
        self.api.refresh_session().await
    }

    /// Whether the stored access token is still accepted
    pub async fn verify_token(&self) -> bool {
        if self.tokens().access_token().is_none() {
            return false;
        }

        match self.api.dispatch(ApiRequest::get("/user/verify")).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Token verification failed: {}", e);
                false
            }
        }
    }

    fn require_access_token(&self) -> Result<()> {
        if self.tokens().access_token().is_none() {
            return Err(OneMailError::Auth("No access token available".to_string()));
        }
        Ok(())
    }

    // ========================================================================
    // Profile
    // ========================================================================

    pub async fn get_user_profile(&self) -> Result<UserProfile> {
        self.require_access_token()?;
        self.api.request(ApiRequest::get("/user/profile")).await
    }

    /// Update the profile and keep the stored user record in sync
    pub async fn update_profile(&self, update: &UpdateProfileRequest) -> Result<UserProfile> {
        self.require_access_token()?;
        let profile: UserProfile = self
            .api
            .request(ApiRequest::put("/user/profile").json(update)?)
            .await?;

        self.tokens().set_user(&User {
            id: profile.id.clone(),
            phone_number: profile.phone_number.clone(),
            created_at: profile.created_at.clone(),
            updated_at: profile.updated_at.clone(),
        })?;
        Ok(profile)
    }

    pub async fn change_password(&self, request: &ChangePasswordRequest) -> Result<MessageResponse> {
        self.require_access_token()?;
        self.api
            .request(ApiRequest::post("/user/change-password").json(request)?)
            .await
    }

    /// Delete the account and wipe the local session on success
    pub async fn delete_account(&self, request: &DeleteAccountRequest) -> Result<()> {
        self.require_access_token()?;
        self.api
            .dispatch(ApiRequest::delete("/user/account").json(request)?)
            .await?;
        self.tokens().clear_session()?;
        info!("Account deleted");
        Ok(())
    }

    pub async fn get_user_stats(&self) -> Result<UserStats> {
        self.require_access_token()?;
        self.api.request(ApiRequest::get("/user/stats")).await
    }

    // ========================================================================
    // Linked email accounts
    // ========================================================================

    pub async fn get_email_account_status(&self, user_id: &str) -> Result<EmailAccountStatus> {
        self.require_access_token()?;
        self.api
            .request(ApiRequest::get(format!("/auth/status/{}", user_id)))
            .await
    }

    pub async fn get_gmail_auth_url(&self) -> Result<GmailAuthUrlResponse> {
        self.require_access_token()?;
        self.api.request(ApiRequest::get("/auth/gmail")).await
    }

    pub async fn handle_gmail_callback(
        &self,
        request: &GmailCallbackRequest,
    ) -> Result<GmailCallbackResponse> {
        self.require_access_token()?;
        self.api
            .request(ApiRequest::post("/auth/gmail/callback").json(request)?)
            .await
    }

    /// Start linking a Gmail account
    ///
    /// Returns the Google consent URL to open. The user id is remembered
    /// so the callback can be completed after the redirect.
    pub async fn begin_gmail_link(&self, user_id: &str) -> Result<String> {
        let response = self.get_gmail_auth_url().await?;
        if !response.success || response.data.auth_url.is_empty() {
            return Err(OneMailError::Auth(
                "Failed to initiate Gmail linking".to_string(),
            ));
        }

        self.tokens().set_pending_gmail_user(user_id)?;
        info!("Started Gmail link for user {}", user_id);
        Ok(response.data.auth_url)
    }

    /// Finish linking from the OAuth redirect URL
    pub async fn complete_gmail_link(&self, callback_url: &str) -> Result<GmailCallbackResponse> {
        let url = Url::parse(callback_url)?;
        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };

        let code = match param("code").filter(|c| !c.is_empty()) {
            Some(code) => code,
            None => {
                let reason = param("error")
                    .map(|e| format!("Google returned an error: {}", e))
                    .unwrap_or_else(|| "No authorization code received from Google".to_string());
                return Err(OneMailError::Auth(reason));
            }
        };

        let user_id = self.tokens().pending_gmail_user().ok_or_else(|| {
            OneMailError::InvalidInput(
                "User ID not found. Please try linking your account again.".to_string(),
            )
        })?;

        let result = self
            .handle_gmail_callback(&GmailCallbackRequest { code, user_id })
            .await;

        if let Err(e) = self.tokens().clear_pending_gmail_user() {
            warn!("Failed to clear pending Gmail link: {}", e);
        }

        match &result {
            Ok(response) => info!("Gmail account linked: {}", response.message),
            Err(e) => warn!("Gmail link failed: {}", e),
        }
        result
    }
}
