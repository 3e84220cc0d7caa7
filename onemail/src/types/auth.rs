//! Authentication API types
//!
//! Request and response bodies for the `/api/user` and `/api/auth` routes.
//! Field names follow the backend's camelCase JSON.

use serde::{Deserialize, Serialize};

// ============================================================================
// Users and tokens
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub phone_number: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Access/refresh token pair, always stored and cleared together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthData {
    pub user: User,
    pub tokens: Tokens,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: AuthData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshData {
    pub tokens: Tokens,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: RefreshData,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub phone_number: String,
    pub password: String,
}

pub type LoginRequest = Credentials;
pub type RegisterRequest = Credentials;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack_webhook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteAccountRequest {
    pub password: String,
}

/// Error body returned by the backend on failure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

// ============================================================================
// Profile and stats
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_webhook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_webhook_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_emails: u64,
    pub categorized_emails: u64,
    pub spam_emails: u64,
    pub last_login_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

// ============================================================================
// Linked email accounts
// ============================================================================

/// A linked mailbox as reported by `/auth/status/{userId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAccount {
    pub email: String,
    #[serde(default)]
    pub has_refresh_token: bool,
    #[serde(default)]
    pub token_expiry: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailAccountStatusData {
    #[serde(default)]
    pub emails: Vec<EmailAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailAccountStatus {
    pub success: bool,
    #[serde(default)]
    pub data: EmailAccountStatusData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailAuthUrlData {
    pub auth_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailAuthUrlResponse {
    pub success: bool,
    pub data: GmailAuthUrlData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailCallbackRequest {
    pub code: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailCallbackResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_response_from_backend_json() {
        let json = r#"{
            "success": true,
            "message": "Login successful",
            "data": {
                "user": {"id": "u1", "phoneNumber": "+15551234567", "createdAt": "2024-01-01", "updatedAt": "2024-01-02"},
                "tokens": {"accessToken": "A1", "refreshToken": "R1"}
            }
        }"#;
        let response: AuthResponse = serde_json::from_str(json).unwrap();
        assert!(response.success);
        assert_eq!(response.data.user.id, "u1");
        assert_eq!(response.data.tokens.access_token, "A1");
        assert_eq!(response.data.tokens.refresh_token, "R1");
    }

    #[test]
    fn test_update_profile_skips_unset_fields() {
        let request = UpdateProfileRequest {
            slack_webhook_url: Some("https://hooks.slack.com/x".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"slackWebhookUrl": "https://hooks.slack.com/x"}));
    }
}
