// SPDX-License-Identifier: MIT

//! SMS one-time-password client for two-factor login.
//!
//! Talks to a 2Factor-style hosted API: one call sends an auto-generated
//! OTP to a phone number and returns a session ID, a second call checks
//! the user-supplied OTP against that session.

use serde::Deserialize;

use crate::error::AppError;

/// OTP provider client.
#[derive(Clone)]
pub struct OtpClient {
    /// None in offline/test mode
    http: Option<reqwest::Client>,
    base_url: String,
    api_key: String,
}

/// Provider response envelope.
#[derive(Debug, Deserialize)]
struct OtpResponse {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Details")]
    details: String,
}

impl OtpClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: Some(reqwest::Client::new()),
            base_url: "https://2factor.in/API/V1".to_string(),
            api_key,
        }
    }

    /// Offline client for testing: sending yields a fixed session ID and
    /// verification accepts only `000000`.
    pub fn new_mock() -> Self {
        Self {
            http: None,
            base_url: "https://2factor.in/API/V1".to_string(),
            api_key: "offline".to_string(),
        }
    }

    /// Send an auto-generated OTP to the phone number; returns the provider
    /// session ID to verify against.
    pub async fn send_otp(&self, phone: &str) -> Result<String, AppError> {
        let Some(http) = self.http.as_ref() else {
            return Ok("offline-session".to_string());
        };

        let url = format!(
            "{}/{}/SMS/{}/AUTOGEN",
            self.base_url,
            self.api_key,
            urlencoding::encode(phone)
        );
        let response = self.call(http, &url).await?;

        if response.status != "Success" {
            return Err(AppError::OtpApi(response.details));
        }
        Ok(response.details)
    }

    /// Check an OTP against a session. Ok(true) on match, Ok(false) on a
    /// wrong code; Err only for provider failures.
    pub async fn verify_otp(&self, session_id: &str, otp: &str) -> Result<bool, AppError> {
        let Some(http) = self.http.as_ref() else {
            return Ok(otp == "000000");
        };

        let url = format!(
            "{}/{}/SMS/VERIFY/{}/{}",
            self.base_url,
            self.api_key,
            urlencoding::encode(session_id),
            urlencoding::encode(otp)
        );
        let response = self.call(http, &url).await?;

        Ok(response.status == "Success" && response.details == "OTP Matched")
    }

    async fn call(&self, http: &reqwest::Client, url: &str) -> Result<OtpResponse, AppError> {
        let response = http
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::OtpApi(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::OtpApi(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::OtpApi(format!("JSON parse error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_client_round_trip() {
        let client = OtpClient::new_mock();
        let session = client.send_otp("+15555550123").await.unwrap();
        assert_eq!(session, "offline-session");
        assert!(client.verify_otp(&session, "000000").await.unwrap());
        assert!(!client.verify_otp(&session, "123456").await.unwrap());
    }
}
