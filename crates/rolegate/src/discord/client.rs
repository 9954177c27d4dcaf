// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the provider's REST API.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};

use super::{
    is_unverified, ApiErrorBody, Guild, MemberAdd, Message, TokenResponse, User,
};
use crate::config::GateConfig;
use crate::error::GateError;

/// REST client acting with the bot credential, or as an end-user for the
/// OAuth endpoints.
pub struct DiscordClient {
    api_base: String,
    bot_token: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    http: Client,
}

impl DiscordClient {
    pub fn new(
        api_base: &str,
        bot_token: &str,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
        timeout: Duration,
    ) -> Self {
        crate::ensure_crypto_provider();
        let http = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self {
            api_base: api_base.trim_end_matches('/').to_owned(),
            bot_token: bot_token.to_owned(),
            client_id: client_id.to_owned(),
            client_secret: client_secret.to_owned(),
            redirect_uri: redirect_uri.to_owned(),
            http,
        }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(
            &config.api_base,
            &config.bot_token,
            &config.client_id,
            &config.client_secret,
            &config.redirect_uri,
            config.http_timeout(),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn bot(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.bot_token))
    }

    /// Exchange an authorization code for a token pair.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, GateError> {
        let resp = self
            .http
            .post(self.url("/oauth2/token"))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Perform a single refresh-token grant.
    ///
    /// Any non-success status becomes [`GateError::RefreshRejected`] carrying
    /// the provider body.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, GateError> {
        let resp = self
            .http
            .post(self.url("/oauth2/token"))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(GateError::RefreshRejected(format!("{}: {text}", status.as_u16())));
        }
        Ok(resp.json().await?)
    }

    /// Identity behind an end-user access token.
    pub async fn current_user(&self, access_token: &str) -> Result<User, GateError> {
        let resp = self.http.get(self.url("/users/@me")).bearer_auth(access_token).send().await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Identity of the bot itself.
    pub async fn current_bot_user(&self) -> Result<User, GateError> {
        let resp = self.bot(self.http.get(self.url("/users/@me"))).send().await?;
        Ok(check(resp).await?.json().await?)
    }

    pub async fn guild(&self, guild_id: &str) -> Result<Guild, GateError> {
        let req = self.http.get(self.url(&format!("/guilds/{guild_id}")));
        let resp = self.bot(req).send().await?;
        Ok(check(resp).await?.json().await?)
    }

    /// `PUT /guilds/{g}/members/{u}` with the end-user's access token.
    ///
    /// 201 and 204 are both success. An unverified-account rejection is
    /// normalized into [`GateError::AccountUnverified`]; other rejections carry
    /// the provider message. 429 answers surface as
    /// [`GateError::ProviderRejected`] so callers can honour `retry_after`.
    pub async fn add_guild_member(
        &self,
        guild_id: &str,
        user_id: &str,
        access_token: &str,
    ) -> Result<MemberAdd, GateError> {
        let req = self
            .http
            .put(self.url(&format!("/guilds/{guild_id}/members/{user_id}")))
            .json(&serde_json::json!({ "access_token": access_token }));
        let resp = self.bot(req).send().await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(MemberAdd::AlreadyMember);
        }
        if status.is_success() {
            return Ok(MemberAdd::Joined);
        }

        let text = resp.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GateError::ProviderRejected { status: status.as_u16(), body: text });
        }
        let body = ApiErrorBody::parse(&text);
        if is_unverified(&body, &text) {
            return Err(GateError::AccountUnverified);
        }
        let message = if body.message.is_empty() { text } else { body.message };
        Err(GateError::MemberAddRejected { status: status.as_u16(), message })
    }

    /// `PUT /guilds/{g}/members/{u}/roles/{r}`.
    pub async fn add_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
    ) -> Result<(), GateError> {
        let req =
            self.http.put(self.url(&format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}")));
        let resp = self.bot(req).send().await?;
        check(resp).await?;
        Ok(())
    }

    pub async fn create_message(
        &self,
        channel_id: &str,
        body: &serde_json::Value,
    ) -> Result<Message, GateError> {
        let req = self.http.post(self.url(&format!("/channels/{channel_id}/messages"))).json(body);
        let resp = self.bot(req).send().await?;
        Ok(check(resp).await?.json().await?)
    }

    pub async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        body: &serde_json::Value,
    ) -> Result<Message, GateError> {
        let req = self
            .http
            .patch(self.url(&format!("/channels/{channel_id}/messages/{message_id}")))
            .json(body);
        let resp = self.bot(req).send().await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Messages in a channel, newest first (provider order).
    pub async fn channel_messages(
        &self,
        channel_id: &str,
        after: Option<&str>,
        limit: u8,
    ) -> Result<Vec<Message>, GateError> {
        let mut path = format!("/channels/{channel_id}/messages?limit={limit}");
        if let Some(after) = after {
            path.push_str("&after=");
            path.push_str(&super::urlencoding(after));
        }
        let req = self.http.get(self.url(&path));
        let resp = self.bot(req).send().await?;
        Ok(check(resp).await?.json().await?)
    }

    pub async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), GateError> {
        let req =
            self.http.delete(self.url(&format!("/channels/{channel_id}/messages/{message_id}")));
        let resp = self.bot(req).send().await?;
        check(resp).await?;
        Ok(())
    }
}

/// Map a non-success response to [`GateError::ProviderRejected`].
async fn check(resp: Response) -> Result<Response, GateError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(GateError::ProviderRejected { status, body })
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
