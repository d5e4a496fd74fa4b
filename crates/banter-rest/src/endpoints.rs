//! Typed endpoint wrappers.
//!
//! A representative set over the rate-limited client; every wrapper names
//! its bucket as the route template with the major parameter substituted.

use banter_model::{
    Channel, Guild, InteractionResponse, Member, Message, MessageEdit, MessageSend, User,
};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use crate::{RequestBody, RestClient, RestResult};

impl RestClient {
    /// Fetch the gateway WebSocket URL.
    pub async fn gateway(&self) -> RestResult<String> {
        #[derive(Deserialize)]
        struct GatewayResponse {
            url: String,
        }

        let response: GatewayResponse = self
            .request_json(Method::GET, "/gateway", "/gateway", &RequestBody::Empty)
            .await?;
        Ok(response.url.trim_end_matches('/').to_owned())
    }

    /// Fetch the current bot user.
    pub async fn current_user(&self) -> RestResult<User> {
        self.request_json(
            Method::GET,
            "/users/@me",
            "/users/@me",
            &RequestBody::Empty,
        )
        .await
    }

    /// Fetch a user by ID.
    pub async fn user(&self, user_id: &str) -> RestResult<User> {
        self.request_json(
            Method::GET,
            &format!("/users/{user_id}"),
            "/users/",
            &RequestBody::Empty,
        )
        .await
    }

    /// Fetch a channel by ID.
    pub async fn channel(&self, channel_id: &str) -> RestResult<Channel> {
        self.request_json(
            Method::GET,
            &format!("/channels/{channel_id}"),
            &format!("/channels/{channel_id}"),
            &RequestBody::Empty,
        )
        .await
    }

    /// Fetch a guild by ID.
    pub async fn guild(&self, guild_id: &str) -> RestResult<Guild> {
        self.request_json(
            Method::GET,
            &format!("/guilds/{guild_id}"),
            &format!("/guilds/{guild_id}"),
            &RequestBody::Empty,
        )
        .await
    }

    /// Fetch a guild's channels.
    pub async fn guild_channels(&self, guild_id: &str) -> RestResult<Vec<Channel>> {
        self.request_json(
            Method::GET,
            &format!("/guilds/{guild_id}/channels"),
            &format!("/guilds/{guild_id}/channels"),
            &RequestBody::Empty,
        )
        .await
    }

    /// Fetch a guild member.
    pub async fn guild_member(&self, guild_id: &str, user_id: &str) -> RestResult<Member> {
        self.request_json(
            Method::GET,
            &format!("/guilds/{guild_id}/members/{user_id}"),
            &format!("/guilds/{guild_id}/members/"),
            &RequestBody::Empty,
        )
        .await
    }

    /// Send a message; uploads ride as multipart parts.
    pub async fn channel_message_send(
        &self,
        channel_id: &str,
        message: &MessageSend,
    ) -> RestResult<Message> {
        let path = format!("/channels/{channel_id}/messages");
        let payload = serde_json::to_value(message)?;

        let body = if message.files.is_empty() {
            RequestBody::Json(payload)
        } else {
            RequestBody::Multipart {
                payload_json: payload,
                files: message.files.clone(),
            }
        };

        self.request_json(Method::POST, &path, &path, &body).await
    }

    /// Edit a message.
    pub async fn channel_message_edit(
        &self,
        channel_id: &str,
        message_id: &str,
        edit: &MessageEdit,
    ) -> RestResult<Message> {
        self.request_json(
            Method::PATCH,
            &format!("/channels/{channel_id}/messages/{message_id}"),
            &format!("/channels/{channel_id}/messages/"),
            &RequestBody::Json(serde_json::to_value(edit)?),
        )
        .await
    }

    /// Delete a message.
    pub async fn channel_message_delete(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> RestResult<()> {
        self.request(
            Method::DELETE,
            &format!("/channels/{channel_id}/messages/{message_id}"),
            &format!("/channels/{channel_id}/messages/"),
            &RequestBody::Empty,
        )
        .await?;
        Ok(())
    }

    /// Add the current user's reaction to a message.
    ///
    /// `emoji` is either a unicode emoji or `name:id` for custom emoji.
    pub async fn message_reaction_add(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> RestResult<()> {
        self.request(
            Method::PUT,
            &format!("/channels/{channel_id}/messages/{message_id}/reactions/{emoji}/@me"),
            &format!("/channels/{channel_id}/messages//reactions//"),
            &RequestBody::Empty,
        )
        .await?;
        Ok(())
    }

    /// Remove the current user's reaction from a message.
    pub async fn message_reaction_remove(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> RestResult<()> {
        self.request(
            Method::DELETE,
            &format!("/channels/{channel_id}/messages/{message_id}/reactions/{emoji}/@me"),
            &format!("/channels/{channel_id}/messages//reactions//"),
            &RequestBody::Empty,
        )
        .await?;
        Ok(())
    }

    /// Respond to an interaction.
    pub async fn interaction_respond(
        &self,
        interaction_id: &str,
        token: &str,
        response: &InteractionResponse,
    ) -> RestResult<()> {
        self.request(
            Method::POST,
            &format!("/interactions/{interaction_id}/{token}/callback"),
            "/interactions//callback",
            &RequestBody::Json(serde_json::to_value(response)?),
        )
        .await?;
        Ok(())
    }

    /// Execute a webhook with plain content.
    pub async fn webhook_execute(
        &self,
        webhook_id: &str,
        token: &str,
        content: &str,
    ) -> RestResult<()> {
        self.request(
            Method::POST,
            &format!("/webhooks/{webhook_id}/{token}"),
            &format!("/webhooks/{webhook_id}/"),
            &RequestBody::Json(json!({ "content": content })),
        )
        .await?;
        Ok(())
    }
}
