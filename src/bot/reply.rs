use async_trait::async_trait;
use serenity::{http::Http, model::id::ChannelId};
use std::sync::Arc;

use crate::audio::transport::ResponseChannel;

/// Canal de texto donde se usó un comando; el motor publica ahí los avisos de reproducción
pub struct ChannelReply {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl ChannelReply {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

#[async_trait]
impl ResponseChannel for ChannelReply {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        self.channel_id.say(self.http.as_ref(), text).await?;
        Ok(())
    }
}
