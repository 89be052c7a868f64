use actix_web::http::StatusCode;
use actix_web::{web, Responder};
use std::sync::Arc;
use v::response::{respond_any, respond_error};

use super::MessageResp;
use crate::domain::channel::message_channel_id;
use crate::storage::MessageStore;
use crate::VInboxIMServer;

#[derive(serde::Deserialize)]
pub struct ListQuery {
    pub uid: String,
}

/// 会话列表条目，带最后一条消息摘要 / Conversation list entry with last message summary
#[derive(Debug, serde::Serialize)]
pub struct ConversationResp {
    pub channel_id: String,
    pub channel_type: u8,
    pub unread: u32,
    pub timestamp: i64,
    pub last_message: Option<MessageResp>,
}

pub fn register(cfg: &mut actix_web::web::ServiceConfig, path: &str) {
    cfg.service(web::resource(path).route(web::get().to(conversations_list_handle)));
}

pub async fn conversations_list_handle(
    server: web::Data<Arc<VInboxIMServer>>,
    query: web::Query<ListQuery>,
) -> impl Responder {
    if query.uid.trim().is_empty() {
        return respond_error(StatusCode::BAD_REQUEST, "uid cannot be empty");
    }
    let conversations = server
        .conversation_manager
        .get_conversations(&query.uid, 0, &[]);
    let mut resps = Vec::with_capacity(conversations.len());
    for conversation in conversations {
        let target = message_channel_id(&query.uid, &conversation.channel_id, conversation.channel_type);
        let last_message = match server.store.load_msg(
            &target,
            conversation.channel_type,
            conversation.last_msg_seq,
        ) {
            Ok(message) => message.as_ref().map(MessageResp::from),
            Err(e) => return respond_error(StatusCode::BAD_REQUEST, e),
        };
        resps.push(ConversationResp {
            channel_id: conversation.channel_id,
            channel_type: conversation.channel_type,
            unread: conversation.unread_count,
            timestamp: conversation.timestamp,
            last_message,
        });
    }
    respond_any(StatusCode::OK, resps)
}
