use actix_web::http::StatusCode;
use actix_web::{web, Responder};
use std::sync::Arc;
use v::response::{respond_any, respond_error};

use super::{get_recent_messages, parse_last_msg_seqs, ChannelRecentReq, MessageResp};
use crate::domain::channel::{channel_key, Channel};
use crate::domain::conversation::Conversation;
use crate::storage::MessageStore;
use crate::VInboxIMServer;

#[derive(serde::Deserialize)]
pub struct SyncRequest {
    pub uid: String,
    /// 客户端已知的最大会话版本号 / Highest conversation version the client holds
    #[serde(default)]
    pub version: i64,
    /// 客户端各会话的最后序列号，格式 channelID:channelType:last_msg_seq|...
    /// Last sequence per client conversation, channelID:channelType:last_msg_seq|...
    #[serde(default)]
    pub last_msg_seqs: String,
    /// 每个会话附带的消息条数 / Messages attached per conversation
    #[serde(default)]
    pub msg_count: i64,
    /// 超大频道集合 / Large channel set
    #[serde(default)]
    pub larges: Vec<Channel>,
}

#[derive(Debug, serde::Serialize)]
pub struct SyncConversationResp {
    pub channel_id: String,
    pub channel_type: u8,
    pub unread: u32,
    pub timestamp: i64,
    pub last_msg_seq: u32,
    pub last_client_msg_no: String,
    pub last_msg_id: i64,
    pub offset_msg_seq: u32,
    pub version: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recents: Vec<MessageResp>,
}

pub fn register(cfg: &mut actix_web::web::ServiceConfig, path: &str) {
    cfg.service(web::resource(path).route(web::post().to(sync_conversations_handle)));
}

pub async fn sync_conversations_handle(
    server: web::Data<Arc<VInboxIMServer>>,
    req: web::Json<SyncRequest>,
) -> impl Responder {
    if req.uid.trim().is_empty() {
        return respond_error(StatusCode::BAD_REQUEST, "uid cannot be empty");
    }
    let mut merged = server
        .conversation_manager
        .get_conversations(&req.uid, req.version, &req.larges);

    // 超大频道未读数不在服务端维护，注入存储里的最后一条消息现算
    // Large-channel unread counts are not maintained server side, inject the
    // store's last message and derive on the fly
    for large in &req.larges {
        let last_messages = match server
            .store
            .load_last_msgs(&large.channel_id, large.channel_type, 1)
        {
            Ok(messages) => messages,
            Err(e) => return respond_error(StatusCode::BAD_REQUEST, e),
        };
        let Some(last) = last_messages.last() else {
            continue;
        };
        match merged
            .iter()
            .position(|c| c.channel_id == large.channel_id && c.channel_type == large.channel_type)
        {
            Some(idx) => {
                let conversation = &mut merged[idx];
                conversation.timestamp = last.timestamp;
                conversation.last_msg_seq = last.message_seq;
                conversation.last_client_msg_no = last.client_msg_no.clone();
                conversation.last_msg_id = last.message_id;
                conversation.unread_count =
                    last.message_seq.saturating_sub(conversation.offset_msg_seq);
            }
            None => merged.push(Conversation {
                uid: req.uid.clone(),
                channel_id: large.channel_id.clone(),
                channel_type: large.channel_type,
                unread_count: 0,
                timestamp: last.timestamp,
                last_msg_seq: last.message_seq,
                offset_msg_seq: 0,
                last_client_msg_no: last.client_msg_no.clone(),
                last_msg_id: last.message_id,
                version: 0,
            }),
        }
    }

    let client_seqs = parse_last_msg_seqs(&req.last_msg_seqs);
    let mut resps = Vec::with_capacity(merged.len());
    for conversation in merged {
        let recents = if req.msg_count > 0 {
            let last_msg_seq = client_seqs
                .get(&channel_key(&conversation.channel_id, conversation.channel_type))
                .copied()
                .unwrap_or(0);
            let range = [ChannelRecentReq {
                channel_id: conversation.channel_id.clone(),
                channel_type: conversation.channel_type,
                last_msg_seq,
            }];
            match get_recent_messages(server.store.as_ref(), &req.uid, req.msg_count as usize, &range) {
                Ok(mut list) => list.pop().map(|c| c.messages).unwrap_or_default(),
                Err(e) => return respond_error(StatusCode::BAD_REQUEST, e),
            }
        } else {
            Vec::new()
        };
        resps.push(SyncConversationResp {
            channel_id: conversation.channel_id,
            channel_type: conversation.channel_type,
            unread: conversation.unread_count,
            timestamp: conversation.timestamp,
            last_msg_seq: conversation.last_msg_seq,
            last_client_msg_no: conversation.last_client_msg_no,
            last_msg_id: conversation.last_msg_id,
            offset_msg_seq: conversation.offset_msg_seq,
            version: conversation.version,
            recents,
        });
    }
    respond_any(StatusCode::OK, resps)
}
