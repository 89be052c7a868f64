use actix_web::http::StatusCode;
use actix_web::{web, Responder};
use std::sync::Arc;
use v::response::{respond_error, respond_ok};

use crate::domain::channel::{resolve_person_channel, CHANNEL_TYPE_PERSON};
use crate::domain::conversation::Conversation;
use crate::VInboxIMServer;

#[derive(serde::Deserialize)]
pub struct SetUnreadRequest {
    pub uid: String,
    pub channel_id: String,
    pub channel_type: u8,
    #[serde(default)]
    pub unread: u32,
    /// 超大频道由客户端传序列号主动维护 / Large channels are maintained by the
    /// client through the sequence it passes
    #[serde(default)]
    pub message_seq: u32,
}

pub fn register(cfg: &mut actix_web::web::ServiceConfig, path: &str) {
    cfg.service(web::resource(path).route(web::post().to(set_unread_handle)));
}

pub async fn set_unread_handle(
    server: web::Data<Arc<VInboxIMServer>>,
    req: web::Json<SetUnreadRequest>,
) -> impl Responder {
    if req.uid.trim().is_empty() {
        return respond_error(StatusCode::BAD_REQUEST, "uid cannot be empty");
    }
    if req.channel_id.is_empty() || req.channel_type == 0 {
        return respond_error(StatusCode::BAD_REQUEST, "channel_id or channel_type cannot be empty");
    }
    let channel_id = if req.channel_type == CHANNEL_TYPE_PERSON {
        match resolve_person_channel(&req.uid, &req.channel_id) {
            Ok(id) => id,
            Err(e) => return respond_error(StatusCode::BAD_REQUEST, e),
        }
    } else {
        req.channel_id.clone()
    };
    let manager = &server.conversation_manager;
    let existing = manager.get_conversation(&req.uid, &channel_id, req.channel_type);
    if existing.is_none() && req.message_seq > 0 && req.unread == 0 {
        manager.add_or_update_conversation(
            &req.uid,
            Conversation {
                uid: req.uid.clone(),
                channel_id,
                channel_type: req.channel_type,
                unread_count: 0,
                timestamp: 0,
                last_msg_seq: 0,
                offset_msg_seq: req.message_seq,
                last_client_msg_no: String::new(),
                last_msg_id: 0,
                version: 0,
            },
        );
        return respond_ok();
    }
    match manager.set_conversation_unread(
        &req.uid,
        &channel_id,
        req.channel_type,
        req.unread,
        req.message_seq,
    ) {
        Ok(()) => respond_ok(),
        Err(e) => respond_error(StatusCode::BAD_REQUEST, e),
    }
}
