use actix_web::http::StatusCode;
use actix_web::{web, Responder};
use std::sync::Arc;
use v::response::{respond_error, respond_ok};

use crate::domain::channel::{resolve_person_channel, CHANNEL_TYPE_PERSON};
use crate::VInboxIMServer;

#[derive(serde::Deserialize)]
pub struct DeleteConversationRequest {
    pub uid: String,
    pub channel_id: String,
    pub channel_type: u8,
}

pub fn register(cfg: &mut actix_web::web::ServiceConfig, path: &str) {
    cfg.service(web::resource(path).route(web::post().to(delete_conversation_handle)));
}

pub async fn delete_conversation_handle(
    server: web::Data<Arc<VInboxIMServer>>,
    req: web::Json<DeleteConversationRequest>,
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
    server
        .conversation_manager
        .delete_conversation(&[req.uid.clone()], &channel_id, req.channel_type);
    respond_ok()
}
