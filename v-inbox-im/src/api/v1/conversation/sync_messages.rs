use actix_web::http::StatusCode;
use actix_web::{web, Responder};
use std::sync::Arc;
use v::response::{respond_any, respond_error};

use super::{get_recent_messages, ChannelRecentReq};
use crate::VInboxIMServer;

const DEFAULT_MSG_COUNT: usize = 15;

#[derive(serde::Deserialize)]
pub struct SyncMessagesRequest {
    pub uid: String,
    #[serde(default)]
    pub channels: Vec<ChannelRecentReq>,
    #[serde(default)]
    pub msg_count: i64,
}

pub fn register(cfg: &mut actix_web::web::ServiceConfig, path: &str) {
    cfg.service(web::resource(path).route(web::post().to(sync_messages_handle)));
}

pub async fn sync_messages_handle(
    server: web::Data<Arc<VInboxIMServer>>,
    req: web::Json<SyncMessagesRequest>,
) -> impl Responder {
    if req.uid.trim().is_empty() {
        return respond_error(StatusCode::BAD_REQUEST, "uid cannot be empty");
    }
    let msg_count = if req.msg_count <= 0 {
        DEFAULT_MSG_COUNT
    } else {
        req.msg_count as usize
    };
    match get_recent_messages(server.store.as_ref(), &req.uid, msg_count, &req.channels) {
        Ok(resps) => respond_any(StatusCode::OK, resps),
        Err(e) => respond_error(StatusCode::BAD_REQUEST, e),
    }
}
