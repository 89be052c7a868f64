use actix_web::web;

/// 路由配置包装 / Route configuration wrapper
pub fn configure(cfg: &mut web::ServiceConfig) {
    crate::api::v1::conversation::list::register(cfg, "/conversations");
    crate::api::v1::conversation::clear_unread::register(cfg, "/conversations/clearUnread");
    crate::api::v1::conversation::set_unread::register(cfg, "/conversations/setUnread");
    crate::api::v1::conversation::delete::register(cfg, "/conversations/delete");
    crate::api::v1::conversation::sync::register(cfg, "/conversation/sync");
    crate::api::v1::conversation::sync_messages::register(cfg, "/conversation/syncMessages");
    crate::api::v1::health::basic::register(cfg, "/v1/health");
}
