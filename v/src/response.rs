use actix_web::{http::StatusCode, HttpResponse};

// 通用 HTTP 响应封装
// Generic HTTP response helpers

/// 通用响应（结构体自动转 JSON，失败则原样文本）
/// Generic response: auto JSON from struct, fallback to text
pub fn respond_any<T: serde::Serialize + std::fmt::Debug>(code: StatusCode, data: T) -> HttpResponse {
    match serde_json::to_value(&data) {
        Ok(v) => HttpResponse::build(code).json(v),
        Err(_) => HttpResponse::build(code)
            .content_type("text/plain; charset=utf-8")
            .body(format!("{:?}", data)),
    }
}

/// 操作成功的固定响应体
/// Fixed body for successful mutations
pub fn respond_ok() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

/// 错误响应（人类可读信息）
/// Error response with a human readable message
pub fn respond_error(code: StatusCode, message: impl std::fmt::Display) -> HttpResponse {
    HttpResponse::build(code).json(serde_json::json!({"error": message.to_string()}))
}
