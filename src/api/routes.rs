use actix_web::{error, web, HttpResponse};

use super::handlers;

/// Configures the node routes
///
/// Paths are unprefixed because peers call each other on them directly.
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/node", web::get().to(handlers::get_node))
        .route("/chain", web::get().to(handlers::get_chain))
        .route("/mempool", web::get().to(handlers::get_mempool))
        .route("/validate_chain", web::get().to(handlers::validate_chain))
        .route("/transaction", web::post().to(handlers::new_transaction))
        .route("/mine", web::get().to(handlers::mine_block))
        .route("/update_mempool", web::post().to(handlers::update_mempool))
        .route("/update_chain", web::post().to(handlers::update_chain))
        .route("/replace_chain", web::get().to(handlers::replace_chain));
}

/// Answers malformed JSON payloads with a 400 and a JSON error body
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let response = HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("Malformed payload: {}", err)
        }));
        error::InternalError::from_response(err, response).into()
    })
}
