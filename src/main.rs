use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use peer_ledger::config::NodeConfig;
use peer_ledger::{api, blockchain, network};

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_node,
        api::handlers::get_chain,
        api::handlers::get_mempool,
        api::handlers::validate_chain,
        api::handlers::new_transaction,
        api::handlers::mine_block,
        api::handlers::update_mempool,
        api::handlers::update_chain,
        api::handlers::replace_chain
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::TransactionInput,
            blockchain::TransactionOutput,
            blockchain::TransactionRequest,
            blockchain::Address,
            blockchain::NodeIdentity,
            blockchain::NodeSnapshot,
            network::Peer,
            network::ChainSnapshot,
            api::handlers::ValidationResponse,
            api::handlers::TransactionResponse,
            api::handlers::MineResponse,
            api::handlers::ReplaceChainResponse
        )
    ),
    tags(
        (name = "ledger", description = "Ledger node API endpoints")
    ),
    info(
        title = "Peer Ledger API",
        version = "0.1.0",
        description = "A minimal multi-node proof-of-work ledger",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::from_env()?;

    let identity = blockchain::NodeIdentity::new(config.port);
    let node = blockchain::Node::new(identity, config.consensus.clone())?;
    info!(
        "Node:{} created with genesis {} (target bits {:#010x}, difficulty {})",
        config.port,
        node.tip().hash,
        config.consensus.bits,
        node.difficulty()
    );

    let peers: Vec<String> = config.peers.iter().map(|peer| peer.to_string()).collect();
    info!("Peers: [{}]", peers.join(", "));

    let client = network::HttpPeerClient::new(config.peer_timeout)?;
    let state = web::Data::new(api::AppState::new(node, config.peers.clone(), Arc::new(client)));

    info!("Starting HTTP server at http://{}:{}", config.host, config.port);

    // Start HTTP server
    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Configure OpenAPI documentation
        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(api::configure_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
